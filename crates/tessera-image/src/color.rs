use crate::{error::ImageError, image::Image};

/// Define the RGB weights for the grayscale conversion.
const RW: f64 = 0.299;
const GW: f64 = 0.587;
const BW: f64 = 0.114;

/// Supported color conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversion {
    /// Y = (R + G + B) / 3
    RgbToGrayEqual,
    /// Y = 0.299 * R + 0.587 * G + 0.114 * B
    RgbToGrayWeighted,
}

impl ColorConversion {
    fn weights(self) -> [f64; 3] {
        match self {
            ColorConversion::RgbToGrayEqual => [1.0 / 3.0; 3],
            ColorConversion::RgbToGrayWeighted => [RW, GW, BW],
        }
    }
}

impl Image {
    /// Convert an RGB image to grayscale.
    ///
    /// The result is a new single channel image with the same dtype and device.
    /// Integer results are rounded and saturated.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidArgument`] if the image does not have 3 channels.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_image::{ColorConversion, Image};
    /// use tessera_tensor::{DType, Device};
    ///
    /// let image = Image::create(4, 5, 3, DType::F32, Device::Cpu).unwrap();
    /// let gray = image.convert_color(ColorConversion::RgbToGrayWeighted).unwrap();
    /// assert_eq!(gray.channels(), 1);
    /// assert_eq!(gray.rows(), 4);
    /// assert_eq!(gray.cols(), 5);
    /// ```
    pub fn convert_color(&self, conversion: ColorConversion) -> Result<Image, ImageError> {
        if self.channels() != 3 {
            return Err(ImageError::invalid_argument(format!(
                "{conversion:?} needs a 3 channel image, got {} channels",
                self.channels()
            )));
        }
        let gray = self
            .as_tensor()
            .weighted_channel_sum(&conversion.weights())?;
        Image::from_tensor(&gray)
    }
}
