use tessera_tensor::DType;

use crate::{error::ImageError, image::Image};

/// The scale used by [`Image::convert_to`] when none is given.
///
/// Maps the full range of unsigned integer data onto `[0, 1]` when converting
/// to floating point, and is `1` for every other pair.
///
/// # Example
///
/// ```
/// use tessera_image::ops::default_scale;
/// use tessera_tensor::DType;
///
/// assert_eq!(default_scale(DType::U8, DType::F32), 1.0 / 255.0);
/// assert_eq!(default_scale(DType::U16, DType::F64), 1.0 / 65535.0);
/// assert_eq!(default_scale(DType::U8, DType::U16), 1.0);
/// ```
pub fn default_scale(src: DType, dst: DType) -> f64 {
    match (src, dst) {
        (DType::U8, DType::F32 | DType::F64) => 1.0 / 255.0,
        (DType::U16, DType::F32 | DType::F64) => 1.0 / 65535.0,
        _ => 1.0,
    }
}

impl Image {
    /// Convert the image to `dtype` as `scale * pixel + offset`.
    ///
    /// # Arguments
    ///
    /// * `dtype` - Target data type.
    /// * `scale` - Multiplier; `None` picks [`default_scale`] for the conversion.
    /// * `offset` - Added after scaling; `None` means 0.
    /// * `copy` - Always produce new storage when true.
    ///
    /// When `copy` is false, the dtype does not change and neither scale nor
    /// offset is given, the returned image shares storage with `self`.
    ///
    /// Integer targets round half away from zero and saturate.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_image::Image;
    /// use tessera_tensor::{DType, Device, Tensor};
    ///
    /// let t = Tensor::from_shape_vec(&[1, 2], vec![0u8, 255], Device::Cpu).unwrap();
    /// let image = Image::from_tensor(&t).unwrap();
    /// let float = image.convert_to(DType::F32, None, None, false).unwrap();
    /// assert_eq!(float.as_tensor().to_vec::<f32>().unwrap(), vec![0.0, 1.0]);
    /// ```
    pub fn convert_to(
        &self,
        dtype: DType,
        scale: Option<f64>,
        offset: Option<f64>,
        copy: bool,
    ) -> Result<Image, ImageError> {
        if !copy && dtype == self.dtype() && scale.is_none() && offset.is_none() {
            log::debug!("convert_to {dtype}: same dtype without copy, sharing storage");
            return Ok(self.clone());
        }
        let scale = scale.unwrap_or_else(|| default_scale(self.dtype(), dtype));
        let offset = offset.unwrap_or(0.0);
        let data = self.as_tensor().affine(scale, offset, dtype)?;
        Image::from_tensor(&data)
    }

    /// Replace every pixel value `x` by `scale * x + offset`, in place.
    ///
    /// The dtype never changes; integer images round and saturate. The change is
    /// visible through every handle sharing the pixels.
    pub fn linear_transform(&mut self, scale: f64, offset: f64) -> Result<&mut Self, ImageError> {
        if !self.as_tensor().is_contiguous() {
            log::debug!("linear_transform: making image data contiguous first");
            *self = Image::from_tensor(&self.as_tensor().contiguous()?)?;
        }
        self.as_tensor().affine_(scale, offset)?;
        Ok(self)
    }
}
