use tessera_tensor::DType;

use crate::{error::ImageError, image::Image};

impl Image {
    /// Dilate an 8 bit mask image with a square structuring element.
    ///
    /// Each output pixel is the per-channel maximum over the
    /// `(2 * half_kernel_size + 1)` square window centered on it. Windows are
    /// clipped at the image border; nothing outside the image takes part.
    ///
    /// # Errors
    ///
    /// * [`ImageError::InvalidArgument`] if `half_kernel_size < 1`.
    /// * [`ImageError::UnsupportedOperation`] if the image is not `u8`.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_image::Image;
    /// use tessera_tensor::{DType, Device};
    ///
    /// let mask = Image::create(5, 5, 1, DType::U8, Device::Cpu).unwrap();
    /// mask.at(2, 2).unwrap().set_item(255u8).unwrap();
    ///
    /// let dilated = mask.dilate(1).unwrap();
    /// assert_eq!(dilated.at(1, 1).unwrap().item::<u8>().unwrap(), 255);
    /// assert_eq!(dilated.at(0, 0).unwrap().item::<u8>().unwrap(), 0);
    /// ```
    pub fn dilate(&self, half_kernel_size: i32) -> Result<Image, ImageError> {
        if half_kernel_size < 1 {
            return Err(ImageError::invalid_argument(format!(
                "half_kernel_size must be >= 1, got {half_kernel_size}"
            )));
        }
        if self.dtype() != DType::U8 {
            return Err(ImageError::unsupported_operation(
                "dilate",
                format!("only u8 mask images are supported, got {}", self.dtype()),
            ));
        }
        let half = half_kernel_size as usize;
        let data = self.as_tensor().max_pool2d(half)?;
        Image::from_tensor(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_tensor::{Device, Tensor};

    fn mask(rows: usize, cols: usize, channels: usize, data: Vec<u8>) -> Result<Image, ImageError> {
        let t = Tensor::from_shape_vec(&[rows, cols, channels], data, Device::Cpu)?;
        Image::from_tensor(&t)
    }

    #[test]
    fn dilate_single_pixel() -> Result<(), ImageError> {
        let mut data = vec![0u8; 25];
        data[2 * 5 + 2] = 255;
        let dilated = mask(5, 5, 1, data)?.dilate(1)?;
        #[rustfmt::skip]
        let expected = vec![
            0, 0,   0,   0,   0,
            0, 255, 255, 255, 0,
            0, 255, 255, 255, 0,
            0, 255, 255, 255, 0,
            0, 0,   0,   0,   0,
        ];
        assert_eq!(dilated.as_tensor().to_vec::<u8>()?, expected);
        Ok(())
    }

    #[test]
    fn dilate_clips_at_border() -> Result<(), ImageError> {
        let mut data = vec![0u8; 16];
        data[0] = 9;
        let dilated = mask(4, 4, 1, data)?.dilate(1)?;
        #[rustfmt::skip]
        let expected = vec![
            9, 9, 0, 0,
            9, 9, 0, 0,
            0, 0, 0, 0,
            0, 0, 0, 0,
        ];
        assert_eq!(dilated.as_tensor().to_vec::<u8>()?, expected);
        Ok(())
    }

    #[test]
    fn dilate_channels_independently() -> Result<(), ImageError> {
        // 1x3 image, 2 channels
        let dilated = mask(1, 3, 2, vec![5, 0, 0, 0, 0, 7])?.dilate(1)?;
        assert_eq!(dilated.as_tensor().to_vec::<u8>()?, vec![5, 0, 5, 7, 0, 7]);
        Ok(())
    }

    #[test]
    fn dilate_large_kernel() -> Result<(), ImageError> {
        let mut data = vec![0u8; 9];
        data[4] = 1;
        let dilated = mask(3, 3, 1, data)?.dilate(5)?;
        assert_eq!(dilated.as_tensor().to_vec::<u8>()?, vec![1; 9]);
        Ok(())
    }

    #[test]
    fn dilate_keeps_source() -> Result<(), ImageError> {
        let mut data = vec![0u8; 9];
        data[4] = 1;
        let source = mask(3, 3, 1, data.clone())?;
        let dilated = source.dilate(1)?;
        assert!(!dilated.as_tensor().shares_storage(source.as_tensor()));
        assert_eq!(source.as_tensor().to_vec::<u8>()?, data);
        Ok(())
    }

    #[test]
    fn dilate_empty() -> Result<(), ImageError> {
        let image = Image::create(0, 4, 2, DType::U8, Device::Cpu)?;
        let dilated = image.dilate(2)?;
        assert!(dilated.is_empty());
        assert_eq!(dilated.as_tensor().shape(), &[0, 4, 2]);
        Ok(())
    }

    #[test]
    fn dilate_invalid() -> Result<(), ImageError> {
        let image = Image::create(3, 3, 1, DType::U8, Device::Cpu)?;
        assert!(matches!(image.dilate(0), Err(ImageError::InvalidArgument(_))));
        assert!(matches!(image.dilate(-2), Err(ImageError::InvalidArgument(_))));

        let float = Image::create(3, 3, 1, DType::F32, Device::Cpu)?;
        assert!(matches!(
            float.dilate(1),
            Err(ImageError::UnsupportedOperation { .. })
        ));
        Ok(())
    }
}
