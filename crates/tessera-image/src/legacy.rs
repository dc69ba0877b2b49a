use tessera_tensor::{DType, Device, Tensor};

use crate::{error::ImageError, image::Image};

/// A host image stored as interleaved, row-major, native endian bytes.
///
/// The element type is only known through `bytes_per_channel`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyImage {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
    /// Number of interleaved channels
    pub num_of_channels: usize,
    /// Size of one channel value in bytes
    pub bytes_per_channel: usize,
    /// Pixel bytes
    pub data: Vec<u8>,
}

impl LegacyImage {
    /// Create a zeroed legacy image.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidArgument`] if the byte length overflows `usize`.
    pub fn new(
        width: usize,
        height: usize,
        num_of_channels: usize,
        bytes_per_channel: usize,
    ) -> Result<Self, ImageError> {
        let mut legacy = Self {
            width,
            height,
            num_of_channels,
            bytes_per_channel,
            data: Vec::new(),
        };
        legacy.data = vec![0; legacy.checked_byte_len()?];
        Ok(legacy)
    }

    /// Number of bytes the geometry calls for, or `None` if it overflows `usize`.
    pub fn byte_len(&self) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        [self.height, self.num_of_channels, self.bytes_per_channel]
            .iter()
            .try_fold(self.width, |acc, &d| acc.checked_mul(d))
    }

    fn checked_byte_len(&self) -> Result<usize, ImageError> {
        self.byte_len().ok_or_else(|| {
            ImageError::invalid_argument(format!(
                "geometry {}x{}x{} of {} byte channels overflows the address space",
                self.width, self.height, self.num_of_channels, self.bytes_per_channel
            ))
        })
    }

    /// Returns true if the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.num_of_channels == 0
            || self.bytes_per_channel == 0
    }

    /// Returns true if the image has pixels and a buffer that matches its geometry.
    pub fn has_data(&self) -> bool {
        !self.is_empty() && self.byte_len() == Some(self.data.len())
    }
}

fn dtype_from_bytes(bytes_per_channel: usize) -> Option<DType> {
    match bytes_per_channel {
        1 => Some(DType::U8),
        2 => Some(DType::U16),
        4 => Some(DType::F32),
        _ => None,
    }
}

fn is_legacy_channels(channels: usize) -> bool {
    matches!(channels, 1 | 3 | 4)
}

impl Image {
    /// Create an image on `device` from a legacy image. Always copies.
    ///
    /// The element type follows `bytes_per_channel`: 1 is `u8`, 2 is `u16` and 4 is `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidArgument`] for other byte sizes, channel
    /// counts other than 1, 3 or 4, or a buffer that does not match the geometry.
    pub fn from_legacy(legacy: &LegacyImage, device: Device) -> Result<Image, ImageError> {
        let dtype = dtype_from_bytes(legacy.bytes_per_channel).ok_or_else(|| {
            ImageError::invalid_argument(format!(
                "unsupported bytes_per_channel {}",
                legacy.bytes_per_channel
            ))
        })?;
        if !is_legacy_channels(legacy.num_of_channels) {
            return Err(ImageError::invalid_argument(format!(
                "unsupported num_of_channels {}",
                legacy.num_of_channels
            )));
        }
        let byte_len = legacy.checked_byte_len()?;
        if legacy.data.len() != byte_len {
            return Err(ImageError::invalid_argument(format!(
                "buffer holds {} bytes, geometry needs {byte_len}",
                legacy.data.len()
            )));
        }
        let shape = [legacy.height, legacy.width, legacy.num_of_channels];
        let host = Tensor::from_raw_bytes(&shape, dtype, &legacy.data, Device::Cpu)?;
        Image::from_tensor(&host.to_device(device)?)
    }

    /// Copy the image into a legacy image.
    ///
    /// Images on other devices are transferred to the host first. That needs a
    /// device backend able to copy to the host; the host backend alone cannot
    /// read device memory.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::UnsupportedOperation`] unless the image is `u8`,
    /// `u16` or `f32` with 1, 3 or 4 channels, and [`ImageError::Storage`] if
    /// the pixels cannot be copied to the host.
    pub fn to_legacy(&self) -> Result<LegacyImage, ImageError> {
        if !matches!(self.dtype(), DType::U8 | DType::U16 | DType::F32)
            || !is_legacy_channels(self.channels())
        {
            return Err(ImageError::unsupported_operation(
                "to_legacy",
                format!(
                    "no legacy layout for {} channels of {}",
                    self.channels(),
                    self.dtype()
                ),
            ));
        }
        let mut data = self.as_tensor().clone();
        if !self.device().is_cpu() {
            log::debug!("to_legacy: transferring image from {} to cpu", self.device());
            data = data.to_cpu()?;
        }
        Ok(LegacyImage {
            width: self.cols(),
            height: self.rows(),
            num_of_channels: self.channels(),
            bytes_per_channel: self.dtype().size_in_bytes(),
            data: data.to_bytes()?,
        })
    }
}
