#![deny(missing_docs)]
//! Device abstracted images backed by shared tensors
//!
//! An [`Image`] wraps one rank 3 [`tessera_tensor::Tensor`] with shape
//! `{rows, cols, channels}`. Its dtype and device are those of the tensor, and
//! images built from a tensor share its storage.
//!
//! ```
//! use tessera_image::{ColorConversion, Image};
//! use tessera_tensor::{DType, Device};
//!
//! let rgb = Image::create(4, 4, 3, DType::U8, Device::Cpu).unwrap();
//! let gray = rgb.convert_color(ColorConversion::RgbToGrayWeighted).unwrap();
//! let float = gray.convert_to(DType::F32, None, None, false).unwrap();
//! assert_eq!(float.to_string(), "Image[size={4,4}, channels=1, f32, cpu]");
//! ```

/// Color space conversions.
pub mod color;

/// Error types for the image module.
pub mod error;

/// image representation for computer vision purposes.
pub mod image;

/// Conversion to and from the legacy host image.
pub mod legacy;

/// Morphological filters.
pub mod morphology;

/// Dtype conversion and pixel arithmetic.
pub mod ops;

pub use crate::color::ColorConversion;
pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
pub use crate::legacy::LegacyImage;
