//! Device abstracted images over shared tensors.
//!
//! ```
//! use tessera::image::Image;
//! use tessera::tensor::{DType, Device, Tensor};
//!
//! let tensor = Tensor::zeros(&[2, 2], DType::U8, Device::Cpu).unwrap();
//! let image = Image::from_tensor(&tensor).unwrap();
//! image.at(1, 1).unwrap().set_item(7u8).unwrap();
//! assert_eq!(tensor.get::<u8>(&[1, 1]).unwrap(), 7);
//! ```

#[doc(inline)]
pub use tessera_tensor as tensor;

#[doc(inline)]
pub use tessera_image as image;
