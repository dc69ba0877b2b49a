#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `tessera-tensor` is a small array engine: a dynamically typed, strided
//! tensor whose storage is reference counted and tagged with the device it
//! lives on. It is the backing store of `tessera-image`.
//!
//! # Architecture
//!
//! - **Tensor**: shape, strides, offset and [`DType`] over a shared storage handle
//! - **TensorStorage**: `Arc` shared allocation, guarded by an internal lock
//! - **Device**: closed set of devices, each with a capability table
//! - **Backend**: the allocator and kernels of one device, found with [`backend::dispatch`]
//!
//! # Quick Start
//!
//! ```rust
//! use tessera_tensor::{DType, Device, Tensor};
//!
//! let t = Tensor::from_shape_vec(&[2, 3], vec![1u8, 2, 3, 4, 5, 6], Device::Cpu).unwrap();
//! assert_eq!(t.get::<u8>(&[1, 2]).unwrap(), 6);
//!
//! // views share storage
//! let transposed = t.permute_axes(&[1, 0]).unwrap();
//! assert!(transposed.shares_storage(&t));
//! assert_eq!(transposed.to_vec::<u8>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
//!
//! // kernels allocate a new tensor
//! let f = t.affine(0.5, 0.0, DType::F32).unwrap();
//! assert_eq!(f.to_vec::<f32>().unwrap(), vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0]);
//! ```

/// Allocator module containing memory management utilities.
///
/// This module provides the [`TensorAllocator`] trait and the [`CpuAllocator`]
/// that uses the system allocator.
pub mod allocator;

/// Backend module containing the per-device kernels and the dispatch table.
pub mod backend;

/// Device module containing the device enum and capability tables.
pub mod device;

/// Element data types.
pub mod dtype;

/// Arithmetic and reduction operations between tensors.
pub mod ops;

/// Storage module containing the reference counted memory buffer.
pub mod storage;

/// Tensor module containing the main tensor implementation and error types.
pub mod tensor;

pub use crate::allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError};
pub use crate::backend::{Backend, BinaryOp, CpuBackend};
pub use crate::device::{Capabilities, Device, Op};
pub use crate::dtype::{DType, TensorDType};
pub use crate::storage::TensorStorage;
pub use crate::tensor::{get_strides_from_shape, Tensor, TensorError};
