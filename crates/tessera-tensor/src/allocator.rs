use std::alloc;
use std::alloc::Layout;

use thiserror::Error;

use crate::device::Device;

/// An error type for tensor allocator operations.
#[derive(Debug, Error, PartialEq)]
pub enum TensorAllocatorError {
    /// An error occurred during memory allocation.
    #[error("Invalid tensor layout {0}")]
    LayoutError(core::alloc::LayoutError),

    /// An error occurred during memory allocation.
    #[error("Null pointer")]
    NullPointer,

    /// A copy was requested between devices that cannot exchange data.
    #[error("Cannot copy from {src} to {dst}")]
    UnsupportedCopy {
        /// Source device
        src: Device,
        /// Destination device
        dst: Device,
    },
}

/// A trait for allocating and deallocating memory for tensors.
///
/// # Safety
///
/// The tensor allocator must be thread-safe.
pub trait TensorAllocator: Send + Sync {
    /// Returns the device this allocator hands out memory on.
    fn device(&self) -> Device;

    /// Allocates zero-initialized memory for a tensor with the given layout.
    fn alloc_zeroed(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError>;

    /// Deallocates memory for a tensor with the given layout.
    fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

#[derive(Clone, Copy, Debug, Default)]
/// A tensor allocator that uses the system allocator.
pub struct CpuAllocator;

impl TensorAllocator for CpuAllocator {
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Allocates zeroed memory for a tensor.
    ///
    /// # Arguments
    ///
    /// * `layout` - The layout of the tensor. Must have a non-zero size.
    ///
    /// # Returns
    ///
    /// A non-null pointer to the allocated memory if successful, otherwise an error.
    fn alloc_zeroed(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            Err(TensorAllocatorError::NullPointer)?
        }
        Ok(ptr)
    }

    /// Deallocates memory for a tensor with the given layout.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the layout must be correct.
    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !ptr.is_null() {
            unsafe { alloc::dealloc(ptr, layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocator() -> Result<(), TensorAllocatorError> {
        let allocator = CpuAllocator;
        let layout = Layout::from_size_align(1024, 64).map_err(TensorAllocatorError::LayoutError)?;
        let ptr = allocator.alloc_zeroed(layout)?;
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 1024) };
        assert!(bytes.iter().all(|&b| b == 0));
        allocator.dealloc(ptr, layout);
        Ok(())
    }

    #[test]
    fn test_cpu_allocator_device() {
        assert_eq!(CpuAllocator.device(), Device::Cpu);
    }
}
