//! Arc-based storage management for zero-copy views and shared mutation.
//!
//! Every tensor handle that views the same memory holds a clone of the same
//! [`TensorStorage`]. Writes through one handle are visible through all the
//! others; there is no copy-on-write.

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    allocator::TensorAllocatorError, backend::Backend, device::Device, dtype::TensorDType,
    TensorError,
};

/// The raw allocation. Only reachable through the lock in [`StorageImpl`].
struct RawBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the buffer is only dereferenced while holding the surrounding RwLock,
// which serializes writers against readers.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

struct StorageImpl {
    buffer: RwLock<RawBuffer>,
    /// Number of usable bytes.
    len: usize,
    backend: &'static dyn Backend,
}

impl Drop for StorageImpl {
    fn drop(&mut self) {
        let buffer = self
            .buffer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if buffer.layout.size() != 0 {
            self.backend
                .allocator()
                .dealloc(buffer.ptr.as_ptr(), buffer.layout);
        }
    }
}

/// Reference counted tensor storage.
///
/// Clones are cheap (an `Arc` increment) and alias the same memory.
/// The memory is returned to the device allocator when the last clone drops.
#[derive(Clone)]
pub struct TensorStorage {
    inner: Arc<StorageImpl>,
}

impl TensorStorage {
    /// Allocates `len` zeroed bytes aligned to `align` on the backend's device.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout is invalid or the allocation fails.
    pub fn zeroed(
        len: usize,
        align: usize,
        backend: &'static dyn Backend,
    ) -> Result<Self, TensorError> {
        if len == 0 {
            return Ok(Self::empty(backend));
        }
        let layout =
            Layout::from_size_align(len, align).map_err(TensorAllocatorError::LayoutError)?;
        let raw = backend.allocator().alloc_zeroed(layout)?;
        let ptr = NonNull::new(raw).ok_or(TensorAllocatorError::NullPointer)?;

        Ok(Self {
            inner: Arc::new(StorageImpl {
                buffer: RwLock::new(RawBuffer { ptr, layout }),
                len,
                backend,
            }),
        })
    }

    /// Creates zero-length storage on the backend's device. Nothing is allocated.
    pub fn empty(backend: &'static dyn Backend) -> Self {
        Self {
            inner: Arc::new(StorageImpl {
                // aligned for every element type
                buffer: RwLock::new(RawBuffer {
                    ptr: NonNull::<u64>::dangling().cast(),
                    layout: Layout::new::<()>(),
                }),
                len: 0,
                backend,
            }),
        }
    }

    /// Allocates storage on the backend's device and uploads `bytes` from host memory.
    pub fn from_host_bytes(
        bytes: &[u8],
        align: usize,
        backend: &'static dyn Backend,
    ) -> Result<Self, TensorError> {
        let storage = Self::zeroed(bytes.len(), align, backend)?;
        if bytes.is_empty() {
            return Ok(storage);
        }
        {
            let guard = storage.write();
            // SAFETY: the destination holds at least bytes.len() bytes and is freshly allocated
            unsafe {
                backend.copy(bytes.as_ptr(), guard.ptr(), bytes.len(), &Device::Cpu)?;
            }
        }
        Ok(storage)
    }

    /// Returns the device where the data lives.
    #[inline]
    pub fn device(&self) -> Device {
        self.inner.backend.device()
    }

    /// Returns the backend that owns the memory.
    #[inline]
    pub fn backend(&self) -> &'static dyn Backend {
        self.inner.backend
    }

    /// Returns the number of usable bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Returns true if the storage holds zero bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Returns true if no other handle references this storage.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// Returns the number of handles sharing this storage.
    #[inline]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true if both handles alias the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the base address of the allocation.
    ///
    /// The pointer must not be dereferenced while another handle may be writing.
    pub fn as_ptr(&self) -> *const u8 {
        self.read().ptr() as *const u8
    }

    /// Locks the storage for reading.
    pub fn read(&self) -> StorageReadGuard<'_> {
        StorageReadGuard {
            guard: self
                .inner
                .buffer
                .read()
                .unwrap_or_else(PoisonError::into_inner),
            len: self.inner.len,
            device: self.device(),
        }
    }

    /// Locks the storage for writing.
    pub fn write(&self) -> StorageWriteGuard<'_> {
        StorageWriteGuard {
            guard: self
                .inner
                .buffer
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            len: self.inner.len,
            device: self.device(),
        }
    }
}

impl std::fmt::Debug for TensorStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("len", &self.len())
            .field("device", &self.device())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

fn host_only(device: Device) -> Result<(), TensorError> {
    if device.is_cpu() {
        Ok(())
    } else {
        Err(TensorError::unsupported_operation(
            "host access",
            format!("storage lives on {device}, transfer it to cpu first"),
        ))
    }
}

fn element_range<T: TensorDType>(
    offset: usize,
    numel: usize,
    len: usize,
) -> Result<std::ops::Range<usize>, TensorError> {
    let size = std::mem::size_of::<T>();
    let start = offset * size;
    let end = start + numel * size;
    if end > len {
        return Err(TensorError::index_out_of_bounds(end, len));
    }
    Ok(start..end)
}

fn cast_error(err: bytemuck::PodCastError) -> TensorError {
    TensorError::unsupported_operation("cast storage", format!("{err:?}"))
}

/// Shared access to the bytes of a [`TensorStorage`].
pub struct StorageReadGuard<'a> {
    guard: RwLockReadGuard<'a, RawBuffer>,
    len: usize,
    device: Device,
}

impl StorageReadGuard<'_> {
    pub(crate) fn ptr(&self) -> *mut u8 {
        self.guard.ptr.as_ptr()
    }

    /// Returns the usable bytes. Host storage only.
    pub fn as_bytes(&self) -> Result<&[u8], TensorError> {
        host_only(self.device)?;
        // SAFETY: the allocation holds at least `len` initialized bytes and the read lock is held
        Ok(unsafe { std::slice::from_raw_parts(self.guard.ptr.as_ptr(), self.len) })
    }

    /// Returns `numel` elements of type `T` starting at element `offset`. Host storage only.
    pub fn as_slice<T: TensorDType>(&self, offset: usize, numel: usize) -> Result<&[T], TensorError> {
        let range = element_range::<T>(offset, numel, self.len)?;
        bytemuck::try_cast_slice(&self.as_bytes()?[range]).map_err(cast_error)
    }
}

/// Exclusive access to the bytes of a [`TensorStorage`].
pub struct StorageWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, RawBuffer>,
    len: usize,
    device: Device,
}

impl StorageWriteGuard<'_> {
    pub(crate) fn ptr(&self) -> *mut u8 {
        self.guard.ptr.as_ptr()
    }

    /// Returns the usable bytes mutably. Host storage only.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8], TensorError> {
        host_only(self.device)?;
        // SAFETY: the allocation holds at least `len` bytes and the write lock is held
        Ok(unsafe { std::slice::from_raw_parts_mut(self.guard.ptr.as_ptr(), self.len) })
    }

    /// Returns `numel` mutable elements of type `T` starting at element `offset`. Host storage only.
    pub fn as_slice_mut<T: TensorDType>(
        &mut self,
        offset: usize,
        numel: usize,
    ) -> Result<&mut [T], TensorError> {
        let range = element_range::<T>(offset, numel, self.len)?;
        bytemuck::try_cast_slice_mut(&mut self.as_bytes_mut()?[range]).map_err(cast_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CPU_BACKEND;

    #[test]
    fn test_storage_zeroed() -> Result<(), TensorError> {
        let storage = TensorStorage::zeroed(16, 4, &CPU_BACKEND)?;
        assert_eq!(storage.len(), 16);
        assert!(!storage.is_empty());
        assert_eq!(storage.device(), Device::Cpu);
        assert_eq!(storage.read().as_slice::<f32>(0, 4)?, &[0.0; 4]);
        Ok(())
    }

    #[test]
    fn test_storage_empty() -> Result<(), TensorError> {
        let storage = TensorStorage::zeroed(0, 8, &CPU_BACKEND)?;
        assert!(storage.is_empty());
        assert!(storage.read().as_bytes()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_storage_from_host_bytes() -> Result<(), TensorError> {
        let data = [1u16, 2, 3];
        let storage = TensorStorage::from_host_bytes(bytemuck::cast_slice(&data), 2, &CPU_BACKEND)?;
        assert_eq!(storage.read().as_slice::<u16>(0, 3)?, &data);
        assert_eq!(storage.read().as_slice::<u16>(1, 2)?, &[2, 3]);
        Ok(())
    }

    #[test]
    fn test_storage_out_of_bounds() -> Result<(), TensorError> {
        let storage = TensorStorage::zeroed(4, 1, &CPU_BACKEND)?;
        assert!(storage.read().as_slice::<u8>(2, 3).is_err());
        Ok(())
    }

    #[test]
    fn test_storage_shared_mutation() -> Result<(), TensorError> {
        let storage = TensorStorage::zeroed(4, 1, &CPU_BACKEND)?;
        let alias = storage.clone();
        assert!(!storage.is_unique());
        assert!(storage.ptr_eq(&alias));

        alias.write().as_slice_mut::<u8>(0, 4)?[2] = 7;
        assert_eq!(storage.read().as_slice::<u8>(0, 4)?, &[0, 0, 7, 0]);

        drop(alias);
        assert!(storage.is_unique());
        Ok(())
    }
}
