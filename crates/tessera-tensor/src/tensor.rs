use thiserror::Error;

use super::{
    allocator::TensorAllocatorError,
    backend::{dispatch, CPU_BACKEND},
    device::{Device, Op},
    dtype::{DType, TensorDType},
    storage::TensorStorage,
};

/// An error type for tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    /// Tensor shape does not match the provided data.
    ///
    /// The product of the shape dimensions must equal the number of elements.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements in data")]
    InvalidShape {
        /// Expected number of elements based on shape
        expected: usize,
        /// Actual number of elements in the data
        actual: usize,
    },

    /// Index exceeds tensor bounds.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index that was attempted
        index: usize,
        /// The size of the dimension being indexed
        size: usize,
    },

    /// Underlying storage operation failed.
    ///
    /// This error wraps lower-level memory allocation, deallocation,
    /// or transfer errors. See [`TensorAllocatorError`] for details.
    #[error("Storage error: {0}")]
    StorageError(#[from] TensorAllocatorError),

    /// Tensor dimensions incompatible for the requested operation.
    #[error("Dimension mismatch: {message}. Expected shape: {expected}, got: {actual}")]
    DimensionMismatch {
        /// Human-readable description of the mismatch
        message: String,
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// The element type requested does not match the tensor data type.
    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// Data type of the tensor
        expected: DType,
        /// Data type that was requested
        actual: DType,
    },

    /// Operands live on devices that cannot be mixed.
    #[error("Device mismatch: expected {expected}, got {actual}")]
    DeviceMismatch {
        /// Device of the first operand
        expected: Device,
        /// Device of the offending operand
        actual: Device,
    },

    /// The element or byte count of a shape does not fit in `usize`.
    #[error("Shape {shape} of {dtype} overflows the addressable size")]
    SizeOverflow {
        /// The requested shape
        shape: String,
        /// Element type of the tensor
        dtype: DType,
    },

    /// The operation needs a contiguous row-major tensor.
    #[error("Tensor is not contiguous")]
    NotContiguous,

    /// Operation not supported for this tensor configuration.
    ///
    /// The requested operation is not available for the current data type
    /// or device. See [`Device::capabilities`].
    #[error("Unsupported operation: {operation} - {reason}")]
    UnsupportedOperation {
        /// Name of the operation that failed
        operation: String,
        /// Reason why the operation is not supported
        reason: String,
    },
}

impl TensorError {
    /// Creates an InvalidShape error with clear context.
    pub fn invalid_shape(expected: usize, actual: usize) -> Self {
        Self::InvalidShape { expected, actual }
    }

    /// Creates an IndexOutOfBounds error with clear context.
    pub fn index_out_of_bounds(index: usize, size: usize) -> Self {
        Self::IndexOutOfBounds { index, size }
    }

    /// Creates a DimensionMismatch error with formatted shapes.
    pub fn dimension_mismatch(
        message: impl Into<String>,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Creates an UnsupportedOperation error with context.
    pub fn unsupported_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a SizeOverflow error for `shape`.
    pub fn size_overflow(shape: &[usize], dtype: DType) -> Self {
        Self::SizeOverflow {
            shape: format!("{:?}", shape),
            dtype,
        }
    }
}

/// Returns the element count and byte length of a dense `shape` of `dtype`.
///
/// A shape with a zero extent holds nothing, whatever its other extents.
pub(crate) fn checked_size(shape: &[usize], dtype: DType) -> Result<(usize, usize), TensorError> {
    let numel = if shape.contains(&0) {
        Some(0)
    } else {
        shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    };
    numel
        .and_then(|n| n.checked_mul(dtype.size_in_bytes()).map(|len| (n, len)))
        .ok_or_else(|| TensorError::size_overflow(shape, dtype))
}

fn dense_numel(shape: &[usize]) -> usize {
    if shape.contains(&0) {
        0
    } else {
        shape.iter().product()
    }
}

/// Computes the strides for a row-major (C-contiguous) tensor layout.
///
/// # Examples
///
/// ```rust
/// use tessera_tensor::tensor::get_strides_from_shape;
///
/// assert_eq!(get_strides_from_shape(&[2, 3]), vec![3, 1]);
/// assert_eq!(get_strides_from_shape(&[2, 3, 4]), vec![12, 4, 1]);
/// ```
pub fn get_strides_from_shape(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1usize;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride = stride.saturating_mul(shape[i]);
    }
    strides
}

/// Calls `f` with the storage offset of every element, in row-major order.
pub(crate) fn for_each_offset(
    shape: &[usize],
    strides: &[usize],
    offset: usize,
    mut f: impl FnMut(usize),
) {
    let numel = dense_numel(shape);
    let mut index = vec![0usize; shape.len()];
    let mut current = offset;
    for _ in 0..numel {
        f(current);
        for d in (0..shape.len()).rev() {
            index[d] += 1;
            current += strides[d];
            if index[d] < shape[d] {
                break;
            }
            current -= strides[d] * shape[d];
            index[d] = 0;
        }
    }
}

/// A dynamically typed, strided, device tagged multi-dimensional array.
///
/// A `Tensor` is a handle: cloning it, indexing it or reshaping it produces a
/// new handle over the **same** storage. Writes through any handle are visible
/// through every other one. Use [`Tensor::copy`] for an independent buffer.
///
/// # Examples
///
/// ```rust
/// use tessera_tensor::{Device, Tensor};
///
/// let t = Tensor::from_shape_vec(&[2, 2], vec![1u8, 2, 3, 4], Device::Cpu).unwrap();
/// let row = t.index(1).unwrap();
/// row.set::<u8>(&[0], 30).unwrap();
/// assert_eq!(t.to_vec::<u8>().unwrap(), vec![1, 2, 30, 4]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: TensorStorage,
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    dtype: DType,
}

impl Tensor {
    pub(crate) fn from_storage(storage: TensorStorage, shape: &[usize], dtype: DType) -> Self {
        Self {
            storage,
            strides: get_strides_from_shape(shape),
            shape: shape.to_vec(),
            offset: 0,
            dtype,
        }
    }

    /// Creates a zero-filled tensor.
    ///
    /// # Errors
    ///
    /// Fails with [`TensorError::SizeOverflow`] if the byte length of `shape`
    /// does not fit in `usize`, or if the device cannot allocate `dtype` data.
    pub fn zeros(shape: &[usize], dtype: DType, device: Device) -> Result<Self, TensorError> {
        let (_, len) = checked_size(shape, dtype)?;
        let backend = dispatch(device, dtype, Op::Alloc)?;
        let storage = TensorStorage::zeroed(len, dtype.size_in_bytes(), backend)?;
        Ok(Self::from_storage(storage, shape, dtype))
    }

    /// Creates a host tensor of shape `[0, inner..]` without allocating.
    ///
    /// ```
    /// use tessera_tensor::{DType, Tensor};
    ///
    /// let t = Tensor::empty(DType::F32, &[0, 3]);
    /// assert_eq!(t.shape(), &[0, 0, 3]);
    /// assert_eq!(t.numel(), 0);
    /// ```
    pub fn empty(dtype: DType, inner: &[usize]) -> Self {
        let mut shape = Vec::with_capacity(inner.len() + 1);
        shape.push(0);
        shape.extend_from_slice(inner);
        Self::from_storage(TensorStorage::empty(&CPU_BACKEND), &shape, dtype)
    }

    /// Creates a tensor with every element set to `value` (cast with the engine rule).
    pub fn full(
        shape: &[usize],
        value: f64,
        dtype: DType,
        device: Device,
    ) -> Result<Self, TensorError> {
        let tensor = Self::zeros(shape, dtype, device)?;
        tensor.fill(value)?;
        Ok(tensor)
    }

    /// Creates a new tensor from host data.
    ///
    /// # Errors
    ///
    /// If the number of elements in the data does not match the shape of the tensor, an error is returned.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_tensor::{DType, Device, Tensor};
    ///
    /// let t = Tensor::from_shape_vec(&[2, 2], vec![1u8, 2, 3, 4], Device::Cpu).unwrap();
    /// assert_eq!(t.shape(), &[2, 2]);
    /// assert_eq!(t.dtype(), DType::U8);
    /// ```
    pub fn from_shape_vec<T: TensorDType>(
        shape: &[usize],
        data: Vec<T>,
        device: Device,
    ) -> Result<Self, TensorError> {
        Self::from_shape_slice(shape, &data, device)
    }

    /// Creates a new tensor by copying a slice of host data.
    pub fn from_shape_slice<T: TensorDType>(
        shape: &[usize],
        data: &[T],
        device: Device,
    ) -> Result<Self, TensorError> {
        Self::from_raw_bytes(shape, T::DTYPE, bytemuck::cast_slice(data), device)
    }

    /// Creates a new tensor from native-endian bytes interpreted as `dtype`.
    pub fn from_raw_bytes(
        shape: &[usize],
        dtype: DType,
        bytes: &[u8],
        device: Device,
    ) -> Result<Self, TensorError> {
        let (numel, len) = checked_size(shape, dtype)?;
        let size = dtype.size_in_bytes();
        if len != bytes.len() {
            return Err(TensorError::invalid_shape(numel, bytes.len() / size));
        }
        let backend = dispatch(device, dtype, Op::Alloc)?;
        let storage = TensorStorage::from_host_bytes(bytes, size, backend)?;
        Ok(Self::from_storage(storage, shape, dtype))
    }

    /// Returns the shape.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the strides, in elements.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Returns the offset of the first element into the storage, in elements.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of elements.
    #[inline]
    pub fn numel(&self) -> usize {
        dense_numel(&self.shape)
    }

    /// Returns the element data type.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the device where the data lives.
    #[inline]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Returns the shared storage handle.
    #[inline]
    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    /// Returns true if both tensors view the same allocation.
    #[inline]
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    /// Returns the address of the first element.
    pub fn data_ptr(&self) -> *const u8 {
        self.storage
            .as_ptr()
            .wrapping_add(self.offset * self.dtype.size_in_bytes())
    }

    /// Returns true if the elements are laid out in row-major order without gaps.
    ///
    /// Dimensions of extent 1 do not affect contiguity.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1usize;
        for (&dim, &stride) in self.shape.iter().zip(self.strides.iter()).rev() {
            if dim != 1 && stride != expected {
                return false;
            }
            expected = expected.saturating_mul(dim);
        }
        true
    }

    /// Selects entry `i` of the leading dimension, dropping that dimension.
    ///
    /// The result is a view sharing storage with `self`.
    pub fn index(&self, i: usize) -> Result<Tensor, TensorError> {
        let (&size, &stride) = self
            .shape
            .first()
            .zip(self.strides.first())
            .ok_or_else(|| TensorError::unsupported_operation("index", "tensor has rank 0"))?;
        if i >= size {
            return Err(TensorError::index_out_of_bounds(i, size));
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: self.shape[1..].to_vec(),
            strides: self.strides[1..].to_vec(),
            offset: self.offset + i * stride,
            dtype: self.dtype,
        })
    }

    /// Restricts dimension `dim` to `len` entries starting at `start`.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Tensor, TensorError> {
        let size = *self
            .shape
            .get(dim)
            .ok_or_else(|| TensorError::index_out_of_bounds(dim, self.ndim()))?;
        if start + len > size {
            return Err(TensorError::index_out_of_bounds(start + len, size));
        }
        let mut shape = self.shape.clone();
        shape[dim] = len;
        Ok(Tensor {
            storage: self.storage.clone(),
            shape,
            strides: self.strides.clone(),
            offset: self.offset + start * self.strides[dim],
            dtype: self.dtype,
        })
    }

    /// Reinterprets a contiguous tensor with a new shape without copying.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor, TensorError> {
        let numel = checked_size(shape, self.dtype).map(|(n, _)| n);
        if numel.ok() != Some(self.numel()) {
            return Err(TensorError::dimension_mismatch(
                "reshape must preserve the number of elements",
                &self.shape,
                shape,
            ));
        }
        if !self.is_contiguous() {
            return Err(TensorError::NotContiguous);
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: shape.to_vec(),
            strides: get_strides_from_shape(shape),
            offset: self.offset,
            dtype: self.dtype,
        })
    }

    /// Reorders the dimensions. The result is a (generally non-contiguous) view.
    pub fn permute_axes(&self, axes: &[usize]) -> Result<Tensor, TensorError> {
        let mut seen = vec![false; self.ndim()];
        if axes.len() != self.ndim() {
            return Err(TensorError::dimension_mismatch(
                "permutation rank differs from tensor rank",
                &self.shape,
                axes,
            ));
        }
        for &axis in axes {
            match seen.get_mut(axis) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(TensorError::dimension_mismatch(
                        "axes are not a permutation",
                        &self.shape,
                        axes,
                    ))
                }
            }
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: axes.iter().map(|&a| self.shape[a]).collect(),
            strides: axes.iter().map(|&a| self.strides[a]).collect(),
            offset: self.offset,
            dtype: self.dtype,
        })
    }

    /// Returns the storage offset of the element at `index`.
    pub fn element_offset(&self, index: &[usize]) -> Result<usize, TensorError> {
        if index.len() != self.ndim() {
            return Err(TensorError::dimension_mismatch(
                "index rank differs from tensor rank",
                &self.shape,
                index,
            ));
        }
        let mut offset = self.offset;
        for ((&i, &size), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= size {
                return Err(TensorError::index_out_of_bounds(i, size));
            }
            offset += i * stride;
        }
        Ok(offset)
    }

    fn check_dtype<T: TensorDType>(&self) -> Result<(), TensorError> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        Ok(())
    }

    /// Reads the element at `index`.
    pub fn get<T: TensorDType>(&self, index: &[usize]) -> Result<T, TensorError> {
        self.check_dtype::<T>()?;
        let offset = self.element_offset(index)?;
        let guard = self.storage.read();
        Ok(guard.as_slice::<T>(offset, 1)?[0])
    }

    /// Writes the element at `index`. Visible through every handle on the same storage.
    pub fn set<T: TensorDType>(&self, index: &[usize], value: T) -> Result<(), TensorError> {
        self.check_dtype::<T>()?;
        let offset = self.element_offset(index)?;
        let mut guard = self.storage.write();
        guard.as_slice_mut::<T>(offset, 1)?[0] = value;
        Ok(())
    }

    /// Reads the value of a rank-0 tensor.
    pub fn item<T: TensorDType>(&self) -> Result<T, TensorError> {
        self.get(&[])
    }

    /// Writes the value of a rank-0 tensor.
    pub fn set_item<T: TensorDType>(&self, value: T) -> Result<(), TensorError> {
        self.set(&[], value)
    }

    /// Copies the elements out in row-major order.
    pub fn to_vec<T: TensorDType>(&self) -> Result<Vec<T>, TensorError> {
        self.check_dtype::<T>()?;
        let dense = self.contiguous()?;
        let guard = dense.storage.read();
        Ok(guard.as_slice::<T>(dense.offset, dense.numel())?.to_vec())
    }

    /// Copies the elements out as native-endian bytes in row-major order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TensorError> {
        let dense = self.contiguous()?;
        let size = self.dtype.size_in_bytes();
        let start = dense.offset * size;
        let guard = dense.storage.read();
        Ok(guard.as_bytes()?[start..start + dense.numel() * size].to_vec())
    }

    /// Sets every element of the view to `value`.
    pub fn fill(&self, value: f64) -> Result<(), TensorError> {
        dispatch(self.device(), self.dtype, Op::Fill)?.fill(self, value)
    }

    /// Returns `self` if already contiguous, otherwise a contiguous copy.
    pub fn contiguous(&self) -> Result<Tensor, TensorError> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        log::debug!("contiguous: copying strided view {self}");
        self.copy()
    }

    /// Returns a deep, contiguous copy on the same device.
    pub fn copy(&self) -> Result<Tensor, TensorError> {
        let backend = dispatch(self.device(), self.dtype, Op::Copy)?;
        let dst = Tensor::zeros(&self.shape, self.dtype, self.device())?;
        backend.copy_strided(self, &dst)?;
        Ok(dst)
    }

    /// Returns a new tensor holding `scale * x + offset` for every element, cast to `dtype`.
    pub fn affine(&self, scale: f64, offset: f64, dtype: DType) -> Result<Tensor, TensorError> {
        let backend = dispatch(self.device(), self.dtype, Op::Affine)?;
        dispatch(self.device(), dtype, Op::Alloc)?;
        let dst = Tensor::zeros(&self.shape, dtype, self.device())?;
        backend.affine(self, &dst, scale, offset)?;
        Ok(dst)
    }

    /// Replaces every element `x` by `scale * x + offset` in the tensor's own data type.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::NotContiguous`] for strided views.
    pub fn affine_(&self, scale: f64, offset: f64) -> Result<(), TensorError> {
        if !self.is_contiguous() {
            return Err(TensorError::NotContiguous);
        }
        dispatch(self.device(), self.dtype, Op::Affine)?.affine_inplace(self, scale, offset)
    }

    /// Converts the elements to `dtype` with the engine cast rule.
    pub fn cast(&self, dtype: DType) -> Result<Tensor, TensorError> {
        if dtype == self.dtype {
            return self.copy();
        }
        self.affine(1.0, 0.0, dtype)
    }

    /// Moves the data to `device`.
    ///
    /// Returns a handle on the same storage when the tensor already lives there.
    pub fn to_device(&self, device: Device) -> Result<Tensor, TensorError> {
        if device == self.device() {
            return Ok(self.clone());
        }
        let backend = dispatch(device, self.dtype, Op::Transfer)?;
        log::debug!(
            "to_device: moving {} bytes from {} to {device}",
            self.numel() * self.dtype.size_in_bytes(),
            self.device()
        );
        let src = self.contiguous()?;
        let size = self.dtype.size_in_bytes();
        let len = src.numel() * size;
        let storage = TensorStorage::zeroed(len, size, backend)?;
        {
            let src_guard = src.storage.read();
            let dst_guard = storage.write();
            // SAFETY: both regions hold `len` bytes starting at the given offsets
            unsafe {
                backend.copy(
                    src_guard.ptr().add(src.offset * size),
                    dst_guard.ptr(),
                    len,
                    &src.device(),
                )?;
            }
        }
        backend.synchronize()?;
        Ok(Self::from_storage(storage, &self.shape, self.dtype))
    }

    /// Moves the data to host memory.
    pub fn to_cpu(&self) -> Result<Tensor, TensorError> {
        self.to_device(Device::Cpu)
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("dtype", &self.dtype)
            .field("device", &self.device())
            .finish()
    }
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor[shape={:?}, stride={:?}, {}, {}]",
            self.shape,
            self.strides,
            self.dtype,
            self.device()
        )
    }
}
