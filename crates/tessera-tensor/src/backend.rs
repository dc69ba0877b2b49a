//! Backend abstraction for device operations.
//!
//! A backend owns the allocator of one device and the kernels that run there.
//! Callers never pick a backend directly: [`dispatch`] looks it up from the
//! `(device, dtype, op)` triple after checking the device capability table.

use rayon::prelude::*;

use crate::{
    allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError},
    device::{Device, Op},
    dtype::{DType, TensorDType},
    tensor::{for_each_offset, Tensor, TensorError},
    with_dtype,
};

/// Elementwise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Sub,
    /// `lhs * rhs`
    Mul,
    /// `lhs / rhs`
    Div,
}

impl BinaryOp {
    #[inline]
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }
}

/// Backend trait defining core device operations.
///
/// Kernels receive tensors that were already validated by the caller: shapes
/// agree, every tensor lives on this backend's device, and `dst` tensors are
/// freshly allocated and contiguous unless stated otherwise. Every kernel runs
/// to completion before returning.
pub trait Backend: Send + Sync + 'static {
    /// Returns the device type for this backend.
    fn device(&self) -> Device;

    /// Returns the allocator of the device.
    fn allocator(&self) -> &dyn TensorAllocator;

    /// Copies `len` bytes from `src` (living on `src_device`) into `dst` on this device.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `src` is valid for reads of `len` bytes
    /// - `dst` is valid for writes of `len` bytes
    /// - the two regions do not overlap
    unsafe fn copy(
        &self,
        src: *const u8,
        dst: *mut u8,
        len: usize,
        src_device: &Device,
    ) -> Result<(), TensorAllocatorError>;

    /// Synchronizes device operations.
    ///
    /// For CPU, this is a no-op since operations are synchronous.
    fn synchronize(&self) -> Result<(), TensorAllocatorError> {
        Ok(())
    }

    /// Sets every element of `dst` (which may be a strided view) to `value`.
    fn fill(&self, dst: &Tensor, value: f64) -> Result<(), TensorError>;

    /// Copies `src` (any layout) into `dst` of the same dtype in row-major order.
    fn copy_strided(&self, src: &Tensor, dst: &Tensor) -> Result<(), TensorError>;

    /// Writes `scale * src + offset` into `dst`, casting to the dtype of `dst`.
    fn affine(&self, src: &Tensor, dst: &Tensor, scale: f64, offset: f64)
        -> Result<(), TensorError>;

    /// Replaces every element `x` of the contiguous `dst` by `scale * x + offset`.
    fn affine_inplace(&self, dst: &Tensor, scale: f64, offset: f64) -> Result<(), TensorError>;

    /// Writes `op(lhs, rhs)` into `dst`. All three tensors share the same dtype.
    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Tensor,
        rhs: &Tensor,
        dst: &Tensor,
    ) -> Result<(), TensorError>;

    /// Reduces the channels of an `{H, W, C}` tensor into `{H, W, 1}` with `weights`.
    fn channel_sum(&self, src: &Tensor, dst: &Tensor, weights: &[f64])
        -> Result<(), TensorError>;

    /// Writes the maximum over a `(2 * half + 1)` square window of an `{H, W, C}` tensor.
    ///
    /// Windows are clipped at the image border.
    fn window_max(&self, src: &Tensor, dst: &Tensor, half: usize) -> Result<(), TensorError>;
}

/// CPU backend implementation.
///
/// Kernels run on the calling thread or split rows across the global rayon
/// pool; either way they return only once all work is done.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend {
    allocator: CpuAllocator,
}

impl CpuBackend {
    /// Creates a new CPU backend.
    pub const fn new() -> Self {
        Self {
            allocator: CpuAllocator,
        }
    }
}

/// The process wide CPU backend.
pub static CPU_BACKEND: CpuBackend = CpuBackend::new();

/// Finds the backend that runs `op` on `dtype` data stored on `device`.
///
/// # Errors
///
/// Returns [`TensorError::UnsupportedOperation`] if the capability table of the
/// device does not list the combination, or no backend is compiled in for it.
pub fn dispatch(device: Device, dtype: DType, op: Op) -> Result<&'static dyn Backend, TensorError> {
    if !device.supports(dtype, op) {
        return Err(TensorError::unsupported_operation(
            format!("{op:?}"),
            format!("not available for {dtype} on {device}"),
        ));
    }
    match device {
        Device::Cpu => Ok(&CPU_BACKEND),
        other => Err(TensorError::unsupported_operation(
            format!("{op:?}"),
            format!("no backend compiled for {other}"),
        )),
    }
}

/// Runs `f` over the elements of `t` in row-major order.
///
/// Contiguous tensors are borrowed in place, strided views are gathered first.
fn read_elements<T: TensorDType, R>(
    t: &Tensor,
    f: impl FnOnce(&[T]) -> R,
) -> Result<R, TensorError> {
    let guard = t.storage().read();
    if t.is_contiguous() {
        return Ok(f(guard.as_slice::<T>(t.offset(), t.numel())?));
    }
    let all = guard.as_slice::<T>(0, t.storage().len() / std::mem::size_of::<T>())?;
    let mut data = Vec::with_capacity(t.numel());
    for_each_offset(t.shape(), t.strides(), t.offset(), |o| data.push(all[o]));
    Ok(f(&data))
}

fn gather<T: TensorDType>(t: &Tensor) -> Result<Vec<T>, TensorError> {
    read_elements::<T, _>(t, |data| data.to_vec())
}

/// Runs `f` over the elements of the contiguous tensor `t`.
fn write_elements<T: TensorDType, R>(
    t: &Tensor,
    f: impl FnOnce(&mut [T]) -> R,
) -> Result<R, TensorError> {
    if !t.is_contiguous() {
        return Err(TensorError::NotContiguous);
    }
    let mut guard = t.storage().write();
    Ok(f(guard.as_slice_mut::<T>(t.offset(), t.numel())?))
}

fn fill_typed<T: TensorDType>(dst: &Tensor, value: f64) -> Result<(), TensorError> {
    let value = T::from_f64(value);
    let mut guard = dst.storage().write();
    let all = guard.as_slice_mut::<T>(0, dst.storage().len() / std::mem::size_of::<T>())?;
    for_each_offset(dst.shape(), dst.strides(), dst.offset(), |o| all[o] = value);
    Ok(())
}

fn copy_typed<T: TensorDType>(src: &Tensor, dst: &Tensor) -> Result<(), TensorError> {
    read_elements::<T, _>(src, |input| {
        write_elements::<T, _>(dst, |out| out.copy_from_slice(input))
    })?
}

fn affine_typed<S: TensorDType, D: TensorDType>(
    src: &Tensor,
    dst: &Tensor,
    scale: f64,
    offset: f64,
) -> Result<(), TensorError> {
    read_elements::<S, _>(src, |input| {
        write_elements::<D, _>(dst, |out| {
            out.par_iter_mut()
                .zip(input.par_iter())
                .for_each(|(o, &x)| *o = D::from_f64(scale * x.to_f64() + offset));
        })
    })?
}

fn affine_inplace_typed<T: TensorDType>(
    dst: &Tensor,
    scale: f64,
    offset: f64,
) -> Result<(), TensorError> {
    write_elements::<T, _>(dst, |out| {
        out.par_iter_mut()
            .for_each(|x| *x = T::from_f64(scale * x.to_f64() + offset));
    })
}

fn binary_typed<T: TensorDType>(
    op: BinaryOp,
    lhs: &Tensor,
    rhs: &Tensor,
    dst: &Tensor,
) -> Result<(), TensorError> {
    // the operands may alias each other, so never hold both locks at once
    let a = gather::<T>(lhs)?;
    let b = gather::<T>(rhs)?;
    write_elements::<T, _>(dst, |out| {
        out.par_iter_mut()
            .zip(a.par_iter().zip(b.par_iter()))
            .for_each(|(o, (&x, &y))| *o = T::from_f64(op.apply(x.to_f64(), y.to_f64())));
    })
}

fn channel_sum_typed<T: TensorDType>(
    src: &Tensor,
    dst: &Tensor,
    weights: &[f64],
) -> Result<(), TensorError> {
    let channels = weights.len();
    read_elements::<T, _>(src, |input| {
        write_elements::<T, _>(dst, |out| {
            out.par_iter_mut()
                .zip(input.par_chunks_exact(channels))
                .for_each(|(o, pixel)| {
                    let sum = pixel
                        .iter()
                        .zip(weights)
                        .map(|(&v, &w)| v.to_f64() * w)
                        .sum::<f64>();
                    *o = T::from_f64(sum);
                });
        })
    })?
}

fn window_max_u8(src: &Tensor, dst: &Tensor, half: usize) -> Result<(), TensorError> {
    let (rows, cols, channels) = (src.shape()[0], src.shape()[1], src.shape()[2]);
    if src.numel() == 0 {
        return Ok(());
    }
    let row_len = cols * channels;

    // the window is separable: max over rows of the max over columns
    let horizontal = read_elements::<u8, _>(src, |input| {
        let mut tmp = vec![0u8; input.len()];
        tmp.par_chunks_mut(row_len)
            .zip(input.par_chunks(row_len))
            .for_each(|(out_row, in_row)| {
                for c in 0..cols {
                    let c0 = c.saturating_sub(half);
                    let c1 = (c + half).min(cols - 1);
                    for ch in 0..channels {
                        out_row[c * channels + ch] = (c0..=c1)
                            .map(|cc| in_row[cc * channels + ch])
                            .max()
                            .unwrap_or(0);
                    }
                }
            });
        tmp
    })?;

    write_elements::<u8, _>(dst, |out| {
        out.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(r, out_row)| {
                let r0 = r.saturating_sub(half);
                let r1 = (r + half).min(rows - 1);
                for (i, o) in out_row.iter_mut().enumerate() {
                    *o = (r0..=r1)
                        .map(|rr| horizontal[rr * row_len + i])
                        .max()
                        .unwrap_or(0);
                }
            });
    })
}

impl Backend for CpuBackend {
    fn device(&self) -> Device {
        self.allocator.device()
    }

    fn allocator(&self) -> &dyn TensorAllocator {
        &self.allocator
    }

    unsafe fn copy(
        &self,
        src: *const u8,
        dst: *mut u8,
        len: usize,
        src_device: &Device,
    ) -> Result<(), TensorAllocatorError> {
        if !src_device.is_cpu() {
            return Err(TensorAllocatorError::UnsupportedCopy {
                src: *src_device,
                dst: Device::Cpu,
            });
        }
        std::ptr::copy_nonoverlapping(src, dst, len);
        Ok(())
    }

    fn fill(&self, dst: &Tensor, value: f64) -> Result<(), TensorError> {
        with_dtype!(dst.dtype(), T => fill_typed::<T>(dst, value))
    }

    fn copy_strided(&self, src: &Tensor, dst: &Tensor) -> Result<(), TensorError> {
        with_dtype!(src.dtype(), T => copy_typed::<T>(src, dst))
    }

    fn affine(
        &self,
        src: &Tensor,
        dst: &Tensor,
        scale: f64,
        offset: f64,
    ) -> Result<(), TensorError> {
        with_dtype!(src.dtype(), S => {
            with_dtype!(dst.dtype(), D => affine_typed::<S, D>(src, dst, scale, offset))
        })
    }

    fn affine_inplace(&self, dst: &Tensor, scale: f64, offset: f64) -> Result<(), TensorError> {
        with_dtype!(dst.dtype(), T => affine_inplace_typed::<T>(dst, scale, offset))
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Tensor,
        rhs: &Tensor,
        dst: &Tensor,
    ) -> Result<(), TensorError> {
        with_dtype!(lhs.dtype(), T => binary_typed::<T>(op, lhs, rhs, dst))
    }

    fn channel_sum(
        &self,
        src: &Tensor,
        dst: &Tensor,
        weights: &[f64],
    ) -> Result<(), TensorError> {
        with_dtype!(src.dtype(), T => channel_sum_typed::<T>(src, dst, weights))
    }

    fn window_max(&self, src: &Tensor, dst: &Tensor, half: usize) -> Result<(), TensorError> {
        match src.dtype() {
            DType::U8 => window_max_u8(src, dst, half),
            other => Err(TensorError::unsupported_operation(
                "window_max",
                format!("not implemented for {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_copy() -> Result<(), TensorAllocatorError> {
        let backend = CpuBackend::new();
        let src = vec![1u8, 2, 3, 4, 5];
        let mut dst = vec![0u8; 5];

        unsafe {
            backend.copy(src.as_ptr(), dst.as_mut_ptr(), 5, &Device::Cpu)?;
        }

        assert_eq!(dst, src);
        Ok(())
    }

    #[test]
    fn test_cpu_backend_rejects_device_source() {
        let backend = CpuBackend::new();
        let src = [0u8; 4];
        let mut dst = [0u8; 4];
        let res = unsafe { backend.copy(src.as_ptr(), dst.as_mut_ptr(), 4, &Device::cuda(0)) };
        assert!(matches!(res, Err(TensorAllocatorError::UnsupportedCopy { .. })));
    }

    #[test]
    fn test_cpu_backend_synchronize() {
        assert!(CpuBackend::new().synchronize().is_ok());
    }

    #[test]
    fn test_cpu_backend_device() {
        assert_eq!(CPU_BACKEND.device(), Device::Cpu);
    }

    #[test]
    fn test_dispatch() {
        assert!(dispatch(Device::Cpu, DType::F32, Op::Affine).is_ok());
        assert!(dispatch(Device::Cpu, DType::U8, Op::WindowMax).is_ok());

        let err = dispatch(Device::Cpu, DType::F32, Op::WindowMax).err();
        assert!(matches!(err, Some(TensorError::UnsupportedOperation { .. })));

        let err = dispatch(Device::cuda(0), DType::U8, Op::Alloc).err();
        assert!(matches!(err, Some(TensorError::UnsupportedOperation { .. })));
    }

    #[test]
    fn test_window_max_clips_at_border() -> Result<(), TensorError> {
        let mut data = vec![0u8; 4 * 4];
        data[0] = 9; // top left corner
        let src = Tensor::from_shape_vec(&[4, 4, 1], data, Device::Cpu)?;
        let dst = Tensor::zeros(&[4, 4, 1], DType::U8, Device::Cpu)?;
        CPU_BACKEND.window_max(&src, &dst, 1)?;

        #[rustfmt::skip]
        let expected = vec![
            9, 9, 0, 0,
            9, 9, 0, 0,
            0, 0, 0, 0,
            0, 0, 0, 0,
        ];
        assert_eq!(dst.to_vec::<u8>()?, expected);
        Ok(())
    }

    #[test]
    fn test_affine_strided_source() -> Result<(), TensorError> {
        let src = Tensor::from_shape_vec(&[2, 2], vec![1u8, 2, 3, 4], Device::Cpu)?;
        let transposed = src.permute_axes(&[1, 0])?;
        let dst = Tensor::zeros(&[2, 2], DType::F32, Device::Cpu)?;
        CPU_BACKEND.affine(&transposed, &dst, 2.0, 0.5)?;
        assert_eq!(dst.to_vec::<f32>()?, vec![2.5, 6.5, 4.5, 8.5]);
        Ok(())
    }
}
