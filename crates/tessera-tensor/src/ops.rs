//! Operations for tensors.
//!
//! Elementwise arithmetic between tensors and the two reductions used by the
//! image layer. Every function validates its operands, allocates the output on
//! the operands' device and dispatches a single backend kernel.

use crate::{
    backend::{dispatch, BinaryOp},
    device::Op,
    dtype::DType,
    tensor::{Tensor, TensorError},
};

fn check_same(lhs: &Tensor, rhs: &Tensor) -> Result<(), TensorError> {
    if lhs.device() != rhs.device() {
        return Err(TensorError::DeviceMismatch {
            expected: lhs.device(),
            actual: rhs.device(),
        });
    }
    if lhs.dtype() != rhs.dtype() {
        return Err(TensorError::DTypeMismatch {
            expected: lhs.dtype(),
            actual: rhs.dtype(),
        });
    }
    if lhs.shape() != rhs.shape() {
        return Err(TensorError::dimension_mismatch(
            "operands must have the same shape",
            lhs.shape(),
            rhs.shape(),
        ));
    }
    Ok(())
}

fn binary(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    check_same(lhs, rhs)?;
    let backend = dispatch(lhs.device(), lhs.dtype(), Op::Binary)?;
    let dst = Tensor::zeros(lhs.shape(), lhs.dtype(), lhs.device())?;
    backend.binary(op, lhs, rhs, &dst)?;
    Ok(dst)
}

fn check_hwc(t: &Tensor, operation: &str) -> Result<(), TensorError> {
    if t.ndim() != 3 {
        return Err(TensorError::unsupported_operation(
            operation,
            format!("expected a rank 3 {{H, W, C}} tensor, got shape {:?}", t.shape()),
        ));
    }
    Ok(())
}

/// Add two tensors element-wise.
///
/// # Errors
///
/// Operands must share shape, dtype and device. A device disagreement is
/// reported as [`TensorError::DeviceMismatch`].
pub fn add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    binary(BinaryOp::Add, lhs, rhs)
}

/// Subtract two tensors element-wise.
pub fn sub(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    binary(BinaryOp::Sub, lhs, rhs)
}

/// Multiply two tensors element-wise.
pub fn mul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    binary(BinaryOp::Mul, lhs, rhs)
}

/// Divide two tensors element-wise.
///
/// Integer division by zero follows the cast rule on the f64 result:
/// infinities saturate and `0 / 0` becomes 0.
pub fn div(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    binary(BinaryOp::Div, lhs, rhs)
}

/// Reduces an `{H, W, C}` tensor to `{H, W, 1}` as `sum_c weights[c] * x[.., c]`.
///
/// The result keeps the source dtype.
///
/// # Example
///
/// ```
/// use tessera_tensor::{ops, Device, Tensor};
///
/// let rgb = Tensor::from_shape_vec(&[1, 1, 3], vec![30u8, 60, 90], Device::Cpu).unwrap();
/// let mean = ops::weighted_channel_sum(&rgb, &[1.0 / 3.0; 3]).unwrap();
/// assert_eq!(mean.shape(), &[1, 1, 1]);
/// assert_eq!(mean.to_vec::<u8>().unwrap(), vec![60]);
/// ```
pub fn weighted_channel_sum(src: &Tensor, weights: &[f64]) -> Result<Tensor, TensorError> {
    check_hwc(src, "weighted_channel_sum")?;
    let (rows, cols, channels) = (src.shape()[0], src.shape()[1], src.shape()[2]);
    if weights.len() != channels {
        return Err(TensorError::dimension_mismatch(
            "one weight per channel is required",
            &[channels],
            &[weights.len()],
        ));
    }
    let backend = dispatch(src.device(), src.dtype(), Op::ChannelSum)?;
    let dst = Tensor::zeros(&[rows, cols, 1], src.dtype(), src.device())?;
    if src.numel() == 0 {
        return Ok(dst);
    }
    backend.channel_sum(src, &dst, weights)?;
    Ok(dst)
}

/// Maximum over a `(2 * half + 1)` square window of an `{H, W, C}` u8 tensor.
///
/// Each channel is pooled independently and windows are clipped at the border,
/// so the output has the same shape as the input.
pub fn max_pool2d(src: &Tensor, half: usize) -> Result<Tensor, TensorError> {
    check_hwc(src, "max_pool2d")?;
    if src.dtype() != DType::U8 {
        return Err(TensorError::unsupported_operation(
            "max_pool2d",
            format!("only u8 data is supported, got {}", src.dtype()),
        ));
    }
    let backend = dispatch(src.device(), src.dtype(), Op::WindowMax)?;
    let dst = Tensor::zeros(src.shape(), src.dtype(), src.device())?;
    backend.window_max(src, &dst, half)?;
    Ok(dst)
}

impl Tensor {
    /// See [`add`].
    pub fn add(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        add(self, other)
    }

    /// See [`sub`].
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        sub(self, other)
    }

    /// See [`mul`].
    pub fn mul(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        mul(self, other)
    }

    /// See [`div`].
    pub fn div(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        div(self, other)
    }

    /// See [`weighted_channel_sum`].
    pub fn weighted_channel_sum(&self, weights: &[f64]) -> Result<Tensor, TensorError> {
        weighted_channel_sum(self, weights)
    }

    /// See [`max_pool2d`].
    pub fn max_pool2d(&self, half: usize) -> Result<Tensor, TensorError> {
        max_pool2d(self, half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError},
        backend::Backend,
        device::Device,
        storage::TensorStorage,
    };
    use approx::assert_relative_eq;

    /// Host memory that reports itself as an accelerator, to build off-host operands.
    struct PretendCudaBackend(CpuAllocator);

    static PRETEND_CUDA: PretendCudaBackend = PretendCudaBackend(CpuAllocator);

    impl Backend for PretendCudaBackend {
        fn device(&self) -> Device {
            Device::cuda(0)
        }

        fn allocator(&self) -> &dyn TensorAllocator {
            &self.0
        }

        unsafe fn copy(
            &self,
            src: *const u8,
            dst: *mut u8,
            len: usize,
            _src_device: &Device,
        ) -> Result<(), TensorAllocatorError> {
            std::ptr::copy_nonoverlapping(src, dst, len);
            Ok(())
        }

        fn fill(&self, _: &Tensor, _: f64) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("fill", "pretend device"))
        }

        fn copy_strided(&self, _: &Tensor, _: &Tensor) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("copy", "pretend device"))
        }

        fn affine(&self, _: &Tensor, _: &Tensor, _: f64, _: f64) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("affine", "pretend device"))
        }

        fn affine_inplace(&self, _: &Tensor, _: f64, _: f64) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("affine", "pretend device"))
        }

        fn binary(&self, _: BinaryOp, _: &Tensor, _: &Tensor, _: &Tensor) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("binary", "pretend device"))
        }

        fn channel_sum(&self, _: &Tensor, _: &Tensor, _: &[f64]) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("channel_sum", "pretend device"))
        }

        fn window_max(&self, _: &Tensor, _: &Tensor, _: usize) -> Result<(), TensorError> {
            Err(TensorError::unsupported_operation("window_max", "pretend device"))
        }
    }

    #[test]
    fn test_add() -> Result<(), TensorError> {
        let a = Tensor::from_shape_vec(&[2, 2], vec![1u8, 2, 3, 250], Device::Cpu)?;
        let b = Tensor::from_shape_vec(&[2, 2], vec![4u8, 5, 6, 10], Device::Cpu)?;
        assert_eq!(add(&a, &b)?.to_vec::<u8>()?, vec![5, 7, 9, 255]);
        Ok(())
    }

    #[test]
    fn test_sub_saturates() -> Result<(), TensorError> {
        let a = Tensor::from_shape_vec(&[3], vec![10u16, 5, 0], Device::Cpu)?;
        let b = Tensor::from_shape_vec(&[3], vec![3u16, 5, 1], Device::Cpu)?;
        assert_eq!(a.sub(&b)?.to_vec::<u16>()?, vec![7, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_mul_div_float() -> Result<(), TensorError> {
        let a = Tensor::from_shape_vec(&[3], vec![1.5f32, -2.0, 8.0], Device::Cpu)?;
        let b = Tensor::from_shape_vec(&[3], vec![2.0f32, 4.0, 0.5], Device::Cpu)?;
        let m = mul(&a, &b)?.to_vec::<f32>()?;
        assert_relative_eq!(m[0], 3.0);
        assert_relative_eq!(m[1], -8.0);
        assert_relative_eq!(m[2], 4.0);
        let d = div(&a, &b)?.to_vec::<f32>()?;
        assert_relative_eq!(d[0], 0.75);
        assert_relative_eq!(d[1], -0.5);
        assert_relative_eq!(d[2], 16.0);
        Ok(())
    }

    #[test]
    fn test_binary_with_strided_operand() -> Result<(), TensorError> {
        let a = Tensor::from_shape_vec(&[2, 2], vec![1i32, 2, 3, 4], Device::Cpu)?;
        let at = a.permute_axes(&[1, 0])?;
        assert_eq!(add(&a, &at)?.to_vec::<i32>()?, vec![2, 5, 5, 8]);
        Ok(())
    }

    #[test]
    fn test_binary_rejects_mismatches() -> Result<(), TensorError> {
        let a = Tensor::zeros(&[2, 2], DType::F32, Device::Cpu)?;
        let b = Tensor::zeros(&[4], DType::F32, Device::Cpu)?;
        let c = Tensor::zeros(&[2, 2], DType::F64, Device::Cpu)?;
        assert!(matches!(
            add(&a, &b),
            Err(TensorError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            add(&a, &c),
            Err(TensorError::DTypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_binary_rejects_device_mismatch() -> Result<(), TensorError> {
        let host = Tensor::zeros(&[2], DType::F32, Device::Cpu)?;
        let storage = TensorStorage::zeroed(8, 4, &PRETEND_CUDA)?;
        let device = Tensor::from_storage(storage, &[2], DType::F32);
        assert_eq!(device.device(), Device::cuda(0));
        assert_eq!(
            add(&host, &device).err(),
            Some(TensorError::DeviceMismatch {
                expected: Device::Cpu,
                actual: Device::cuda(0),
            })
        );
        Ok(())
    }

    #[test]
    fn test_host_backend_cannot_read_device_memory() -> Result<(), TensorError> {
        let storage = TensorStorage::zeroed(6, 2, &PRETEND_CUDA)?;
        let device = Tensor::from_storage(storage, &[1, 1, 3], DType::U16);
        assert_eq!(
            device.to_cpu().err(),
            Some(TensorError::StorageError(
                TensorAllocatorError::UnsupportedCopy {
                    src: Device::cuda(0),
                    dst: Device::Cpu,
                }
            ))
        );
        Ok(())
    }

    #[test]
    fn test_weighted_channel_sum() -> Result<(), TensorError> {
        let rgb = Tensor::from_shape_vec(
            &[1, 2, 3],
            vec![100u8, 150, 200, 0, 0, 0],
            Device::Cpu,
        )?;
        let gray = rgb.weighted_channel_sum(&[0.299, 0.587, 0.114])?;
        assert_eq!(gray.shape(), &[1, 2, 1]);
        assert_eq!(gray.to_vec::<u8>()?, vec![141, 0]);

        assert!(rgb.weighted_channel_sum(&[1.0, 1.0]).is_err());
        Ok(())
    }

    #[test]
    fn test_max_pool2d() -> Result<(), TensorError> {
        #[rustfmt::skip]
        let data = vec![
            0u8, 0, 0, 0, 0,
            0,   0, 0, 0, 0,
            0,   0, 7, 0, 0,
            0,   0, 0, 0, 0,
            0,   0, 0, 0, 0,
        ];
        let src = Tensor::from_shape_vec(&[5, 5, 1], data, Device::Cpu)?;
        let out = max_pool2d(&src, 1)?.to_vec::<u8>()?;
        #[rustfmt::skip]
        let expected = vec![
            0u8, 0, 0, 0, 0,
            0,   7, 7, 7, 0,
            0,   7, 7, 7, 0,
            0,   7, 7, 7, 0,
            0,   0, 0, 0, 0,
        ];
        assert_eq!(out, expected);
        Ok(())
    }

    #[test]
    fn test_max_pool2d_rejects_float() -> Result<(), TensorError> {
        let src = Tensor::zeros(&[2, 2, 1], DType::F32, Device::Cpu)?;
        assert!(matches!(
            src.max_pool2d(1),
            Err(TensorError::UnsupportedOperation { .. })
        ));
        let flat = Tensor::zeros(&[4], DType::U8, Device::Cpu)?;
        assert!(flat.max_pool2d(1).is_err());
        Ok(())
    }
}
