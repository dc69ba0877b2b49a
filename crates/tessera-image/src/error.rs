use tessera_tensor::{Device, TensorAllocatorError, TensorError};

/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Bad geometry, out of range index, wrong channel count or mismatched buffer.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not available for this dtype, layout or device.
    #[error("Unsupported operation: {operation} - {reason}")]
    UnsupportedOperation {
        /// Name of the operation that failed
        operation: String,
        /// Reason why the operation is not supported
        reason: String,
    },

    /// Operands live on different devices.
    #[error("Device mismatch: expected {expected}, got {actual}")]
    DeviceMismatch {
        /// Device of the first operand
        expected: Device,
        /// Device of the offending operand
        actual: Device,
    },

    /// The engine could not allocate, free or transfer memory.
    #[error("Storage error: {0}")]
    Storage(TensorAllocatorError),
}

impl ImageError {
    /// Creates an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an UnsupportedOperation error.
    pub fn unsupported_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<TensorError> for ImageError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::StorageError(e) => Self::Storage(e),
            TensorError::UnsupportedOperation { operation, reason } => {
                Self::UnsupportedOperation { operation, reason }
            }
            TensorError::DeviceMismatch { expected, actual } => {
                Self::DeviceMismatch { expected, actual }
            }
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tensor_error() {
        let err: ImageError = TensorError::index_out_of_bounds(4, 2).into();
        assert!(matches!(err, ImageError::InvalidArgument(_)));

        let err: ImageError = TensorError::unsupported_operation("max_pool2d", "f32").into();
        assert_eq!(err, ImageError::unsupported_operation("max_pool2d", "f32"));

        let err: ImageError = TensorError::StorageError(TensorAllocatorError::NullPointer).into();
        assert_eq!(err, ImageError::Storage(TensorAllocatorError::NullPointer));

        let err: ImageError = TensorError::DeviceMismatch {
            expected: Device::Cpu,
            actual: Device::cuda(1),
        }
        .into();
        assert_eq!(err.to_string(), "Device mismatch: expected cpu, got cuda:1");
    }
}
