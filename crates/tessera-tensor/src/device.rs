use std::{fmt, str::FromStr};

use crate::{dtype::DType, TensorError};

/// Device where tensor storage lives and kernels execute.
///
/// The set of devices is closed. What each device can do is described by its
/// [`Capabilities`] table rather than by a trait hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// CUDA device with device ID
    Cuda {
        /// The CUDA device ID
        device_id: usize,
    },
}

/// Kinds of engine operations, used as keys in the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Allocate zeroed storage or upload host data.
    Alloc,
    /// Fill every element with a scalar.
    Fill,
    /// Elementwise `scale * x + offset`, optionally changing the data type.
    Affine,
    /// Strided copy into a fresh contiguous buffer.
    Copy,
    /// Elementwise arithmetic between two tensors.
    Binary,
    /// Weighted sum across the channel axis of an `{H, W, C}` tensor.
    ChannelSum,
    /// Square window maximum over an `{H, W, C}` tensor.
    WindowMax,
    /// Move data to another device.
    Transfer,
}

/// Capability table of a device: which data types and operations it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Data types that can be allocated on the device.
    pub dtypes: &'static [DType],
    /// Operations with a kernel on the device, each with the data types it accepts.
    pub ops: &'static [(Op, &'static [DType])],
}

impl Capabilities {
    /// Returns true if `op` can run on `dtype` data.
    pub fn supports(&self, dtype: DType, op: Op) -> bool {
        self.dtypes.contains(&dtype)
            && self
                .ops
                .iter()
                .any(|(kind, dtypes)| *kind == op && dtypes.contains(&dtype))
    }
}

const CPU_CAPABILITIES: Capabilities = Capabilities {
    dtypes: &DType::ALL,
    ops: &[
        (Op::Alloc, &DType::ALL),
        (Op::Fill, &DType::ALL),
        (Op::Affine, &DType::ALL),
        (Op::Copy, &DType::ALL),
        (Op::Binary, &DType::ALL),
        (Op::ChannelSum, &DType::ALL),
        (Op::WindowMax, &[DType::U8]),
        (Op::Transfer, &DType::ALL),
    ],
};

// no backend is compiled in for accelerators yet
const NO_CAPABILITIES: Capabilities = Capabilities {
    dtypes: &[],
    ops: &[],
};

impl Device {
    /// Returns the device type as a string.
    pub fn device_type(&self) -> &str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda { .. } => "cuda",
        }
    }

    /// Returns the device ID if applicable.
    pub fn device_id(&self) -> Option<usize> {
        match self {
            Device::Cpu => None,
            Device::Cuda { device_id } => Some(*device_id),
        }
    }

    /// Returns true if the device is CPU.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Returns true if the device is a GPU.
    pub fn is_gpu(&self) -> bool {
        !self.is_cpu()
    }

    /// Creates a CUDA device with the specified device ID.
    pub fn cuda(device_id: usize) -> Self {
        Device::Cuda { device_id }
    }

    /// Returns the capability table of the device.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Device::Cpu => CPU_CAPABILITIES,
            Device::Cuda { .. } => NO_CAPABILITIES,
        }
    }

    /// Returns true if `op` can run on `dtype` data on this device.
    pub fn supports(&self, dtype: DType, op: Op) -> bool {
        self.capabilities().supports(dtype, op)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    /// Parses `cpu`, `cpu:0`, `cuda` or `cuda:N`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, id) = match lower.split_once(':') {
            Some((kind, id)) => {
                let id = id.parse::<usize>().map_err(|_| {
                    TensorError::unsupported_operation("parse device", format!("bad id in {s:?}"))
                })?;
                (kind.to_string(), id)
            }
            None => (lower, 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda { device_id: id }),
            _ => Err(TensorError::unsupported_operation(
                "parse device",
                format!("unknown device {s:?}"),
            )),
        }
    }
}
