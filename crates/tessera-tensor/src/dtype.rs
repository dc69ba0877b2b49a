//! Element data types and the engine-wide numeric cast rule.

use std::fmt;

/// Supported element types for tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
}

impl DType {
    /// All supported data types.
    pub const ALL: [DType; 6] = [
        DType::U8,
        DType::U16,
        DType::I32,
        DType::I64,
        DType::F32,
        DType::F64,
    ];

    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Returns true for floating point types.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns true for integer types.
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Smallest representable value, as f64.
    pub fn min_value(self) -> f64 {
        match self {
            Self::U8 => u8::MIN as f64,
            Self::U16 => u16::MIN as f64,
            Self::I32 => i32::MIN as f64,
            Self::I64 => i64::MIN as f64,
            Self::F32 => f32::MIN as f64,
            Self::F64 => f64::MIN,
        }
    }

    /// Largest representable value, as f64.
    pub fn max_value(self) -> f64 {
        match self {
            Self::U8 => u8::MAX as f64,
            Self::U16 => u16::MAX as f64,
            Self::I32 => i32::MAX as f64,
            Self::I64 => i64::MAX as f64,
            Self::F32 => f32::MAX as f64,
            Self::F64 => f64::MAX,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Trait for Rust types that can be stored in a tensor.
///
/// Every conversion between element types goes through [`TensorDType::from_f64`],
/// so the rounding and saturation policy is the same for every kernel:
///
/// * float targets take the value as is,
/// * integer targets round half away from zero and then clamp to the
///   representable range; `NaN` maps to zero.
pub trait TensorDType:
    bytemuck::Pod + Default + PartialOrd + num_traits::NumCast + Send + Sync + 'static
{
    /// The corresponding [`DType`] value.
    const DTYPE: DType;

    /// Widen the element to f64.
    fn to_f64(self) -> f64;

    /// Narrow an f64 into the element type using the engine cast rule.
    fn from_f64(x: f64) -> Self;
}

macro_rules! impl_integer_dtype {
    ($ty:ty, $variant:ident) => {
        impl TensorDType for $ty {
            const DTYPE: DType = DType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(x: f64) -> Self {
                if x.is_nan() {
                    return 0;
                }
                x.round().clamp(<$ty>::MIN as f64, <$ty>::MAX as f64) as $ty
            }
        }
    };
}

impl_integer_dtype!(u8, U8);
impl_integer_dtype!(u16, U16);
impl_integer_dtype!(i32, I32);
impl_integer_dtype!(i64, I64);

impl TensorDType for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl TensorDType for f64 {
    const DTYPE: DType = DType::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(x: f64) -> Self {
        x
    }
}

/// Expand `$body` once per data type with `$T` bound to the matching Rust type.
///
/// ```
/// use tessera_tensor::{with_dtype, DType};
///
/// let bytes = with_dtype!(DType::U16, T => std::mem::size_of::<T>());
/// assert_eq!(bytes, 2);
/// ```
#[macro_export]
macro_rules! with_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DType::U8 => {
                type $T = u8;
                $body
            }
            $crate::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::DType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size_in_bytes() {
        assert_eq!(DType::U8.size_in_bytes(), 1);
        assert_eq!(DType::U16.size_in_bytes(), 2);
        assert_eq!(DType::I32.size_in_bytes(), 4);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::I64.size_in_bytes(), 8);
        assert_eq!(DType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_dtype_display() {
        assert_eq!(format!("{}", DType::U8), "u8");
        assert_eq!(format!("{}", DType::F32), "f32");
        assert_eq!(format!("{}", DType::I64), "i64");
    }

    #[test]
    fn test_tensor_dtype_trait() {
        assert_eq!(u8::DTYPE, DType::U8);
        assert_eq!(u16::DTYPE, DType::U16);
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f64::DTYPE, DType::F64);
    }

    #[test]
    fn test_cast_rule_saturates() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(u16::from_f64(70000.0), u16::MAX);
        assert_eq!(i32::from_f64(-1e12), i32::MIN);
        assert_eq!(u8::from_f64(f64::NAN), 0);
    }

    #[test]
    fn test_cast_rule_rounds() {
        assert_eq!(u8::from_f64(141.95), 142);
        assert_eq!(u8::from_f64(2.5), 3);
        assert_eq!(i32::from_f64(-2.5), -3);
        assert_eq!(u16::from_f64(0.49), 0);
    }

    #[test]
    fn test_with_dtype_dispatch() {
        for dtype in DType::ALL {
            let size = with_dtype!(dtype, T => std::mem::size_of::<T>());
            assert_eq!(size, dtype.size_in_bytes());
        }
    }
}
