use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric element types the convolution operators register for.
///
/// The vendor primitives are instantiated for single precision and
/// half precision; everything else stays on the framework side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 16-bit IEEE 754 half-precision float
    F16,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
        }
    }
}
