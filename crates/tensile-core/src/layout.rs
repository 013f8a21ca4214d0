use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage interleaving of a 4D activation tensor.
///
/// The operators support the two layouts the accelerator library accepts:
/// channel-first (`NCHW`) and channel-last (`NHWC`). Filter tensors follow
/// the matching permutation (`MCHW` / `MHWC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageOrder {
    /// batch × channels × height × width
    #[default]
    Nchw,
    /// batch × height × width × channels
    Nhwc,
}

impl StorageOrder {
    /// Decompose a rank-4 activation dim list into (n, c, h, w).
    ///
    /// Callers validate the rank first; slices shorter than 4 panic.
    pub fn split_activation(&self, dims: &[usize]) -> (usize, usize, usize, usize) {
        match self {
            StorageOrder::Nchw => (dims[0], dims[1], dims[2], dims[3]),
            StorageOrder::Nhwc => (dims[0], dims[3], dims[1], dims[2]),
        }
    }

    /// Spatial extent (h, w) of a rank-4 output dim list.
    pub fn output_spatial(&self, dims: &[usize]) -> (usize, usize) {
        match self {
            StorageOrder::Nchw => (dims[2], dims[3]),
            StorageOrder::Nhwc => (dims[1], dims[2]),
        }
    }

    /// Compose the dim list of a rank-4 output tensor from logical sizes.
    pub fn compose_output(&self, n: usize, m: usize, h: usize, w: usize) -> [usize; 4] {
        match self {
            StorageOrder::Nchw => [n, m, h, w],
            StorageOrder::Nhwc => [n, h, w, m],
        }
    }
}

impl fmt::Display for StorageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOrder::Nchw => write!(f, "NCHW"),
            StorageOrder::Nhwc => write!(f, "NHWC"),
        }
    }
}
