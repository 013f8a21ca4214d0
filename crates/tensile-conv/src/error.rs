use thiserror::Error;

/// Errors surfaced by the convolution operators.
///
/// Every variant is fatal to the call that produced it: a failed
/// convolution invalidates the whole downstream computation, so there is
/// no retry and no fallback between selection policies.
#[derive(Debug, Error)]
pub enum ConvError {
    /// Rejected operator configuration, detected at construction.
    #[error("invalid convolution config: {0}")]
    Config(String),

    /// Tensor of the wrong rank handed to an executor.
    #[error("{tensor} must have rank {expected}, got {got}")]
    BadRank {
        tensor: &'static str,
        expected: usize,
        got: usize,
    },

    /// Dimension-consistency violation between the call's tensors.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Any non-success status from the vendor library.
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ConvError>;
