use serde::{Deserialize, Serialize};
use tensile_core::{DType, PadScheme, StorageOrder};

use crate::error::{ConvError, Result};
use crate::pool::NUM_POOLED_STATES;

/// Default workspace byte ceiling for the bounded-heuristic policy.
///
/// 64 MiB is large enough to let the vendor heuristic pick Winograd
/// variants on recent CNN shapes.
pub const DEFAULT_WORKSPACE_LIMIT: usize = 64 * 1024 * 1024;

/// How the concrete convolution algorithm is chosen on a shape change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Vendor recommendation honoring the configured workspace ceiling.
    /// Fast (no kernel launches), least well-tuned. The default.
    Heuristic,
    /// Fixed, pre-chosen algorithm ids with no vendor query at all.
    /// Trades peak throughput for run-to-run reproducibility.
    Deterministic,
    /// Time every variant on real data and take the fastest. Ignores the
    /// workspace ceiling entirely; running out of device memory afterwards
    /// is accepted as the price of an unconstrained search.
    Exhaustive,
}

/// Immutable per-operator configuration, set once by the surrounding
/// framework at operator setup time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvConfig {
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad: PadScheme,
    pub order: StorageOrder,
    pub dtype: DType,
    /// Workspace byte ceiling for heuristic selection.
    #[serde(default = "default_ws_limit")]
    pub ws_limit_bytes: usize,
    #[serde(default)]
    pub exhaustive_search: bool,
    #[serde(default)]
    pub deterministic: bool,
    /// Which pooled execution state this operator shares.
    #[serde(default, alias = "cudnn_state")]
    pub state_index: usize,
}

fn default_ws_limit() -> usize {
    DEFAULT_WORKSPACE_LIMIT
}

impl ConvConfig {
    /// Minimal configuration: square kernel, unit stride, zero padding,
    /// heuristic selection.
    pub fn with_kernel(kernel_h: usize, kernel_w: usize) -> Self {
        ConvConfig {
            kernel_h,
            kernel_w,
            stride_h: 1,
            stride_w: 1,
            pad: PadScheme::symmetric(0, 0),
            order: StorageOrder::default(),
            dtype: DType::F32,
            ws_limit_bytes: DEFAULT_WORKSPACE_LIMIT,
            exhaustive_search: false,
            deterministic: false,
            state_index: 0,
        }
    }

    /// Reject configurations the operators cannot run. Called once from
    /// the executor constructors, before any vendor traffic.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_h == 0 || self.kernel_w == 0 {
            return Err(ConvError::Config("kernel extent must be non-zero".into()));
        }
        if self.stride_h == 0 || self.stride_w == 0 {
            return Err(ConvError::Config("stride must be non-zero".into()));
        }
        if self.deterministic && self.exhaustive_search {
            return Err(ConvError::Config(
                "deterministic and exhaustive_search are mutually exclusive".into(),
            ));
        }
        if self.state_index >= NUM_POOLED_STATES {
            return Err(ConvError::Config(format!(
                "state_index {} out of range (< {})",
                self.state_index, NUM_POOLED_STATES
            )));
        }
        // The vendor primitive cannot express asymmetric padding; explicit
        // schemes are rejected here, derived ones when resolved per shape.
        if let PadScheme::Explicit {
            top,
            bottom,
            left,
            right,
        } = self.pad
        {
            if top != bottom || left != right {
                return Err(ConvError::Config(format!(
                    "asymmetric padding unsupported: top {top} / bottom {bottom}, \
                     left {left} / right {right}"
                )));
            }
        }
        Ok(())
    }

    /// The selection policy the flags encode.
    pub fn policy(&self) -> SelectionPolicy {
        if self.deterministic {
            SelectionPolicy::Deterministic
        } else if self.exhaustive_search {
            SelectionPolicy::Exhaustive
        } else {
            SelectionPolicy::Heuristic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = ConvConfig::with_kernel(3, 3);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.policy(), SelectionPolicy::Heuristic);
        assert_eq!(cfg.ws_limit_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.state_index, 0);
    }

    #[test]
    fn test_deterministic_and_exhaustive_exclusive() {
        let mut cfg = ConvConfig::with_kernel(3, 3);
        cfg.deterministic = true;
        cfg.exhaustive_search = true;
        assert!(matches!(cfg.validate(), Err(ConvError::Config(_))));
    }

    #[test]
    fn test_policy_flags() {
        let mut cfg = ConvConfig::with_kernel(3, 3);
        cfg.deterministic = true;
        assert_eq!(cfg.policy(), SelectionPolicy::Deterministic);
        cfg.deterministic = false;
        cfg.exhaustive_search = true;
        assert_eq!(cfg.policy(), SelectionPolicy::Exhaustive);
    }

    #[test]
    fn test_asymmetric_padding_rejected() {
        let mut cfg = ConvConfig::with_kernel(3, 3);
        cfg.pad = PadScheme::Explicit {
            top: 1,
            bottom: 2,
            left: 0,
            right: 0,
        };
        assert!(matches!(cfg.validate(), Err(ConvError::Config(_))));
    }

    #[test]
    fn test_state_index_bound() {
        let mut cfg = ConvConfig::with_kernel(3, 3);
        cfg.state_index = NUM_POOLED_STATES;
        assert!(matches!(cfg.validate(), Err(ConvError::Config(_))));
    }

    #[test]
    fn test_zero_kernel_rejected() {
        let cfg = ConvConfig::with_kernel(0, 3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cfg: ConvConfig = serde_json::from_str(
            r#"{
                "kernel_h": 3, "kernel_w": 3,
                "stride_h": 1, "stride_w": 1,
                "pad": {"Explicit": {"top": 1, "bottom": 1, "left": 1, "right": 1}},
                "order": "Nchw",
                "dtype": "F32"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.ws_limit_bytes, DEFAULT_WORKSPACE_LIMIT);
        assert!(!cfg.exhaustive_search);
        assert!(!cfg.deterministic);
        assert!(cfg.validate().is_ok());
    }
}
