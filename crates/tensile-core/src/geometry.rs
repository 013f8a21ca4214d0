//! Convolution geometry: output sizing and padding derivation.
//!
//! The GPU operators treat these as collaborators — they decide the output
//! extent and the concrete per-edge padding before any descriptor is built.

use serde::{Deserialize, Serialize};

/// Concrete per-edge padding for one convolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pads {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Pads {
    pub fn zero() -> Self {
        Pads {
            top: 0,
            bottom: 0,
            left: 0,
            right: 0,
        }
    }

    /// Whether top/bottom and left/right padding agree per axis.
    pub fn is_symmetric(&self) -> bool {
        self.top == self.bottom && self.left == self.right
    }
}

/// How padding is determined for a convolution.
///
/// `Explicit` carries caller-chosen per-edge amounts; `Same` and `Valid`
/// derive them from the spatial extent at call time, the way classic
/// framework "legacy pad" modes do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadScheme {
    Explicit {
        top: usize,
        bottom: usize,
        left: usize,
        right: usize,
    },
    /// Output spatial extent is ceil(input / stride); total padding split
    /// evenly, with the odd byte going to bottom/right.
    Same,
    /// No padding at all.
    Valid,
}

impl PadScheme {
    /// Symmetric explicit padding, the common case.
    pub fn symmetric(pad_h: usize, pad_w: usize) -> Self {
        PadScheme::Explicit {
            top: pad_h,
            bottom: pad_h,
            left: pad_w,
            right: pad_w,
        }
    }

    /// Resolve this scheme to concrete per-edge padding for the given
    /// spatial extent, kernel and stride.
    pub fn resolve(
        &self,
        in_h: usize,
        in_w: usize,
        kernel_h: usize,
        kernel_w: usize,
        stride_h: usize,
        stride_w: usize,
    ) -> Pads {
        match *self {
            PadScheme::Explicit {
                top,
                bottom,
                left,
                right,
            } => Pads {
                top,
                bottom,
                left,
                right,
            },
            PadScheme::Valid => Pads::zero(),
            PadScheme::Same => {
                let (top, bottom) = same_axis_pads(in_h, kernel_h, stride_h);
                let (left, right) = same_axis_pads(in_w, kernel_w, stride_w);
                Pads {
                    top,
                    bottom,
                    left,
                    right,
                }
            }
        }
    }
}

fn same_axis_pads(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = input.div_ceil(stride);
    let needed = (out - 1) * stride + kernel;
    let total = needed.saturating_sub(input);
    (total / 2, total - total / 2)
}

/// Output spatial extent of a 2D convolution, or `None` when the kernel
/// does not fit inside the padded input.
pub fn conv_output_dims(
    in_h: usize,
    in_w: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    pads: &Pads,
) -> Option<(usize, usize)> {
    let padded_h = in_h + pads.top + pads.bottom;
    let padded_w = in_w + pads.left + pads.right;
    if padded_h < kernel_h || padded_w < kernel_w {
        return None;
    }
    let out_h = (padded_h - kernel_h) / stride_h + 1;
    let out_w = (padded_w - kernel_w) / stride_w + 1;
    Some((out_h, out_w))
}
