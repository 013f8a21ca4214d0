//! # tensile-core
//!
//! Foundation types shared by the Tensile GPU operators:
//! - `Shape`: dimension lists with stack-allocated storage for the common 1D-4D case
//! - `DType`: the numeric element types the accelerator kernels accept
//! - `StorageOrder`: the two supported 4D tensor interleavings (NCHW / NHWC)
//! - convolution geometry: output sizing and padding derivation

pub mod dtype;
pub mod geometry;
pub mod layout;
pub mod shape;

pub use dtype::DType;
pub use geometry::{conv_output_dims, PadScheme, Pads};
pub use layout::StorageOrder;
pub use shape::Shape;
