//! The operator-owned descriptor set.
//!
//! Five opaque vendor handles: input/bias/output tensor layouts, the filter
//! layout and the convolution parameters. Each part is rebuilt
//! independently so an input-only shape change leaves the filter and bias
//! descriptors untouched. The backend's descriptor types release their
//! vendor objects on `Drop`, so destruction of the owning operator frees
//! everything on every exit path.

use tensile_core::{DType, Pads, StorageOrder};

use crate::backend::CudnnBackend;
use crate::error::{ConvError, Result};

pub struct ConvDescriptors<B: CudnnBackend> {
    pub input: B::TensorDesc,
    pub filter: B::FilterDesc,
    pub bias: B::TensorDesc,
    pub output: B::TensorDesc,
    pub conv: B::ConvDesc,
}

impl<B: CudnnBackend> ConvDescriptors<B> {
    pub fn new(backend: &B) -> Result<Self> {
        Ok(ConvDescriptors {
            input: backend.create_tensor_desc()?,
            filter: backend.create_filter_desc()?,
            bias: backend.create_tensor_desc()?,
            output: backend.create_tensor_desc()?,
            conv: backend.create_conv_desc()?,
        })
    }

    pub fn set_input(
        &mut self,
        backend: &B,
        order: StorageOrder,
        dtype: DType,
        n: usize,
        c: usize,
        h: usize,
        w: usize,
    ) -> Result<()> {
        backend.set_tensor4d(&mut self.input, order, dtype, n, c, h, w)
    }

    /// The bias layout depends only on the filter's output-channel count,
    /// so both are rebuilt together.
    pub fn set_filter_and_bias(
        &mut self,
        backend: &B,
        order: StorageOrder,
        dtype: DType,
        m: usize,
        c: usize,
        kh: usize,
        kw: usize,
    ) -> Result<()> {
        backend.set_filter4d(&mut self.filter, dtype, order, m, c, kh, kw)?;
        backend.set_tensor4d(&mut self.bias, order, dtype, 1, m, 1, 1)
    }

    pub fn set_output(
        &mut self,
        backend: &B,
        order: StorageOrder,
        dtype: DType,
        n: usize,
        m: usize,
        h_out: usize,
        w_out: usize,
    ) -> Result<()> {
        backend.set_tensor4d(&mut self.output, order, dtype, n, m, h_out, w_out)
    }

    /// Rebuild the convolution-parameter descriptor.
    ///
    /// The vendor primitive cannot express asymmetric padding, so the
    /// resolved pads are checked before the vendor sees the descriptor.
    pub fn set_conv(
        &mut self,
        backend: &B,
        dtype: DType,
        pads: &Pads,
        stride_h: usize,
        stride_w: usize,
    ) -> Result<()> {
        if !pads.is_symmetric() {
            return Err(ConvError::Config(format!(
                "derived padding is asymmetric (top {}, bottom {}, left {}, right {}), \
                 which the vendor convolution cannot express",
                pads.top, pads.bottom, pads.left, pads.right
            )));
        }
        backend.set_conv2d(&mut self.conv, pads.top, pads.left, stride_h, stride_w, dtype)
    }
}
