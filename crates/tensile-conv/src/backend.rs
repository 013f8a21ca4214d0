//! The vendor library boundary.
//!
//! [`CudnnBackend`] is the seam between the selection/caching protocol and
//! the accelerator's convolution primitives: one method per vendor entry
//! point, with the opaque handle and descriptor types left to the
//! implementation. The real implementation wraps cuDNN (see `cudnn`, behind
//! the `cuda` feature); tests drive the protocol through a counting mock.
//!
//! Descriptor and handle release is the implementation's responsibility:
//! the associated types own their vendor objects and free them on `Drop`.

#![allow(clippy::too_many_arguments)]

use tensile_core::{DType, StorageOrder};

use crate::error::Result;

/// Number of forward algorithm variants the vendor library ships.
///
/// Sizes the result buffer handed to the exhaustive search; a library that
/// ships more variants has the excess silently truncated.
pub const NUM_FWD_ALGOS: usize = 7;
/// Number of backward-filter algorithm variants.
pub const NUM_BWD_FILTER_ALGOS: usize = 4;
/// Number of backward-data algorithm variants.
pub const NUM_BWD_DATA_ALGOS: usize = 5;

/// Forward convolution algorithm variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvFwdAlgo {
    ImplicitGemm,
    ImplicitPrecompGemm,
    Gemm,
    Direct,
    Fft,
    FftTiling,
    Winograd,
}

/// Backward-filter (weight gradient) algorithm variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvBwdFilterAlgo {
    Algo0,
    Algo1,
    Fft,
    Algo3,
}

/// Backward-data (input gradient) algorithm variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvBwdDataAlgo {
    Algo0,
    Algo1,
    Fft,
    FftTiling,
    Winograd,
}

impl ConvFwdAlgo {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::ImplicitGemm),
            1 => Some(Self::ImplicitPrecompGemm),
            2 => Some(Self::Gemm),
            3 => Some(Self::Direct),
            4 => Some(Self::Fft),
            5 => Some(Self::FftTiling),
            6 => Some(Self::Winograd),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::ImplicitGemm => 0,
            Self::ImplicitPrecompGemm => 1,
            Self::Gemm => 2,
            Self::Direct => 3,
            Self::Fft => 4,
            Self::FftTiling => 5,
            Self::Winograd => 6,
        }
    }
}

impl ConvBwdFilterAlgo {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Algo0),
            1 => Some(Self::Algo1),
            2 => Some(Self::Fft),
            3 => Some(Self::Algo3),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Algo0 => 0,
            Self::Algo1 => 1,
            Self::Fft => 2,
            Self::Algo3 => 3,
        }
    }
}

impl ConvBwdDataAlgo {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Algo0),
            1 => Some(Self::Algo1),
            2 => Some(Self::Fft),
            3 => Some(Self::FftTiling),
            4 => Some(Self::Winograd),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Algo0 => 0,
            Self::Algo1 => 1,
            Self::Fft => 2,
            Self::FftTiling => 3,
            Self::Winograd => 4,
        }
    }
}

/// One timed candidate from an exhaustive search, ranked fastest-first by
/// the vendor.
#[derive(Debug, Clone, Copy)]
pub struct AlgoPerf<A> {
    pub algo: A,
    /// Whether the vendor reported success for this candidate.
    pub ok: bool,
    pub time_ms: f32,
    pub memory_bytes: usize,
}

/// Vendor convolution library boundary.
///
/// Implementations provide the opaque state (handles, descriptors, device
/// workspace, device tensors) plus the descriptor, query and execution
/// entry points the executors invoke. All methods map a vendor failure to
/// [`crate::ConvError::Backend`].
pub trait CudnnBackend: Send + Sync + 'static {
    /// Per-pooled-state vendor handle.
    type Handle: Send;
    type TensorDesc: Send;
    type FilterDesc: Send;
    type ConvDesc: Send;
    /// Device scratch allocation.
    type Workspace: Send;
    /// Device tensor, owned and shape-managed by the storage collaborator.
    type Tensor;

    // --- handles and descriptors ---

    fn create_handle(&self) -> Result<Self::Handle>;
    fn create_tensor_desc(&self) -> Result<Self::TensorDesc>;
    fn create_filter_desc(&self) -> Result<Self::FilterDesc>;
    fn create_conv_desc(&self) -> Result<Self::ConvDesc>;

    fn set_tensor4d(
        &self,
        desc: &mut Self::TensorDesc,
        order: StorageOrder,
        dtype: DType,
        n: usize,
        c: usize,
        h: usize,
        w: usize,
    ) -> Result<()>;

    fn set_filter4d(
        &self,
        desc: &mut Self::FilterDesc,
        dtype: DType,
        order: StorageOrder,
        m: usize,
        c: usize,
        kh: usize,
        kw: usize,
    ) -> Result<()>;

    /// Dilation is fixed at 1 and the mode is cross-correlation.
    fn set_conv2d(
        &self,
        desc: &mut Self::ConvDesc,
        pad_h: usize,
        pad_w: usize,
        stride_h: usize,
        stride_w: usize,
        dtype: DType,
    ) -> Result<()>;

    // --- device memory and tensor storage collaborator ---

    fn alloc_workspace(&self, nbytes: usize) -> Result<Self::Workspace>;

    fn dims<'a>(&self, t: &'a Self::Tensor) -> &'a [usize];
    fn resize(&self, t: &mut Self::Tensor, dims: &[usize]) -> Result<()>;

    // --- forward algorithm queries ---

    /// Fast recommendation honoring a workspace byte ceiling.
    fn recommend_fwd_algo(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        w: &Self::FilterDesc,
        conv: &Self::ConvDesc,
        y: &Self::TensorDesc,
        ws_limit: usize,
    ) -> Result<ConvFwdAlgo>;

    /// Timed search over up to `requested` candidates, ranked fastest-first.
    /// Runs real kernels and is free to allocate; the ceiling does not apply.
    fn find_fwd_algos(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        w: &Self::FilterDesc,
        conv: &Self::ConvDesc,
        y: &Self::TensorDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvFwdAlgo>>>;

    fn fwd_workspace_size(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        w: &Self::FilterDesc,
        conv: &Self::ConvDesc,
        y: &Self::TensorDesc,
        algo: ConvFwdAlgo,
    ) -> Result<usize>;

    // --- backward-filter algorithm queries ---

    fn recommend_bwd_filter_algo(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dw: &Self::FilterDesc,
        ws_limit: usize,
    ) -> Result<ConvBwdFilterAlgo>;

    fn find_bwd_filter_algos(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dw: &Self::FilterDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdFilterAlgo>>>;

    fn bwd_filter_workspace_size(
        &self,
        handle: &Self::Handle,
        x: &Self::TensorDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dw: &Self::FilterDesc,
        algo: ConvBwdFilterAlgo,
    ) -> Result<usize>;

    // --- backward-data algorithm queries ---

    fn recommend_bwd_data_algo(
        &self,
        handle: &Self::Handle,
        w: &Self::FilterDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dx: &Self::TensorDesc,
        ws_limit: usize,
    ) -> Result<ConvBwdDataAlgo>;

    fn find_bwd_data_algos(
        &self,
        handle: &Self::Handle,
        w: &Self::FilterDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dx: &Self::TensorDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdDataAlgo>>>;

    fn bwd_data_workspace_size(
        &self,
        handle: &Self::Handle,
        w: &Self::FilterDesc,
        dy: &Self::TensorDesc,
        conv: &Self::ConvDesc,
        dx: &Self::TensorDesc,
        algo: ConvBwdDataAlgo,
    ) -> Result<usize>;

    // --- execution ---

    /// y = conv(x, w); pure overwrite, no blending with prior contents.
    fn convolution_forward(
        &self,
        handle: &Self::Handle,
        algo: ConvFwdAlgo,
        x_desc: &Self::TensorDesc,
        x: &Self::Tensor,
        w_desc: &Self::FilterDesc,
        w: &Self::Tensor,
        conv: &Self::ConvDesc,
        workspace: Option<&Self::Workspace>,
        workspace_bytes: usize,
        y_desc: &Self::TensorDesc,
        y: &mut Self::Tensor,
    ) -> Result<()>;

    /// y += bias, broadcast over every non-channel position.
    fn add_bias(
        &self,
        handle: &Self::Handle,
        bias_desc: &Self::TensorDesc,
        bias: &Self::Tensor,
        y_desc: &Self::TensorDesc,
        y: &mut Self::Tensor,
    ) -> Result<()>;

    /// db = reduce(dy) over every non-channel position.
    fn backward_bias(
        &self,
        handle: &Self::Handle,
        dy_desc: &Self::TensorDesc,
        dy: &Self::Tensor,
        db_desc: &Self::TensorDesc,
        db: &mut Self::Tensor,
    ) -> Result<()>;

    fn backward_filter(
        &self,
        handle: &Self::Handle,
        algo: ConvBwdFilterAlgo,
        x_desc: &Self::TensorDesc,
        x: &Self::Tensor,
        dy_desc: &Self::TensorDesc,
        dy: &Self::Tensor,
        conv: &Self::ConvDesc,
        workspace: Option<&Self::Workspace>,
        workspace_bytes: usize,
        dw_desc: &Self::FilterDesc,
        dw: &mut Self::Tensor,
    ) -> Result<()>;

    fn backward_data(
        &self,
        handle: &Self::Handle,
        algo: ConvBwdDataAlgo,
        w_desc: &Self::FilterDesc,
        w: &Self::Tensor,
        dy_desc: &Self::TensorDesc,
        dy: &Self::Tensor,
        conv: &Self::ConvDesc,
        workspace: Option<&Self::Workspace>,
        workspace_bytes: usize,
        dx_desc: &Self::TensorDesc,
        dx: &mut Self::Tensor,
    ) -> Result<()>;
}
