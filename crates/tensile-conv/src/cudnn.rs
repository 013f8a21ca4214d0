//! cuDNN implementation of the vendor boundary.
//!
//! Wraps the raw cuDNN entry points exposed through `cudarc::cudnn::sys`,
//! with device memory managed by `cudarc::driver`. Every opaque vendor
//! object is held in an owning wrapper that releases it on `Drop`.
//!
//! The pre-v8 single-answer recommendation getters no longer exist in
//! current cuDNN, so the heuristic policy is served by the `_v7` ranked
//! queries, taking the fastest candidate whose declared workspace need
//! fits the configured ceiling.

#![allow(clippy::too_many_arguments)]

use std::ffi::c_void;
use std::os::raw::c_int;
use std::sync::Arc;

use cudarc::cudnn::sys;
use cudarc::driver::{CudaDevice, CudaSlice, DevicePtr, DevicePtrMut};
use tensile_core::{DType, StorageOrder};

use crate::backend::{
    AlgoPerf, ConvBwdDataAlgo, ConvBwdFilterAlgo, ConvFwdAlgo, CudnnBackend,
};
use crate::error::{ConvError, Result};

fn check(status: sys::cudnnStatus_t, ctx: &str) -> Result<()> {
    if status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(ConvError::Backend(format!("{ctx}: {status:?}")))
    }
}

fn tensor_format(order: StorageOrder) -> sys::cudnnTensorFormat_t {
    match order {
        StorageOrder::Nchw => sys::cudnnTensorFormat_t::CUDNN_TENSOR_NCHW,
        StorageOrder::Nhwc => sys::cudnnTensorFormat_t::CUDNN_TENSOR_NHWC,
    }
}

fn data_type(dtype: DType) -> sys::cudnnDataType_t {
    match dtype {
        DType::F32 => sys::cudnnDataType_t::CUDNN_DATA_FLOAT,
        DType::F16 => sys::cudnnDataType_t::CUDNN_DATA_HALF,
    }
}

fn fwd_algo_sys(algo: ConvFwdAlgo) -> sys::cudnnConvolutionFwdAlgo_t {
    use sys::cudnnConvolutionFwdAlgo_t::*;
    match algo {
        ConvFwdAlgo::ImplicitGemm => CUDNN_CONVOLUTION_FWD_ALGO_IMPLICIT_GEMM,
        ConvFwdAlgo::ImplicitPrecompGemm => CUDNN_CONVOLUTION_FWD_ALGO_IMPLICIT_PRECOMP_GEMM,
        ConvFwdAlgo::Gemm => CUDNN_CONVOLUTION_FWD_ALGO_GEMM,
        ConvFwdAlgo::Direct => CUDNN_CONVOLUTION_FWD_ALGO_DIRECT,
        ConvFwdAlgo::Fft => CUDNN_CONVOLUTION_FWD_ALGO_FFT,
        ConvFwdAlgo::FftTiling => CUDNN_CONVOLUTION_FWD_ALGO_FFT_TILING,
        ConvFwdAlgo::Winograd => CUDNN_CONVOLUTION_FWD_ALGO_WINOGRAD,
    }
}

fn bwd_filter_algo_sys(algo: ConvBwdFilterAlgo) -> sys::cudnnConvolutionBwdFilterAlgo_t {
    use sys::cudnnConvolutionBwdFilterAlgo_t::*;
    match algo {
        ConvBwdFilterAlgo::Algo0 => CUDNN_CONVOLUTION_BWD_FILTER_ALGO_0,
        ConvBwdFilterAlgo::Algo1 => CUDNN_CONVOLUTION_BWD_FILTER_ALGO_1,
        ConvBwdFilterAlgo::Fft => CUDNN_CONVOLUTION_BWD_FILTER_ALGO_FFT,
        ConvBwdFilterAlgo::Algo3 => CUDNN_CONVOLUTION_BWD_FILTER_ALGO_3,
    }
}

fn bwd_data_algo_sys(algo: ConvBwdDataAlgo) -> sys::cudnnConvolutionBwdDataAlgo_t {
    use sys::cudnnConvolutionBwdDataAlgo_t::*;
    match algo {
        ConvBwdDataAlgo::Algo0 => CUDNN_CONVOLUTION_BWD_DATA_ALGO_0,
        ConvBwdDataAlgo::Algo1 => CUDNN_CONVOLUTION_BWD_DATA_ALGO_1,
        ConvBwdDataAlgo::Fft => CUDNN_CONVOLUTION_BWD_DATA_ALGO_FFT,
        ConvBwdDataAlgo::FftTiling => CUDNN_CONVOLUTION_BWD_DATA_ALGO_FFT_TILING,
        ConvBwdDataAlgo::Winograd => CUDNN_CONVOLUTION_BWD_DATA_ALGO_WINOGRAD,
    }
}

/// A cuDNN library handle. Each pooled state owns one, plus one per
/// operator for recommendation and workspace-size queries.
pub struct CudnnHandle {
    raw: sys::cudnnHandle_t,
}

unsafe impl Send for CudnnHandle {}

impl Drop for CudnnHandle {
    fn drop(&mut self) {
        unsafe {
            sys::cudnnDestroy(self.raw);
        }
    }
}

pub struct TensorDescriptor {
    raw: sys::cudnnTensorDescriptor_t,
}

unsafe impl Send for TensorDescriptor {}

impl Drop for TensorDescriptor {
    fn drop(&mut self) {
        unsafe {
            sys::cudnnDestroyTensorDescriptor(self.raw);
        }
    }
}

pub struct FilterDescriptor {
    raw: sys::cudnnFilterDescriptor_t,
}

unsafe impl Send for FilterDescriptor {}

impl Drop for FilterDescriptor {
    fn drop(&mut self) {
        unsafe {
            sys::cudnnDestroyFilterDescriptor(self.raw);
        }
    }
}

pub struct ConvDescriptor {
    raw: sys::cudnnConvolutionDescriptor_t,
}

unsafe impl Send for ConvDescriptor {}

impl Drop for ConvDescriptor {
    fn drop(&mut self) {
        unsafe {
            sys::cudnnDestroyConvolutionDescriptor(self.raw);
        }
    }
}

/// Device scratch allocation backing one pooled state.
pub struct DeviceWorkspace {
    buf: CudaSlice<u8>,
}

/// A device tensor: raw bytes plus a dim list and element type.
pub struct DeviceTensor {
    device: Arc<CudaDevice>,
    dims: Vec<usize>,
    dtype: DType,
    data: CudaSlice<u8>,
}

impl DeviceTensor {
    pub fn zeros(ctx: &CudnnContext, dtype: DType, dims: &[usize]) -> Result<Self> {
        let numel: usize = dims.iter().product();
        let data = ctx
            .device
            .alloc_zeros::<u8>(dtype.storage_bytes(numel))
            .map_err(|e| ConvError::Backend(format!("alloc_zeros: {e}")))?;
        Ok(DeviceTensor {
            device: Arc::clone(&ctx.device),
            dims: dims.to_vec(),
            dtype,
            data,
        })
    }

    /// Upload host f32 data (H2D).
    pub fn from_f32(ctx: &CudnnContext, dims: &[usize], host: &[f32]) -> Result<Self> {
        let bytes: Vec<u8> = host.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let data = ctx
            .device
            .htod_copy(bytes)
            .map_err(|e| ConvError::Backend(format!("htod_copy: {e}")))?;
        Ok(DeviceTensor {
            device: Arc::clone(&ctx.device),
            dims: dims.to_vec(),
            dtype: DType::F32,
            data,
        })
    }

    /// Read the tensor back to the host (D2H) as f32.
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        let bytes = self
            .device
            .dtoh_sync_copy(&self.data)
            .map_err(|e| ConvError::Backend(format!("dtoh_sync_copy: {e}")))?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    fn ptr(&self) -> *const c_void {
        *self.data.device_ptr() as usize as *const c_void
    }

    fn ptr_mut(&mut self) -> *mut c_void {
        *self.data.device_ptr_mut() as usize as *mut c_void
    }
}

/// The cuDNN-backed vendor implementation, bound to one device.
pub struct CudnnContext {
    device: Arc<CudaDevice>,
}

impl CudnnContext {
    pub fn new(device_index: usize) -> Result<Self> {
        let device = CudaDevice::new(device_index)
            .map_err(|e| ConvError::Backend(format!("device {device_index}: {e}")))?;
        Ok(CudnnContext { device })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }
}

impl CudnnBackend for CudnnContext {
    type Handle = CudnnHandle;
    type TensorDesc = TensorDescriptor;
    type FilterDesc = FilterDescriptor;
    type ConvDesc = ConvDescriptor;
    type Workspace = DeviceWorkspace;
    type Tensor = DeviceTensor;

    fn create_handle(&self) -> Result<CudnnHandle> {
        let mut raw: sys::cudnnHandle_t = std::ptr::null_mut();
        check(unsafe { sys::cudnnCreate(&mut raw) }, "cudnnCreate")?;
        Ok(CudnnHandle { raw })
    }

    fn create_tensor_desc(&self) -> Result<TensorDescriptor> {
        let mut raw: sys::cudnnTensorDescriptor_t = std::ptr::null_mut();
        check(
            unsafe { sys::cudnnCreateTensorDescriptor(&mut raw) },
            "cudnnCreateTensorDescriptor",
        )?;
        Ok(TensorDescriptor { raw })
    }

    fn create_filter_desc(&self) -> Result<FilterDescriptor> {
        let mut raw: sys::cudnnFilterDescriptor_t = std::ptr::null_mut();
        check(
            unsafe { sys::cudnnCreateFilterDescriptor(&mut raw) },
            "cudnnCreateFilterDescriptor",
        )?;
        Ok(FilterDescriptor { raw })
    }

    fn create_conv_desc(&self) -> Result<ConvDescriptor> {
        let mut raw: sys::cudnnConvolutionDescriptor_t = std::ptr::null_mut();
        check(
            unsafe { sys::cudnnCreateConvolutionDescriptor(&mut raw) },
            "cudnnCreateConvolutionDescriptor",
        )?;
        Ok(ConvDescriptor { raw })
    }

    fn set_tensor4d(
        &self,
        desc: &mut TensorDescriptor,
        order: StorageOrder,
        dtype: DType,
        n: usize,
        c: usize,
        h: usize,
        w: usize,
    ) -> Result<()> {
        check(
            unsafe {
                sys::cudnnSetTensor4dDescriptor(
                    desc.raw,
                    tensor_format(order),
                    data_type(dtype),
                    n as c_int,
                    c as c_int,
                    h as c_int,
                    w as c_int,
                )
            },
            "cudnnSetTensor4dDescriptor",
        )
    }

    fn set_filter4d(
        &self,
        desc: &mut FilterDescriptor,
        dtype: DType,
        order: StorageOrder,
        m: usize,
        c: usize,
        kh: usize,
        kw: usize,
    ) -> Result<()> {
        check(
            unsafe {
                sys::cudnnSetFilter4dDescriptor(
                    desc.raw,
                    data_type(dtype),
                    tensor_format(order),
                    m as c_int,
                    c as c_int,
                    kh as c_int,
                    kw as c_int,
                )
            },
            "cudnnSetFilter4dDescriptor",
        )
    }

    fn set_conv2d(
        &self,
        desc: &mut ConvDescriptor,
        pad_h: usize,
        pad_w: usize,
        stride_h: usize,
        stride_w: usize,
        _dtype: DType,
    ) -> Result<()> {
        // Accumulation stays in f32 for both element types.
        check(
            unsafe {
                sys::cudnnSetConvolution2dDescriptor(
                    desc.raw,
                    pad_h as c_int,
                    pad_w as c_int,
                    stride_h as c_int,
                    stride_w as c_int,
                    1,
                    1,
                    sys::cudnnConvolutionMode_t::CUDNN_CROSS_CORRELATION,
                    sys::cudnnDataType_t::CUDNN_DATA_FLOAT,
                )
            },
            "cudnnSetConvolution2dDescriptor",
        )
    }

    fn alloc_workspace(&self, nbytes: usize) -> Result<DeviceWorkspace> {
        let buf = self
            .device
            .alloc_zeros::<u8>(nbytes)
            .map_err(|e| ConvError::Backend(format!("workspace alloc ({nbytes} bytes): {e}")))?;
        Ok(DeviceWorkspace { buf })
    }

    fn dims<'a>(&self, t: &'a DeviceTensor) -> &'a [usize] {
        &t.dims
    }

    fn resize(&self, t: &mut DeviceTensor, dims: &[usize]) -> Result<()> {
        let numel: usize = dims.iter().product();
        let nbytes = t.dtype.storage_bytes(numel);
        if nbytes != t.data.len() {
            t.data = self
                .device
                .alloc_zeros::<u8>(nbytes)
                .map_err(|e| ConvError::Backend(format!("resize alloc ({nbytes} bytes): {e}")))?;
        }
        t.dims = dims.to_vec();
        Ok(())
    }

    fn recommend_fwd_algo(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        w: &FilterDescriptor,
        conv: &ConvDescriptor,
        y: &TensorDescriptor,
        ws_limit: usize,
    ) -> Result<ConvFwdAlgo> {
        let mut perf: Vec<sys::cudnnConvolutionFwdAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; crate::backend::NUM_FWD_ALGOS];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionForwardAlgorithm_v7(
                    handle.raw,
                    x.raw,
                    w.raw,
                    conv.raw,
                    y.raw,
                    perf.len() as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnGetConvolutionForwardAlgorithm_v7",
        )?;
        perf.truncate(returned as usize);
        perf.iter()
            .find(|p| {
                p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS && p.memory <= ws_limit
            })
            .and_then(|p| ConvFwdAlgo::from_raw(p.algo as i32))
            .ok_or_else(|| {
                ConvError::Backend("no forward algorithm within workspace limit".into())
            })
    }

    fn find_fwd_algos(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        w: &FilterDescriptor,
        conv: &ConvDescriptor,
        y: &TensorDescriptor,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvFwdAlgo>>> {
        let mut perf: Vec<sys::cudnnConvolutionFwdAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; requested];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnFindConvolutionForwardAlgorithm(
                    handle.raw,
                    x.raw,
                    w.raw,
                    conv.raw,
                    y.raw,
                    requested as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnFindConvolutionForwardAlgorithm",
        )?;
        perf.truncate(returned as usize);
        Ok(perf
            .iter()
            .filter_map(|p| {
                ConvFwdAlgo::from_raw(p.algo as i32).map(|algo| AlgoPerf {
                    algo,
                    ok: p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS,
                    time_ms: p.time,
                    memory_bytes: p.memory,
                })
            })
            .collect())
    }

    fn fwd_workspace_size(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        w: &FilterDescriptor,
        conv: &ConvDescriptor,
        y: &TensorDescriptor,
        algo: ConvFwdAlgo,
    ) -> Result<usize> {
        let mut size: usize = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionForwardWorkspaceSize(
                    handle.raw,
                    x.raw,
                    w.raw,
                    conv.raw,
                    y.raw,
                    fwd_algo_sys(algo),
                    &mut size,
                )
            },
            "cudnnGetConvolutionForwardWorkspaceSize",
        )?;
        Ok(size)
    }

    fn recommend_bwd_filter_algo(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dw: &FilterDescriptor,
        ws_limit: usize,
    ) -> Result<ConvBwdFilterAlgo> {
        let mut perf: Vec<sys::cudnnConvolutionBwdFilterAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; crate::backend::NUM_BWD_FILTER_ALGOS];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionBackwardFilterAlgorithm_v7(
                    handle.raw,
                    x.raw,
                    dy.raw,
                    conv.raw,
                    dw.raw,
                    perf.len() as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnGetConvolutionBackwardFilterAlgorithm_v7",
        )?;
        perf.truncate(returned as usize);
        perf.iter()
            .find(|p| {
                p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS && p.memory <= ws_limit
            })
            .and_then(|p| ConvBwdFilterAlgo::from_raw(p.algo as i32))
            .ok_or_else(|| {
                ConvError::Backend("no backward-filter algorithm within workspace limit".into())
            })
    }

    fn find_bwd_filter_algos(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dw: &FilterDescriptor,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdFilterAlgo>>> {
        let mut perf: Vec<sys::cudnnConvolutionBwdFilterAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; requested];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnFindConvolutionBackwardFilterAlgorithm(
                    handle.raw,
                    x.raw,
                    dy.raw,
                    conv.raw,
                    dw.raw,
                    requested as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnFindConvolutionBackwardFilterAlgorithm",
        )?;
        perf.truncate(returned as usize);
        Ok(perf
            .iter()
            .filter_map(|p| {
                ConvBwdFilterAlgo::from_raw(p.algo as i32).map(|algo| AlgoPerf {
                    algo,
                    ok: p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS,
                    time_ms: p.time,
                    memory_bytes: p.memory,
                })
            })
            .collect())
    }

    fn bwd_filter_workspace_size(
        &self,
        handle: &CudnnHandle,
        x: &TensorDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dw: &FilterDescriptor,
        algo: ConvBwdFilterAlgo,
    ) -> Result<usize> {
        let mut size: usize = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionBackwardFilterWorkspaceSize(
                    handle.raw,
                    x.raw,
                    dy.raw,
                    conv.raw,
                    dw.raw,
                    bwd_filter_algo_sys(algo),
                    &mut size,
                )
            },
            "cudnnGetConvolutionBackwardFilterWorkspaceSize",
        )?;
        Ok(size)
    }

    fn recommend_bwd_data_algo(
        &self,
        handle: &CudnnHandle,
        w: &FilterDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dx: &TensorDescriptor,
        ws_limit: usize,
    ) -> Result<ConvBwdDataAlgo> {
        let mut perf: Vec<sys::cudnnConvolutionBwdDataAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; crate::backend::NUM_BWD_DATA_ALGOS];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionBackwardDataAlgorithm_v7(
                    handle.raw,
                    w.raw,
                    dy.raw,
                    conv.raw,
                    dx.raw,
                    perf.len() as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnGetConvolutionBackwardDataAlgorithm_v7",
        )?;
        perf.truncate(returned as usize);
        perf.iter()
            .find(|p| {
                p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS && p.memory <= ws_limit
            })
            .and_then(|p| ConvBwdDataAlgo::from_raw(p.algo as i32))
            .ok_or_else(|| {
                ConvError::Backend("no backward-data algorithm within workspace limit".into())
            })
    }

    fn find_bwd_data_algos(
        &self,
        handle: &CudnnHandle,
        w: &FilterDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dx: &TensorDescriptor,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdDataAlgo>>> {
        let mut perf: Vec<sys::cudnnConvolutionBwdDataAlgoPerf_t> =
            vec![unsafe { std::mem::zeroed() }; requested];
        let mut returned: c_int = 0;
        check(
            unsafe {
                sys::cudnnFindConvolutionBackwardDataAlgorithm(
                    handle.raw,
                    w.raw,
                    dy.raw,
                    conv.raw,
                    dx.raw,
                    requested as c_int,
                    &mut returned,
                    perf.as_mut_ptr(),
                )
            },
            "cudnnFindConvolutionBackwardDataAlgorithm",
        )?;
        perf.truncate(returned as usize);
        Ok(perf
            .iter()
            .filter_map(|p| {
                ConvBwdDataAlgo::from_raw(p.algo as i32).map(|algo| AlgoPerf {
                    algo,
                    ok: p.status == sys::cudnnStatus_t::CUDNN_STATUS_SUCCESS,
                    time_ms: p.time,
                    memory_bytes: p.memory,
                })
            })
            .collect())
    }

    fn bwd_data_workspace_size(
        &self,
        handle: &CudnnHandle,
        w: &FilterDescriptor,
        dy: &TensorDescriptor,
        conv: &ConvDescriptor,
        dx: &TensorDescriptor,
        algo: ConvBwdDataAlgo,
    ) -> Result<usize> {
        let mut size: usize = 0;
        check(
            unsafe {
                sys::cudnnGetConvolutionBackwardDataWorkspaceSize(
                    handle.raw,
                    w.raw,
                    dy.raw,
                    conv.raw,
                    dx.raw,
                    bwd_data_algo_sys(algo),
                    &mut size,
                )
            },
            "cudnnGetConvolutionBackwardDataWorkspaceSize",
        )?;
        Ok(size)
    }

    fn convolution_forward(
        &self,
        handle: &CudnnHandle,
        algo: ConvFwdAlgo,
        x_desc: &TensorDescriptor,
        x: &DeviceTensor,
        w_desc: &FilterDescriptor,
        w: &DeviceTensor,
        conv: &ConvDescriptor,
        workspace: Option<&DeviceWorkspace>,
        workspace_bytes: usize,
        y_desc: &TensorDescriptor,
        y: &mut DeviceTensor,
    ) -> Result<()> {
        let one = 1.0f32;
        let zero = 0.0f32;
        let ws_ptr = workspace
            .map(|ws| *ws.buf.device_ptr() as usize as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        check(
            unsafe {
                sys::cudnnConvolutionForward(
                    handle.raw,
                    &one as *const f32 as *const c_void,
                    x_desc.raw,
                    x.ptr(),
                    w_desc.raw,
                    w.ptr(),
                    conv.raw,
                    fwd_algo_sys(algo),
                    ws_ptr,
                    workspace_bytes,
                    &zero as *const f32 as *const c_void,
                    y_desc.raw,
                    y.ptr_mut(),
                )
            },
            "cudnnConvolutionForward",
        )
    }

    fn add_bias(
        &self,
        handle: &CudnnHandle,
        bias_desc: &TensorDescriptor,
        bias: &DeviceTensor,
        y_desc: &TensorDescriptor,
        y: &mut DeviceTensor,
    ) -> Result<()> {
        let one = 1.0f32;
        check(
            unsafe {
                sys::cudnnAddTensor(
                    handle.raw,
                    &one as *const f32 as *const c_void,
                    bias_desc.raw,
                    bias.ptr(),
                    &one as *const f32 as *const c_void,
                    y_desc.raw,
                    y.ptr_mut(),
                )
            },
            "cudnnAddTensor",
        )
    }

    fn backward_bias(
        &self,
        handle: &CudnnHandle,
        dy_desc: &TensorDescriptor,
        dy: &DeviceTensor,
        db_desc: &TensorDescriptor,
        db: &mut DeviceTensor,
    ) -> Result<()> {
        let one = 1.0f32;
        let zero = 0.0f32;
        check(
            unsafe {
                sys::cudnnConvolutionBackwardBias(
                    handle.raw,
                    &one as *const f32 as *const c_void,
                    dy_desc.raw,
                    dy.ptr(),
                    &zero as *const f32 as *const c_void,
                    db_desc.raw,
                    db.ptr_mut(),
                )
            },
            "cudnnConvolutionBackwardBias",
        )
    }

    fn backward_filter(
        &self,
        handle: &CudnnHandle,
        algo: ConvBwdFilterAlgo,
        x_desc: &TensorDescriptor,
        x: &DeviceTensor,
        dy_desc: &TensorDescriptor,
        dy: &DeviceTensor,
        conv: &ConvDescriptor,
        workspace: Option<&DeviceWorkspace>,
        workspace_bytes: usize,
        dw_desc: &FilterDescriptor,
        dw: &mut DeviceTensor,
    ) -> Result<()> {
        let one = 1.0f32;
        let zero = 0.0f32;
        let ws_ptr = workspace
            .map(|ws| *ws.buf.device_ptr() as usize as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        check(
            unsafe {
                sys::cudnnConvolutionBackwardFilter(
                    handle.raw,
                    &one as *const f32 as *const c_void,
                    x_desc.raw,
                    x.ptr(),
                    dy_desc.raw,
                    dy.ptr(),
                    conv.raw,
                    bwd_filter_algo_sys(algo),
                    ws_ptr,
                    workspace_bytes,
                    &zero as *const f32 as *const c_void,
                    dw_desc.raw,
                    dw.ptr_mut(),
                )
            },
            "cudnnConvolutionBackwardFilter",
        )
    }

    fn backward_data(
        &self,
        handle: &CudnnHandle,
        algo: ConvBwdDataAlgo,
        w_desc: &FilterDescriptor,
        w: &DeviceTensor,
        dy_desc: &TensorDescriptor,
        dy: &DeviceTensor,
        conv: &ConvDescriptor,
        workspace: Option<&DeviceWorkspace>,
        workspace_bytes: usize,
        dx_desc: &TensorDescriptor,
        dx: &mut DeviceTensor,
    ) -> Result<()> {
        let one = 1.0f32;
        let zero = 0.0f32;
        let ws_ptr = workspace
            .map(|ws| *ws.buf.device_ptr() as usize as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        check(
            unsafe {
                sys::cudnnConvolutionBackwardData(
                    handle.raw,
                    &one as *const f32 as *const c_void,
                    w_desc.raw,
                    w.ptr(),
                    dy_desc.raw,
                    dy.ptr(),
                    conv.raw,
                    bwd_data_algo_sys(algo),
                    ws_ptr,
                    workspace_bytes,
                    &zero as *const f32 as *const c_void,
                    dx_desc.raw,
                    dx.ptr_mut(),
                )
            },
            "cudnnConvolutionBackwardData",
        )
    }
}
