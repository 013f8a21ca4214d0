//! Counting mock of the vendor boundary, used by the unit tests.
//!
//! Selection queries answer from small fixed perf tables (ranked
//! fastest-first, the way the vendor ranks search results); execution
//! calls run a naive CPU convolution so value-level tests are possible.
//! The arithmetic assumes channel-first data; channel-last tests assert
//! shapes only.

#![allow(clippy::too_many_arguments)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tensile_core::{DType, StorageOrder};

use crate::backend::{
    AlgoPerf, ConvBwdDataAlgo, ConvBwdFilterAlgo, ConvFwdAlgo, CudnnBackend,
};
use crate::error::{ConvError, Result};

#[derive(Default)]
pub struct MockCounters {
    pub handle_creates: AtomicUsize,
    pub workspace_allocs: AtomicUsize,
    pub workspace_frees: AtomicUsize,
    pub recommend_fwd: AtomicUsize,
    pub find_fwd: AtomicUsize,
    pub find_fwd_requested: AtomicUsize,
    pub recommend_bwd_filter: AtomicUsize,
    pub find_bwd_filter: AtomicUsize,
    pub recommend_bwd_data: AtomicUsize,
    pub find_bwd_data: AtomicUsize,
    pub forward_execs: AtomicUsize,
    pub bias_adds: AtomicUsize,
    pub bias_grads: AtomicUsize,
    pub filter_grads: AtomicUsize,
    pub data_grads: AtomicUsize,
}

impl MockCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockHandle;

#[derive(Default)]
pub struct MockTensorDesc {
    pub sets: usize,
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

#[derive(Default)]
pub struct MockFilterDesc {
    pub sets: usize,
    pub m: usize,
    pub c: usize,
    pub kh: usize,
    pub kw: usize,
}

#[derive(Default)]
pub struct MockConvDesc {
    pub sets: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
}

pub struct MockWorkspace {
    pub nbytes: usize,
    counters: Arc<MockCounters>,
}

impl Drop for MockWorkspace {
    fn drop(&mut self) {
        MockCounters::bump(&self.counters.workspace_frees);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockTensor {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

impl MockTensor {
    pub fn zeros(dims: &[usize]) -> Self {
        MockTensor {
            dims: dims.to_vec(),
            data: vec![0.0; dims.iter().product()],
        }
    }

    pub fn filled(dims: &[usize], value: f32) -> Self {
        MockTensor {
            dims: dims.to_vec(),
            data: vec![value; dims.iter().product()],
        }
    }

    pub fn from_data(dims: &[usize], data: &[f32]) -> Self {
        assert_eq!(dims.iter().product::<usize>(), data.len());
        MockTensor {
            dims: dims.to_vec(),
            data: data.to_vec(),
        }
    }
}

pub struct MockBackend {
    pub counters: Arc<MockCounters>,
    fwd_table: Vec<AlgoPerf<ConvFwdAlgo>>,
    bwd_filter_table: Vec<AlgoPerf<ConvBwdFilterAlgo>>,
    bwd_data_table: Vec<AlgoPerf<ConvBwdDataAlgo>>,
}

fn perf<A>(algo: A, time_ms: f32, memory_bytes: usize) -> AlgoPerf<A> {
    AlgoPerf {
        algo,
        ok: true,
        time_ms,
        memory_bytes,
    }
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            counters: Arc::new(MockCounters::default()),
            fwd_table: vec![
                perf(ConvFwdAlgo::Winograd, 0.40, 1_000_000),
                perf(ConvFwdAlgo::Fft, 0.60, 200_000),
                perf(ConvFwdAlgo::ImplicitPrecompGemm, 0.90, 40_000),
                perf(ConvFwdAlgo::ImplicitGemm, 1.50, 0),
            ],
            bwd_filter_table: vec![
                perf(ConvBwdFilterAlgo::Fft, 0.30, 300_000),
                perf(ConvBwdFilterAlgo::Algo1, 0.70, 60_000),
                perf(ConvBwdFilterAlgo::Algo0, 1.20, 0),
            ],
            bwd_data_table: vec![
                perf(ConvBwdDataAlgo::Winograd, 0.35, 400_000),
                perf(ConvBwdDataAlgo::Algo1, 0.80, 80_000),
                perf(ConvBwdDataAlgo::Algo0, 1.10, 0),
            ],
        }
    }

    fn recommend<A: Copy>(table: &[AlgoPerf<A>], ws_limit: usize) -> Result<A> {
        table
            .iter()
            .find(|p| p.ok && p.memory_bytes <= ws_limit)
            .map(|p| p.algo)
            .ok_or_else(|| ConvError::Backend("no algorithm within workspace limit".into()))
    }

    fn memory_of<A: Copy + PartialEq>(table: &[AlgoPerf<A>], algo: A) -> usize {
        table
            .iter()
            .find(|p| p.algo == algo)
            .map(|p| p.memory_bytes)
            .unwrap_or(0)
    }
}

impl CudnnBackend for MockBackend {
    type Handle = MockHandle;
    type TensorDesc = MockTensorDesc;
    type FilterDesc = MockFilterDesc;
    type ConvDesc = MockConvDesc;
    type Workspace = MockWorkspace;
    type Tensor = MockTensor;

    fn create_handle(&self) -> Result<MockHandle> {
        MockCounters::bump(&self.counters.handle_creates);
        Ok(MockHandle)
    }

    fn create_tensor_desc(&self) -> Result<MockTensorDesc> {
        Ok(MockTensorDesc::default())
    }

    fn create_filter_desc(&self) -> Result<MockFilterDesc> {
        Ok(MockFilterDesc::default())
    }

    fn create_conv_desc(&self) -> Result<MockConvDesc> {
        Ok(MockConvDesc::default())
    }

    fn set_tensor4d(
        &self,
        desc: &mut MockTensorDesc,
        _order: StorageOrder,
        _dtype: DType,
        n: usize,
        c: usize,
        h: usize,
        w: usize,
    ) -> Result<()> {
        desc.sets += 1;
        desc.n = n;
        desc.c = c;
        desc.h = h;
        desc.w = w;
        Ok(())
    }

    fn set_filter4d(
        &self,
        desc: &mut MockFilterDesc,
        _dtype: DType,
        _order: StorageOrder,
        m: usize,
        c: usize,
        kh: usize,
        kw: usize,
    ) -> Result<()> {
        desc.sets += 1;
        desc.m = m;
        desc.c = c;
        desc.kh = kh;
        desc.kw = kw;
        Ok(())
    }

    fn set_conv2d(
        &self,
        desc: &mut MockConvDesc,
        pad_h: usize,
        pad_w: usize,
        stride_h: usize,
        stride_w: usize,
        _dtype: DType,
    ) -> Result<()> {
        desc.sets += 1;
        desc.pad_h = pad_h;
        desc.pad_w = pad_w;
        desc.stride_h = stride_h;
        desc.stride_w = stride_w;
        Ok(())
    }

    fn alloc_workspace(&self, nbytes: usize) -> Result<MockWorkspace> {
        MockCounters::bump(&self.counters.workspace_allocs);
        Ok(MockWorkspace {
            nbytes,
            counters: Arc::clone(&self.counters),
        })
    }

    fn dims<'a>(&self, t: &'a MockTensor) -> &'a [usize] {
        &t.dims
    }

    fn resize(&self, t: &mut MockTensor, dims: &[usize]) -> Result<()> {
        t.dims = dims.to_vec();
        t.data.resize(dims.iter().product(), 0.0);
        Ok(())
    }

    fn recommend_fwd_algo(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _w: &MockFilterDesc,
        _conv: &MockConvDesc,
        _y: &MockTensorDesc,
        ws_limit: usize,
    ) -> Result<ConvFwdAlgo> {
        MockCounters::bump(&self.counters.recommend_fwd);
        Self::recommend(&self.fwd_table, ws_limit)
    }

    fn find_fwd_algos(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _w: &MockFilterDesc,
        _conv: &MockConvDesc,
        _y: &MockTensorDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvFwdAlgo>>> {
        MockCounters::bump(&self.counters.find_fwd);
        self.counters
            .find_fwd_requested
            .store(requested, Ordering::SeqCst);
        Ok(self.fwd_table[..requested.min(self.fwd_table.len())].to_vec())
    }

    fn fwd_workspace_size(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _w: &MockFilterDesc,
        _conv: &MockConvDesc,
        _y: &MockTensorDesc,
        algo: ConvFwdAlgo,
    ) -> Result<usize> {
        Ok(Self::memory_of(&self.fwd_table, algo))
    }

    fn recommend_bwd_filter_algo(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dw: &MockFilterDesc,
        ws_limit: usize,
    ) -> Result<ConvBwdFilterAlgo> {
        MockCounters::bump(&self.counters.recommend_bwd_filter);
        Self::recommend(&self.bwd_filter_table, ws_limit)
    }

    fn find_bwd_filter_algos(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dw: &MockFilterDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdFilterAlgo>>> {
        MockCounters::bump(&self.counters.find_bwd_filter);
        Ok(self.bwd_filter_table[..requested.min(self.bwd_filter_table.len())].to_vec())
    }

    fn bwd_filter_workspace_size(
        &self,
        _handle: &MockHandle,
        _x: &MockTensorDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dw: &MockFilterDesc,
        algo: ConvBwdFilterAlgo,
    ) -> Result<usize> {
        Ok(Self::memory_of(&self.bwd_filter_table, algo))
    }

    fn recommend_bwd_data_algo(
        &self,
        _handle: &MockHandle,
        _w: &MockFilterDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dx: &MockTensorDesc,
        ws_limit: usize,
    ) -> Result<ConvBwdDataAlgo> {
        MockCounters::bump(&self.counters.recommend_bwd_data);
        Self::recommend(&self.bwd_data_table, ws_limit)
    }

    fn find_bwd_data_algos(
        &self,
        _handle: &MockHandle,
        _w: &MockFilterDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dx: &MockTensorDesc,
        requested: usize,
    ) -> Result<Vec<AlgoPerf<ConvBwdDataAlgo>>> {
        MockCounters::bump(&self.counters.find_bwd_data);
        Ok(self.bwd_data_table[..requested.min(self.bwd_data_table.len())].to_vec())
    }

    fn bwd_data_workspace_size(
        &self,
        _handle: &MockHandle,
        _w: &MockFilterDesc,
        _dy: &MockTensorDesc,
        _conv: &MockConvDesc,
        _dx: &MockTensorDesc,
        algo: ConvBwdDataAlgo,
    ) -> Result<usize> {
        Ok(Self::memory_of(&self.bwd_data_table, algo))
    }

    fn convolution_forward(
        &self,
        _handle: &MockHandle,
        _algo: ConvFwdAlgo,
        x_desc: &MockTensorDesc,
        x: &MockTensor,
        w_desc: &MockFilterDesc,
        flt: &MockTensor,
        conv: &MockConvDesc,
        _workspace: Option<&MockWorkspace>,
        _workspace_bytes: usize,
        y_desc: &MockTensorDesc,
        y: &mut MockTensor,
    ) -> Result<()> {
        MockCounters::bump(&self.counters.forward_execs);
        let (n, c, h, w) = (x_desc.n, x_desc.c, x_desc.h, x_desc.w);
        let (m, kh, kw) = (w_desc.m, w_desc.kh, w_desc.kw);
        let (oh, ow) = (y_desc.h, y_desc.w);
        for ni in 0..n {
            for oc in 0..m {
                for yh in 0..oh {
                    for yw in 0..ow {
                        let mut acc = 0.0f32;
                        for ic in 0..c {
                            for r in 0..kh {
                                for s in 0..kw {
                                    let ih = (yh * conv.stride_h + r) as isize - conv.pad_h as isize;
                                    let iw = (yw * conv.stride_w + s) as isize - conv.pad_w as isize;
                                    if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                        continue;
                                    }
                                    acc += x.data[((ni * c + ic) * h + ih as usize) * w
                                        + iw as usize]
                                        * flt.data[((oc * c + ic) * kh + r) * kw + s];
                                }
                            }
                        }
                        y.data[((ni * m + oc) * oh + yh) * ow + yw] = acc;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_bias(
        &self,
        _handle: &MockHandle,
        _bias_desc: &MockTensorDesc,
        bias: &MockTensor,
        y_desc: &MockTensorDesc,
        y: &mut MockTensor,
    ) -> Result<()> {
        MockCounters::bump(&self.counters.bias_adds);
        let (n, m, oh, ow) = (y_desc.n, y_desc.c, y_desc.h, y_desc.w);
        for ni in 0..n {
            for oc in 0..m {
                for yh in 0..oh {
                    for yw in 0..ow {
                        y.data[((ni * m + oc) * oh + yh) * ow + yw] += bias.data[oc];
                    }
                }
            }
        }
        Ok(())
    }

    fn backward_bias(
        &self,
        _handle: &MockHandle,
        dy_desc: &MockTensorDesc,
        dy: &MockTensor,
        _db_desc: &MockTensorDesc,
        db: &mut MockTensor,
    ) -> Result<()> {
        MockCounters::bump(&self.counters.bias_grads);
        let (n, m, oh, ow) = (dy_desc.n, dy_desc.c, dy_desc.h, dy_desc.w);
        db.data.iter_mut().for_each(|v| *v = 0.0);
        for ni in 0..n {
            for oc in 0..m {
                for yh in 0..oh {
                    for yw in 0..ow {
                        db.data[oc] += dy.data[((ni * m + oc) * oh + yh) * ow + yw];
                    }
                }
            }
        }
        Ok(())
    }

    fn backward_filter(
        &self,
        _handle: &MockHandle,
        _algo: ConvBwdFilterAlgo,
        x_desc: &MockTensorDesc,
        x: &MockTensor,
        dy_desc: &MockTensorDesc,
        dy: &MockTensor,
        conv: &MockConvDesc,
        _workspace: Option<&MockWorkspace>,
        _workspace_bytes: usize,
        dw_desc: &MockFilterDesc,
        dw: &mut MockTensor,
    ) -> Result<()> {
        MockCounters::bump(&self.counters.filter_grads);
        let (n, c, h, w) = (x_desc.n, x_desc.c, x_desc.h, x_desc.w);
        let (m, kh, kw) = (dw_desc.m, dw_desc.kh, dw_desc.kw);
        let (oh, ow) = (dy_desc.h, dy_desc.w);
        dw.data.iter_mut().for_each(|v| *v = 0.0);
        for ni in 0..n {
            for oc in 0..m {
                for yh in 0..oh {
                    for yw in 0..ow {
                        let g = dy.data[((ni * m + oc) * oh + yh) * ow + yw];
                        for ic in 0..c {
                            for r in 0..kh {
                                for s in 0..kw {
                                    let ih = (yh * conv.stride_h + r) as isize - conv.pad_h as isize;
                                    let iw = (yw * conv.stride_w + s) as isize - conv.pad_w as isize;
                                    if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                        continue;
                                    }
                                    dw.data[((oc * c + ic) * kh + r) * kw + s] += g
                                        * x.data[((ni * c + ic) * h + ih as usize) * w
                                            + iw as usize];
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn backward_data(
        &self,
        _handle: &MockHandle,
        _algo: ConvBwdDataAlgo,
        w_desc: &MockFilterDesc,
        flt: &MockTensor,
        dy_desc: &MockTensorDesc,
        dy: &MockTensor,
        conv: &MockConvDesc,
        _workspace: Option<&MockWorkspace>,
        _workspace_bytes: usize,
        dx_desc: &MockTensorDesc,
        dx: &mut MockTensor,
    ) -> Result<()> {
        MockCounters::bump(&self.counters.data_grads);
        let (n, c, h, w) = (dx_desc.n, dx_desc.c, dx_desc.h, dx_desc.w);
        let (m, kh, kw) = (w_desc.m, w_desc.kh, w_desc.kw);
        let (oh, ow) = (dy_desc.h, dy_desc.w);
        dx.data.iter_mut().for_each(|v| *v = 0.0);
        for ni in 0..n {
            for oc in 0..m {
                for yh in 0..oh {
                    for yw in 0..ow {
                        let g = dy.data[((ni * m + oc) * oh + yh) * ow + yw];
                        for ic in 0..c {
                            for r in 0..kh {
                                for s in 0..kw {
                                    let ih = (yh * conv.stride_h + r) as isize - conv.pad_h as isize;
                                    let iw = (yw * conv.stride_w + s) as isize - conv.pad_w as isize;
                                    if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                        continue;
                                    }
                                    dx.data[((ni * c + ic) * h + ih as usize) * w + iw as usize] +=
                                        g * flt.data[((oc * c + ic) * kh + r) * kw + s];
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
