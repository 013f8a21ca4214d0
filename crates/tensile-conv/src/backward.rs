//! The gradient convolution executor.

use std::sync::Arc;

use log::{debug, trace};
use tensile_core::StorageOrder;

use crate::backend::CudnnBackend;
use crate::config::ConvConfig;
use crate::descriptors::ConvDescriptors;
use crate::error::{ConvError, Result};
use crate::pool::StatePool;
use crate::selector::{select_backward, BackwardChoice};
use crate::tracker::ShapeTracker;

/// 2D convolution gradients: filter gradient and bias gradient always,
/// input gradient on request.
///
/// Mirrors [`Conv2dForward`](crate::Conv2dForward)'s caching protocol with
/// two independently selected backward algorithms sharing one pooled
/// scratch buffer sized to the larger requirement.
pub struct Conv2dBackward<B: CudnnBackend> {
    cfg: ConvConfig,
    backend: Arc<B>,
    pool: Arc<StatePool<B>>,
    handle: B::Handle,
    tracker: ShapeTracker,
    desc: ConvDescriptors<B>,
    choice: Option<BackwardChoice>,
}

impl<B: CudnnBackend> Conv2dBackward<B> {
    pub fn new(cfg: ConvConfig, backend: Arc<B>, pool: Arc<StatePool<B>>) -> Result<Self> {
        cfg.validate()?;
        let handle = backend.create_handle()?;
        let desc = ConvDescriptors::new(&*backend)?;
        Ok(Conv2dBackward {
            cfg,
            backend,
            pool,
            handle,
            tracker: ShapeTracker::new(),
            desc,
            choice: None,
        })
    }

    pub fn config(&self) -> &ConvConfig {
        &self.cfg
    }

    /// Compute gradients from the forward inputs and the output gradient.
    ///
    /// `dfilter` and `dbias` are resized to match the filter and the
    /// output-channel count; `dx`, when given, is resized to the input's
    /// shape. Execution order is fixed: bias gradient (a plain reduction,
    /// no pooled state), then filter gradient, then the optional data
    /// gradient, the latter two inside one pooled-state lease.
    pub fn run(
        &mut self,
        x: &B::Tensor,
        filter: &B::Tensor,
        dy: &B::Tensor,
        dfilter: &mut B::Tensor,
        dbias: &mut B::Tensor,
        dx: Option<&mut B::Tensor>,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let xd = backend.dims(x);
        if xd.len() != 4 {
            return Err(ConvError::BadRank {
                tensor: "input",
                expected: 4,
                got: xd.len(),
            });
        }
        let fd = backend.dims(filter);
        if fd.len() != 4 {
            return Err(ConvError::BadRank {
                tensor: "filter",
                expected: 4,
                got: fd.len(),
            });
        }
        let dyd = backend.dims(dy);
        if dyd.len() != 4 {
            return Err(ConvError::BadRank {
                tensor: "output gradient",
                expected: 4,
                got: dyd.len(),
            });
        }

        let cfg = self.cfg.clone();
        let (n, c, h, w) = cfg.order.split_activation(xd);
        let m = fd[0];

        let expected_filter = match cfg.order {
            StorageOrder::Nchw => [m, c, cfg.kernel_h, cfg.kernel_w],
            StorageOrder::Nhwc => [m, cfg.kernel_h, cfg.kernel_w, c],
        };
        if fd != expected_filter.as_slice() {
            return Err(ConvError::ShapeMismatch {
                expected: expected_filter.to_vec(),
                got: fd.to_vec(),
            });
        }

        let (h_out, w_out) = cfg.order.output_spatial(dyd);
        let expected_dy = cfg.order.compose_output(n, m, h_out, w_out);
        if dyd != expected_dy.as_slice() {
            return Err(ConvError::ShapeMismatch {
                expected: expected_dy.to_vec(),
                got: dyd.to_vec(),
            });
        }

        // Padding is re-derived from the forward spatial extent.
        let pads = cfg
            .pad
            .resolve(h, w, cfg.kernel_h, cfg.kernel_w, cfg.stride_h, cfg.stride_w);

        backend.resize(dfilter, fd)?;
        backend.resize(dbias, &[m])?;

        let input_changed = self.tracker.observe_input(xd);
        let filter_changed = self.tracker.observe_filter(fd);

        let choice = match self.choice {
            Some(choice) if !input_changed && !filter_changed => {
                trace!(
                    "conv bwd: shapes unchanged, reusing {:?} / {:?}",
                    choice.filter_algo,
                    choice.data_algo
                );
                choice
            }
            _ => {
                debug!("conv bwd: descriptor configuration changed");
                if input_changed {
                    self.desc
                        .set_input(&*backend, cfg.order, cfg.dtype, n, c, h, w)?;
                }
                if filter_changed {
                    self.desc.set_filter_and_bias(
                        &*backend,
                        cfg.order,
                        cfg.dtype,
                        m,
                        c,
                        cfg.kernel_h,
                        cfg.kernel_w,
                    )?;
                }
                self.desc
                    .set_output(&*backend, cfg.order, cfg.dtype, n, m, h_out, w_out)?;
                self.desc
                    .set_conv(&*backend, cfg.dtype, &pads, cfg.stride_h, cfg.stride_w)?;
                let choice = select_backward(
                    &*backend,
                    &self.handle,
                    &self.pool,
                    cfg.policy(),
                    cfg.state_index,
                    cfg.ws_limit_bytes,
                    &self.desc,
                )?;
                *self.choice.insert(choice)
            }
        };

        // Bias gradient is a plain reduction over dY: no scratch memory,
        // no pooled state.
        let desc = &self.desc;
        backend.backward_bias(&self.handle, &desc.output, dy, &desc.bias, dbias)?;

        self.pool.with_state(cfg.state_index, |state| {
            let (handle, scratch) = state.split_mut();
            let workspace = scratch.ensure(&*backend, choice.workspace_bytes)?;
            backend.backward_filter(
                handle,
                choice.filter_algo,
                &desc.input,
                x,
                &desc.output,
                dy,
                &desc.conv,
                workspace,
                choice.workspace_bytes,
                &desc.filter,
                dfilter,
            )?;
            if let Some(dx) = dx {
                backend.resize(dx, xd)?;
                backend.backward_data(
                    handle,
                    choice.data_algo,
                    &desc.filter,
                    filter,
                    &desc.output,
                    dy,
                    &desc.conv,
                    workspace,
                    choice.workspace_bytes,
                    &desc.input,
                    dx,
                )?;
            }
            Ok(())
        })
    }
}
