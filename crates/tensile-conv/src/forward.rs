//! The forward convolution executor.

use std::sync::Arc;

use log::{debug, trace};
use tensile_core::{conv_output_dims, StorageOrder};

use crate::backend::CudnnBackend;
use crate::config::ConvConfig;
use crate::descriptors::ConvDescriptors;
use crate::error::{ConvError, Result};
use crate::pool::StatePool;
use crate::selector::{select_forward, ForwardChoice};
use crate::tracker::ShapeTracker;

/// 2D forward convolution: `y = conv(x, filter) + bias`.
///
/// Owns the descriptor set, the shape cache and the cached algorithm
/// choice; shares a pooled (handle, scratch) pair with every other
/// operator configured with the same `state_index`. Repeated calls with
/// unchanged tensor shapes skip descriptor rebuilds and algorithm
/// selection entirely.
pub struct Conv2dForward<B: CudnnBackend> {
    cfg: ConvConfig,
    backend: Arc<B>,
    pool: Arc<StatePool<B>>,
    /// Operator-local handle for recommendation and workspace-size
    /// queries; execution uses the pooled handle.
    handle: B::Handle,
    tracker: ShapeTracker,
    desc: ConvDescriptors<B>,
    choice: Option<ForwardChoice>,
}

impl<B: CudnnBackend> Conv2dForward<B> {
    pub fn new(cfg: ConvConfig, backend: Arc<B>, pool: Arc<StatePool<B>>) -> Result<Self> {
        cfg.validate()?;
        let handle = backend.create_handle()?;
        let desc = ConvDescriptors::new(&*backend)?;
        Ok(Conv2dForward {
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

    /// Run the convolution, writing into `y` (resized to the output shape).
    pub fn run(
        &mut self,
        x: &B::Tensor,
        filter: &B::Tensor,
        bias: &B::Tensor,
        y: &mut B::Tensor,
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
        let bd = backend.dims(bias);
        if bd.len() != 1 {
            return Err(ConvError::BadRank {
                tensor: "bias",
                expected: 1,
                got: bd.len(),
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
        if bd[0] != m {
            return Err(ConvError::ShapeMismatch {
                expected: vec![m],
                got: bd.to_vec(),
            });
        }

        let pads = cfg
            .pad
            .resolve(h, w, cfg.kernel_h, cfg.kernel_w, cfg.stride_h, cfg.stride_w);
        let (h_out, w_out) = conv_output_dims(
            h,
            w,
            cfg.kernel_h,
            cfg.kernel_w,
            cfg.stride_h,
            cfg.stride_w,
            &pads,
        )
        .ok_or_else(|| ConvError::ShapeMismatch {
            expected: vec![cfg.kernel_h, cfg.kernel_w],
            got: vec![h + pads.top + pads.bottom, w + pads.left + pads.right],
        })?;
        let y_dims = cfg.order.compose_output(n, m, h_out, w_out);
        backend.resize(y, &y_dims)?;

        let input_changed = self.tracker.observe_input(xd);
        let filter_changed = self.tracker.observe_filter(fd);

        let choice = match self.choice {
            Some(choice) if !input_changed && !filter_changed => {
                trace!("conv fwd: shapes unchanged, reusing {:?}", choice.algo);
                choice
            }
            _ => {
                debug!("conv fwd: descriptor configuration changed");
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
                let choice = select_forward(
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

        let desc = &self.desc;
        self.pool.with_state(cfg.state_index, |state| {
            let (handle, scratch) = state.split_mut();
            let workspace = scratch.ensure(&*backend, choice.workspace_bytes)?;
            backend.convolution_forward(
                handle,
                choice.algo,
                &desc.input,
                x,
                &desc.filter,
                filter,
                &desc.conv,
                workspace,
                choice.workspace_bytes,
                &desc.output,
                y,
            )
        })?;

        // Bias addition needs no scratch memory and runs outside the lease.
        backend.add_bias(&self.handle, &desc.bias, bias, &desc.output, y)
    }
}

impl<B: CudnnBackend> std::fmt::Debug for Conv2dForward<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conv2dForward")
            .field("cfg", &self.cfg)
            .field("choice", &self.choice)
            .finish()
    }
}
