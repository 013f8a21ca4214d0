//! Algorithm selection strategies.
//!
//! One policy-dispatch routine, [`choose_algo`], shared by the forward and
//! backward paths; the callers only differ in which vendor query closures
//! they hand it and which fixed algorithm the deterministic policy pins.

use std::fmt::Debug;

use log::debug;

use crate::backend::{
    AlgoPerf, ConvBwdDataAlgo, ConvBwdFilterAlgo, ConvFwdAlgo, CudnnBackend, NUM_BWD_DATA_ALGOS,
    NUM_BWD_FILTER_ALGOS, NUM_FWD_ALGOS,
};
use crate::config::SelectionPolicy;
use crate::descriptors::ConvDescriptors;
use crate::error::{ConvError, Result};
use crate::pool::StatePool;

/// The forward operator's cached selection.
#[derive(Debug, Clone, Copy)]
pub struct ForwardChoice {
    pub algo: ConvFwdAlgo,
    pub workspace_bytes: usize,
}

/// The gradient operator's cached selection. `workspace_bytes` is the
/// maximum of the two requirements: the filter-gradient and data-gradient
/// invocations run back to back against the same pooled buffer.
#[derive(Debug, Clone, Copy)]
pub struct BackwardChoice {
    pub filter_algo: ConvBwdFilterAlgo,
    pub data_algo: ConvBwdDataAlgo,
    pub workspace_bytes: usize,
}

/// Dispatch one algorithm selection through the configured policy.
///
/// Exhaustive search runs under the pooled-state lease and empties the
/// shared scratch buffer first, so the timed candidates can allocate the
/// whole device budget unconstrained by the configured ceiling.
fn choose_algo<B: CudnnBackend, A: Copy + Debug>(
    label: &'static str,
    policy: SelectionPolicy,
    pool: &StatePool<B>,
    state_index: usize,
    fixed: A,
    find: impl FnOnce(&B::Handle) -> Result<Vec<AlgoPerf<A>>>,
    recommend: impl FnOnce() -> Result<A>,
) -> Result<A> {
    match policy {
        SelectionPolicy::Deterministic => Ok(fixed),
        SelectionPolicy::Heuristic => recommend(),
        SelectionPolicy::Exhaustive => pool.with_state(state_index, |state| {
            debug!("{label}: exhaustive search");
            state.scratch_mut().reset();
            let perf = find(state.handle())?;
            fastest(label, &perf)
        }),
    }
}

/// Pick the vendor's first-ranked (fastest) candidate, logging the whole
/// field for diagnostics.
fn fastest<A: Copy + Debug>(label: &str, perf: &[AlgoPerf<A>]) -> Result<A> {
    for p in perf {
        debug!(
            "{label} candidate {:?}: ok={} time={:.3}ms memory={}B",
            p.algo, p.ok, p.time_ms, p.memory_bytes
        );
    }
    match perf.first() {
        Some(best) if best.ok => Ok(best.algo),
        _ => Err(ConvError::Backend(format!(
            "{label}: exhaustive search produced no usable algorithm"
        ))),
    }
}

pub(crate) fn select_forward<B: CudnnBackend>(
    backend: &B,
    query_handle: &B::Handle,
    pool: &StatePool<B>,
    policy: SelectionPolicy,
    state_index: usize,
    ws_limit: usize,
    desc: &ConvDescriptors<B>,
) -> Result<ForwardChoice> {
    let algo = choose_algo(
        "conv fwd",
        policy,
        pool,
        state_index,
        ConvFwdAlgo::ImplicitPrecompGemm,
        |handle| {
            backend.find_fwd_algos(
                handle,
                &desc.input,
                &desc.filter,
                &desc.conv,
                &desc.output,
                NUM_FWD_ALGOS,
            )
        },
        || {
            backend.recommend_fwd_algo(
                query_handle,
                &desc.input,
                &desc.filter,
                &desc.conv,
                &desc.output,
                ws_limit,
            )
        },
    )?;
    let workspace_bytes = backend.fwd_workspace_size(
        query_handle,
        &desc.input,
        &desc.filter,
        &desc.conv,
        &desc.output,
        algo,
    )?;
    debug!("conv fwd: algorithm {algo:?}, workspace {workspace_bytes} bytes");
    Ok(ForwardChoice {
        algo,
        workspace_bytes,
    })
}

pub(crate) fn select_backward<B: CudnnBackend>(
    backend: &B,
    query_handle: &B::Handle,
    pool: &StatePool<B>,
    policy: SelectionPolicy,
    state_index: usize,
    ws_limit: usize,
    desc: &ConvDescriptors<B>,
) -> Result<BackwardChoice> {
    // The two directions are selected independently; under exhaustive
    // search each empties and reuses the shared scratch buffer in turn.
    let filter_algo = choose_algo(
        "conv bwd filter",
        policy,
        pool,
        state_index,
        ConvBwdFilterAlgo::Algo1,
        |handle| {
            backend.find_bwd_filter_algos(
                handle,
                &desc.input,
                &desc.output,
                &desc.conv,
                &desc.filter,
                NUM_BWD_FILTER_ALGOS,
            )
        },
        || {
            backend.recommend_bwd_filter_algo(
                query_handle,
                &desc.input,
                &desc.output,
                &desc.conv,
                &desc.filter,
                ws_limit,
            )
        },
    )?;
    let data_algo = choose_algo(
        "conv bwd data",
        policy,
        pool,
        state_index,
        ConvBwdDataAlgo::Algo1,
        |handle| {
            backend.find_bwd_data_algos(
                handle,
                &desc.filter,
                &desc.output,
                &desc.conv,
                &desc.input,
                NUM_BWD_DATA_ALGOS,
            )
        },
        || {
            backend.recommend_bwd_data_algo(
                query_handle,
                &desc.filter,
                &desc.output,
                &desc.conv,
                &desc.input,
                ws_limit,
            )
        },
    )?;

    let filter_ws = backend.bwd_filter_workspace_size(
        query_handle,
        &desc.input,
        &desc.output,
        &desc.conv,
        &desc.filter,
        filter_algo,
    )?;
    let data_ws = backend.bwd_data_workspace_size(
        query_handle,
        &desc.filter,
        &desc.output,
        &desc.conv,
        &desc.input,
        data_algo,
    )?;
    let workspace_bytes = filter_ws.max(data_ws);
    debug!(
        "conv bwd: algorithms {filter_algo:?} / {data_algo:?}, workspace {workspace_bytes} bytes"
    );
    Ok(BackwardChoice {
        filter_algo,
        data_algo,
        workspace_bytes,
    })
}
