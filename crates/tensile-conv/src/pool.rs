//! Pooled execution state: reusable (vendor handle, scratch buffer) pairs.
//!
//! Every operator configured with the same `state_index` shares one pair;
//! the per-index mutex is the single serialization point of the whole
//! mechanism. The registry is explicit — constructed once by the embedding
//! framework and handed to operators as an `Arc` — rather than a global
//! singleton, so independent pools (tests, multiple devices) cannot
//! interfere.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::CudnnBackend;
use crate::error::{ConvError, Result};

/// Upper bound on pooled-state indices. Keeps the pool a small fixed set;
/// a configured index past the bound is rejected at operator construction.
pub const NUM_POOLED_STATES: usize = 4;

/// Device scratch memory that grows monotonically to the largest request
/// seen and can be dropped wholesale before an exhaustive search.
pub struct ScratchBuffer<B: CudnnBackend> {
    buf: Option<B::Workspace>,
    nbytes: usize,
}

impl<B: CudnnBackend> ScratchBuffer<B> {
    fn new() -> Self {
        ScratchBuffer {
            buf: None,
            nbytes: 0,
        }
    }

    /// Return a buffer of at least `nbytes`, reallocating only when the
    /// current allocation is smaller. The old buffer is released before
    /// the larger one is requested so both never coexist on device.
    pub fn ensure(&mut self, backend: &B, nbytes: usize) -> Result<Option<&B::Workspace>> {
        if nbytes > self.nbytes {
            self.buf = None;
            self.buf = Some(backend.alloc_workspace(nbytes)?);
            self.nbytes = nbytes;
        }
        Ok(self.buf.as_ref())
    }

    /// Release the allocation immediately.
    pub fn reset(&mut self) {
        self.buf = None;
        self.nbytes = 0;
    }

    /// Currently allocated byte count.
    pub fn capacity(&self) -> usize {
        self.nbytes
    }
}

/// One (handle, scratch buffer) pair, held under its index's lease.
pub struct PooledState<B: CudnnBackend> {
    handle: B::Handle,
    scratch: ScratchBuffer<B>,
}

impl<B: CudnnBackend> PooledState<B> {
    pub fn handle(&self) -> &B::Handle {
        &self.handle
    }

    pub fn scratch(&self) -> &ScratchBuffer<B> {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut ScratchBuffer<B> {
        &mut self.scratch
    }

    /// Borrow the handle and the scratch buffer at once, for execution
    /// paths that size the buffer and then launch on the same handle.
    pub fn split_mut(&mut self) -> (&B::Handle, &mut ScratchBuffer<B>) {
        (&self.handle, &mut self.scratch)
    }
}

/// Registry of pooled states, keyed by small integer index and created
/// lazily on first acquisition.
pub struct StatePool<B: CudnnBackend> {
    backend: Arc<B>,
    states: Mutex<HashMap<usize, Arc<Mutex<PooledState<B>>>>>,
}

impl<B: CudnnBackend> StatePool<B> {
    pub fn new(backend: Arc<B>) -> Self {
        StatePool {
            backend,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` with exclusive access to the state numbered `index`.
    ///
    /// The lease lasts exactly for the duration of `f`; callers keep it to
    /// descriptor-driven vendor invocations and never hold it across
    /// unrelated work.
    pub fn with_state<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut PooledState<B>) -> Result<R>,
    ) -> Result<R> {
        if index >= NUM_POOLED_STATES {
            return Err(ConvError::Config(format!(
                "pooled state index {index} out of range (< {NUM_POOLED_STATES})"
            )));
        }
        let state = {
            let mut map = self.states.lock();
            if let Some(state) = map.get(&index) {
                Arc::clone(state)
            } else {
                let state = Arc::new(Mutex::new(PooledState {
                    handle: self.backend.create_handle()?,
                    scratch: ScratchBuffer::new(),
                }));
                map.insert(index, Arc::clone(&state));
                state
            }
        };
        let mut guard = state.lock();
        f(&mut guard)
    }
}
