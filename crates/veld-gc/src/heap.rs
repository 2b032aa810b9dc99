//! Heap facade
//!
//! The one surface most of the runtime ever touches: capacity and liveness
//! queries, allocation, and time-since-collection, all forwarded to the
//! collector engine or answered from the cached reservation bounds. The
//! facade owns no object layout knowledge; operations that would require it
//! fail loudly instead of guessing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::address::{Address, HeapBounds};
use crate::engine::{AllocError, AllocKind, CollectorEngine, MutatorId};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Thin forwarding facade over the collector engine
pub struct HeapFacade {
    engine: Arc<dyn CollectorEngine>,
    bounds: HeapBounds,

    /// Wall-clock millis of the last collection end; initialized to facade
    /// creation time so the delta is meaningful before the first cycle
    last_gc_millis: AtomicU64,
}

impl HeapFacade {
    /// Create the facade over the engine and the fixed heap reservation
    pub fn new(engine: Arc<dyn CollectorEngine>, bounds: HeapBounds) -> Self {
        Self {
            engine,
            bounds,
            last_gc_millis: AtomicU64::new(now_millis()),
        }
    }

    /// The reserved heap range
    pub fn bounds(&self) -> HeapBounds {
        self.bounds
    }

    /// Heap capacity in bytes
    ///
    /// Same figure as [`max_capacity`](Self::max_capacity); the reservation
    /// is not resized at runtime.
    pub fn capacity(&self) -> usize {
        self.max_capacity()
    }

    /// Maximum bytes the engine could make available for objects
    pub fn max_capacity(&self) -> usize {
        self.engine.max_capacity()
    }

    /// Bytes currently in use
    pub fn used(&self) -> usize {
        self.engine.used_bytes()
    }

    /// Whether `addr` lies inside the reserved heap range
    ///
    /// This is the reserved-range variant: boundary-exact against
    /// `[heap_start, heap_end)`, independent of whether the engine has
    /// committed the address to a live space yet. Callers that need
    /// space-membership semantics ask the engine directly via
    /// [`CollectorEngine::is_in_space`].
    #[inline]
    pub fn is_in(&self, addr: Address) -> bool {
        self.bounds.contains(addr)
    }

    /// Allocate `size` bytes for `mutator`
    ///
    /// An `Err` is recoverable allocation pressure: the runtime may retry
    /// after triggering a collection before surfacing out-of-memory.
    ///
    /// # Panics
    ///
    /// Panics if the engine reports success with a null address; treating
    /// that as a valid object would corrupt the heap.
    pub fn allocate(
        &self,
        mutator: MutatorId,
        size: usize,
        kind: AllocKind,
    ) -> Result<Address, AllocError> {
        let addr = self.engine.allocate(mutator, size, kind)?;
        if addr.is_zero() {
            panic!("collector engine returned a null address as a successful allocation");
        }
        Ok(addr)
    }

    /// Forward an explicit collection request from a mutator
    pub fn collect(&self, mutator: MutatorId) {
        self.engine.handle_user_collection_request(mutator);
    }

    /// Record that a collection cycle just finished
    pub fn record_collection_end(&self) {
        self.last_gc_millis.store(now_millis(), Ordering::Release);
    }

    /// Milliseconds elapsed since the last recorded collection
    ///
    /// Clock skew can make the recorded timestamp sit in the future; the
    /// negative delta is clamped to zero with a warning rather than
    /// propagated.
    pub fn millis_since_last_gc(&self) -> u64 {
        let last = self.last_gc_millis.load(Ordering::Acquire);
        let now = now_millis();
        if now < last {
            warn!(
                now,
                last, "millis_since_last_gc would be negative, returning zero"
            );
            return 0;
        }
        now - last
    }

    /// Thread-local allocation buffer capacity, not supported
    ///
    /// TLABs are disabled as a configuration requirement; nothing may query
    /// them. Always panics.
    pub fn tlab_capacity(&self) -> usize {
        panic!("tlab_capacity is not supported by the heap facade");
    }

    /// Thread-local allocation buffer usage, not supported; always panics
    pub fn tlab_used(&self) -> usize {
        panic!("tlab_used is not supported by the heap facade");
    }

    /// Block-level start lookup, not supported
    ///
    /// Object layout discovery belongs to the engine. Always panics.
    pub fn block_start(&self, _addr: Address) -> Address {
        panic!("block_start is not supported by the heap facade");
    }

    /// Block-level size lookup, not supported; always panics
    pub fn block_size(&self, _addr: Address) -> usize {
        panic!("block_size is not supported by the heap facade");
    }

    /// Full heap object iteration, not supported; always panics
    pub fn object_iterate(&self, _callback: &mut dyn FnMut(Address)) {
        panic!("object_iterate is not supported by the heap facade");
    }
}
