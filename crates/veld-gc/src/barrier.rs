//! Write barrier fast path and slow path
//!
//! Every reference-field store and reference-array copy the running program
//! performs funnels through here. The fast path is a single side-metadata
//! byte load and bit test; only stores into flagged granules take the
//! out-of-line slow path, which forwards the event to the collector engine.
//!
//! The barrier never mutates the side metadata itself. It is lock-free and
//! runs on arbitrary mutator threads; the only shared state it touches is
//! the read-only bitmap view and its own statistics counters.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::address::Address;
use crate::engine::CollectorEngine;
use crate::metadata::SideMetadata;

/// One reference-field store
///
/// Constructed at the call site and consumed synchronously; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEvent {
    /// Header address of the object being written into
    pub object: Address,
    /// Address of the field slot being stored to
    pub slot: Address,
    /// The reference being stored (may be null)
    pub new_value: Address,
}

/// One bulk reference-array copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayCopyEvent {
    /// Base of the source element range
    pub src: Address,
    /// Base of the destination element range
    pub dst: Address,
    /// Number of reference elements copied
    pub count: usize,
}

/// Barrier flavor, selected once at initialization
///
/// Dispatch is a match on this tag, resolved at construction; there is no
/// per-store virtual call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierKind {
    /// Object-granularity post-write barrier with the inline bit-test
    /// fast path
    Object,
    /// Degraded object barrier: no fast-path bit test available, every
    /// store calls the slow path unconditionally
    ObjectSlowOnly,
}

/// Barrier statistics
///
/// Counts slow-path entries only; the fast path stays free of read-modify-
/// write traffic.
#[derive(Debug, Default)]
pub struct BarrierStats {
    /// Reference writes forwarded to the engine
    write_slow_calls: AtomicU64,
    /// Array copies forwarded to the engine
    array_copy_calls: AtomicU64,
}

impl BarrierStats {
    /// Reference writes that took the slow path
    pub fn write_slow_calls(&self) -> u64 {
        self.write_slow_calls.load(Ordering::Relaxed)
    }

    /// Array copies that took the slow path
    pub fn array_copy_calls(&self) -> u64 {
        self.array_copy_calls.load(Ordering::Relaxed)
    }
}

thread_local! {
    /// Set while the slow path is executing on this thread. The engine's
    /// bookkeeping must not perform reference writes of its own; re-entry
    /// here means infinite barrier recursion and is fatal.
    static IN_SLOW_PATH: Cell<bool> = const { Cell::new(false) };
}

/// The write barrier
///
/// Owns the dispatch tag, the side-metadata view, and the engine handle.
/// Constructed once during bootstrap and shared by all mutator threads.
pub struct WriteBarrier {
    kind: BarrierKind,
    metadata: SideMetadata,
    engine: Arc<dyn CollectorEngine>,
    stats: BarrierStats,
}

impl WriteBarrier {
    /// Create a barrier over the engine's side-metadata bitmap
    pub fn new(kind: BarrierKind, metadata: SideMetadata, engine: Arc<dyn CollectorEngine>) -> Self {
        Self {
            kind,
            metadata,
            engine,
            stats: BarrierStats::default(),
        }
    }

    /// The selected barrier flavor
    pub fn kind(&self) -> BarrierKind {
        self.kind
    }

    /// Slow-path statistics
    pub fn stats(&self) -> &BarrierStats {
        &self.stats
    }

    /// Post-write barrier for a single reference-field store
    ///
    /// Executes on every managed reference assignment. One byte load and one
    /// branch in the common case; the slow path is only taken when the
    /// granule containing `event.object` is flagged in the side metadata.
    #[inline(always)]
    pub fn object_reference_write_post(&self, event: WriteEvent) {
        match self.kind {
            BarrierKind::Object => {
                if self.metadata.is_dirty(event.object) {
                    self.object_reference_write_slow(event);
                }
            }
            BarrierKind::ObjectSlowOnly => self.object_reference_write_slow(event),
        }
    }

    /// Out-of-line slow path for a reference write
    ///
    /// Also the direct entry point where no fast path exists. Forwards the
    /// full event triple to the engine unchanged.
    #[cold]
    #[inline(never)]
    pub fn object_reference_write_slow(&self, event: WriteEvent) {
        self.stats.write_slow_calls.fetch_add(1, Ordering::Relaxed);
        let _guard = ReentryGuard::enter();
        self.engine.report_write(event);
    }

    /// Post-copy barrier for a bulk reference-array copy
    ///
    /// `dest_uninitialized` marks copies into a freshly allocated array that
    /// has never been visible to the program; such a destination cannot yet
    /// hold stale cross-region references, so the report is suppressed.
    #[inline(always)]
    pub fn object_reference_array_copy_post(&self, event: ArrayCopyEvent, dest_uninitialized: bool) {
        if dest_uninitialized {
            return;
        }
        self.object_reference_array_copy_slow(event);
    }

    /// Out-of-line slow path for an array copy
    #[cold]
    #[inline(never)]
    fn object_reference_array_copy_slow(&self, event: ArrayCopyEvent) {
        self.stats.array_copy_calls.fetch_add(1, Ordering::Relaxed);
        let _guard = ReentryGuard::enter();
        self.engine.report_array_copy(event);
    }
}

/// RAII guard for the per-thread slow-path re-entry flag
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Self {
        IN_SLOW_PATH.with(|flag| {
            if flag.get() {
                panic!(
                    "write barrier slow path re-entered: the collector engine \
                     performed a reference write during its own bookkeeping"
                );
            }
            flag.set(true);
        });
        ReentryGuard
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_SLOW_PATH.with(|flag| flag.set(false));
    }
}
