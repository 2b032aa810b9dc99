//! Collector engine interface
//!
//! The boundary layer does not trace, copy, or sweep anything itself. All of
//! that belongs to the collector engine plugged in behind it, which this
//! module specifies as a trait. The barrier forwards write/copy events to it,
//! the heap facade forwards allocation and capacity queries, and the root
//! scan coordinator hands it the discovered reference slots.

use crate::address::{Address, HeapBounds};
use crate::barrier::{ArrayCopyEvent, WriteEvent};

/// Which allocator the engine should service a request from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// The engine's default allocator for ordinary objects
    Default,
    /// Non-moving allocation (large objects, pinned data)
    NonMoving,
}

/// Opaque identifier for a mutator thread
///
/// The engine keeps per-mutator allocation state keyed by this; the boundary
/// layer never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MutatorId(pub u64);

/// Allocation failure reported by the engine
///
/// Recoverable: the runtime may retry after triggering a collection before
/// converting this into a user-visible out-of-memory condition.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AllocError {
    /// The request cannot be satisfied right now
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory {
        /// Size of the failed request in bytes
        requested: usize,
    },
}

/// Engine initialization failure
///
/// Covers invalid option strings and failed heap reservations. Fatal: the
/// process must not start with a half-initialized collector.
#[derive(Debug, Clone, thiserror::Error)]
#[error("collector engine initialization failed: {0}")]
pub struct EngineInitError(pub String);

/// The tracing collector behind the boundary layer
///
/// Implementations own the mark/copy/sweep machinery, the space allocators,
/// and the side-metadata bitmap. Every method here is called from arbitrary
/// mutator or worker threads, so implementations must be `Send + Sync`.
pub trait CollectorEngine: Send + Sync {
    /// Initialize the engine with its opaque option string and heap size
    ///
    /// Called exactly once during bootstrap, before any other method. The
    /// option string is free-form collector tuning; the boundary layer never
    /// interprets it.
    fn initialize(&self, options: &str, heap_bytes: usize) -> Result<(), EngineInitError>;

    /// The heap range the engine reserved during initialization
    fn heap_bounds(&self) -> HeapBounds;

    /// Base pointer and length of the engine-owned side-metadata bitmap
    ///
    /// The bitmap must cover the whole of [`heap_bounds`](Self::heap_bounds)
    /// and stay valid for the engine's lifetime. The boundary layer only
    /// ever reads it.
    fn side_metadata(&self) -> (*const u8, usize);

    /// Record a single reference-field write
    ///
    /// Must not perform reference writes of its own while executing; the
    /// barrier treats re-entry as a fatal invariant violation.
    fn report_write(&self, event: WriteEvent);

    /// Record a bulk reference-array copy
    fn report_array_copy(&self, event: ArrayCopyEvent);

    /// Allocate `size` bytes for the given mutator
    fn allocate(
        &self,
        mutator: MutatorId,
        size: usize,
        kind: AllocKind,
    ) -> Result<Address, AllocError>;

    /// Bytes currently in use across all spaces
    fn used_bytes(&self) -> usize;

    /// Maximum bytes the engine could make available for objects
    fn max_capacity(&self) -> usize;

    /// Whether the engine considers `addr` part of a live space
    fn is_in_space(&self, addr: Address) -> bool;

    /// Service an explicit collection request from a mutator
    fn handle_user_collection_request(&self, mutator: MutatorId);

    /// Report a reference slot discovered during root scanning
    fn report_root_slot(&self, slot: Address);
}
