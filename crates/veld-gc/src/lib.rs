//! GC boundary layer for the Veld VM
//!
//! This crate sits between the VM runtime and a pluggable tracing collector
//! engine. It owns the interception and coordination work any collector
//! needs, without owning any trace/copy/sweep logic itself:
//!
//! - **Write barrier**: intercepts every reference-field store and
//!   reference-array copy; an inline side-metadata bit test decides whether
//!   the store must be reported to the engine (`barrier` module)
//! - **Side metadata**: address arithmetic and a read-only view over the
//!   engine-owned per-granule bitmap (`metadata` module)
//! - **Root scanning**: claims and walks every root source exactly once per
//!   collection cycle across any number of concurrent workers (`roots`
//!   module)
//! - **Heap facade**: capacity, liveness, allocation, and time-since-GC
//!   queries forwarded to the engine (`heap` module)
//! - **Bootstrap**: configuration and explicit wiring of the above into one
//!   [`GcBridge`] handle (`config` and `bridge` modules)
//!
//! # Example
//!
//! ```rust,ignore
//! use veld_gc::{GcBridge, GcConfig, RootKind, RootScanRegistry};
//!
//! let mut registry = RootScanRegistry::new(stack_walker, epilogue);
//! for (kind, source) in runtime_sources {
//!     registry.register(kind, source);
//! }
//!
//! let bridge = GcBridge::new(GcConfig::default(), engine, registry)?;
//!
//! // Every reference store in the interpreter:
//! bridge.barrier().object_reference_write_post(event);
//!
//! // Once per collection cycle:
//! bridge.arm_root_scan();
//! // ... each worker thread:
//! bridge.roots().scan_pass(worker_index)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod address;
pub mod barrier;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod heap;
pub mod metadata;
pub mod roots;

#[cfg(test)]
pub(crate) mod testutil;

pub use address::{Address, HeapBounds};
pub use barrier::{ArrayCopyEvent, BarrierKind, BarrierStats, WriteBarrier, WriteEvent};
pub use bridge::GcBridge;
pub use config::GcConfig;
pub use engine::{AllocError, AllocKind, CollectorEngine, EngineInitError, MutatorId};
pub use heap::HeapFacade;
pub use metadata::{granule_bit, SideMetadata};
pub use roots::{
    ClaimRecord, ClaimTable, CycleState, RootKind, RootScanCoordinator, RootScanError,
    RootScanRegistry, RootSource, ThreadStackScanner,
};

/// Boundary-layer errors
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    /// Invalid configuration, reported once at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// The collector engine failed to initialize
    #[error(transparent)]
    EngineInit(#[from] EngineInitError),

    /// A root scan cycle failed
    #[error(transparent)]
    RootScan(#[from] RootScanError),
}

/// Boundary-layer result
pub type GcResult<T> = Result<T, GcError>;
