//! Process bootstrap for the boundary layer
//!
//! [`GcBridge`] wires the facade, barrier, and root scan coordinator to one
//! collector engine. It is built once during VM startup and passed explicitly
//! to every component that needs it; there is no ambient global heap handle.

use std::sync::Arc;

use tracing::debug;

use crate::config::GcConfig;
use crate::engine::CollectorEngine;
use crate::heap::HeapFacade;
use crate::metadata::SideMetadata;
use crate::roots::{RootScanCoordinator, RootScanRegistry};
use crate::WriteBarrier;
use crate::{GcError, GcResult};

/// The assembled GC boundary layer
///
/// Owns the heap facade, the write barrier, and the root scan coordinator,
/// all bound to the same engine. Lifetime is owned by the process bootstrap
/// code.
pub struct GcBridge {
    engine: Arc<dyn CollectorEngine>,
    heap: HeapFacade,
    barrier: WriteBarrier,
    roots: RootScanCoordinator,
    workers: usize,
}

impl GcBridge {
    /// Bootstrap the boundary layer
    ///
    /// Validates the configuration, initializes the engine with its opaque
    /// option string, and builds each component over the engine's reserved
    /// heap and side-metadata bitmap. Any failure here is fatal to startup.
    pub fn new(
        config: GcConfig,
        engine: Arc<dyn CollectorEngine>,
        registry: RootScanRegistry,
    ) -> GcResult<Self> {
        config.validate()?;
        engine.initialize(&config.engine_options, config.heap_bytes)?;

        let bounds = engine.heap_bounds();
        if bounds.len() < config.heap_bytes {
            return Err(GcError::Config(format!(
                "engine reserved {} bytes, configured heap is {} bytes",
                bounds.len(),
                config.heap_bytes
            )));
        }

        let (metadata_base, metadata_len) = engine.side_metadata();
        if metadata_len < SideMetadata::bytes_required(bounds) {
            return Err(GcError::Config(format!(
                "side metadata covers {} bytes, need {} for the reservation",
                metadata_len,
                SideMetadata::bytes_required(bounds)
            )));
        }
        // SAFETY: the bitmap is engine-owned for the engine's lifetime, the
        // engine outlives every component holding the view, and coverage of
        // the reservation was just validated.
        let metadata = unsafe { SideMetadata::new(metadata_base, metadata_len, bounds) };

        let heap = HeapFacade::new(engine.clone(), bounds);
        let barrier = WriteBarrier::new(config.barrier, metadata, engine.clone());
        let roots = RootScanCoordinator::new(registry, engine.clone())?;

        debug!(
            heap_bytes = config.heap_bytes,
            barrier = ?config.barrier,
            workers = config.workers,
            "gc boundary layer initialized"
        );

        Ok(Self {
            engine,
            heap,
            barrier,
            roots,
            workers: config.workers,
        })
    }

    /// The collector engine behind the bridge
    pub fn engine(&self) -> &Arc<dyn CollectorEngine> {
        &self.engine
    }

    /// The heap facade
    pub fn heap(&self) -> &HeapFacade {
        &self.heap
    }

    /// The write barrier
    pub fn barrier(&self) -> &WriteBarrier {
        &self.barrier
    }

    /// The root scan coordinator
    pub fn roots(&self) -> &RootScanCoordinator {
        &self.roots
    }

    /// Root-scan worker count the bridge was configured for
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Arm a root scan cycle for the configured worker count
    pub fn arm_root_scan(&self) {
        self.roots.arm(self.workers);
    }
}
