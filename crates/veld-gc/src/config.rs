//! Boundary-layer configuration
//!
//! Validated once at bootstrap; configuration errors abort startup and are
//! never recovered.

use crate::barrier::BarrierKind;
use crate::GcError;

/// Configuration for the GC boundary layer
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Heap size the engine should reserve, in bytes
    pub heap_bytes: usize,

    /// Free-form tuning options handed verbatim to the collector engine
    pub engine_options: String,

    /// Barrier flavor to install
    pub barrier: BarrierKind,

    /// Root-scan worker threads a collection cycle is armed for
    pub workers: usize,

    /// Whether the runtime has thread-local allocation buffers enabled
    ///
    /// Must be false: the engine owns all allocation, and TLAB queries
    /// against the facade fail loudly.
    pub tlabs_enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_bytes: 256 * 1024 * 1024,
            engine_options: String::new(),
            barrier: BarrierKind::Object,
            workers: num_cpus::get(),
            tlabs_enabled: false,
        }
    }
}

impl GcConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GcError> {
        if self.heap_bytes == 0 {
            return Err(GcError::Config("heap size must be nonzero".into()));
        }
        if self.workers == 0 {
            return Err(GcError::Config(
                "at least one root-scan worker is required".into(),
            ));
        }
        if self.tlabs_enabled {
            return Err(GcError::Config(
                "thread-local allocation buffers must be disabled".into(),
            ));
        }
        Ok(())
    }
}
