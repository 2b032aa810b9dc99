//! Root scan coordination
//!
//! A collection cycle must walk every root source of the runtime exactly
//! once, no matter how many worker threads call in concurrently. This module
//! owns the catalogue of root sources, the atomic claim table that assigns
//! each source to exactly one worker, and the completion counting that fires
//! the one-time epilogue after the last worker finishes its pass.
//!
//! The per-source claimed set covers the global root sources (code cache,
//! class-loader graph, global handle storage, weak tables, the VM thread).
//! Thread-stack roots go through a separate stop-the-world primitive because
//! they need a process-wide consistency point; the first worker to arrive
//! performs that pass before any of its per-source claims.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::address::Address;
use crate::engine::CollectorEngine;
use crate::GcError;

/// The closed set of per-source-claimed root sources
///
/// Known at compile time; adding a source is a code change, never a data
/// change. The discriminant order is the fixed enumeration order workers
/// attempt claims in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RootKind {
    /// References embedded in compiled code blobs
    CodeCache = 0,
    /// Class-loader data graph
    ClassLoaderGraph = 1,
    /// Strong global handle storage
    GlobalHandles = 2,
    /// Weak reference tables
    WeakHandles = 3,
    /// The VM's own service thread
    VmThread = 4,
}

impl RootKind {
    /// Number of per-source-claimed root sources
    pub const COUNT: usize = 5;

    /// All sources in claim-enumeration order
    pub const ALL: [RootKind; Self::COUNT] = [
        RootKind::CodeCache,
        RootKind::ClassLoaderGraph,
        RootKind::GlobalHandles,
        RootKind::WeakHandles,
        RootKind::VmThread,
    ];

    /// Claim-table index of this source
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable source name
    pub fn name(self) -> &'static str {
        match self {
            RootKind::CodeCache => "code-cache",
            RootKind::ClassLoaderGraph => "class-loader-graph",
            RootKind::GlobalHandles => "global-handles",
            RootKind::WeakHandles => "weak-handles",
            RootKind::VmThread => "vm-thread",
        }
    }
}

/// Root scanning failure
///
/// A failed iteration primitive aborts the whole cycle: a partially scanned
/// root set must never be handed to the collector for tracing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RootScanError {
    /// A per-source iteration primitive failed
    #[error("scanning {} roots failed: {message}", .kind.name())]
    Source {
        /// Which source failed
        kind: RootKind,
        /// Runtime-reported failure detail
        message: String,
    },

    /// The stop-the-world thread-stack walk failed
    #[error("thread stack scan failed: {0}")]
    ThreadStacks(String),

    /// An earlier failure in this cycle already aborted it
    #[error("root scan cycle aborted by an earlier failure")]
    Poisoned,
}

impl RootScanError {
    /// Build a per-source failure
    pub fn source(kind: RootKind, message: impl Into<String>) -> Self {
        RootScanError::Source {
            kind,
            message: message.into(),
        }
    }
}

/// A runtime iteration primitive for one root source
///
/// Implementations walk their source's reference locations in the runtime's
/// natural enumeration order and invoke the visitor once per slot.
pub trait RootSource: Send + Sync {
    /// Walk this source, reporting each discovered slot to the visitor
    fn scan(&self, visitor: &mut dyn FnMut(Address)) -> Result<(), RootScanError>;
}

impl<T: RootSource + ?Sized> RootSource for Arc<T> {
    fn scan(&self, visitor: &mut dyn FnMut(Address)) -> Result<(), RootScanError> {
        (**self).scan(visitor)
    }
}

/// The stop-the-world thread-stack walk
///
/// Parks every mutator thread at a safepoint and enumerates each stack's
/// reference slots. Process-wide: one invocation covers all threads.
pub trait ThreadStackScanner: Send + Sync {
    /// Walk every mutator stack, reporting each slot to the visitor
    fn scan_all_stacks(&self, visitor: &mut dyn FnMut(Address)) -> Result<(), RootScanError>;
}

impl<T: ThreadStackScanner + ?Sized> ThreadStackScanner for Arc<T> {
    fn scan_all_stacks(&self, visitor: &mut dyn FnMut(Address)) -> Result<(), RootScanError> {
        (**self).scan_all_stacks(visitor)
    }
}

/// Catalogue of the runtime's iteration primitives
///
/// One provider per [`RootKind`], the thread-stack walker, and the epilogue
/// hook run once after the last worker finishes (code-cache marking
/// bookkeeping and the like).
pub struct RootScanRegistry {
    sources: [Option<Box<dyn RootSource>>; RootKind::COUNT],
    thread_stacks: Box<dyn ThreadStackScanner>,
    epilogue: Box<dyn Fn() + Send + Sync>,
}

impl RootScanRegistry {
    /// Create a registry with the thread-stack walker and epilogue hook
    pub fn new(
        thread_stacks: Box<dyn ThreadStackScanner>,
        epilogue: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            sources: std::array::from_fn(|_| None),
            thread_stacks,
            epilogue,
        }
    }

    /// Register the iteration primitive for one source
    ///
    /// Registering a source twice replaces the earlier provider.
    pub fn register(&mut self, kind: RootKind, source: Box<dyn RootSource>) {
        self.sources[kind.index()] = Some(source);
    }

    fn source(&self, kind: RootKind) -> &dyn RootSource {
        self.sources[kind.index()]
            .as_deref()
            .unwrap_or_else(|| panic!("no provider registered for {} roots", kind.name()))
    }

    fn missing_source(&self) -> Option<RootKind> {
        RootKind::ALL
            .into_iter()
            .find(|kind| self.sources[kind.index()].is_none())
    }
}

/// One atomically-claimable flag per root source
///
/// Each flag transitions unclaimed to claimed exactly once per cycle; flags
/// are only ever reset together when the coordinator re-arms.
pub struct ClaimTable {
    flags: [AtomicBool; RootKind::COUNT],
}

impl ClaimTable {
    fn new() -> Self {
        Self {
            flags: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Attempt to claim a source; true means the caller is its exclusive
    /// scanner this cycle
    pub fn claim(&self, kind: RootKind) -> bool {
        self.flags[kind.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a source has been claimed this cycle
    pub fn is_claimed(&self, kind: RootKind) -> bool {
        self.flags[kind.index()].load(Ordering::Acquire)
    }

    fn reset(&self) {
        for flag in &self.flags {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Coordinator lifecycle within one collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle in progress
    Idle,
    /// Claim table reset, workers may scan
    Armed,
    /// All expected workers finished, epilogue has run
    Complete,
}

const STATE_IDLE: u8 = 0;
const STATE_ARMED: u8 = 1;
const STATE_COMPLETE: u8 = 2;

/// One claim recorded for the shared claim-order log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRecord {
    /// Worker that won the claim
    pub worker: usize,
    /// Source it claimed
    pub kind: RootKind,
}

/// Guarantees each root source is scanned exactly once per collection cycle
///
/// Workers race through [`scan_pass`](Self::scan_pass); the claim table
/// assigns each source to the first worker that reaches it, and the
/// completion counter fires the epilogue exactly once, strictly after every
/// claimed source has been scanned.
pub struct RootScanCoordinator {
    registry: RootScanRegistry,
    engine: Arc<dyn CollectorEngine>,

    claims: ClaimTable,

    /// Separate exactly-once flag for the stop-the-world stack walk
    stacks_claimed: AtomicBool,

    /// Workers admitted into the current cycle (participation tickets)
    arrivals: AtomicUsize,

    /// Workers that have finished their pass this cycle
    completed: AtomicUsize,

    /// Workers the initiator armed the cycle for
    expected: AtomicUsize,

    state: AtomicU8,

    /// Set when a provider failure aborts the cycle
    poisoned: AtomicBool,

    /// Double-epilogue detection
    epilogue_ran: AtomicBool,

    /// Shared claim-order log, reset each cycle
    claim_log: Mutex<Vec<ClaimRecord>>,
}

impl RootScanCoordinator {
    /// Create a coordinator over a fully populated registry
    ///
    /// Fails if any root source lacks a registered provider; a hole in the
    /// catalogue would mean silently skipped roots every cycle.
    pub fn new(
        registry: RootScanRegistry,
        engine: Arc<dyn CollectorEngine>,
    ) -> Result<Self, GcError> {
        if let Some(kind) = registry.missing_source() {
            return Err(GcError::Config(format!(
                "no provider registered for {} roots",
                kind.name()
            )));
        }
        Ok(Self {
            registry,
            engine,
            claims: ClaimTable::new(),
            stacks_claimed: AtomicBool::new(false),
            arrivals: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            expected: AtomicUsize::new(0),
            state: AtomicU8::new(STATE_IDLE),
            poisoned: AtomicBool::new(false),
            epilogue_ran: AtomicBool::new(false),
            claim_log: Mutex::new(Vec::new()),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> CycleState {
        match self.state.load(Ordering::Acquire) {
            STATE_IDLE => CycleState::Idle,
            STATE_ARMED => CycleState::Armed,
            STATE_COMPLETE => CycleState::Complete,
            other => unreachable!("corrupt cycle state {}", other),
        }
    }

    /// Whether the current cycle was aborted by a provider failure
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Claims recorded during the current cycle
    pub fn claim_log(&self) -> Vec<ClaimRecord> {
        self.claim_log.lock().clone()
    }

    /// Arm a new cycle for `expected_workers` scanning threads
    ///
    /// Called by exactly one initiating thread before any worker begins its
    /// pass. Resets the claim table and completion counter.
    ///
    /// # Panics
    ///
    /// Panics if a healthy cycle is still armed: arming twice would reset
    /// claim flags mid-cycle and break the exactly-once guarantee. An
    /// aborted (poisoned) cycle may be re-armed.
    pub fn arm(&self, expected_workers: usize) {
        assert!(expected_workers > 0, "cannot arm a cycle for zero workers");
        let state = self.state.load(Ordering::Acquire);
        if state == STATE_ARMED && !self.poisoned.load(Ordering::Acquire) {
            panic!("root scan cycle armed while a previous cycle is still in flight");
        }

        self.claims.reset();
        self.stacks_claimed.store(false, Ordering::Release);
        self.arrivals.store(0, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.expected.store(expected_workers, Ordering::Release);
        self.poisoned.store(false, Ordering::Release);
        self.epilogue_ran.store(false, Ordering::Release);
        self.claim_log.lock().clear();
        self.state.store(STATE_ARMED, Ordering::Release);

        debug!(workers = expected_workers, "root scan cycle armed");
    }

    /// One worker's scanning pass
    ///
    /// Claims sources in enumeration order and scans each one it wins,
    /// forwarding every discovered slot to the collector engine. The first
    /// worker to arrive additionally performs the stop-the-world thread
    /// stack walk before its claims, so thread-local roots are visible
    /// before any global source is marked scanned. A worker that wins no
    /// claims still counts toward completion.
    ///
    /// Participation is ticketed against the armed worker total: workers
    /// arriving past the quota are turned away without touching the claim
    /// table, so the completion count never misses an in-flight scan.
    ///
    /// The worker that brings the completion count to the armed worker total
    /// runs the epilogue; it runs exactly once per cycle.
    ///
    /// # Panics
    ///
    /// Panics if no cycle is armed, or if the epilogue would run twice
    /// (both are broken-invariant states, not recoverable errors).
    pub fn scan_pass(&self, worker: usize) -> Result<(), RootScanError> {
        let state = self.state.load(Ordering::Acquire);
        if state == STATE_COMPLETE {
            // A worker arriving after the cycle completed must not disturb
            // the finished claim table or re-trigger the epilogue.
            warn!(worker, "root scan pass arrived after cycle completion");
            return Ok(());
        }
        assert!(
            state == STATE_ARMED,
            "root scan pass outside an armed cycle"
        );

        if self.poisoned.load(Ordering::Acquire) {
            return Err(RootScanError::Poisoned);
        }

        // Admission ticket. A worker past the armed total could otherwise
        // win a claim the completion count does not wait for, letting the
        // epilogue fire while that source's scan is still in flight.
        let ticket = self.arrivals.fetch_add(1, Ordering::AcqRel);
        if ticket >= self.expected.load(Ordering::Acquire) {
            warn!(worker, ticket, "root scan worker count exceeded armed total");
            return Ok(());
        }

        let mut visitor = |slot: Address| self.engine.report_root_slot(slot);

        // Thread stacks need the process-wide safepoint primitive, not the
        // per-source claim table. Exactly one worker performs the walk, and
        // it happens before that worker's per-source claims.
        if self
            .stacks_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Err(err) = self.registry.thread_stacks.scan_all_stacks(&mut visitor) {
                self.poisoned.store(true, Ordering::Release);
                return Err(err);
            }
        }

        for kind in RootKind::ALL {
            if self.poisoned.load(Ordering::Acquire) {
                return Err(RootScanError::Poisoned);
            }
            if !self.claims.claim(kind) {
                continue;
            }
            self.claim_log.lock().push(ClaimRecord { worker, kind });
            if let Err(err) = self.registry.source(kind).scan(&mut visitor) {
                self.poisoned.store(true, Ordering::Release);
                return Err(err);
            }
        }

        self.finish_pass(worker);
        Ok(())
    }

    /// Completion counting and the one-time epilogue
    fn finish_pass(&self, worker: usize) {
        let expected = self.expected.load(Ordering::Acquire);
        let finished = self.completed.fetch_add(1, Ordering::AcqRel) + 1;

        if finished < expected {
            return;
        }

        // Last one out: admission tickets cap the finisher count at the
        // armed total, and the fetch_add above hands exactly one worker the
        // `finished == expected` observation, so every source has been
        // claimed and scanned and the epilogue has a single exclusive
        // runner.
        if self
            .epilogue_ran
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("root scan epilogue ran twice in one cycle");
        }
        (self.registry.epilogue)();
        self.state.store(STATE_COMPLETE, Ordering::Release);
        debug!(worker, "root scan cycle complete");
    }
}
