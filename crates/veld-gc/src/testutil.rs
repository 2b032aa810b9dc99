//! Shared test doubles
//!
//! A recording collector engine used by the unit tests across modules.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::address::{Address, HeapBounds};
use crate::barrier::{ArrayCopyEvent, WriteEvent};
use crate::engine::{AllocError, AllocKind, CollectorEngine, EngineInitError, MutatorId};
use crate::metadata::{granule_bit, SideMetadata};

pub(crate) const TEST_HEAP_START: usize = 0x1000;
pub(crate) const TEST_HEAP_END: usize = 0x2000;

pub(crate) fn test_bounds() -> HeapBounds {
    HeapBounds::new(
        Address::from_usize(TEST_HEAP_START),
        Address::from_usize(TEST_HEAP_END),
    )
}

/// Engine double that records every event it is handed
///
/// Owns a real side-metadata bitmap over the test heap range, mutated only
/// through [`set_dirty`](Self::set_dirty) the way a real engine would flip
/// granule bits.
pub(crate) struct CountingEngine {
    bitmap: Box<[AtomicU8]>,
    writes: Mutex<Vec<WriteEvent>>,
    array_copies: Mutex<Vec<ArrayCopyEvent>>,
    root_slots: Mutex<Vec<Address>>,
    collection_requests: AtomicU64,
    used: AtomicUsize,
    capacity: AtomicUsize,
    /// Bump allocator cursor; zero means allocation always fails
    alloc_cursor: AtomicUsize,
}

impl Default for CountingEngine {
    fn default() -> Self {
        let len = SideMetadata::bytes_required(test_bounds());
        Self {
            bitmap: (0..len).map(|_| AtomicU8::new(0)).collect(),
            writes: Mutex::new(Vec::new()),
            array_copies: Mutex::new(Vec::new()),
            root_slots: Mutex::new(Vec::new()),
            collection_requests: AtomicU64::new(0),
            used: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
            alloc_cursor: AtomicUsize::new(0),
        }
    }
}

impl CountingEngine {
    /// Flag the granule containing `addr` for slow-path attention
    pub(crate) fn set_dirty(&self, addr: Address) {
        let (byte, bit) = granule_bit(addr);
        let (first, _) = granule_bit(test_bounds().start());
        self.bitmap[byte - first].fetch_or(1 << bit, Ordering::Release);
    }
    /// Engine that serves bump allocations starting at `base` and reports
    /// the given capacity figures
    pub(crate) fn with_heap(base: usize, used: usize, capacity: usize) -> Self {
        let engine = CountingEngine::default();
        engine.alloc_cursor.store(base, Ordering::Relaxed);
        engine.used.store(used, Ordering::Relaxed);
        engine.capacity.store(capacity, Ordering::Relaxed);
        engine
    }

    pub(crate) fn writes(&self) -> Vec<WriteEvent> {
        self.writes.lock().clone()
    }

    pub(crate) fn array_copies(&self) -> Vec<ArrayCopyEvent> {
        self.array_copies.lock().clone()
    }

    pub(crate) fn root_slots(&self) -> Vec<Address> {
        self.root_slots.lock().clone()
    }

    pub(crate) fn collection_requests(&self) -> u64 {
        self.collection_requests.load(Ordering::Relaxed)
    }
}

impl CollectorEngine for CountingEngine {
    fn initialize(&self, _options: &str, _heap_bytes: usize) -> Result<(), EngineInitError> {
        Ok(())
    }

    fn heap_bounds(&self) -> HeapBounds {
        test_bounds()
    }

    fn side_metadata(&self) -> (*const u8, usize) {
        // AtomicU8 has the same layout as u8
        (self.bitmap.as_ptr() as *const u8, self.bitmap.len())
    }

    fn report_write(&self, event: WriteEvent) {
        self.writes.lock().push(event);
    }

    fn report_array_copy(&self, event: ArrayCopyEvent) {
        self.array_copies.lock().push(event);
    }

    fn allocate(
        &self,
        _mutator: MutatorId,
        size: usize,
        _kind: AllocKind,
    ) -> Result<Address, AllocError> {
        if self.alloc_cursor.load(Ordering::Relaxed) == 0 {
            return Err(AllocError::OutOfMemory { requested: size });
        }
        let base = self.alloc_cursor.fetch_add(size, Ordering::Relaxed);
        self.used.fetch_add(size, Ordering::Relaxed);
        Ok(Address::from_usize(base))
    }

    fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    fn max_capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    fn is_in_space(&self, _addr: Address) -> bool {
        false
    }

    fn handle_user_collection_request(&self, _mutator: MutatorId) {
        self.collection_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn report_root_slot(&self, slot: Address) {
        self.root_slots.lock().push(slot);
    }
}
