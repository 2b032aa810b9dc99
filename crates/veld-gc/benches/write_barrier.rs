use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use veld_gc::{
    Address, AllocError, AllocKind, ArrayCopyEvent, BarrierKind, CollectorEngine, EngineInitError,
    HeapBounds, MutatorId, SideMetadata, WriteBarrier, WriteEvent,
};

const HEAP_START: usize = 0x10000;
const HEAP_END: usize = 0x20000;

fn heap_bounds() -> HeapBounds {
    HeapBounds::new(Address::from_usize(HEAP_START), Address::from_usize(HEAP_END))
}

/// Engine that discards every report, so the bench measures the barrier only
struct SinkEngine;

impl CollectorEngine for SinkEngine {
    fn initialize(&self, _options: &str, _heap_bytes: usize) -> Result<(), EngineInitError> {
        Ok(())
    }
    fn heap_bounds(&self) -> HeapBounds {
        heap_bounds()
    }
    fn side_metadata(&self) -> (*const u8, usize) {
        (std::ptr::null(), 0)
    }
    fn report_write(&self, event: WriteEvent) {
        black_box(event);
    }
    fn report_array_copy(&self, event: ArrayCopyEvent) {
        black_box(event);
    }
    fn allocate(
        &self,
        _mutator: MutatorId,
        requested: usize,
        _kind: AllocKind,
    ) -> Result<Address, AllocError> {
        Err(AllocError::OutOfMemory { requested })
    }
    fn used_bytes(&self) -> usize {
        0
    }
    fn max_capacity(&self) -> usize {
        HEAP_END - HEAP_START
    }
    fn is_in_space(&self, _addr: Address) -> bool {
        false
    }
    fn handle_user_collection_request(&self, _mutator: MutatorId) {}
    fn report_root_slot(&self, _slot: Address) {}
}

fn barrier_over(bitmap: &[u8], kind: BarrierKind) -> WriteBarrier {
    // SAFETY: every bench keeps the bitmap alive past the barrier
    let metadata = unsafe { SideMetadata::from_slice(bitmap, heap_bounds()) };
    WriteBarrier::new(kind, metadata, Arc::new(SinkEngine) as Arc<dyn CollectorEngine>)
}

fn event(object: usize) -> WriteEvent {
    WriteEvent {
        object: Address::from_usize(object),
        slot: Address::from_usize(object + 0x10),
        new_value: Address::from_usize(HEAP_START + 0x800),
    }
}

fn bench_fast_path_clean(c: &mut Criterion) {
    let bitmap = vec![0u8; SideMetadata::bytes_required(heap_bounds())];
    let barrier = barrier_over(&bitmap, BarrierKind::Object);

    c.bench_function("write_post_clean", |b| {
        b.iter(|| {
            barrier.object_reference_write_post(black_box(event(HEAP_START + 0x40)));
        });
    });
}

fn bench_slow_path_dirty(c: &mut Criterion) {
    let mut bitmap = vec![0u8; SideMetadata::bytes_required(heap_bounds())];
    // Every granule flagged: every store takes the out-of-line call
    for byte in bitmap.iter_mut() {
        *byte = 0xFF;
    }
    let barrier = barrier_over(&bitmap, BarrierKind::Object);

    c.bench_function("write_post_dirty", |b| {
        b.iter(|| {
            barrier.object_reference_write_post(black_box(event(HEAP_START + 0x40)));
        });
    });
}

fn bench_degraded_mode(c: &mut Criterion) {
    let bitmap = vec![0u8; SideMetadata::bytes_required(heap_bounds())];
    let barrier = barrier_over(&bitmap, BarrierKind::ObjectSlowOnly);

    c.bench_function("write_post_slow_only", |b| {
        b.iter(|| {
            barrier.object_reference_write_post(black_box(event(HEAP_START + 0x40)));
        });
    });
}

criterion_group!(
    benches,
    bench_fast_path_clean,
    bench_slow_path_dirty,
    bench_degraded_mode
);
criterion_main!(benches);
