//! Side-metadata index
//!
//! The collector engine keeps one bit of bookkeeping per 8-byte granule of
//! heap address space in a flat external bitmap ("side metadata"). The write
//! barrier consults this bitmap on every reference store: bit `1` means the
//! containing granule needs slow-path attention, bit `0` means the store can
//! be skipped.
//!
//! The bitmap is owned and mutated exclusively by the collector engine. This
//! module only provides the address arithmetic and a read-only view.
//!
//! ## Encoding
//!
//! For an address `a`:
//! - the containing bitmap byte is `a >> 6` (64 bytes of heap per bitmap byte)
//! - the bit within that byte is `(a >> 3) & 7` (one bit per 8-byte granule)

use crate::address::{Address, HeapBounds};

/// Log2 of the granule size in bytes
pub const LOG_BYTES_IN_GRANULE: usize = 3;

/// Bytes of heap address space mapped by one granule bit
pub const BYTES_IN_GRANULE: usize = 1 << LOG_BYTES_IN_GRANULE;

/// Log2 of the heap bytes covered by one bitmap byte (8 granules)
pub const LOG_BYTES_PER_METADATA_BYTE: usize = 6;

/// Compute the side-metadata position for an address
///
/// Returns `(byte_index, bit_index)` where `byte_index` is the absolute
/// bitmap byte (`addr >> 6`) and `bit_index` selects the granule bit within
/// it (`(addr >> 3) & 7`).
///
/// Pure address arithmetic; never fails for addresses inside [`HeapBounds`].
/// Behavior for addresses outside the heap reservation is meaningless and
/// callers must not pass them.
#[inline(always)]
pub const fn granule_bit(addr: Address) -> (usize, u8) {
    let raw = addr.as_usize();
    let byte = raw >> LOG_BYTES_PER_METADATA_BYTE;
    let bit = ((raw >> LOG_BYTES_IN_GRANULE) & 7) as u8;
    (byte, bit)
}

/// Read-only view over the collector-owned side-metadata bitmap
///
/// Holds the bitmap base pointer and the heap range it covers. The view
/// translates absolute byte indices from [`granule_bit`] into offsets from
/// the bitmap base.
pub struct SideMetadata {
    /// Bitmap base pointer (owned by the collector engine)
    base: *const u8,

    /// Bitmap length in bytes
    len: usize,

    /// Heap range covered by the bitmap
    bounds: HeapBounds,
}

impl SideMetadata {
    /// Create a view over a collector-owned bitmap
    ///
    /// # Safety
    ///
    /// `base` must point to at least `len` readable bytes that stay valid
    /// for as long as any copy of the view (or a barrier holding one) is
    /// alive, and that are only mutated through atomic or volatile stores.
    /// The view carries no lifetime; the caller owns that guarantee.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap is too small to cover `bounds`.
    pub unsafe fn new(base: *const u8, len: usize, bounds: HeapBounds) -> Self {
        let required = Self::bytes_required(bounds);
        assert!(
            len >= required,
            "side metadata too small: {} bytes, need {} to cover {}..{}",
            len,
            required,
            bounds.start(),
            bounds.end()
        );
        Self { base, len, bounds }
    }

    /// Create a view over a slice-backed bitmap (used by tests and by
    /// engines that keep their metadata in ordinary memory)
    ///
    /// # Safety
    ///
    /// The slice must outlive the view; only its raw pointer is retained,
    /// not the borrow.
    pub unsafe fn from_slice(bitmap: &[u8], bounds: HeapBounds) -> Self {
        unsafe { Self::new(bitmap.as_ptr(), bitmap.len(), bounds) }
    }

    /// Number of bitmap bytes needed to cover `bounds`
    pub fn bytes_required(bounds: HeapBounds) -> usize {
        let (first, _) = granule_bit(bounds.start());
        // end is exclusive; the last mapped address is end - 1
        let (last, _) = granule_bit(Address::from_usize(bounds.end().as_usize() - 1));
        last - first + 1
    }

    /// Heap range covered by this view
    #[inline]
    pub fn bounds(&self) -> HeapBounds {
        self.bounds
    }

    /// Bitmap length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitmap is empty (never true for a validated view)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The fast-path bit test: is the granule containing `addr` flagged for
    /// slow-path attention?
    ///
    /// One byte load and one bit test. `addr` must lie inside the covered
    /// heap range; only heap-resident objects ever reach the barrier, so the
    /// caller has already established membership.
    #[inline(always)]
    pub fn is_dirty(&self, addr: Address) -> bool {
        debug_assert!(
            self.bounds.contains(addr),
            "side-metadata query outside covered range: {}",
            addr
        );
        let (byte, bit) = granule_bit(addr);
        let (first, _) = granule_bit(self.bounds.start());
        let offset = byte - first;
        // Volatile load: the engine flips these bits concurrently and the
        // barrier must observe a fresh value, not a cached one.
        let b = unsafe { std::ptr::read_volatile(self.base.add(offset)) };
        (b >> bit) & 1 == 1
    }
}

// SAFETY: the view is read-only over engine-owned memory that outlives it;
// concurrent reads from mutator threads are the intended access pattern.
unsafe impl Send for SideMetadata {}
unsafe impl Sync for SideMetadata {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(start: usize, end: usize) -> HeapBounds {
        HeapBounds::new(Address::from_usize(start), Address::from_usize(end))
    }

    #[test]
    fn test_granule_bit_encoding() {
        // 0x1000 >> 6 = 0x40, (0x1000 >> 3) & 7 = 0
        assert_eq!(granule_bit(Address::from_usize(0x1000)), (0x40, 0));
        // One granule later the bit index advances
        assert_eq!(granule_bit(Address::from_usize(0x1008)), (0x40, 1));
        // Addresses within the same granule share a bit
        assert_eq!(granule_bit(Address::from_usize(0x100F)), (0x40, 1));
        // 64 bytes later the byte index advances
        assert_eq!(granule_bit(Address::from_usize(0x1040)), (0x41, 0));
    }

    #[test]
    fn test_granule_bit_covers_all_bits() {
        // Eight consecutive granules map to the eight bits of one byte
        for g in 0..8usize {
            let (byte, bit) = granule_bit(Address::from_usize(0x1000 + g * 8));
            assert_eq!(byte, 0x40);
            assert_eq!(bit, g as u8);
        }
    }

    #[test]
    fn test_bytes_required() {
        // 4 KiB of heap needs 64 bitmap bytes
        assert_eq!(SideMetadata::bytes_required(bounds(0x1000, 0x2000)), 64);
        // A single granule still needs one byte
        assert_eq!(SideMetadata::bytes_required(bounds(0x1000, 0x1008)), 1);
    }

    #[test]
    fn test_is_dirty_reads_engine_bit() {
        let b = bounds(0x1000, 0x2000);
        let mut bitmap = vec![0u8; SideMetadata::bytes_required(b)];
        // Flag the granule at 0x1008 (byte 0, bit 1)
        bitmap[0] = 1 << 1;
        // SAFETY: the bitmap vec outlives the view
        let view = unsafe { SideMetadata::from_slice(&bitmap, b) };

        assert!(!view.is_dirty(Address::from_usize(0x1000)));
        assert!(view.is_dirty(Address::from_usize(0x1008)));
        assert!(view.is_dirty(Address::from_usize(0x100F)));
        assert!(!view.is_dirty(Address::from_usize(0x1010)));
    }

    #[test]
    fn test_is_dirty_far_from_base() {
        let b = bounds(0x1000, 0x2000);
        let mut bitmap = vec![0u8; SideMetadata::bytes_required(b)];
        // Granule at 0x1FF8: byte (0x1FF8 >> 6) - (0x1000 >> 6) = 0x3F, bit 7
        bitmap[0x3F] = 1 << 7;
        // SAFETY: the bitmap vec outlives the view
        let view = unsafe { SideMetadata::from_slice(&bitmap, b) };

        assert!(view.is_dirty(Address::from_usize(0x1FF8)));
        assert!(!view.is_dirty(Address::from_usize(0x1FF0)));
    }

    #[test]
    #[should_panic(expected = "side metadata too small")]
    fn test_undersized_bitmap_panics() {
        let b = bounds(0x1000, 0x2000);
        let bitmap = vec![0u8; 8];
        // SAFETY: the bitmap vec outlives the view
        let _ = unsafe { SideMetadata::from_slice(&bitmap, b) };
    }
}
