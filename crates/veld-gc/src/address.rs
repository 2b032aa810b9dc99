//! Heap addresses and the reserved address range
//!
//! This module defines the raw address representation used throughout the
//! boundary layer. Addresses are opaque byte offsets into the managed address
//! space; the boundary layer never dereferences them itself, it only forwards
//! them to the collector engine or uses them for side-metadata arithmetic.

use std::fmt;

/// An opaque address inside the managed address space
///
/// Wraps a fixed-width unsigned integer. Only addresses validated against
/// [`HeapBounds`] may reach the barrier logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address(usize);

impl Address {
    /// The zero address, used for null/empty references
    pub const ZERO: Address = Address(0);

    /// Create an address from a raw integer
    #[inline]
    pub const fn from_usize(raw: usize) -> Self {
        Address(raw)
    }

    /// Get the raw integer value
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check whether this is the null address
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Offset this address by `bytes`
    ///
    /// # Panics
    ///
    /// Panics if the offset would wrap past the end of the address space.
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        match self.0.checked_add(bytes) {
            Some(raw) => Address(raw),
            None => panic!("address offset overflow"),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(raw: usize) -> Self {
        Address(raw)
    }
}

/// The reserved heap address range `[start, end)`
///
/// Fixed once during initialization and immutable thereafter; the reservation
/// is never resized at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapBounds {
    start: Address,
    end: Address,
}

impl HeapBounds {
    /// Create bounds for the half-open range `[start, end)`
    ///
    /// # Panics
    ///
    /// Panics if `start >= end` (an empty or inverted reservation is a
    /// configuration error that must never reach this point).
    pub fn new(start: Address, end: Address) -> Self {
        assert!(
            start < end,
            "invalid heap reservation: start {} >= end {}",
            start,
            end
        );
        Self { start, end }
    }

    /// Start of the reserved range (inclusive)
    #[inline]
    pub fn start(&self) -> Address {
        self.start
    }

    /// End of the reserved range (exclusive)
    #[inline]
    pub fn end(&self) -> Address {
        self.end
    }

    /// Size of the reserved range in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    /// Check if the range is empty (never true for validated bounds)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Boundary-exact membership test for the half-open range
    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end
    }
}
