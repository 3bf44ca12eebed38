//! Memory management utilities
//!
//! Resource buffers are allocated through an explicit allocator context that
//! the resource pack receives at construction, rather than through a
//! process-wide hook. Tests hand each pack its own [`TrackingAllocator`] so
//! that live-byte accounting never leaks between test cases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot of an allocator's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Bytes currently handed out and not yet released
    pub live_bytes: usize,
    /// Highest value `live_bytes` has reached
    pub peak_bytes: usize,
    /// Number of `allocate` calls
    pub allocations: usize,
    /// Number of `release` calls
    pub releases: usize,
}

/// Allocator context for resource byte buffers
///
/// A buffer obtained from `allocate` must be returned through `release` on
/// the same allocator.
pub trait BufferAllocator: Send + Sync {
    /// Allocate a zero-filled buffer of `len` bytes
    fn allocate(&self, len: usize) -> Vec<u8>;

    /// Give a buffer back to the allocator
    fn release(&self, buffer: Vec<u8>);

    /// Current counters
    fn stats(&self) -> AllocationStats {
        AllocationStats::default()
    }
}

/// Plain heap allocator with no bookkeeping
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Shared handle to a system allocator
    pub fn shared() -> Arc<dyn BufferAllocator> {
        Arc::new(Self)
    }
}

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Vec<u8> {
        vec![0; len]
    }

    fn release(&self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Heap allocator that counts live and peak bytes
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
}

impl TrackingAllocator {
    /// Create a new tracking allocator with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferAllocator for TrackingAllocator {
    fn allocate(&self, len: usize) -> Vec<u8> {
        let live = self.live_bytes.fetch_add(len, Ordering::Relaxed) + len;
        self.peak_bytes.fetch_max(live, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        vec![0; len]
    }

    fn release(&self, buffer: Vec<u8>) {
        let len = buffer.len();
        let previous = self.live_bytes.fetch_sub(len, Ordering::Relaxed);
        debug_assert!(previous >= len, "released more bytes than were allocated");
        self.releases.fetch_add(1, Ordering::Relaxed);
        drop(buffer);
    }

    fn stats(&self) -> AllocationStats {
        AllocationStats {
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
        }
    }
}
