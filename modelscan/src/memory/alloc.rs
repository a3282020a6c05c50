use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static CURRENT: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);
static BASELINE: AtomicUsize = AtomicUsize::new(0);
static ACTIVE: AtomicBool = AtomicBool::new(false);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counting wrapper around the system allocator.
///
/// Install it in the binary to make `AllocationSession` report real figures:
///
/// ```rust,ignore
/// #[global_allocator]
/// static GLOBAL: modelscan::memory::TrackingAllocator = modelscan::memory::TrackingAllocator;
/// ```
///
/// Without it every session reports 0.
pub struct TrackingAllocator;

fn record_growth(size: usize) {
    let now = CURRENT.fetch_add(size, Ordering::Relaxed) + size;
    if ACTIVE.load(Ordering::Relaxed) {
        PEAK.fetch_max(now, Ordering::Relaxed);
    }
}

fn record_shrink(size: usize) {
    CURRENT.fetch_sub(size, Ordering::Relaxed);
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_growth(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_growth(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record_shrink(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            let old_size = layout.size();
            if new_size > old_size {
                record_growth(new_size - old_size);
            } else {
                record_shrink(old_size - new_size);
            }
        }
        new_ptr
    }
}

/// A profiling window over `TrackingAllocator`.
///
/// Peak figures are relative to the heap in use when the session started.
/// Only one session should be live at a time; starting a new one resets the
/// baseline.
#[derive(Debug)]
pub struct AllocationSession {
    _private: (),
}

impl AllocationSession {
    pub fn start() -> Self {
        let now = CURRENT.load(Ordering::Relaxed);
        BASELINE.store(now, Ordering::Relaxed);
        PEAK.store(now, Ordering::Relaxed);
        ACTIVE.store(true, Ordering::Relaxed);
        Self { _private: () }
    }

    /// High-water mark in MB since the session started.
    pub fn peak_mb(&self) -> f64 {
        let peak = PEAK.load(Ordering::Relaxed);
        let baseline = BASELINE.load(Ordering::Relaxed);
        peak.saturating_sub(baseline) as f64 / BYTES_PER_MB
    }

    /// Heap growth in MB currently outstanding since the session started.
    pub fn current_mb(&self) -> f64 {
        let now = CURRENT.load(Ordering::Relaxed);
        let baseline = BASELINE.load(Ordering::Relaxed);
        now.saturating_sub(baseline) as f64 / BYTES_PER_MB
    }

    /// End the session, returning the final peak.
    pub fn stop(self) -> f64 {
        self.peak_mb()
    }
}

impl Drop for AllocationSession {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Relaxed);
    }
}
