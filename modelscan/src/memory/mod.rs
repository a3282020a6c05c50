//! Memory telemetry for the scan loop.
//!
//! Two independent signals are exposed:
//! - `MemoryProbe::resident_memory_mb` reports the OS view of the process
//!   (resident set, including Tesseract's native allocations). This is the
//!   only input to quality tier selection.
//! - `AllocationSession` reports the high-water mark of heap memory claimed
//!   through the Rust allocator since the session started. Diagnostic only.

mod alloc;

pub use alloc::{AllocationSession, TrackingAllocator};

/// Returned by probes that cannot read resident memory on this platform.
pub const RSS_UNAVAILABLE: f64 = -1.0;

pub trait MemoryProbe {
    /// Current resident set size in MB, or `RSS_UNAVAILABLE`.
    fn resident_memory_mb(&self) -> f64;
}

/// Reads resident memory of the current process from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    #[cfg(target_os = "linux")]
    fn resident_memory_mb(&self) -> f64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss_kb(&status))
            .map(|kb| kb as f64 / 1024.0)
            .unwrap_or(RSS_UNAVAILABLE)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_memory_mb(&self) -> f64 {
        RSS_UNAVAILABLE
    }
}

/// Pull the `VmRSS` figure (kB) out of a `/proc/<pid>/status` dump.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
