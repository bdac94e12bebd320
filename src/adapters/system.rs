//! Chip probe and restart control.
//!
//! Implements [`SystemPort`].
//!
//! - **`target_os = "espidf"`** wraps `esp_timer_get_time()`, the heap
//!   capability queries and `esp_restart()`.
//! - **`not(target_os = "espidf")`** uses `std::time::Instant` for uptime,
//!   fixed heap figures, and records restart requests instead of
//!   performing them.

use crate::app::ports::{SystemMetrics, SystemPort};

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU32, Ordering};

/// Heap figures reported by the host simulation.
#[cfg(not(target_os = "espidf"))]
pub const SIM_FREE_HEAP: u32 = 180 * 1024;
#[cfg(not(target_os = "espidf"))]
pub const SIM_FREE_PSRAM: u32 = 6 * 1024 * 1024;

pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    restarts: AtomicU32,
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EspSystem {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            restarts: AtomicU32::new(0),
        }
    }

    /// Restart requests seen so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl SystemPort for EspSystem {
    #[cfg(target_os = "espidf")]
    fn metrics(&self) -> SystemMetrics {
        use esp_idf_svc::sys::*;
        unsafe {
            SystemMetrics {
                uptime_ms: esp_timer_get_time() as u64 / 1_000,
                free_heap: esp_get_free_heap_size(),
                free_psram: heap_caps_get_free_size(MALLOC_CAP_SPIRAM) as u32,
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn metrics(&self) -> SystemMetrics {
        SystemMetrics {
            uptime_ms: self.start.elapsed().as_millis() as u64,
            free_heap: SIM_FREE_HEAP,
            free_psram: SIM_FREE_PSRAM,
        }
    }

    #[cfg(target_os = "espidf")]
    fn restart(&self) {
        log::warn!("System: restarting");
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&self) {
        log::warn!("System(sim): restart requested");
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}
