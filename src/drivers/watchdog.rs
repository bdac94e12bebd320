//! Worker liveness supervision.
//!
//! The worker subscribes itself to the ESP-IDF task watchdog when it starts
//! and feeds it once per loop pass, idle or not. A missed deadline panics
//! and the device resets. The host build keeps the same surface and just
//! counts feeds so tests can check the loop keeps them coming.

use log::{info, warn};

pub struct Watchdog {
    timeout_ms: u32,
    backend: backend::Subscription,
}

impl Watchdog {
    /// Set the timeout and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        let backend = backend::Subscription::open(timeout_ms);
        if backend.is_active() {
            info!("Watchdog: {} ms, panic on miss", timeout_ms);
        } else {
            warn!("Watchdog: not subscribed, worker runs unsupervised");
        }
        Self {
            timeout_ms,
            backend,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn feed(&self) {
        self.backend.feed();
    }

    /// Feeds recorded by the simulation.
    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u32 {
        self.backend.feeds()
    }
}

#[cfg(target_os = "espidf")]
mod backend {
    use esp_idf_svc::sys::{
        ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_delete,
        esp_task_wdt_reconfigure, esp_task_wdt_reset,
    };

    pub struct Subscription {
        active: bool,
    }

    impl Subscription {
        pub fn open(timeout_ms: u32) -> Self {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: plain FFI calls; a null handle means the calling task.
            let active = unsafe {
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::debug!("Watchdog: reconfigure returned {}", ret);
                }
                esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
            };
            Self { active }
        }

        pub fn is_active(&self) -> bool {
            self.active
        }

        pub fn feed(&self) {
            if self.active {
                // SAFETY: the calling task is subscribed.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }

    impl Drop for Subscription {
        fn drop(&mut self) {
            if self.active {
                // SAFETY: removes the subscription made in `open`.
                unsafe {
                    esp_task_wdt_delete(core::ptr::null_mut());
                }
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod backend {
    use core::sync::atomic::{AtomicU32, Ordering};

    pub struct Subscription {
        feeds: AtomicU32,
    }

    impl Subscription {
        pub fn open(_timeout_ms: u32) -> Self {
            Self {
                feeds: AtomicU32::new(0),
            }
        }

        pub fn is_active(&self) -> bool {
            true
        }

        pub fn feed(&self) {
            self.feeds.fetch_add(1, Ordering::Relaxed);
        }

        pub fn feeds(&self) -> u32 {
            self.feeds.load(Ordering::Relaxed)
        }
    }
}
