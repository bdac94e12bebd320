//! Runtime diagnostics report.
//!
//! Collected on demand by the `debug.runDiagnostics` method (only present
//! in `core-debug` builds) and written to the console log. The report never
//! includes credentials.

use serde::Serialize;

use log::info;

use crate::app::ports::SystemMetrics;
use crate::memory::PoolStats;
use crate::tasks::Runtime;

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct LoggerStatus {
    pub path: String,
    pub pending_bytes: usize,
    pub dropped: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub firmware: &'static str,
    pub system: SystemMetrics,
    pub pools: Vec<PoolStats>,
    pub wifi_state: i32,
    pub ble_state: i32,
    pub wifi_ssid: heapless::String<32>,
    pub wifi_mode: u8,
    pub settings_dirty: bool,
    pub logger: LoggerStatus,
    pub queued_commands: usize,
    pub queued_states: usize,
    pub queued_logs: usize,
}

impl Report {
    pub fn collect(rt: &Runtime) -> Self {
        let svc = &rt.services;
        let settings = svc.settings.snapshot();
        Self {
            firmware: FIRMWARE_VERSION,
            system: svc.system.metrics(),
            pools: svc.memory.stats(),
            wifi_state: svc.wifi.state_code(),
            ble_state: svc.ble.state_code(),
            wifi_ssid: settings.wifi_ssid,
            wifi_mode: settings.wifi_mode.code(),
            settings_dirty: svc.settings.is_dirty(),
            logger: LoggerStatus {
                path: svc.logger.path().display().to_string(),
                pending_bytes: svc.logger.pending_bytes(),
                dropped: svc.logger.dropped(),
            },
            queued_commands: rt.channels.commands.len(),
            queued_states: rt.channels.states.len(),
            queued_logs: rt.channels.logs.len(),
        }
    }

    pub fn log(&self) {
        info!("=============================================");
        info!("      System Diagnostics Report (v{})", self.firmware);
        info!("=============================================");
        info!("--- 1. System ---");
        info!("  Uptime             : {} ms", self.system.uptime_ms);
        info!("  Heap free          : {} KB", self.system.free_heap / 1024);
        info!("  PSRAM free         : {} KB", self.system.free_psram / 1024);
        info!("--- 2. Memory pools ---");
        for p in &self.pools {
            info!(
                "  {:<18} {:>3}/{:<3} x {} B",
                p.name, p.used, p.block_count, p.block_size
            );
        }
        info!("--- 3. Radios ---");
        info!("  WiFi state         : {} (mode {}, ssid '{}')", self.wifi_state, self.wifi_mode, self.wifi_ssid);
        info!("  BLE state          : {}", self.ble_state);
        info!("--- 4. Persistence ---");
        info!("  Settings dirty     : {}", self.settings_dirty);
        info!(
            "  Log file           : {} ({} B pending, {} dropped)",
            self.logger.path, self.logger.pending_bytes, self.logger.dropped
        );
        info!("--- 5. Queues ---");
        info!(
            "  commands {} / states {} / logs {}",
            self.queued_commands, self.queued_states, self.queued_logs
        );
        info!("=============================================");
    }
}
