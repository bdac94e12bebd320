//! Runtime core configuration parameters
//!
//! All tunables for the task fabric, flash logger and memory pools.
//! The defaults are the production values; tests shrink them.

use serde::{Deserialize, Serialize};

use crate::drivers::task::Core;
use crate::util::bounded;

/// Placement of one long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub core: Core,
    /// FreeRTOS priority (higher runs first)
    pub priority: u8,
    /// Stack size in KiB
    pub stack_kb: usize,
}

impl TaskSpec {
    pub const fn app(priority: u8, stack_kb: usize) -> Self {
        Self {
            core: Core::App,
            priority,
            stack_kb,
        }
    }
}

/// One fixed-block memory pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: heapless::String<24>,
    /// Bytes per block
    pub block_size: usize,
    /// Blocks in the pool
    pub block_count: usize,
}

impl PoolConfig {
    pub fn new(name: &str, block_size: usize, block_count: usize) -> Self {
        Self {
            name: bounded(name),
            block_size,
            block_count,
        }
    }
}

/// Flash logger parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Append-only log file
    pub path: String,
    /// Ring buffer capacity in bytes
    pub ring_bytes: usize,
    /// Background write period (milliseconds)
    pub flush_interval_ms: u32,
    /// Longest a caller may wait for ring space (milliseconds)
    pub send_timeout_ms: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            path: "/ffat/sys/system.log".into(),
            ring_bytes: 8192,
            flush_interval_ms: 60_000, // 1/min
            send_timeout_ms: 10,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    // --- Tasks ---
    pub worker: TaskSpec,
    pub monitor: TaskSpec,
    pub pusher: TaskSpec,
    pub flash_writer: TaskSpec,

    // --- Liveness ---
    /// Task watchdog timeout (milliseconds)
    pub watchdog_timeout_ms: u32,
    /// Worker command-queue wait; must stay below the watchdog timeout
    pub worker_recv_timeout_ms: u32,

    // --- Timing ---
    /// Monitor tick period (milliseconds)
    pub monitor_period_ms: u32,
    /// Pusher event wait, doubles as the log batching window (milliseconds)
    pub pusher_wait_ms: u32,
    /// Longest the monitor waits for a state-queue slot (milliseconds)
    pub state_enqueue_timeout_ms: u32,
    /// Delay between the reboot reply and the actual restart (milliseconds)
    pub restart_grace_ms: u32,

    // --- Batching ---
    /// Log lines per `log.batch` notification
    pub log_batch_max: usize,

    pub logger: LoggerConfig,
    pub pools: Vec<PoolConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker: TaskSpec::app(1, 8),
            monitor: TaskSpec::app(1, 6),
            pusher: TaskSpec::app(2, 6),
            flash_writer: TaskSpec::app(1, 4),

            watchdog_timeout_ms: 15_000,
            worker_recv_timeout_ms: 10_000,

            monitor_period_ms: 1000, // 1 Hz
            pusher_wait_ms: 500,
            state_enqueue_timeout_ms: 10,
            restart_grace_ms: 200,

            log_batch_max: 20,

            logger: LoggerConfig::default(),
            pools: vec![
                PoolConfig::new("FrameBuffer_Pool", 1024 * 1024, 4),
                PoolConfig::new("FileUpload_Pool", 256 * 1024, 8),
                PoolConfig::new("GeneralData_Pool", 64 * 1024, 16),
            ],
        }
    }
}

impl CoreConfig {
    /// Reject combinations that would starve the watchdog or break the
    /// logger and pools.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.worker_recv_timeout_ms >= self.watchdog_timeout_ms {
            return Err("worker_recv_timeout_ms must be below watchdog_timeout_ms");
        }
        if self.monitor_period_ms == 0 {
            return Err("monitor_period_ms must be non-zero");
        }
        if self.pusher_wait_ms == 0 {
            return Err("pusher_wait_ms must be non-zero");
        }
        if self.log_batch_max == 0 {
            return Err("log_batch_max must be non-zero");
        }
        if self.logger.ring_bytes < 64 {
            return Err("logger.ring_bytes must be at least 64");
        }
        if self.logger.flush_interval_ms == 0 {
            return Err("logger.flush_interval_ms must be non-zero");
        }
        if self
            .pools
            .iter()
            .any(|p| p.block_size == 0 || p.block_count == 0)
        {
            return Err("pool block_size and block_count must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(CoreConfig::default().validate(), Ok(()));
    }

    #[test]
    fn worker_timeout_must_be_below_watchdog() {
        let c = CoreConfig {
            worker_recv_timeout_ms: 15_000,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        let mut c = CoreConfig::default();
        c.pools.push(PoolConfig::new("Empty", 0, 4));
        assert!(c.validate().is_err());
    }

    #[test]
    fn default_pool_table() {
        let c = CoreConfig::default();
        let names: Vec<&str> = c.pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["FrameBuffer_Pool", "FileUpload_Pool", "GeneralData_Pool"]
        );
        assert_eq!(c.pools[0].block_size, 1024 * 1024);
        assert_eq!(c.pools[2].block_count, 16);
    }

    #[test]
    fn pusher_outranks_worker_and_monitor() {
        let c = CoreConfig::default();
        assert!(c.pusher.priority > c.worker.priority);
        assert!(c.pusher.priority > c.monitor.priority);
    }

    #[test]
    fn serde_roundtrip() {
        let c = CoreConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = CoreConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: CoreConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }
}
