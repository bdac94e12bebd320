//! The three long-running tasks and the context they share.
//!
//! ```text
//!   worker  : Idle ──(command)──▶ Dispatch ──▶ Idle      feeds the watchdog
//!   monitor : Sleep ──(period)──▶ Tick ──▶ Sleep         absolute deadlines
//!   pusher  : Wait ──(bits|timeout)──▶ Drain ──▶ Wait    batches log lines
//! ```
//!
//! Tasks share nothing mutable except through [`Channels`] and the
//! components' own locks. Every loop checks [`Runtime::is_running`] so host
//! tests can stop the fabric; on the device it runs forever.

pub mod dispatch;
pub mod monitor;
pub mod pusher;
pub mod worker;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info};

use crate::app::ports::{RadioPort, ScanPort, SystemPort, Transport};
use crate::config::CoreConfig;
use crate::drivers::task::spawn_task;
use crate::error::Error;
use crate::ipc::Channels;
use crate::logger::FlashLogger;
use crate::memory::MemoryManager;
use crate::settings::SettingsManager;

/// Components the tasks operate on.
pub struct Services {
    pub settings: Arc<SettingsManager>,
    pub memory: Arc<MemoryManager>,
    pub logger: Arc<FlashLogger>,
    pub wifi: Arc<dyn RadioPort>,
    pub ble: Arc<dyn RadioPort>,
    pub scanner: Arc<dyn ScanPort>,
    pub system: Arc<dyn SystemPort>,
    pub transport: Arc<dyn Transport>,
}

pub struct Runtime {
    pub config: CoreConfig,
    pub channels: &'static Channels,
    pub services: Services,
    running: AtomicBool,
}

impl Runtime {
    pub fn new(config: CoreConfig, channels: &'static Channels, services: Services) -> Arc<Self> {
        Arc::new(Self {
            config,
            channels,
            services,
            running: AtomicBool::new(true),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every task loop to return after its current iteration.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn millis(ms: u32) -> Duration {
        Duration::from_millis(u64::from(ms))
    }
}

pub struct TaskHandles {
    pub worker: JoinHandle<()>,
    pub monitor: JoinHandle<()>,
    pub pusher: JoinHandle<()>,
}

impl TaskHandles {
    /// Wait for every task to return. Only meaningful after
    /// [`Runtime::shutdown`].
    pub fn join(self) {
        for (name, handle) in [
            ("worker", self.worker),
            ("monitor", self.monitor),
            ("pusher", self.pusher),
        ] {
            if handle.join().is_err() {
                error!("Tasks: {} panicked", name);
            }
        }
    }
}

/// Start the worker, monitor and pusher with the placement from the config.
pub fn spawn(rt: &Arc<Runtime>) -> Result<TaskHandles, Error> {
    let cfg = &rt.config;

    let worker = {
        let rt = Arc::clone(rt);
        spawn_task(&cfg.worker, c"sys-worker", move || worker::run(&rt))
            .map_err(|_| Error::Spawn("worker"))?
    };
    let monitor = {
        let rt = Arc::clone(rt);
        spawn_task(&cfg.monitor, c"sys-monitor", move || monitor::run(&rt))
            .map_err(|_| Error::Spawn("monitor"))?
    };
    let pusher = {
        let rt = Arc::clone(rt);
        spawn_task(&cfg.pusher, c"sys-pusher", move || pusher::run(&rt))
            .map_err(|_| Error::Spawn("pusher"))?
    };

    info!("Tasks: worker, monitor and pusher started");
    Ok(TaskHandles {
        worker,
        monitor,
        pusher,
    })
}
