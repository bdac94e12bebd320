//! Spawning the runtime's long-lived tasks.
//!
//! Every fabric task (worker, monitor, pusher) and the flash writer is a
//! `std::thread`. On ESP-IDF each thread is a FreeRTOS task, and the
//! pthread config set just before creation decides its core, priority
//! and stack. The config is per calling thread and consumed by the next
//! creation, so [`spawn_task`] keeps the two steps back to back.

use core::ffi::CStr;
use std::thread::JoinHandle;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::TaskSpec;

/// ESP32-S3 CPU a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Core {
    /// Core 0, shared with the radio stacks.
    Pro = 0,
    /// Core 1, where the fabric runs.
    App = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The pthread config was rejected (ESP-IDF error code).
    Config(i32),
    /// The thread itself could not be created.
    Create,
}

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(code) => write!(f, "task config rejected ({code})"),
            Self::Create => write!(f, "task creation failed"),
        }
    }
}

/// Start `body` as the task described by `spec`.
pub fn spawn_task(
    spec: &TaskSpec,
    name: &'static CStr,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, SpawnError> {
    let label = name.to_str().unwrap_or("task");
    configure_next(spec, name)?;
    info!(
        "Task '{}': {:?} core, priority {}, {} KiB stack",
        label, spec.core, spec.priority, spec.stack_kb
    );
    std::thread::Builder::new()
        .name(label.to_owned())
        .stack_size(host_stack_bytes(spec))
        .spawn(body)
        .map_err(|_| SpawnError::Create)
}

#[cfg(target_os = "espidf")]
fn configure_next(spec: &TaskSpec, name: &'static CStr) -> Result<(), SpawnError> {
    use esp_idf_sys::{ESP_OK, esp_create_default_pthread_config, esp_pthread_set_cfg};

    // SAFETY: the config is copied by esp_pthread_set_cfg; `name` is 'static.
    let ret = unsafe {
        let mut cfg = esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = spec.priority as i32;
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr();
        esp_pthread_set_cfg(&cfg)
    };
    if ret == ESP_OK as i32 {
        Ok(())
    } else {
        Err(SpawnError::Config(ret))
    }
}

#[cfg(not(target_os = "espidf"))]
fn configure_next(_spec: &TaskSpec, _name: &'static CStr) -> Result<(), SpawnError> {
    Ok(())
}

/// The pthread config sets the device stack; the std builder value only
/// matters on the host, where formatting and the test harness need a 64 KiB
/// floor.
fn host_stack_bytes(spec: &TaskSpec) -> usize {
    if cfg!(target_os = "espidf") {
        spec.stack_kb * 1024
    } else {
        spec.stack_kb.max(64) * 1024
    }
}
