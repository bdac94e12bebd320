//! Runtime core for the ESP32-S3 management firmware.
//!
//! Exposes the task fabric, memory pools, flash logger and settings cache
//! for the firmware binary and for host-side integration tests. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; every other target gets a simulation.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod debug;
pub mod diagnostics;
pub mod error;
pub mod ipc;
pub mod logger;
pub mod memory;
pub mod rpc;
pub mod settings;
pub mod sync;
pub mod tasks;
pub mod util;

pub mod adapters;
pub mod drivers;

pub use error::{Error, Result};
