//! Task placement, the task watchdog and the critical-section provider.

pub mod cs_shim;
pub mod task;
pub mod watchdog;
