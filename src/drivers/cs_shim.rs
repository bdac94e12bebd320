//! `critical-section` 1.x provider for ESP-IDF builds.
//!
//! The IPC queues sit on `embassy-sync` channels with a
//! `CriticalSectionRawMutex`, which links against these two symbols. A
//! section is one process-wide raw mutex; nesting on the same task only
//! bumps a per-task depth.

#[cfg(target_os = "espidf")]
use core::cell::Cell;

#[cfg(target_os = "espidf")]
use parking_lot::lock_api::RawMutex as _;

#[cfg(target_os = "espidf")]
static SECTION: parking_lot::RawMutex = parking_lot::RawMutex::INIT;

#[cfg(target_os = "espidf")]
thread_local! {
    static DEPTH: Cell<u8> = const { Cell::new(0) };
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            SECTION.lock();
        }
        depth.set(d.saturating_add(1));
        d
    })
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(outer: u8) {
    DEPTH.with(|depth| {
        depth.set(outer);
        if outer == 0 {
            // SAFETY: depth 0 -> 1 on this task took the lock in acquire.
            unsafe { SECTION.unlock() };
        }
    })
}
