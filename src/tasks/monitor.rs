//! Monitor task: periodic housekeeping and status publishing.
//!
//! Runs on absolute deadlines (`next += period`) so processing time does
//! not accumulate as drift. Each tick:
//!
//! 1. feeds queued driver events to the radio managers,
//! 2. runs the radios' update hooks,
//! 3. commits the settings cache (no-op unless dirty),
//! 4. publishes a `system.stateUpdate` notification.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::json;

use crate::ipc::EventBits;
use crate::rpc::Notification;

use super::Runtime;

pub const STATE_METHOD: &str = "system.stateUpdate";

pub fn run(rt: &Runtime) {
    let period = Runtime::millis(rt.config.monitor_period_ms);
    info!("Monitor: started, period {} ms", period.as_millis());
    let mut next = Instant::now() + period;
    while rt.is_running() {
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        }
        next = next_deadline(next, period, Instant::now());
        tick(rt);
    }
}

/// Advance the absolute deadline by one period. If that is already in the
/// past the missed periods are dropped, not replayed: the next tick lands
/// one full period from `now`. A FreeRTOS delay-until would instead run the
/// missed ticks back to back; a status snapshot that is already stale is
/// not worth publishing twice.
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if next < now {
        debug!("Monitor: overran, resynchronising");
        now + period
    } else {
        next
    }
}

/// One monitor cycle. Returns whether the status notification was queued.
pub fn tick(rt: &Runtime) -> bool {
    let svc = &rt.services;
    let ch = rt.channels;

    while let Some(event) = ch.radio_events.try_recv() {
        svc.wifi.handle_event(event);
        svc.ble.handle_event(event);
    }
    svc.wifi.update();
    svc.ble.update();

    if let Err(e) = svc.settings.commit() {
        debug!("Monitor: settings commit deferred ({})", e);
    }

    let metrics = svc.system.metrics();
    let note = Notification::new(
        STATE_METHOD,
        json!({
            "uptime": metrics.uptime_ms,
            "free_heap": metrics.free_heap,
            "free_psram": metrics.free_psram,
            "wifi_state": svc.wifi.state_code(),
            "ble_state": svc.ble.state_code(),
        }),
    );
    let Some(message) = note.to_state_message() else {
        warn!("Monitor: status update too large, dropped");
        return false;
    };

    let timeout = Runtime::millis(rt.config.state_enqueue_timeout_ms);
    if ch.states.send_timeout(message, timeout).is_err() {
        warn!("Monitor: state queue is full, status update dropped");
        return false;
    }
    ch.events.set(EventBits::STATE_READY);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(1000);

    #[test]
    fn on_time_tick_keeps_the_grid() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(1300);
        assert_eq!(next_deadline(t0 + PERIOD, PERIOD, now), t0 + 2 * PERIOD);
    }

    #[test]
    fn overrun_drops_missed_periods() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(3500);
        assert_eq!(next_deadline(t0 + PERIOD, PERIOD, now), now + PERIOD);
    }
}
