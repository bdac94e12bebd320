//! Pusher task: forwards queued notifications to transport peers.
//!
//! Waits for either ready bit with a bounded timeout, which doubles as the
//! log batching window. With no peer attached both queues are drained and
//! discarded so producers never back up. Otherwise every state message is
//! broadcast on its own, in order, and up to `log_batch_max` log lines go
//! out as one `log.batch` notification.
//!
//! Nothing here logs per cycle: every log line re-enters the log queue and
//! would wake the pusher again.

use serde_json::{Value, json};

use crate::ipc::EventBits;
use crate::rpc::Notification;

use super::Runtime;

pub const LOG_BATCH_METHOD: &str = "log.batch";

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub woken_by: Option<EventBits>,
    pub states_sent: usize,
    pub logs_sent: usize,
    pub discarded: usize,
}

pub fn run(rt: &Runtime) {
    log::info!("Pusher: started");
    while rt.is_running() {
        cycle(rt);
    }
}

pub fn cycle(rt: &Runtime) -> CycleReport {
    let ch = rt.channels;
    let transport = &rt.services.transport;

    let bits = ch.events.wait_any(
        EventBits::STATE_READY | EventBits::LOG_READY,
        Runtime::millis(rt.config.pusher_wait_ms),
    );
    let mut report = CycleReport {
        woken_by: (!bits.is_empty()).then_some(bits),
        ..CycleReport::default()
    };

    if transport.peer_count() == 0 {
        report.discarded = ch.states.drain() + ch.logs.drain();
        return report;
    }

    while let Some(message) = ch.states.try_recv() {
        transport.broadcast(&message);
        report.states_sent += 1;
    }

    let mut batch = Vec::new();
    while batch.len() < rt.config.log_batch_max {
        let Some(line) = ch.logs.try_recv() else {
            break;
        };
        batch.push(json!({ "msg": line.as_str() }));
    }
    if !batch.is_empty() {
        report.logs_sent = batch.len();
        transport.broadcast(&Notification::new(LOG_BATCH_METHOD, Value::Array(batch)).to_json());
    }
    report
}
