//! Bridge from radio driver callbacks to the monitor task.
//!
//! Driver callbacks are C function pointers that cannot capture state, so
//! the radio event queue is installed here once at boot and callbacks post
//! through [`post`]. Posting never blocks; a full queue drops the event.

use std::sync::OnceLock;

use log::warn;

use crate::app::ports::RadioEvent;
use crate::ipc::channels::RADIO_EVENT_DEPTH;
use crate::ipc::Queue;

type Sink = Queue<RadioEvent, RADIO_EVENT_DEPTH>;

static SINK: OnceLock<&'static Sink> = OnceLock::new();

/// Route driver events into `queue`. Only the first call takes effect.
pub fn install(queue: &'static Sink) -> bool {
    SINK.set(queue).is_ok()
}

/// Forward one event. Returns `false` if no queue is installed or it is full.
pub fn post(event: RadioEvent) -> bool {
    let Some(sink) = SINK.get() else {
        return false;
    };
    if sink.try_send(event).is_err() {
        warn!("Radio: event queue full, dropped {:?}", event);
        return false;
    }
    true
}
