//! The set of queues and signals connecting the runtime tasks.
//!
//! ```text
//!  transport ──CommandRecord──▶ commands ──▶ worker
//!  monitor   ──StateMessage──▶ states   ──┐
//!  log bridge ──LogLine──────▶ logs     ──┼─▶ pusher ──▶ transport
//!                               events ───┘   (STATE_READY | LOG_READY)
//!  radio callbacks ─RadioEvent─▶ radio_events ──▶ monitor
//! ```
//!
//! One `Channels` value is created by the entry point (as a `static`) and
//! handed to every task by reference.

use crate::app::ports::RadioEvent;
use crate::rpc::CommandRecord;

use super::event_group::EventGroup;
use super::queue::Queue;

/// Depth of the inbound command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 10;
/// Depth of the outbound state-notification queue.
pub const STATE_QUEUE_DEPTH: usize = 20;
/// Depth of the console log queue.
pub const LOG_QUEUE_DEPTH: usize = 30;
/// Depth of the radio driver event queue.
pub const RADIO_EVENT_DEPTH: usize = 8;

/// Longest method name a command record carries.
pub const METHOD_MAX: usize = 32;
/// Longest serialised params string a command record carries.
pub const PARAMS_MAX: usize = 256;
/// Longest rendered state notification.
pub const STATE_MESSAGE_MAX: usize = 1024;
/// Longest console line forwarded to peers.
pub const LOG_LINE_MAX: usize = 128;

pub type StateMessage = heapless::String<STATE_MESSAGE_MAX>;
pub type LogLine = heapless::String<LOG_LINE_MAX>;

pub struct Channels {
    pub commands: Queue<CommandRecord, COMMAND_QUEUE_DEPTH>,
    pub states: Queue<StateMessage, STATE_QUEUE_DEPTH>,
    pub logs: Queue<LogLine, LOG_QUEUE_DEPTH>,
    pub radio_events: Queue<RadioEvent, RADIO_EVENT_DEPTH>,
    pub events: EventGroup,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub const fn new() -> Self {
        Self {
            commands: Queue::new(),
            states: Queue::new(),
            logs: Queue::new(),
            radio_events: Queue::new(),
            events: EventGroup::new(),
        }
    }
}
