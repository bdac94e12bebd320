//! Worker task: executes queued commands.
//!
//! Blocks on the command queue for at most `worker_recv_timeout_ms` (kept
//! below the watchdog timeout) and feeds the watchdog on every iteration,
//! whether or not a command arrived. A handler that hangs therefore trips
//! the watchdog within one period.

use log::{debug, info};

use crate::debug_log;
use crate::drivers::watchdog::Watchdog;
use crate::rpc::CommandRecord;

use super::Runtime;
use super::dispatch::{Dispatcher, follow_up};

pub fn run(rt: &Runtime) {
    let watchdog = Watchdog::new(rt.config.watchdog_timeout_ms);
    let dispatcher = Dispatcher::new();
    info!(
        "Worker: started, {} method(s), watchdog {} ms",
        dispatcher.methods().count(),
        watchdog.timeout_ms()
    );
    while rt.is_running() {
        poll_once(rt, &dispatcher, &watchdog);
    }
}

/// One loop iteration. Returns whether a command was handled.
pub fn poll_once(rt: &Runtime, dispatcher: &Dispatcher, watchdog: &Watchdog) -> bool {
    let timeout = Runtime::millis(rt.config.worker_recv_timeout_ms);
    let handled = match rt.channels.commands.recv_timeout(timeout) {
        Some(mut command) => {
            handle(rt, dispatcher, &mut command);
            true
        }
        None => {
            debug!("Worker: no command within {} ms", timeout.as_millis());
            false
        }
    };
    watchdog.feed();
    handled
}

fn handle(rt: &Runtime, dispatcher: &Dispatcher, command: &mut CommandRecord) {
    debug_log!(
        rt.services.settings,
        "Worker: '{}' from client {}",
        command.method,
        command.client_id
    );
    let outcome = command
        .params_value()
        .and_then(|params| dispatcher.dispatch(rt, &command.method, &params));
    match outcome {
        Ok(outcome) => {
            command.respond(Ok(outcome.result));
            if let Some(action) = outcome.then {
                follow_up(rt, action);
            }
        }
        Err(e) => command.respond(Err(e)),
    }
}
