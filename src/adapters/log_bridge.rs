//! Console log bridge.
//!
//! A [`log::Log`] that hands every record to the console logger first and
//! then offers a bounded copy of the line to the log queue, so attached
//! peers see the same output as the serial port. The copy never blocks:
//! when the queue is full the line only reaches the console.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::ipc::channels::LogLine;
use crate::ipc::{Channels, EventBits};
use crate::util::render;

pub struct LogBridge<L> {
    console: L,
    channels: &'static Channels,
    level: LevelFilter,
}

impl<L: Log + 'static> LogBridge<L> {
    pub fn new(console: L, channels: &'static Channels, level: LevelFilter) -> Self {
        Self {
            console,
            channels,
            level,
        }
    }

    /// Install as the global logger. The bridge lives for the rest of the
    /// program.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let level = self.level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(level);
        Ok(())
    }

    fn forward(&self, record: &Record<'_>) {
        let mut line: LogLine = render(format_args!("{} {}", record.level(), record.args()));
        while line.ends_with(|c: char| c == '\r' || c == '\n') {
            line.pop();
        }
        if self.channels.logs.try_send(line).is_ok() {
            self.channels.events.set(EventBits::LOG_READY);
        }
    }
}

impl<L: Log + 'static> Log for LogBridge<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.console.log(record);
        self.forward(record);
    }

    fn flush(&self) {
        self.console.flush();
    }
}
