//! Flash-friendly asynchronous logger.
//!
//! Callers render a line into a bounded buffer and push it into an
//! in-memory [`ByteRing`]; a background writer appends everything pending
//! to one file at a time, either every `flush_interval` or when
//! [`FlashLogger::flush`] is signalled. Many tiny writes become a few large
//! sequential ones.
//!
//! ```text
//!   log!() ──▶ ByteRing (lock) ──▶ writer task ──▶ file (file lock, append)
//!                     ▲                   ▲
//!                 10 ms wait        flush() / interval
//! ```
//!
//! Lock order: the ring lock is only ever taken briefly and never while the
//! caller holds anything else; the writer holds the file lock while it pops
//! entries, never the other way round.

pub mod ring;

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Condvar;

use crate::config::{LoggerConfig, TaskSpec};
use crate::drivers::task::spawn_task;
use crate::error::LoggerError;
use crate::ipc::BinarySemaphore;
use crate::sync::Guarded;

pub use ring::ByteRing;

/// Longest rendered entry; longer lines are cut.
pub const LINE_MAX: usize = 256;

const SEPARATOR: &[u8] = b"\n";

pub struct FlashLogger {
    ring: Guarded<ByteRing>,
    /// Rung by the writer after it frees ring space.
    space: Condvar,
    flush_signal: BinarySemaphore,
    /// Serialises every operation that touches the log file.
    file_lock: Guarded<()>,
    path: PathBuf,
    send_timeout: Duration,
    flush_interval: Duration,
    dropped: AtomicU32,
    started: AtomicBool,
}

impl FlashLogger {
    pub fn new(cfg: &LoggerConfig) -> Result<Self, LoggerError> {
        let ring = ByteRing::new(cfg.ring_bytes);
        if ring.max_item() == 0 {
            return Err(LoggerError::RingTooSmall);
        }
        Ok(Self {
            ring: Guarded::new(ring),
            space: Condvar::new(),
            flush_signal: BinarySemaphore::new(),
            file_lock: Guarded::new(()),
            path: PathBuf::from(&cfg.path),
            send_timeout: Duration::from_millis(u64::from(cfg.send_timeout_ms)),
            flush_interval: Duration::from_millis(u64::from(cfg.flush_interval_ms)),
            dropped: AtomicU32::new(0),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the background writer.
    pub fn start(self: &Arc<Self>, spec: &TaskSpec) -> Result<JoinHandle<()>, LoggerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("FlashLogger: already started");
            return Err(LoggerError::AlreadyStarted);
        }
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("FlashLogger: cannot create {}: {}", dir.display(), e);
            }
        }

        let logger = Arc::clone(self);
        let handle = spawn_task(spec, c"flash-log", move || logger.run()).map_err(|e| {
            self.started.store(false, Ordering::Release);
            error!("FlashLogger: {}", e);
            LoggerError::SpawnFailed
        })?;

        info!(
            "FlashLogger: logging to '{}', buffer {} B, flush every {} ms",
            self.path.display(),
            self.ring.with(|r| r.capacity()),
            self.flush_interval.as_millis()
        );
        Ok(handle)
    }

    /// Render and enqueue one entry. Never blocks longer than the send
    /// timeout; on failure the entry is dropped and counted.
    pub fn log(&self, args: fmt::Arguments<'_>) -> bool {
        let line = crate::util::render::<LINE_MAX>(args);
        if line.is_empty() {
            return false;
        }
        if self.push(line.as_bytes()) {
            return true;
        }
        let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("FlashLogger: ring buffer full, entry dropped ({} total)", n);
        false
    }

    fn push(&self, entry: &[u8]) -> bool {
        let deadline = Instant::now().checked_add(self.send_timeout);
        let mut ring = self.ring.lock();
        loop {
            if ring.push(entry) {
                return true;
            }
            if entry.len() > ring.max_item() {
                return false;
            }
            let timed_out = match deadline {
                Some(deadline) => self.space.wait_until(&mut ring, deadline).timed_out(),
                None => {
                    self.space.wait(&mut ring);
                    false
                }
            };
            if timed_out {
                return ring.push(entry);
            }
        }
    }

    /// Request an out-of-cycle write. Returns immediately.
    pub fn flush(&self) {
        self.flush_signal.give();
    }

    /// Append every pending entry to the log file. Returns how many were
    /// written; `0` if nothing was pending or the file could not be opened.
    pub fn write_pending(&self) -> usize {
        if self.ring.with(|r| r.is_empty()) {
            return 0;
        }

        let _file = self.file_lock.lock();
        let mut file = match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                error!(
                    "FlashLogger: cannot open '{}' for appending: {}",
                    self.path.display(),
                    e
                );
                return 0;
            }
        };

        let mut entry = Vec::with_capacity(LINE_MAX);
        let mut written = 0;
        let mut bytes = 0;
        loop {
            let popped = self.ring.with(|r| r.pop_into(&mut entry));
            if !popped {
                break;
            }
            self.space.notify_all();
            if let Err(e) = file
                .write_all(&entry)
                .and_then(|()| file.write_all(SEPARATOR))
            {
                error!("FlashLogger: write failed: {}", e);
                break;
            }
            written += 1;
            bytes += entry.len();
        }
        if let Err(e) = file.flush() {
            warn!("FlashLogger: flush failed: {}", e);
        }
        debug!("FlashLogger: {} entries, {} B written", written, bytes);
        written
    }

    /// Remove the log file, waiting for any in-flight write to finish.
    pub fn clear_log_file(&self) -> bool {
        let _file = self.file_lock.lock();
        if !self.path.exists() {
            return true;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("FlashLogger: '{}' cleared", self.path.display());
                true
            }
            Err(e) => {
                error!("FlashLogger: cannot clear '{}': {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn pending_bytes(&self) -> usize {
        self.ring.with(|r| r.pending_bytes())
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self) {
        loop {
            // Woken by flush() or by the interval; either way write out.
            let _ = self.flush_signal.take_timeout(self.flush_interval);
            self.write_pending();
        }
    }
}

/// Write a formatted entry to a [`FlashLogger`].
///
/// ```ignore
/// flash_log!(logger, "boot: firmware {}", VERSION);
/// ```
#[macro_export]
macro_rules! flash_log {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::core::format_args!($($arg)+))
    };
}
