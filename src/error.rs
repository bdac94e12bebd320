//! Unified error types for the runtime core.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! boot sequence's error handling uniform. None of these ever cross a task
//! boundary: each component handles its own failures and callers only see
//! booleans, options or structured RPC errors.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Key/blob storage failed.
    Storage(StorageError),
    /// Memory pool setup or allocation failed.
    Pool(PoolError),
    /// Flash logger setup failed.
    Logger(LoggerError),
    /// Settings could not be persisted.
    Settings(SettingsError),
    /// A background task could not be created.
    Spawn(&'static str),
    /// Configuration is incoherent.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Pool(e) => write!(f, "pool: {e}"),
            Self::Logger(e) => write!(f, "logger: {e}"),
            Self::Settings(e) => write!(f, "settings: {e}"),
            Self::Spawn(name) => write!(f, "spawn: {name}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Memory pool errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// One or more pools could not reserve their backing region.
    /// The remaining pools are still usable.
    ReserveFailed { failed: usize },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveFailed { failed } => {
                write!(f, "{failed} pool(s) failed to reserve backing memory")
            }
        }
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

// ---------------------------------------------------------------------------
// Logger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerError {
    /// The ring buffer size is too small to hold a single entry.
    RingTooSmall,
    /// The background writer is already running.
    AlreadyStarted,
    /// The background writer thread could not be created.
    SpawnFailed,
}

impl fmt::Display for LoggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingTooSmall => write!(f, "ring buffer too small"),
            Self::AlreadyStarted => write!(f, "writer already started"),
            Self::SpawnFailed => write!(f, "writer task creation failed"),
        }
    }
}

impl From<LoggerError> for Error {
    fn from(e: LoggerError) -> Self {
        Self::Logger(e)
    }
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    /// The aggregate could not be encoded.
    Encode,
    /// The backing store rejected the write; the dirty flag stays set.
    Persist(StorageError),
    /// Erasing the namespace failed during factory reset.
    Erase(StorageError),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encode failed"),
            Self::Persist(e) => write!(f, "persist failed: {e}"),
            Self::Erase(e) => write!(f, "erase failed: {e}"),
        }
    }
}

impl From<SettingsError> for Error {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed_by_subsystem() {
        let e: Error = PoolError::ReserveFailed { failed: 2 }.into();
        assert_eq!(e.to_string(), "pool: 2 pool(s) failed to reserve backing memory");

        let e: Error = SettingsError::Persist(StorageError::IoError).into();
        assert_eq!(e.to_string(), "settings: persist failed: I/O error");
    }

    #[test]
    fn storage_errors_convert() {
        let e: Error = StorageError::NotFound.into();
        assert!(matches!(e, Error::Storage(StorageError::NotFound)));
    }
}
