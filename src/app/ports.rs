//! Port traits: the hexagonal boundary between the runtime core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ tasks / managers (core)
//! ```
//!
//! Everything the core treats as an external collaborator (key/blob store,
//! chip probes, radio stacks, the HTTP/WebSocket transport) is reached
//! through one of these traits. All ports are shared between tasks, so
//! every method takes `&self` and implementations are `Send + Sync`.
//!
//! ## Notes
//!
//! - **StoragePort** writes MUST be atomic per blob; a reader never sees a
//!   half-written aggregate.
//! - **RadioPort** implementations never mutate shared state from a driver
//!   callback. Callbacks push a [`RadioEvent`] into the IPC fabric and the
//!   monitor task feeds it back through [`RadioPort::handle_event`].

use serde::Serialize;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: core ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Namespaced key/blob persistence.
pub trait StoragePort: Send + Sync {
    /// Read a whole blob.
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a blob atomically, replacing any previous value.
    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Erase every key in a namespace. Succeeds if the namespace is empty.
    fn erase_namespace(&self, namespace: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: core → chip)
// ───────────────────────────────────────────────────────────────

/// Volatile chip metrics sampled by the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemMetrics {
    pub uptime_ms: u64,
    pub free_heap: u32,
    pub free_psram: u32,
}

pub trait SystemPort: Send + Sync {
    fn metrics(&self) -> SystemMetrics;

    /// Restart the chip. Does not return on hardware.
    fn restart(&self);
}

// ───────────────────────────────────────────────────────────────
// Radio ports (driven adapters: core ↔ WiFi / BLE managers)
// ───────────────────────────────────────────────────────────────

/// Driver-level occurrences forwarded from callback context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    WifiStaConnected,
    WifiStaGotIp,
    WifiStaDisconnected { reason: u8 },
    BleClientConnected,
    BleClientDisconnected,
}

/// A configuration-driven radio state machine.
pub trait RadioPort: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Re-read the settings cache and converge to it.
    fn apply_settings(&self);

    /// Periodic housekeeping (reconnect timers and the like).
    fn update(&self);

    /// Numeric state reported in the state notification.
    fn state_code(&self) -> i32;

    /// Consume a driver event. Events for other radios are ignored.
    fn handle_event(&self, event: RadioEvent);
}

/// One access point found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    pub ssid: heapless::String<32>,
    pub rssi: i8,
    pub auth: u8,
}

/// Blocking network scan.
pub trait ScanPort: Send + Sync {
    fn scan(&self) -> Vec<ScanRecord>;
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: core → WebSocket peers)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the HTTP/WebSocket layer.
pub trait Transport: Send + Sync {
    /// Number of attached peers.
    fn peer_count(&self) -> usize;

    /// Send one text frame to every attached peer.
    fn broadcast(&self, text: &str);
}

/// A transport with no peers. Used until the web server is wired up.
pub struct NullTransport;

impl Transport for NullTransport {
    fn peer_count(&self) -> usize {
        0
    }

    fn broadcast(&self, _text: &str) {}
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Namespace or key name is not accepted by the backend.
    InvalidName,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidName => write!(f, "invalid namespace or key"),
        }
    }
}
