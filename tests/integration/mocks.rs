//! Mock ports and a runtime fixture for integration tests.
//!
//! The transport records every frame it is asked to broadcast; the system
//! port counts restarts instead of resetting the process, and notes what
//! had reached storage and the log file at that moment.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use sysmgr::adapters::ble::BleManager;
use sysmgr::adapters::nvs::NvsAdapter;
use sysmgr::adapters::wifi::WifiManager;
use sysmgr::app::ports::{
    ScanPort, ScanRecord, StoragePort, SystemMetrics, SystemPort, Transport,
};
use sysmgr::config::{CoreConfig, LoggerConfig, PoolConfig};
use sysmgr::ipc::Channels;
use sysmgr::logger::FlashLogger;
use sysmgr::memory::{MemoryManager, PsramAllocator};
use sysmgr::settings::{BLOB_KEY, NAMESPACE, SettingsManager, SystemSettings};
use sysmgr::tasks::{Runtime, Services};
use sysmgr::util::bounded;

// ── Transport ─────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingTransport {
    peers: AtomicUsize,
    frames: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn set_peers(&self, n: usize) {
        self.peers.store(n, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn frame_json(&self, index: usize) -> serde_json::Value {
        serde_json::from_str(&self.frames.lock()[index]).unwrap()
    }
}

impl Transport for RecordingTransport {
    fn peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }

    fn broadcast(&self, text: &str) {
        self.frames.lock().push(text.to_owned());
    }
}

// ── System ────────────────────────────────────────────────────

/// What was durable when `restart()` was called.
#[derive(Debug, Clone)]
pub struct RestartView {
    pub stored: Option<SystemSettings>,
    pub log: String,
}

pub struct MockSystem {
    restarts: AtomicU32,
    storage: Arc<NvsAdapter>,
    log_path: PathBuf,
    views: Mutex<Vec<RestartView>>,
}

#[allow(dead_code)]
impl MockSystem {
    pub fn new(storage: Arc<NvsAdapter>, log_path: PathBuf) -> Self {
        Self {
            restarts: AtomicU32::new(0),
            storage,
            log_path,
            views: Mutex::new(Vec::new()),
        }
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn last_restart(&self) -> Option<RestartView> {
        self.views.lock().last().cloned()
    }
}

impl SystemPort for MockSystem {
    fn metrics(&self) -> SystemMetrics {
        SystemMetrics {
            uptime_ms: 42_000,
            free_heap: 150_000,
            free_psram: 4_000_000,
        }
    }

    fn restart(&self) {
        let stored = self
            .storage
            .read_blob(NAMESPACE, BLOB_KEY)
            .ok()
            .and_then(|blob| SystemSettings::from_bytes(&blob));
        let log = std::fs::read_to_string(&self.log_path).unwrap_or_default();
        self.views.lock().push(RestartView { stored, log });
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Scanner ───────────────────────────────────────────────────

pub struct FixedScanner;

impl ScanPort for FixedScanner {
    fn scan(&self) -> Vec<ScanRecord> {
        vec![
            ScanRecord { ssid: bounded("Office"), rssi: -52, auth: 3 },
            ScanRecord { ssid: bounded("Guest"), rssi: -77, auth: 0 },
        ]
    }
}

// ── Fixture ───────────────────────────────────────────────────

pub struct Fixture {
    pub rt: Arc<Runtime>,
    pub storage: Arc<NvsAdapter>,
    pub transport: Arc<RecordingTransport>,
    pub system: Arc<MockSystem>,
    pub ble: Arc<BleManager>,
    pub dir: TempDir,
}

/// Short timeouts and tiny pools so a test never waits long.
pub fn test_config(dir: &TempDir) -> CoreConfig {
    CoreConfig {
        watchdog_timeout_ms: 1_000,
        worker_recv_timeout_ms: 20,
        monitor_period_ms: 10,
        pusher_wait_ms: 10,
        state_enqueue_timeout_ms: 5,
        restart_grace_ms: 0,
        logger: LoggerConfig {
            path: dir.path().join("sys/system.log").display().to_string(),
            ring_bytes: 1024,
            flush_interval_ms: 20,
            send_timeout_ms: 5,
        },
        pools: vec![
            PoolConfig::new("Small_Pool", 64, 4),
            PoolConfig::new("Large_Pool", 512, 2),
        ],
        ..CoreConfig::default()
    }
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    config.validate().unwrap();

    let channels: &'static Channels = Box::leak(Box::new(Channels::new()));
    let storage = Arc::new(NvsAdapter::new().unwrap());
    let settings = Arc::new(SettingsManager::load(storage.clone()));

    let mut memory = MemoryManager::new();
    memory.init(&config.pools, &PsramAllocator).unwrap();

    let logger = Arc::new(FlashLogger::new(&config.logger).unwrap());
    let wifi = Arc::new(WifiManager::new(settings.clone()));
    let ble = Arc::new(BleManager::new(settings.clone()));
    ble.begin();

    let transport = Arc::new(RecordingTransport::default());
    let system = Arc::new(MockSystem::new(
        storage.clone(),
        PathBuf::from(&config.logger.path),
    ));

    let services = Services {
        settings,
        memory: Arc::new(memory),
        logger,
        wifi,
        ble: ble.clone(),
        scanner: Arc::new(FixedScanner),
        system: system.clone(),
        transport: transport.clone(),
    };

    Fixture {
        rt: Runtime::new(config, channels, services),
        storage,
        transport,
        system,
        ble,
        dir,
    }
}
