//! Management firmware: main entry point
//!
//! Brings the runtime core up in dependency order and hands control to
//! the task fabric.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter     WifiManager   BleManager   EspSystem           │
//! │  (Storage)      (Radio+Scan)  (Radio)      (System)            │
//! │  LogBridge      radio_events  Transport                        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  SettingsManager · MemoryManager · FlashLogger         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  worker (commands) · monitor (1 Hz) · pusher (notifications)   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_svc::log::EspLogger;
use log::{LevelFilter, info, warn};

use sysmgr::adapters::ble::BleManager;
use sysmgr::adapters::log_bridge::LogBridge;
use sysmgr::adapters::nvs::NvsAdapter;
use sysmgr::adapters::radio_events;
use sysmgr::adapters::system::EspSystem;
use sysmgr::adapters::wifi::{self, WifiManager};
use sysmgr::app::ports::{NullTransport, RadioPort};
use sysmgr::config::CoreConfig;
use sysmgr::diagnostics::FIRMWARE_VERSION;
use sysmgr::error::Error;
use sysmgr::flash_log;
use sysmgr::ipc::Channels;
use sysmgr::logger::FlashLogger;
use sysmgr::memory::{MemoryManager, PsramAllocator};
use sysmgr::settings::SettingsManager;
use sysmgr::tasks::{self, Runtime, Services};

static CHANNELS: Channels = Channels::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    LogBridge::new(EspLogger::new(), &CHANNELS, LevelFilter::Info).install()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  System Manager v{}                 ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    let config = CoreConfig::default();
    config.validate().map_err(Error::Config)?;

    // ── 2. Persistent settings ────────────────────────────────
    let nvs = NvsAdapter::new().map_err(Error::from)?;
    let settings = Arc::new(SettingsManager::load(Arc::new(nvs)));

    // ── 3. Memory pools ───────────────────────────────────────
    let mut memory = MemoryManager::new();
    if let Err(e) = memory.init(&config.pools, &PsramAllocator) {
        // Pools that did reserve stay usable.
        warn!("Boot: {}", e);
    }
    memory.log_status();
    let memory = Arc::new(memory);

    // ── 4. Flash logger ───────────────────────────────────────
    let logger = Arc::new(FlashLogger::new(&config.logger).map_err(Error::from)?);
    // The writer runs for the lifetime of the device; its handle is not needed.
    let _writer = logger.start(&config.flash_writer).map_err(Error::from)?;

    // ── 5. Radios ─────────────────────────────────────────────
    let wifi = Arc::new(WifiManager::new(Arc::clone(&settings)));
    let ble = Arc::new(BleManager::new(Arc::clone(&settings)));
    if !radio_events::install(&CHANNELS.radio_events) {
        warn!("Boot: radio event queue already installed");
    }
    if let Err(code) = wifi::register_driver_events() {
        warn!("Boot: WiFi event registration failed ({})", code);
    }
    ble.begin();
    wifi.apply_settings();

    // ── 6. Task fabric ────────────────────────────────────────
    let services = Services {
        settings,
        memory,
        logger: Arc::clone(&logger),
        wifi: Arc::clone(&wifi) as Arc<dyn RadioPort>,
        ble,
        scanner: wifi,
        system: Arc::new(EspSystem::new()),
        transport: Arc::new(NullTransport),
    };
    let rt = Runtime::new(config, &CHANNELS, services);
    let _handles = tasks::spawn(&rt)?;

    flash_log!(
        logger,
        "[Main] System booted successfully. Version: {}",
        FIRMWARE_VERSION
    );

    #[cfg(feature = "core-debug")]
    sysmgr::diagnostics::Report::collect(&rt).log();

    // ── 7. Park: everything else happens in the tasks ─────────
    loop {
        std::thread::park();
    }
}
