//! Settings cache with dirty tracking and lazy persistence.
//!
//! The in-memory [`SystemSettings`] is the single source of truth. Setters
//! only mark it dirty when a value actually changes; the monitor task calls
//! [`SettingsManager::commit`] every tick, which writes the blob only when
//! dirty. Everything happens under one [`Guarded`] lock, and persistence is
//! the only blocking work done while holding it.

pub mod model;

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::error::SettingsError;
use crate::sync::Guarded;
use crate::util::bounded;

pub use model::{CURRENT_VERSION, StaticIp, SystemSettings, WifiMode};

/// Storage namespace holding the settings blob.
pub const NAMESPACE: &str = "sys_config";
/// Key of the settings blob.
pub const BLOB_KEY: &str = "settings_v1";

struct State {
    settings: SystemSettings,
    dirty: bool,
}

impl State {
    fn mark_dirty(&mut self) {
        if !self.dirty {
            debug!("Settings: marked dirty");
            self.dirty = true;
        }
    }

    fn load_defaults(&mut self) {
        info!("Settings: loading defaults");
        self.settings = SystemSettings::default();
        self.mark_dirty();
    }
}

pub struct SettingsManager {
    storage: Arc<dyn StoragePort>,
    state: Guarded<State>,
}

impl SettingsManager {
    /// Load the stored aggregate, falling back to (and persisting) the
    /// defaults if it is missing, malformed or from another schema version.
    pub fn load(storage: Arc<dyn StoragePort>) -> Self {
        let stored = match storage.read_blob(NAMESPACE, BLOB_KEY) {
            Ok(bytes) => {
                let decoded = SystemSettings::from_bytes(&bytes);
                if decoded.is_none() {
                    warn!(
                        "Settings: stored blob unusable (want v{}), restoring defaults",
                        CURRENT_VERSION
                    );
                }
                decoded
            }
            Err(StorageError::NotFound) => {
                warn!("Settings: nothing stored, restoring defaults");
                None
            }
            Err(e) => {
                warn!("Settings: read failed ({}), restoring defaults", e);
                None
            }
        };

        let manager = Self {
            storage,
            state: Guarded::new(State {
                settings: SystemSettings::default(),
                dirty: false,
            }),
        };

        match stored {
            Some(settings) => {
                info!("Settings: v{} loaded", settings.settings_version);
                manager.state.with(|s| s.settings = settings);
            }
            None => {
                let mut state = manager.state.lock();
                state.load_defaults();
                // A failed save leaves the flag set; the next commit retries.
                let _ = manager.save(&mut state);
            }
        }
        manager
    }

    fn save(&self, state: &mut State) -> Result<(), SettingsError> {
        state.settings.settings_version = CURRENT_VERSION;
        let bytes = state.settings.to_bytes().ok_or_else(|| {
            error!("Settings: encode failed");
            SettingsError::Encode
        })?;
        match self.storage.write_blob(NAMESPACE, BLOB_KEY, &bytes) {
            Ok(()) => {
                info!("Settings: committed ({} B)", bytes.len());
                state.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!("Settings: commit failed: {}", e);
                Err(SettingsError::Persist(e))
            }
        }
    }

    // ── Readers ────────────────────────────────────────────────────

    /// Consistent copy of the whole aggregate.
    pub fn snapshot(&self) -> SystemSettings {
        self.state.with(|s| s.settings.clone())
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.state.with(|s| s.settings.debug_mode_enabled)
    }

    pub fn wifi_mode(&self) -> WifiMode {
        self.state.with(|s| s.settings.wifi_mode)
    }

    pub fn bluetooth_enabled(&self) -> bool {
        self.state.with(|s| s.settings.bluetooth_enabled)
    }

    pub fn bluetooth_name(&self) -> heapless::String<32> {
        self.state.with(|s| s.settings.bluetooth_name.clone())
    }

    pub fn is_dirty(&self) -> bool {
        self.state.with(|s| s.dirty)
    }

    // ── Setters ────────────────────────────────────────────────────
    //
    // Values are cut to their field capacity before comparing, so writing
    // back an over-long value that was already stored truncated is a no-op.
    // Each setter returns whether anything changed.

    pub fn set_wifi_config(&self, ssid: &str, password: &str, mode: WifiMode) -> bool {
        let ssid = bounded(ssid);
        let password = bounded(password);
        self.state.with(|s| {
            let cur = &mut s.settings;
            if cur.wifi_ssid == ssid && cur.wifi_password == password && cur.wifi_mode == mode {
                return false;
            }
            cur.wifi_ssid = ssid;
            cur.wifi_password = password;
            cur.wifi_mode = mode;
            s.mark_dirty();
            true
        })
    }

    pub fn set_bluetooth_config(&self, enabled: bool, name: &str) -> bool {
        let name = bounded(name);
        self.state.with(|s| {
            let cur = &mut s.settings;
            if cur.bluetooth_enabled == enabled && cur.bluetooth_name == name {
                return false;
            }
            cur.bluetooth_enabled = enabled;
            cur.bluetooth_name = name;
            s.mark_dirty();
            true
        })
    }

    pub fn set_debug_mode(&self, enabled: bool) -> bool {
        self.state.with(|s| {
            if s.settings.debug_mode_enabled == enabled {
                return false;
            }
            s.settings.debug_mode_enabled = enabled;
            s.mark_dirty();
            true
        })
    }

    pub fn set_static_ip(&self, enabled: bool, ip: &str, subnet: &str, gateway: &str) -> bool {
        let proposed = StaticIp {
            enabled,
            ip: bounded(ip),
            subnet: bounded(subnet),
            gateway: bounded(gateway),
        };
        self.state.with(|s| {
            if s.settings.wifi_static_ip == proposed {
                return false;
            }
            s.settings.wifi_static_ip = proposed;
            s.mark_dirty();
            true
        })
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Persist if dirty. `Ok(false)` means there was nothing to do.
    pub fn commit(&self) -> Result<bool, SettingsError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(false);
        }
        self.save(&mut state).map(|()| true)
    }

    /// Persist unconditionally.
    pub fn force_save(&self) -> Result<(), SettingsError> {
        let mut state = self.state.lock();
        self.save(&mut state)
    }

    /// Erase the namespace, restore the defaults and persist them, all in
    /// one critical section.
    pub fn factory_reset(&self) -> Result<(), SettingsError> {
        let mut state = self.state.lock();
        warn!("Settings: factory reset");
        let erased = self.storage.erase_namespace(NAMESPACE);
        if let Err(e) = erased {
            error!("Settings: erase failed: {}", e);
        }
        state.load_defaults();
        self.save(&mut state)?;
        erased.map_err(SettingsError::Erase)
    }
}
