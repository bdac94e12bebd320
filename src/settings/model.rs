//! The persisted settings aggregate.

use serde::{Deserialize, Serialize};

use crate::util::bounded;

/// Schema version written with every save. Any other value on load means
/// the stored blob is discarded in favour of the defaults.
pub const CURRENT_VERSION: u32 = 1;

/// WiFi radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WifiMode {
    Off = 0,
    Sta = 1,
    Ap = 2,
    #[default]
    ApSta = 3,
}

impl WifiMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Sta),
            2 => Some(Self::Ap),
            3 => Some(Self::ApSta),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Static IPv4 addressing, each field a dotted quad.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticIp {
    pub enabled: bool,
    pub ip: heapless::String<15>,
    pub subnet: heapless::String<15>,
    pub gateway: heapless::String<15>,
}

/// Every user-configurable value, persisted as one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub settings_version: u32,

    // --- WiFi ---
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,
    pub wifi_mode: WifiMode,
    pub wifi_static_ip: StaticIp,

    // --- Bluetooth ---
    pub bluetooth_enabled: bool,
    pub bluetooth_name: heapless::String<32>,

    // --- Debug ---
    pub debug_mode_enabled: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            settings_version: CURRENT_VERSION,

            wifi_ssid: bounded("esp32s3"),
            wifi_password: bounded("12345678"),
            wifi_mode: WifiMode::ApSta,
            wifi_static_ip: StaticIp::default(),

            bluetooth_enabled: true,
            bluetooth_name: bounded("ESP32S3-Device"),

            debug_mode_enabled: true,
        }
    }
}

impl SystemSettings {
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        postcard::to_allocvec(self).ok()
    }

    /// Decode a stored blob. `None` if it is malformed or from another
    /// schema version.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (settings, rest): (Self, _) = postcard::take_from_bytes(bytes).ok()?;
        if !rest.is_empty() || settings.settings_version != CURRENT_VERSION {
            return None;
        }
        Some(settings)
    }
}
