//! WiFi manager: a settings-driven state machine behind [`RadioPort`].
//!
//! The manager never owns configuration. [`RadioPort::apply_settings`]
//! re-reads the settings cache and converges the radio to it; driver
//! callbacks post [`RadioEvent`]s which the monitor task feeds back through
//! [`RadioPort::handle_event`], so all state changes happen on the monitor
//! (or worker) thread under one lock.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_wifi_*` calls on an already
//!   initialised driver, plus an event-loop handler that posts driver
//!   events through [`super::radio_events`].
//! - **all other targets**: simulation that only counts calls.
//!
//! ## Reconnection policy
//!
//! After a disconnect the station waits [`RECONNECT_INTERVAL`] before
//! retrying. Disconnects that look permanent (AP missing, auth failure)
//! count towards [`MAX_STA_RETRIES`]; reaching it parks the manager in
//! `FailedPermanently` until settings are applied again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::app::ports::{RadioEvent, RadioPort, ScanPort, ScanRecord};
use crate::settings::{SettingsManager, SystemSettings, WifiMode};
use crate::sync::Guarded;

/// Station retries allowed after permanent-looking failures.
pub const MAX_STA_RETRIES: u8 = 5;
/// Delay between a disconnect and the next connection attempt.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
/// SSID the soft-AP broadcasts.
pub const AP_SSID: &str = "ESP32S3-Device";

// Driver disconnect reasons treated as configuration problems.
const REASON_AUTH_EXPIRE: u8 = 2;
const REASON_NO_AP_FOUND: u8 = 201;
const REASON_AUTH_FAIL: u8 = 202;

fn is_permanent(reason: u8) -> bool {
    matches!(
        reason,
        REASON_AUTH_EXPIRE | REASON_NO_AP_FOUND | REASON_AUTH_FAIL
    )
}

/// Externally visible WiFi state. The discriminant is the numeric code
/// reported in state notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WifiState {
    Disabled = 0,
    Disconnected = 1,
    Connecting = 2,
    ConnectedSta = 3,
    HostingAp = 4,
    HostingApSta = 5,
    FailedPermanently = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Station {
    Off,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

struct Inner {
    station: Station,
    ap_up: bool,
    retries: u8,
    last_attempt: Instant,
    #[cfg(not(target_os = "espidf"))]
    sim: SimDriver,
}

impl Inner {
    fn state(&self) -> WifiState {
        match (self.station, self.ap_up) {
            (Station::Failed, _) => WifiState::FailedPermanently,
            (Station::Connected, true) => WifiState::HostingApSta,
            (Station::Connected, false) => WifiState::ConnectedSta,
            (Station::Connecting, _) => WifiState::Connecting,
            (Station::Disconnected, _) => WifiState::Disconnected,
            (Station::Off, true) => WifiState::HostingAp,
            (Station::Off, false) => WifiState::Disabled,
        }
    }
}

/// Simulation: records what the driver was asked to do.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimDriver {
    pub connects: u32,
    pub scans: u32,
    pub mode: u8,
}

pub struct WifiManager {
    settings: Arc<SettingsManager>,
    inner: Guarded<Inner>,
    reconnect_interval: Duration,
}

impl WifiManager {
    pub fn new(settings: Arc<SettingsManager>) -> Self {
        Self {
            settings,
            inner: Guarded::new(Inner {
                station: Station::Off,
                ap_up: false,
                retries: 0,
                last_attempt: Instant::now(),
                #[cfg(not(target_os = "espidf"))]
                sim: SimDriver::default(),
            }),
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn state(&self) -> WifiState {
        self.inner.with(|i| i.state())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_driver(&self) -> SimDriver {
        self.inner.with(|i| i.sim)
    }

    fn start_sta(inner: &mut Inner, settings: &SystemSettings) {
        if settings.wifi_ssid.is_empty() {
            warn!("WiFi: STA mode enabled, but no SSID configured");
            Self::stop_sta(inner);
            return;
        }
        info!("WiFi: STA connecting to '{}'", settings.wifi_ssid);
        let ip = &settings.wifi_static_ip;
        if ip.enabled {
            if is_ipv4(&ip.ip) && is_ipv4(&ip.subnet) && is_ipv4(&ip.gateway) {
                info!("WiFi: using static IP {}", ip.ip);
            } else {
                warn!("WiFi: invalid static IP configuration, falling back to DHCP");
            }
        }
        platform_connect(inner);
        inner.station = Station::Connecting;
        inner.last_attempt = Instant::now();
    }

    fn stop_sta(inner: &mut Inner) {
        if matches!(inner.station, Station::Connected | Station::Connecting) {
            platform_disconnect(inner);
        }
        inner.station = Station::Off;
    }
}

fn is_ipv4(s: &str) -> bool {
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

impl RadioPort for WifiManager {
    fn name(&self) -> &'static str {
        "wifi"
    }

    fn apply_settings(&self) {
        let settings = self.settings.snapshot();
        let mut inner = self.inner.lock();
        info!("WiFi: applying settings (mode {:?})", settings.wifi_mode);

        if inner.station == Station::Failed {
            inner.station = Station::Off;
        }
        inner.retries = 0;
        platform_set_mode(&mut inner, settings.wifi_mode);

        let want_sta = matches!(settings.wifi_mode, WifiMode::Sta | WifiMode::ApSta);
        let want_ap = matches!(settings.wifi_mode, WifiMode::Ap | WifiMode::ApSta);

        if want_sta {
            Self::start_sta(&mut inner, &settings);
        } else {
            Self::stop_sta(&mut inner);
        }

        if want_ap && !inner.ap_up {
            info!("WiFi: soft-AP '{}' up", AP_SSID);
        } else if !want_ap && inner.ap_up {
            info!("WiFi: soft-AP down");
        }
        inner.ap_up = want_ap;

        if inner.state() == WifiState::Disabled {
            info!("WiFi: disabled");
        }
    }

    fn update(&self) {
        let mut inner = self.inner.lock();
        if inner.station != Station::Disconnected
            || inner.last_attempt.elapsed() < self.reconnect_interval
        {
            return;
        }
        info!("WiFi: reconnect interval elapsed, retrying");
        platform_connect(&mut inner);
        inner.station = Station::Connecting;
        inner.last_attempt = Instant::now();
    }

    fn state_code(&self) -> i32 {
        self.state() as i32
    }

    fn handle_event(&self, event: RadioEvent) {
        let mut inner = self.inner.lock();
        match event {
            RadioEvent::WifiStaConnected => {
                info!("WiFi: STA associated, waiting for IP");
            }
            RadioEvent::WifiStaGotIp => {
                if inner.station == Station::Off {
                    return;
                }
                info!("WiFi: STA got IP");
                inner.retries = 0;
                inner.station = Station::Connected;
            }
            RadioEvent::WifiStaDisconnected { reason } => {
                if matches!(inner.station, Station::Off | Station::Failed) {
                    return;
                }
                warn!("WiFi: STA disconnected (reason {})", reason);
                if is_permanent(reason) {
                    inner.retries += 1;
                    warn!(
                        "WiFi: permanent-like failure, attempt {}/{}",
                        inner.retries, MAX_STA_RETRIES
                    );
                    if inner.retries >= MAX_STA_RETRIES {
                        error!("WiFi: max retries reached, giving up until reconfigured");
                        inner.station = Station::Failed;
                        return;
                    }
                }
                inner.station = Station::Disconnected;
                inner.last_attempt = Instant::now();
            }
            RadioEvent::BleClientConnected | RadioEvent::BleClientDisconnected => {}
        }
    }
}

impl ScanPort for WifiManager {
    fn scan(&self) -> Vec<ScanRecord> {
        let records = platform_scan(&self.inner);
        info!("WiFi: scan found {} network(s)", records.len());
        records
    }
}

// ── Platform-specific ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn platform_set_mode(_inner: &mut Inner, mode: WifiMode) {
    use esp_idf_svc::sys::*;
    let ret = unsafe { esp_wifi_set_mode(mode.code() as wifi_mode_t) };
    if ret != ESP_OK as i32 {
        error!("WiFi: esp_wifi_set_mode failed ({})", ret);
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_set_mode(inner: &mut Inner, mode: WifiMode) {
    inner.sim.mode = mode.code();
}

#[cfg(target_os = "espidf")]
fn platform_connect(_inner: &mut Inner) {
    let ret = unsafe { esp_idf_svc::sys::esp_wifi_connect() };
    if ret != esp_idf_svc::sys::ESP_OK as i32 {
        warn!("WiFi: esp_wifi_connect failed ({})", ret);
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_connect(inner: &mut Inner) {
    inner.sim.connects += 1;
}

#[cfg(target_os = "espidf")]
fn platform_disconnect(_inner: &mut Inner) {
    unsafe {
        esp_idf_svc::sys::esp_wifi_disconnect();
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_disconnect(_inner: &mut Inner) {
    info!("WiFi(sim): disconnected");
}

#[cfg(target_os = "espidf")]
fn platform_scan(_inner: &Guarded<Inner>) -> Vec<ScanRecord> {
    use esp_idf_svc::sys::*;
    unsafe {
        let ret = esp_wifi_scan_start(core::ptr::null(), true);
        if ret != ESP_OK as i32 {
            warn!("WiFi: scan start failed ({})", ret);
            return Vec::new();
        }
        let mut count: u16 = 0;
        esp_wifi_scan_get_ap_num(&mut count);
        let mut raw: Vec<wifi_ap_record_t> = (0..count).map(|_| core::mem::zeroed()).collect();
        let ret = esp_wifi_scan_get_ap_records(&mut count, raw.as_mut_ptr());
        if ret != ESP_OK as i32 {
            warn!("WiFi: reading scan records failed ({})", ret);
            return Vec::new();
        }
        raw.truncate(count as usize);
        raw.iter()
            .map(|ap| {
                let len = ap.ssid.iter().position(|&b| b == 0).unwrap_or(ap.ssid.len());
                let ssid = core::str::from_utf8(&ap.ssid[..len]).unwrap_or("");
                ScanRecord {
                    ssid: crate::util::bounded(ssid),
                    rssi: ap.rssi,
                    auth: ap.authmode as u8,
                }
            })
            .collect()
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_scan(inner: &Guarded<Inner>) -> Vec<ScanRecord> {
    use crate::util::bounded;
    inner.with(|i| i.sim.scans += 1);
    vec![
        ScanRecord { ssid: bounded("HomeNet"), rssi: -48, auth: 3 },
        ScanRecord { ssid: bounded("Cafe_Guest"), rssi: -71, auth: 0 },
        ScanRecord { ssid: bounded("Lab-5G"), rssi: -80, auth: 4 },
    ]
}

/// Hook the driver's event base into [`super::radio_events`].
#[cfg(target_os = "espidf")]
pub fn register_driver_events() -> Result<(), esp_idf_svc::sys::esp_err_t> {
    use esp_idf_svc::sys::*;
    unsafe {
        let ret = esp_event_handler_register(
            WIFI_EVENT,
            ESP_EVENT_ANY_ID,
            Some(on_driver_event),
            core::ptr::null_mut(),
        );
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        let ret = esp_event_handler_register(
            IP_EVENT,
            ip_event_t_IP_EVENT_STA_GOT_IP as i32,
            Some(on_driver_event),
            core::ptr::null_mut(),
        );
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_driver_event(
    _arg: *mut core::ffi::c_void,
    base: esp_idf_svc::sys::esp_event_base_t,
    id: i32,
    data: *mut core::ffi::c_void,
) {
    use esp_idf_svc::sys::*;
    let event = if base == unsafe { IP_EVENT } {
        RadioEvent::WifiStaGotIp
    } else if id == wifi_event_t_WIFI_EVENT_STA_CONNECTED as i32 {
        RadioEvent::WifiStaConnected
    } else if id == wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32 {
        let reason = if data.is_null() {
            0
        } else {
            unsafe { (*(data as *const wifi_event_sta_disconnected_t)).reason as u8 }
        };
        RadioEvent::WifiStaDisconnected { reason }
    } else {
        return;
    };
    super::radio_events::post(event);
}
