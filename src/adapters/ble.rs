//! BLE manager: advertising controlled by the settings cache.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid bring-up, GAP advertising, and a
//!   GATTS callback that posts client connect/disconnect through
//!   [`super::radio_events`].
//! - **all other targets**: simulation that counts advertising starts/stops.

use std::sync::Arc;

use log::{error, info};

use crate::app::ports::{RadioEvent, RadioPort};
use crate::settings::SettingsManager;
use crate::sync::Guarded;

/// The discriminant is the numeric code reported in state notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum BleState {
    /// Stack not brought up (or bring-up failed).
    Uninitialized = 0,
    Disabled = 1,
    Advertising = 2,
    Connected = 3,
}

/// Simulation: advertising calls seen by the "controller".
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimController {
    pub adv_starts: u32,
    pub adv_stops: u32,
    /// Make the next bring-up fail.
    pub fail_init: bool,
}

struct Inner {
    state: BleState,
    name: heapless::String<32>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimController,
}

pub struct BleManager {
    settings: Arc<SettingsManager>,
    inner: Guarded<Inner>,
}

impl BleManager {
    pub fn new(settings: Arc<SettingsManager>) -> Self {
        Self {
            settings,
            inner: Guarded::new(Inner {
                state: BleState::Uninitialized,
                name: heapless::String::new(),
                #[cfg(not(target_os = "espidf"))]
                sim: SimController::default(),
            }),
        }
    }

    /// Bring up the stack, then converge to the current settings.
    pub fn begin(&self) {
        let ok = self.inner.with(|inner| {
            if !platform_init(inner) {
                error!("BLE: stack bring-up failed");
                inner.state = BleState::Uninitialized;
                return false;
            }
            inner.state = BleState::Disabled;
            true
        });
        if ok {
            self.apply_settings();
        }
    }

    pub fn state(&self) -> BleState {
        self.inner.with(|i| i.state)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_controller(&self) -> SimController {
        self.inner.with(|i| i.sim)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_init(&self) {
        self.inner.with(|i| i.sim.fail_init = true);
    }

    fn start_advertising(inner: &mut Inner) {
        if inner.state == BleState::Advertising {
            return;
        }
        info!("BLE: advertising as '{}'", inner.name);
        if platform_start_advertising(inner) {
            inner.state = BleState::Advertising;
        } else {
            error!("BLE: failed to start advertising");
        }
    }

    fn stop_advertising(inner: &mut Inner) {
        if inner.state != BleState::Advertising {
            return;
        }
        info!("BLE: advertising stopped");
        platform_stop_advertising(inner);
        inner.state = BleState::Disabled;
    }

    fn set_name(inner: &mut Inner, name: &heapless::String<32>) {
        if name.is_empty() || inner.name == *name {
            return;
        }
        info!("BLE: device name '{}'", name);
        inner.name = name.clone();
        platform_set_name(inner);
        if inner.state == BleState::Advertising {
            platform_stop_advertising(inner);
            platform_start_advertising(inner);
        }
    }
}

impl RadioPort for BleManager {
    fn name(&self) -> &'static str {
        "ble"
    }

    fn apply_settings(&self) {
        let enabled = self.settings.bluetooth_enabled();
        let name = self.settings.bluetooth_name();
        let mut inner = self.inner.lock();
        if inner.state == BleState::Uninitialized {
            return;
        }
        Self::set_name(&mut inner, &name);
        if enabled {
            Self::start_advertising(&mut inner);
        } else {
            Self::stop_advertising(&mut inner);
        }
    }

    // The stack is event driven; nothing to poll.
    fn update(&self) {}

    fn state_code(&self) -> i32 {
        self.state() as i32
    }

    fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::BleClientConnected => {
                info!("BLE: client connected");
                self.inner.with(|i| i.state = BleState::Connected);
            }
            RadioEvent::BleClientDisconnected => {
                info!("BLE: client disconnected");
                let enabled = self.settings.bluetooth_enabled();
                let mut inner = self.inner.lock();
                if inner.state != BleState::Connected {
                    return;
                }
                // Advertising stops on connect; resume or settle as disabled.
                inner.state = BleState::Disabled;
                if enabled {
                    Self::start_advertising(&mut inner);
                }
            }
            _ => {}
        }
    }
}

// ── Platform-specific ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn platform_init(_inner: &mut Inner) -> bool {
    use esp_idf_svc::sys::*;
    unsafe {
        esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

        let mut bt_cfg = esp_bt_controller_config_t::default();
        let ret = esp_bt_controller_init(&mut bt_cfg);
        if ret != ESP_OK as i32 {
            error!("BLE: bt_controller_init failed ({})", ret);
            return false;
        }
        let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
        if ret != ESP_OK as i32 {
            error!("BLE: bt_controller_enable failed ({})", ret);
            return false;
        }
        let ret = esp_bluedroid_init();
        if ret != ESP_OK as i32 {
            error!("BLE: bluedroid_init failed ({})", ret);
            return false;
        }
        let ret = esp_bluedroid_enable();
        if ret != ESP_OK as i32 {
            error!("BLE: bluedroid_enable failed ({})", ret);
            return false;
        }
        esp_ble_gatts_register_callback(Some(on_gatts_event));
        esp_ble_gatts_app_register(0);
    }
    true
}

#[cfg(not(target_os = "espidf"))]
fn platform_init(inner: &mut Inner) -> bool {
    !core::mem::take(&mut inner.sim.fail_init)
}

#[cfg(target_os = "espidf")]
fn platform_set_name(inner: &mut Inner) {
    let mut c_name = [0u8; 33];
    c_name[..inner.name.len()].copy_from_slice(inner.name.as_bytes());
    unsafe {
        esp_idf_svc::sys::esp_ble_gap_set_device_name(c_name.as_ptr() as *const _);
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_set_name(_inner: &mut Inner) {}

#[cfg(target_os = "espidf")]
fn platform_start_advertising(_inner: &mut Inner) -> bool {
    use esp_idf_svc::sys::*;
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params) == ESP_OK as i32
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_start_advertising(inner: &mut Inner) -> bool {
    inner.sim.adv_starts += 1;
    true
}

#[cfg(target_os = "espidf")]
fn platform_stop_advertising(_inner: &mut Inner) {
    unsafe {
        esp_idf_svc::sys::esp_ble_gap_stop_advertising();
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_stop_advertising(inner: &mut Inner) {
    inner.sim.adv_stops += 1;
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_gatts_event(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    _gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            super::radio_events::post(RadioEvent::BleClientConnected);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            super::radio_events::post(RadioEvent::BleClientDisconnected);
        }
        _ => {}
    }
}
