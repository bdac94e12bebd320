//! Settings cache lifecycle against the simulated NVS backend: first boot,
//! edit, lazy commit, reload and factory reset.

use std::sync::Arc;

use sysmgr::adapters::nvs::NvsAdapter;
use sysmgr::app::ports::StoragePort;
use sysmgr::settings::{BLOB_KEY, NAMESPACE, SettingsManager, SystemSettings, WifiMode};

fn stored(storage: &NvsAdapter) -> SystemSettings {
    let blob = storage.read_blob(NAMESPACE, BLOB_KEY).unwrap();
    SystemSettings::from_bytes(&blob).unwrap()
}

#[test]
fn first_boot_persists_defaults() {
    let storage = Arc::new(NvsAdapter::new().unwrap());
    assert!(!storage.exists(NAMESPACE, BLOB_KEY));

    let settings = SettingsManager::load(storage.clone());
    assert!(!settings.is_dirty());
    assert_eq!(stored(&storage), SystemSettings::default());
}

#[test]
fn edit_commit_reset_cycle() {
    let storage = Arc::new(NvsAdapter::new().unwrap());
    let settings = SettingsManager::load(storage.clone());

    assert!(settings.set_wifi_config("Net1", "pass1234", WifiMode::Sta));
    assert!(settings.is_dirty());
    // Nothing reaches storage until commit.
    assert_eq!(stored(&storage).wifi_ssid.as_str(), "esp32s3");

    assert_eq!(settings.commit(), Ok(true));
    assert!(!settings.is_dirty());
    assert_eq!(stored(&storage).wifi_ssid.as_str(), "Net1");
    assert_eq!(settings.commit(), Ok(false));

    // Same values again: not dirty.
    assert!(!settings.set_wifi_config("Net1", "pass1234", WifiMode::Sta));
    assert!(!settings.is_dirty());

    assert_eq!(settings.factory_reset(), Ok(()));
    assert_eq!(settings.snapshot(), SystemSettings::default());
    assert_eq!(stored(&storage), SystemSettings::default());
}

#[test]
fn reload_sees_committed_values() {
    let storage = Arc::new(NvsAdapter::new().unwrap());
    {
        let settings = SettingsManager::load(storage.clone());
        settings.set_bluetooth_config(false, "Bench-7");
        settings.set_static_ip(true, "192.168.4.10", "255.255.255.0", "192.168.4.1");
        settings.commit().unwrap();
    }

    let reloaded = SettingsManager::load(storage.clone()).snapshot();
    assert!(!reloaded.bluetooth_enabled);
    assert_eq!(reloaded.bluetooth_name.as_str(), "Bench-7");
    assert!(reloaded.wifi_static_ip.enabled);
    assert_eq!(reloaded.wifi_static_ip.gateway.as_str(), "192.168.4.1");
}

#[test]
fn foreign_schema_version_is_replaced() {
    let storage = Arc::new(NvsAdapter::new().unwrap());
    let future = SystemSettings {
        settings_version: 9,
        wifi_ssid: sysmgr::util::bounded("FromTheFuture"),
        ..SystemSettings::default()
    };
    let bytes = postcard::to_allocvec(&future).unwrap();
    storage.write_blob(NAMESPACE, BLOB_KEY, &bytes).unwrap();

    let settings = SettingsManager::load(storage.clone());
    assert_eq!(settings.snapshot(), SystemSettings::default());
    assert_eq!(stored(&storage).settings_version, 1);
}

#[test]
fn truncated_blob_is_replaced() {
    let storage = Arc::new(NvsAdapter::new().unwrap());
    storage.write_blob(NAMESPACE, BLOB_KEY, &[1, 2]).unwrap();
    let settings = SettingsManager::load(storage.clone());
    assert_eq!(settings.snapshot().wifi_ssid.as_str(), "esp32s3");
    assert_eq!(stored(&storage), SystemSettings::default());
}
