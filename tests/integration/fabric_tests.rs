//! End-to-end tests of the task fabric: transport text in, worker
//! dispatch, replies, monitor ticks and pusher output.

use std::time::{Duration, Instant};

use serde_json::{Value, json};

use sysmgr::adapters::ble::BleState;
use sysmgr::app::ports::RadioEvent;
use sysmgr::drivers::watchdog::Watchdog;
use sysmgr::ipc::EventBits;
use sysmgr::ipc::channels::LOG_QUEUE_DEPTH;
use sysmgr::rpc::{self, Notification, Response, reply_channel};
use sysmgr::settings::{BLOB_KEY, NAMESPACE, SystemSettings, WifiMode};
use sysmgr::app::ports::StoragePort;
use sysmgr::tasks::dispatch::Dispatcher;
use sysmgr::tasks::{self, monitor, pusher, worker};
use sysmgr::util::bounded;

use crate::mocks::{Fixture, fixture};

/// Submit `text`, run one worker iteration and return the reply.
fn call(fx: &Fixture, text: &str) -> Response {
    let (tx, rx) = reply_channel();
    rpc::submit(fx.rt.channels, 1, text, Some(tx)).unwrap();
    let watchdog = Watchdog::new(fx.rt.config.watchdog_timeout_ms);
    assert!(worker::poll_once(&fx.rt, &Dispatcher::new(), &watchdog));
    rx.try_recv().expect("worker replied")
}

fn result(response: Response) -> Value {
    response.body.expect("successful reply")
}

fn next_state(fx: &Fixture) -> Value {
    let message = fx.rt.channels.states.try_recv().expect("state message queued");
    serde_json::from_str(&message).unwrap()
}

// ── Worker ────────────────────────────────────────────────────

#[test]
fn settings_get_returns_defaults_without_password() {
    let fx = fixture();
    let response = call(&fx, r#"{"id":1,"method":"settings.get"}"#);
    assert_eq!(response.id, Some(1));
    let body = result(response);
    assert_eq!(body["wifi"]["ssid"], "esp32s3");
    assert_eq!(body["wifi"]["mode"], 3);
    assert_eq!(body["bluetooth"]["deviceName"], "ESP32S3-Device");
    assert_eq!(body["debug"]["enabled"], true);
    assert!(body["wifi"].get("password").is_none());
}

#[test]
fn unknown_method_yields_structured_error() {
    let fx = fixture();
    let response = call(&fx, r#"{"id":9,"method":"no.such"}"#);
    let err = response.body.clone().unwrap_err();
    assert_eq!(err.code, rpc::METHOD_NOT_FOUND);
    let wire: Value = serde_json::from_str(&response.to_json()).unwrap();
    assert_eq!(wire["id"], 9);
    assert_eq!(wire["error"]["code"], -32601);
}

#[test]
fn save_wifi_requires_ssid() {
    let fx = fixture();
    let response = call(&fx, r#"{"id":2,"method":"settings.saveWiFi","params":{"password":"x"}}"#);
    let err = response.body.unwrap_err();
    assert_eq!(err.code, rpc::INVALID_PARAMS);
    assert_eq!(err.message, "Invalid params: missing ssid");
    assert!(!fx.rt.services.settings.is_dirty());
}

#[test]
fn save_wifi_rejects_bad_mode_and_static_ip() {
    let fx = fixture();
    let bad_mode = call(&fx, r#"{"method":"settings.saveWiFi","params":{"ssid":"A","mode":7}}"#);
    assert_eq!(bad_mode.body.unwrap_err().code, rpc::INVALID_PARAMS);

    let bad_ip = call(
        &fx,
        r#"{"method":"settings.saveWiFi","params":{"ssid":"A","staticIp":{"enabled":true,"ip":"10.0.0.300","subnet":"255.255.255.0","gateway":"10.0.0.1"}}}"#,
    );
    assert_eq!(bad_ip.body.unwrap_err().message, "Invalid params: staticIp");
    assert_eq!(fx.rt.services.settings.snapshot().wifi_ssid.as_str(), "esp32s3");
}

#[test]
fn save_wifi_marks_dirty_and_monitor_persists() {
    let fx = fixture();
    let body = result(call(
        &fx,
        r#"{"id":3,"method":"settings.saveWiFi","params":{"ssid":"Net1","password":"pass1234","mode":1}}"#,
    ));
    assert_eq!(body, json!({ "status": "success" }));

    let settings = &fx.rt.services.settings;
    assert!(settings.is_dirty());
    assert_eq!(settings.wifi_mode(), WifiMode::Sta);

    assert!(monitor::tick(&fx.rt));
    assert!(!settings.is_dirty());
    let blob = fx.storage.read_blob(NAMESPACE, BLOB_KEY).unwrap();
    let stored = SystemSettings::from_bytes(&blob).unwrap();
    assert_eq!(stored.wifi_ssid.as_str(), "Net1");
    assert_eq!(stored.wifi_password.as_str(), "pass1234");
}

#[test]
fn save_wifi_without_mode_keeps_current_mode() {
    let fx = fixture();
    result(call(&fx, r#"{"method":"settings.saveWiFi","params":{"ssid":"Lab"}}"#));
    let s = fx.rt.services.settings.snapshot();
    assert_eq!(s.wifi_ssid.as_str(), "Lab");
    assert_eq!(s.wifi_mode, WifiMode::ApSta);
}

#[test]
fn save_bluetooth_reapplies_radio() {
    let fx = fixture();
    assert_eq!(fx.ble.state(), BleState::Advertising);
    result(call(
        &fx,
        r#"{"method":"settings.saveBluetooth","params":{"deviceName":"Bench","enabled":false}}"#,
    ));
    assert_eq!(fx.ble.state(), BleState::Disabled);
    assert_eq!(fx.rt.services.settings.bluetooth_name().as_str(), "Bench");
}

#[test]
fn set_debug_requires_flag() {
    let fx = fixture();
    let err = call(&fx, r#"{"method":"settings.setDebug","params":{}}"#).body.unwrap_err();
    assert_eq!(err.message, "Invalid params: missing enabled");

    result(call(&fx, r#"{"method":"settings.setDebug","params":{"enabled":false}}"#));
    assert!(!fx.rt.services.settings.is_debug_enabled());
}

#[test]
fn idle_iteration_still_feeds_watchdog() {
    let fx = fixture();
    let watchdog = Watchdog::new(fx.rt.config.watchdog_timeout_ms);
    let dispatcher = Dispatcher::new();
    assert!(!worker::poll_once(&fx.rt, &dispatcher, &watchdog));
    assert!(!worker::poll_once(&fx.rt, &dispatcher, &watchdog));
    assert_eq!(watchdog.feeds(), 2);
}

#[test]
fn memory_method_reports_pools() {
    let fx = fixture();
    let body = result(call(&fx, r#"{"method":"system.memory"}"#));
    let pools = body["pools"].as_array().unwrap();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools[0]["name"], "Small_Pool");
    assert_eq!(pools[0]["block_count"], 4);
    assert_eq!(pools[1]["used"], 0);
}

#[test]
fn log_clear_removes_file() {
    let fx = fixture();
    let path = fx.rt.services.logger.path().to_path_buf();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "old\n").unwrap();

    let body = result(call(&fx, r#"{"method":"log.clear"}"#));
    assert_eq!(body["status"], "cleared");
    assert!(!path.exists());
    assert!(fx.dir.path().exists());
}

// ── Follow-ups ────────────────────────────────────────────────

#[test]
fn scan_publishes_result_after_reply() {
    let fx = fixture();
    let body = result(call(&fx, r#"{"id":4,"method":"wifi.scan"}"#));
    assert_eq!(body["status"], "scanning");

    let note = next_state(&fx);
    assert_eq!(note["method"], "wifi.scanResult");
    assert_eq!(note["params"][0], json!({ "ssid": "Office", "rssi": -52, "auth": 3 }));
    assert_eq!(note["params"].as_array().unwrap().len(), 2);
    assert!(fx.rt.channels.events.get().contains(EventBits::STATE_READY));
}

#[test]
fn reboot_replies_then_restarts() {
    let fx = fixture();
    let body = result(call(&fx, r#"{"id":5,"method":"system.reboot"}"#));
    assert_eq!(body["status"], "rebooting");
    assert_eq!(fx.system.restarts(), 1);
}

#[test]
fn reboot_persists_unsaved_settings_before_restart() {
    let fx = fixture();
    result(call(&fx, r#"{"method":"settings.saveWiFi","params":{"ssid":"Net1","mode":1}}"#));
    assert!(fx.rt.services.settings.is_dirty());

    // No monitor tick in between: only the reboot path can persist.
    result(call(&fx, r#"{"method":"system.reboot"}"#));

    let seen = fx.system.last_restart().expect("restart called");
    let stored = seen.stored.expect("settings blob present at restart");
    assert_eq!(stored.wifi_ssid.as_str(), "Net1");
    assert_eq!(stored.wifi_mode, WifiMode::Sta);
    assert!(!fx.rt.services.settings.is_dirty());
}

#[test]
fn reboot_drains_flash_log_before_restart() {
    let fx = fixture();
    result(call(&fx, r#"{"method":"system.reboot"}"#));

    let seen = fx.system.last_restart().expect("restart called");
    assert!(seen.log.contains("Received reboot command"), "log was {:?}", seen.log);
    assert_eq!(fx.rt.services.logger.pending_bytes(), 0);
}

#[test]
fn factory_reset_restart_sees_defaults_on_storage() {
    let fx = fixture();
    result(call(&fx, r#"{"method":"settings.saveBluetooth","params":{"deviceName":"Bench-7"}}"#));
    result(call(&fx, r#"{"method":"system.factoryReset"}"#));

    let seen = fx.system.last_restart().expect("restart called");
    assert_eq!(seen.stored, Some(SystemSettings::default()));
    assert!(seen.log.contains("Received factory reset command"));
}

#[test]
fn factory_reset_restores_and_persists_defaults() {
    let fx = fixture();
    result(call(&fx, r#"{"method":"settings.saveWiFi","params":{"ssid":"Net1","mode":1}}"#));
    monitor::tick(&fx.rt);

    let body = result(call(&fx, r#"{"method":"system.factoryReset"}"#));
    assert_eq!(body["status"], "resetting");
    assert_eq!(fx.system.restarts(), 1);

    let defaults = SystemSettings::default();
    assert_eq!(fx.rt.services.settings.snapshot(), defaults);
    assert!(!fx.rt.services.settings.is_dirty());
    let blob = fx.storage.read_blob(NAMESPACE, BLOB_KEY).unwrap();
    assert_eq!(SystemSettings::from_bytes(&blob), Some(defaults));
}

// ── Monitor ───────────────────────────────────────────────────

#[test]
fn monitor_tick_publishes_state_update() {
    let fx = fixture();
    fx.rt.channels.events.clear(EventBits::all());
    assert!(monitor::tick(&fx.rt));
    assert!(fx.rt.channels.events.get().contains(EventBits::STATE_READY));

    let note = next_state(&fx);
    assert_eq!(note["method"], monitor::STATE_METHOD);
    assert_eq!(note["params"]["uptime"], 42_000);
    assert_eq!(note["params"]["free_heap"], 150_000);
    assert_eq!(note["params"]["free_psram"], 4_000_000);
    assert_eq!(note["params"]["ble_state"], BleState::Advertising as i32);
}

#[test]
fn monitor_feeds_radio_events_before_publishing() {
    let fx = fixture();
    fx.rt
        .channels
        .radio_events
        .try_send(RadioEvent::BleClientConnected)
        .unwrap();
    assert!(monitor::tick(&fx.rt));
    assert_eq!(fx.ble.state(), BleState::Connected);
    assert!(fx.rt.channels.radio_events.is_empty());
    assert_eq!(next_state(&fx)["params"]["ble_state"], 3);
}

#[test]
fn monitor_drops_update_when_state_queue_full() {
    let fx = fixture();
    let states = &fx.rt.channels.states;
    while !states.is_full() {
        assert!(monitor::tick(&fx.rt));
    }
    assert!(!monitor::tick(&fx.rt));
    assert_eq!(states.len(), states.capacity());
}

// ── Pusher ────────────────────────────────────────────────────

fn queue_logs(fx: &Fixture, n: usize) {
    for i in 0..n {
        fx.rt.channels.logs.try_send(bounded(&format!("line {i}"))).unwrap();
    }
    fx.rt.channels.events.set(EventBits::LOG_READY);
}

#[test]
fn pusher_discards_everything_without_peers() {
    let fx = fixture();
    monitor::tick(&fx.rt);
    queue_logs(&fx, 3);

    let report = pusher::cycle(&fx.rt);
    assert_eq!(report.discarded, 4);
    assert!(report.woken_by.is_some());
    assert!(fx.transport.frames().is_empty());
    assert!(fx.rt.channels.states.is_empty());
    assert!(fx.rt.channels.logs.is_empty());
}

#[test]
fn pusher_sends_states_then_one_log_batch() {
    let fx = fixture();
    fx.transport.set_peers(1);
    let state = Notification::new("system.stateUpdate", json!({ "uptime": 1 }))
        .to_state_message()
        .unwrap();
    fx.rt.channels.states.try_send(state).unwrap();
    fx.rt.channels.events.set(EventBits::STATE_READY);
    queue_logs(&fx, 25);

    let report = pusher::cycle(&fx.rt);
    assert_eq!(report.states_sent, 1);
    assert_eq!(report.logs_sent, fx.rt.config.log_batch_max);

    let frames = fx.transport.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(fx.transport.frame_json(0)["method"], "system.stateUpdate");
    let batch = fx.transport.frame_json(1);
    assert_eq!(batch["method"], pusher::LOG_BATCH_METHOD);
    assert_eq!(batch["params"].as_array().unwrap().len(), 20);
    assert_eq!(batch["params"][0], json!({ "msg": "line 0" }));

    // Remainder goes out on the next cycle, even without a fresh signal.
    let report = pusher::cycle(&fx.rt);
    assert_eq!(report.woken_by, None);
    assert_eq!(report.logs_sent, 5);
    assert!(fx.rt.channels.logs.is_empty());
}

#[test]
fn pusher_times_out_quietly() {
    let fx = fixture();
    fx.transport.set_peers(2);
    fx.rt.channels.events.clear(EventBits::all());
    let report = pusher::cycle(&fx.rt);
    assert_eq!(report, pusher::CycleReport::default());
    assert!(fx.transport.frames().is_empty());
}

#[test]
fn log_queue_depth_bounds_a_burst() {
    let fx = fixture();
    queue_logs(&fx, LOG_QUEUE_DEPTH);
    assert!(fx.rt.channels.logs.try_send(bounded("overflow")).is_err());
}

// ── Whole fabric ──────────────────────────────────────────────

#[test]
fn spawned_tasks_serve_requests_and_stop_on_shutdown() {
    let fx = fixture();
    fx.transport.set_peers(1);
    let handles = tasks::spawn(&fx.rt).unwrap();

    let (tx, rx) = reply_channel();
    rpc::submit(fx.rt.channels, 7, r#"{"id":11,"method":"settings.get"}"#, Some(tx)).unwrap();
    let reply = rx.recv_timeout(Duration::from_secs(2)).expect("reply from worker");
    assert_eq!(reply.id, Some(11));
    assert!(reply.body.is_ok());

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut seen_state = false;
    while Instant::now() < deadline && !seen_state {
        seen_state = fx
            .transport
            .frames()
            .iter()
            .any(|f| f.contains(monitor::STATE_METHOD));
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(seen_state, "pusher forwarded a monitor update");

    fx.rt.shutdown();
    handles.join();
    assert!(!fx.rt.is_running());
}
