//! Method table for the worker.
//!
//! Built once at startup: method name → handler. A handler validates its
//! params, performs the mutation, and returns the reply body plus an
//! optional follow-up that the worker runs *after* replying (restart,
//! factory reset, scan).

use std::net::Ipv4Addr;

use heapless::FnvIndexMap;
use log::{info, warn};
use serde_json::{Value, json};

use crate::flash_log;
use crate::ipc::EventBits;
use crate::rpc::{Notification, RpcError};
use crate::settings::WifiMode;

use super::Runtime;

/// Work that must wait until the reply has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Restart,
    FactoryReset,
    Scan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Value,
    pub then: Option<FollowUp>,
}

impl Outcome {
    fn reply(result: Value) -> Self {
        Self { result, then: None }
    }

    fn reply_then(result: Value, then: FollowUp) -> Self {
        Self {
            result,
            then: Some(then),
        }
    }
}

type Handler = fn(&Runtime, &Value) -> Result<Outcome, RpcError>;

const TABLE_SIZE: usize = 16;

pub struct Dispatcher {
    table: FnvIndexMap<&'static str, Handler, TABLE_SIZE>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut d = Self {
            table: FnvIndexMap::new(),
        };
        d.register("settings.get", settings_get);
        d.register("settings.saveWiFi", settings_save_wifi);
        d.register("settings.saveBluetooth", settings_save_bluetooth);
        d.register("settings.setDebug", settings_set_debug);
        d.register("wifi.scan", wifi_scan);
        d.register("system.reboot", system_reboot);
        d.register("system.factoryReset", system_factory_reset);
        d.register("system.memory", system_memory);
        d.register("log.clear", log_clear);
        #[cfg(feature = "core-debug")]
        d.register("debug.runDiagnostics", debug_run_diagnostics);
        d
    }

    fn register(&mut self, method: &'static str, handler: Handler) {
        if self.table.insert(method, handler).is_err() {
            warn!("Dispatch: table full, '{}' not registered", method);
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    pub fn dispatch(&self, rt: &Runtime, method: &str, params: &Value) -> Result<Outcome, RpcError> {
        let handler = self.table.get(method).ok_or_else(RpcError::method_not_found)?;
        handler(rt, params)
    }
}

// ---------------------------------------------------------------------------
// Param helpers
// ---------------------------------------------------------------------------

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("Invalid params: missing {key}")))
}

fn optional_str<'a>(params: &'a Value, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or("")
}

fn status(s: &str) -> Value {
    json!({ "status": s })
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn settings_get(rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    let s = rt.services.settings.snapshot();
    Ok(Outcome::reply(json!({
        "wifi": {
            "ssid": s.wifi_ssid.as_str(),
            "mode": s.wifi_mode.code(),
            "staticIp": {
                "enabled": s.wifi_static_ip.enabled,
                "ip": s.wifi_static_ip.ip.as_str(),
                "subnet": s.wifi_static_ip.subnet.as_str(),
                "gateway": s.wifi_static_ip.gateway.as_str(),
            },
        },
        "bluetooth": {
            "deviceName": s.bluetooth_name.as_str(),
            "enabled": s.bluetooth_enabled,
        },
        "debug": { "enabled": s.debug_mode_enabled },
    })))
}

struct StaticIpParams<'a> {
    enabled: bool,
    ip: &'a str,
    subnet: &'a str,
    gateway: &'a str,
}

fn parse_static_ip(value: &Value) -> Result<StaticIpParams<'_>, RpcError> {
    let invalid = || RpcError::invalid_params("Invalid params: staticIp");
    if !value.is_object() {
        return Err(invalid());
    }
    let parsed = StaticIpParams {
        enabled: value.get("enabled").and_then(Value::as_bool).unwrap_or(false),
        ip: optional_str(value, "ip"),
        subnet: optional_str(value, "subnet"),
        gateway: optional_str(value, "gateway"),
    };
    if parsed.enabled
        && [parsed.ip, parsed.subnet, parsed.gateway]
            .iter()
            .any(|a| a.parse::<Ipv4Addr>().is_err())
    {
        return Err(invalid());
    }
    Ok(parsed)
}

fn settings_save_wifi(rt: &Runtime, params: &Value) -> Result<Outcome, RpcError> {
    let settings = &rt.services.settings;
    let ssid = required_str(params, "ssid")?;
    let password = optional_str(params, "password");
    let mode = match params.get("mode") {
        None | Some(Value::Null) => settings.wifi_mode(),
        Some(v) => v
            .as_i64()
            .and_then(WifiMode::from_code)
            .ok_or_else(|| RpcError::invalid_params("Invalid params: mode must be 0-3"))?,
    };
    let static_ip = match params.get("staticIp") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_static_ip(v)?),
    };

    if let Some(ip) = static_ip {
        settings.set_static_ip(ip.enabled, ip.ip, ip.subnet, ip.gateway);
    }
    settings.set_wifi_config(ssid, password, mode);
    rt.services.wifi.apply_settings();
    Ok(Outcome::reply(status("success")))
}

fn settings_save_bluetooth(rt: &Runtime, params: &Value) -> Result<Outcome, RpcError> {
    let name = required_str(params, "deviceName")?;
    let enabled = params.get("enabled").and_then(Value::as_bool).unwrap_or(false);
    rt.services.settings.set_bluetooth_config(enabled, name);
    rt.services.ble.apply_settings();
    Ok(Outcome::reply(status("success")))
}

fn settings_set_debug(rt: &Runtime, params: &Value) -> Result<Outcome, RpcError> {
    let enabled = params
        .get("enabled")
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::invalid_params("Invalid params: missing enabled"))?;
    rt.services.settings.set_debug_mode(enabled);
    Ok(Outcome::reply(status("success")))
}

// ---------------------------------------------------------------------------
// WiFi / system / log
// ---------------------------------------------------------------------------

fn wifi_scan(_rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    Ok(Outcome::reply_then(status("scanning"), FollowUp::Scan))
}

fn system_reboot(_rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    Ok(Outcome::reply_then(status("rebooting"), FollowUp::Restart))
}

fn system_factory_reset(_rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    Ok(Outcome::reply_then(status("resetting"), FollowUp::FactoryReset))
}

fn system_memory(rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    let pools = serde_json::to_value(rt.services.memory.stats())
        .map_err(|_| RpcError::internal("Failed to encode pool stats"))?;
    Ok(Outcome::reply(json!({ "pools": pools })))
}

fn log_clear(rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    if rt.services.logger.clear_log_file() {
        Ok(Outcome::reply(status("cleared")))
    } else {
        Err(RpcError::internal("Failed to clear log file"))
    }
}

#[cfg(feature = "core-debug")]
fn debug_run_diagnostics(rt: &Runtime, _params: &Value) -> Result<Outcome, RpcError> {
    info!("Worker: running diagnostics");
    crate::diagnostics::Report::collect(rt).log();
    Ok(Outcome::reply(status("completed")))
}

// ---------------------------------------------------------------------------
// Follow-ups
// ---------------------------------------------------------------------------

/// Run the deferred part of a command. `Restart` and `FactoryReset` do not
/// return on hardware.
pub fn follow_up(rt: &Runtime, action: FollowUp) {
    let svc = &rt.services;
    match action {
        FollowUp::Restart => {
            flash_log!(svc.logger, "[Worker] Received reboot command. Restarting...");
            restart(rt);
        }
        FollowUp::FactoryReset => {
            flash_log!(svc.logger, "[Worker] Received factory reset command. Resetting...");
            if let Err(e) = svc.settings.factory_reset() {
                warn!("Worker: factory reset incomplete: {}", e);
            }
            restart(rt);
        }
        FollowUp::Scan => publish_scan(rt),
    }
}

/// Persist settings, drain the flash log, then restart. A failed save is
/// logged and does not stop the restart.
fn restart(rt: &Runtime) {
    let svc = &rt.services;
    if let Err(e) = svc.settings.force_save() {
        flash_log!(svc.logger, "[Worker] Settings not saved before restart: {}", e);
    }
    svc.logger.write_pending();
    std::thread::sleep(Runtime::millis(rt.config.restart_grace_ms));
    svc.system.restart();
}

fn publish_scan(rt: &Runtime) {
    let mut records = rt.services.scanner.scan();
    info!("Worker: scan finished, {} network(s)", records.len());

    // Keep as many records as fit in one state message.
    let message = loop {
        let params = serde_json::to_value(&records).unwrap_or(Value::Array(Vec::new()));
        if let Some(m) = Notification::new("wifi.scanResult", params).to_state_message() {
            break m;
        }
        if records.pop().is_none() {
            warn!("Worker: scan result does not fit a state message");
            return;
        }
    };

    let ch = rt.channels;
    if ch.states.try_send(message).is_ok() {
        ch.events.set(EventBits::STATE_READY);
    } else {
        warn!("Worker: state queue full, scan result dropped");
    }
}
