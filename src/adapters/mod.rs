//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                   |
//! |----------------|--------------------|-------------------------------|
//! | `ble`          | RadioPort          | Bluedroid GAP/GATTS           |
//! | `log_bridge`   | log::Log           | Console + log queue           |
//! | `nvs`          | StoragePort        | NVS / in-memory store         |
//! | `radio_events` |                    | Driver callbacks → monitor    |
//! | `system`       | SystemPort         | ESP32 timer, heap caps, reset |
//! | `wifi`         | RadioPort          | ESP-IDF WiFi STA/AP           |
//! |                | ScanPort           |                               |

pub mod ble;
pub mod log_bridge;
pub mod nvs;
pub mod radio_events;
pub mod system;
pub mod wifi;
