//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements         | Connects to                   |
//! |------------|--------------------|-------------------------------|
//! | `spp`      | SerialLink         | Bluedroid SPP / simulated bar |
//! | `time`     | TimePort           | ESP32 system timer            |
//! | `nvs`      | PersistencePort    | NVS / in-memory store         |
//! | `log_sink` | EventSink          | Serial log output             |
//! | `mqtt`     | EventSink          | MQTT broker (ESP-IDF client)  |
//! | `thermal`  | ThermalPort        | ESP32 on-die sensor           |
//! | `wifi`     | ConnectivityPort   | ESP-IDF WiFi STA              |

pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod spp;
pub mod thermal;
pub mod time;
pub mod wifi;
