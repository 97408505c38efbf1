//! ESP32 on-die temperature adapter.
//!
//! Implements [`ThermalPort`] for the bridge.
//!
//! - **`target_os = "espidf"`**: the original ESP32 has no IDF
//!   temperature-sensor driver, so this reads the ROM routine
//!   `temprature_sens_read` (spelling is the ROM's), which reports °F.
//!   A raw value of 128 means the sensor is not powered.
//! - **`not(target_os = "espidf")`**: returns whatever the test set.

use crate::app::ports::ThermalPort;

#[cfg(target_os = "espidf")]
unsafe extern "C" {
    fn temprature_sens_read() -> u8;
}

#[cfg(target_os = "espidf")]
const SENSOR_OFF: u8 = 128;

#[derive(Default)]
pub struct ChipThermometer {
    #[cfg(not(target_os = "espidf"))]
    reading: Option<f32>,
}

impl ChipThermometer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host simulation: the value the next read returns.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_reading(&mut self, celsius: Option<f32>) {
        self.reading = celsius;
    }
}

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn fahrenheit_to_celsius(f: f32) -> f32 {
    (f - 32.0) / 1.8
}

impl ThermalPort for ChipThermometer {
    #[cfg(target_os = "espidf")]
    fn read_celsius(&mut self) -> Option<f32> {
        // SAFETY: ROM routine with no arguments and no shared state.
        let raw = unsafe { temprature_sens_read() };
        (raw != SENSOR_OFF).then(|| fahrenheit_to_celsius(f32::from(raw)))
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_celsius(&mut self) -> Option<f32> {
        self.reading
    }
}
