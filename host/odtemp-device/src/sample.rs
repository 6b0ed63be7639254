use chrono::{DateTime, Local};
use odtemp_shared::Reading;
use parking_lot::Mutex;

/// Tracing target of measurement lines, so that the log sink can treat them apart
/// from diagnostics
pub const MEASUREMENT_TARGET: &str = "odtemp::measurement";

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    pub reading: Reading,
    pub timestamp: DateTime<Local>,
    /// Session generation at the time the sample was decoded
    pub generation: u64,
}

pub(crate) fn log_measurement(reading: &Reading) {
    match reading.humidity {
        Some(humidity) => tracing::info!(
            target: MEASUREMENT_TARGET,
            "Temperature: {:.2}°C, humidity: {:.2}%",
            reading.temperature,
            humidity
        ),
        None => tracing::info!(
            target: MEASUREMENT_TARGET,
            "Temperature: {:.2}°C",
            reading.temperature
        ),
    }
}

/// Latest reading, shared between the reader and the presenter poller
#[derive(Debug, Default)]
pub struct LiveCache {
    latest: Mutex<Option<Reading>>,
}

impl LiveCache {
    pub fn update(&self, reading: Reading) {
        *self.latest.lock() = Some(reading);
    }

    /// Temperature and humidity always come from the same report
    pub fn snapshot(&self) -> Option<Reading> {
        *self.latest.lock()
    }
}
