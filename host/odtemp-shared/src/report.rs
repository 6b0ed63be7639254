use crate::{
    COMMAND_REPORT_ID, DATA_REPORT_ID, EVENT_REPORT_ID, FIRMWARE_REPORT_ID, UUID_REPORT_ID,
};

/// Fixed point scale used by the firmware for both temperature and humidity
const FIXED_POINT_SCALE: f64 = 100.0;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ReportError {
    #[error("Empty report")]
    Empty,
    #[error("Report {id} is too short to decode ({len} payload bytes)")]
    Malformed { id: u8, len: usize },
}

/// A single decoded measurement
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    /// `None` for temperature-only devices
    pub humidity: Option<f64>,
}

impl Reading {
    pub fn humidity_present(&self) -> bool {
        self.humidity.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report<'a> {
    Data(Reading),
    Event,
    /// `None` when the declared length is zero or doesn't fit into the report
    Firmware(Option<String>),
    Command { code: u8, args: &'a [u8] },
    Uuid(&'a [u8]),
    Unknown(u8),
}

impl<'a> Report<'a> {
    /// Classifies a raw input report, `bytes[0]` being the report id.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ReportError> {
        let (&id, payload) = bytes.split_first().ok_or(ReportError::Empty)?;
        let malformed = || ReportError::Malformed {
            id,
            len: payload.len(),
        };

        match id {
            DATA_REPORT_ID => decode_data(payload).map(Report::Data).ok_or_else(malformed),
            EVENT_REPORT_ID => Ok(Report::Event),
            FIRMWARE_REPORT_ID => Ok(Report::Firmware(decode_firmware_version(payload))),
            COMMAND_REPORT_ID => {
                let (&code, args) = payload.split_first().ok_or_else(malformed)?;
                Ok(Report::Command { code, args })
            }
            UUID_REPORT_ID => Ok(Report::Uuid(payload)),
            other => Ok(Report::Unknown(other)),
        }
    }
}

fn fixed_point(bytes: &[u8]) -> Option<f64> {
    let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(i16::from_le_bytes(raw) as f64 / FIXED_POINT_SCALE)
}

/// Decodes the payload of a data report (report id already stripped).
/// Returns `None` only when the payload is shorter than 2 bytes.
pub fn decode_data(payload: &[u8]) -> Option<Reading> {
    let temperature = fixed_point(payload)?;
    let humidity = payload.get(2..).and_then(fixed_point);

    Some(Reading {
        temperature,
        humidity,
    })
}

/// Decodes a length-prefixed version string (report id already stripped).
/// An empty version is treated like a length mismatch.
pub fn decode_firmware_version(payload: &[u8]) -> Option<String> {
    let (&len, rest) = payload.split_first()?;
    if len == 0 {
        return None;
    }
    let version = rest.get(..len as usize)?;
    Some(String::from_utf8_lossy(version).into_owned())
}
