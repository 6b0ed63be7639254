mod command;
mod report;

pub use crate::command::{
    build_interval_feature_request, build_reset_command, parse_interval_feature_response,
    set_feature_interval, ResetKind,
};
pub use crate::report::{decode_data, decode_firmware_version, Reading, Report, ReportError};

// VID/PID pair of the sensor (STM32 vendor id)
pub const USB_VID: u16 = 0x0483;
pub const USB_PID: u16 = 0xA26A;

pub const DATA_REPORT_ID: u8 = 1;
pub const EVENT_REPORT_ID: u8 = 2;
pub const FIRMWARE_REPORT_ID: u8 = 3;
/// Also used as the tag of the feature report carrying the sampling interval
pub const COMMAND_REPORT_ID: u8 = 4;
pub const UUID_REPORT_ID: u8 = 5;

/// Outbound command buffer: tag + command + reserved padding
pub const COMMAND_REPORT_SIZE: usize = 7;
pub const FEATURE_REPORT_SIZE: usize = 64;
/// Largest input report the device sends, tag included
pub const MAX_REPORT_SIZE: usize = 64;

// The device clamps anything faster than this anyway
pub const MIN_SAMPLING_INTERVAL_MS: u32 = 200;
