use crate::{COMMAND_REPORT_ID, COMMAND_REPORT_SIZE, FEATURE_REPORT_SIZE};

/// Reset commands. Sent by the host to request a reset, and echoed by the device
/// right before it resets on its own.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum ResetKind {
    UserApp = 0xF0,
    Bootloader = 0xF1,
    SystemBootstrap = 0xFA,
}

impl TryFrom<u8> for ResetKind {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0xF0 => Ok(ResetKind::UserApp),
            0xF1 => Ok(ResetKind::Bootloader),
            0xFA => Ok(ResetKind::SystemBootstrap),
            other => Err(other),
        }
    }
}

impl From<ResetKind> for u8 {
    fn from(kind: ResetKind) -> Self {
        kind as u8
    }
}

pub fn build_reset_command(kind: ResetKind) -> [u8; COMMAND_REPORT_SIZE] {
    let mut buf = [0; COMMAND_REPORT_SIZE];
    buf[0] = COMMAND_REPORT_ID;
    buf[1] = kind.into();
    buf
}

/// Overwrites the interval field of a feature buffer, keeping the rest intact.
/// The buffer should be fetched from the device first (read-modify-write).
pub fn set_feature_interval(buf: &mut [u8; FEATURE_REPORT_SIZE], interval_ms: u32) {
    buf[0] = COMMAND_REPORT_ID;
    buf[1..5].copy_from_slice(&interval_ms.to_le_bytes());
}

/// A fresh feature buffer carrying only the interval. Prefer [`set_feature_interval`]
/// on a fetched buffer when talking to a real device.
pub fn build_interval_feature_request(interval_ms: u32) -> [u8; FEATURE_REPORT_SIZE] {
    let mut buf = [0; FEATURE_REPORT_SIZE];
    set_feature_interval(&mut buf, interval_ms);
    buf
}

/// `None` if the buffer is too short to hold the interval field
pub fn parse_interval_feature_response(buf: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = buf.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_roundtrip() {
        let buf = build_interval_feature_request(200);
        assert_eq!(buf[0], COMMAND_REPORT_ID);
        assert_eq!(parse_interval_feature_response(&buf), Some(200));
    }

    #[test]
    fn test_set_interval_preserves_other_bytes() {
        let mut buf = [0xAB; FEATURE_REPORT_SIZE];
        set_feature_interval(&mut buf, 0x0102_0304);
        assert_eq!(&buf[..5], &[COMMAND_REPORT_ID, 0x04, 0x03, 0x02, 0x01]);
        assert!(
            buf[5..].iter().all(|&b| b == 0xAB),
            "bytes past the interval field must survive"
        );
    }

    #[test]
    fn test_parse_short_buffer() {
        assert_eq!(parse_interval_feature_response(&[COMMAND_REPORT_ID, 1, 2]), None);
    }

    #[test]
    fn test_reset_command() {
        assert_eq!(
            build_reset_command(ResetKind::Bootloader),
            [COMMAND_REPORT_ID, 0xF1, 0, 0, 0, 0, 0]
        );
        assert_eq!(ResetKind::try_from(0xFA), Ok(ResetKind::SystemBootstrap));
        assert_eq!(ResetKind::try_from(0x10), Err(0x10));
    }
}
