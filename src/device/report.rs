use crate::device::constants::{REPORT_SIZE, SCALE_TENTHS, SIGN_NEGATIVE, UNITS_GRAMS};
use crate::device::types::{Reading, Units};
use crate::error::DeviceError;

/// Decode one input report.
///
/// Layout:
/// - `[0]` battery / status, not used
/// - `[1]` sign, `5` means negative
/// - `[2]` units, `2` means grams, anything else ounces
/// - `[3]` scale factor, `255` means the magnitude is in tenths
/// - `[4..6]` magnitude, u16 little-endian
pub fn decode(report: &[u8; REPORT_SIZE]) -> Reading {
    let sign = if report[1] == SIGN_NEGATIVE { -1.0_f64 } else { 1.0_f64 };
    let units = if report[2] == UNITS_GRAMS { Units::Grams } else { Units::Ounces };
    let divisor = if report[3] == SCALE_TENTHS { 10.0_f64 } else { 1.0_f64 };
    let magnitude = u16::from_le_bytes([report[4], report[5]]);

    Reading {
        units,
        weight: f64::from(magnitude) / divisor * sign,
    }
}

/// Decode the first REPORT_SIZE bytes of a packet as read from the endpoint.
pub fn decode_packet(packet: &[u8]) -> Result<Reading, DeviceError> {
    let report: &[u8; REPORT_SIZE] = packet
        .get(..REPORT_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(DeviceError::ShortReport { expected: REPORT_SIZE, actual: packet.len() })?;

    Ok(decode(report))
}
