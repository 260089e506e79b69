//! Heart Rate Measurement (0x2A37) payload decoding
//! Only the measurement value is extracted; energy expended and RR intervals
//! that may follow it are ignored.

/// Flags bit 0: the value is a little-endian u16 instead of a u8
const FLAG_VALUE_U16: u8 = 1 << 0;

/// Decodes the heart rate in bpm, or `None` when the payload is too short
/// for the width its flags announce.
pub fn decode_heart_rate(payload: &[u8]) -> Option<u16> {
    let (&flags, rest) = payload.split_first()?;

    if flags & FLAG_VALUE_U16 == 0 {
        rest.first().map(|&bpm| u16::from(bpm))
    } else {
        match rest {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}
