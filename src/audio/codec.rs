//! # G.711 μ-law Codec
//!
//! Converts between 16-bit little-endian linear PCM and 8-bit μ-law samples,
//! the companded format used on the telephony leg of a call.
//!
//! ## Wire Compatibility:
//! The encoder clamps magnitudes to 13 bits, biases by 0x84 and stores the
//! one's complement of `sign | exponent | mantissa`. The telephony platform
//! expects exactly this byte layout, so the constants below must not drift.
//!
//! Both directions are pure and allocation-bounded: one output buffer per call.

use crate::error::BridgeError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Bias added to the magnitude before the segment search.
const BIAS: i32 = 0x84;

/// Largest magnitude the encoder represents (2^13 - 1). Louder samples saturate.
pub const CLIP: i32 = 0x1FFF;

/// Encode a single linear sample to a μ-law byte.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
    let magnitude = (sample as i32).abs().min(CLIP) + BIAS;

    // Scan from bit 14 down to bit 8; falling through leaves segment 0.
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let shift = if exponent > 0 { exponent as i32 + 3 } else { 4 };
    let mantissa = ((magnitude >> shift) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Decode a single μ-law byte to a linear sample.
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a buffer of 16-bit little-endian PCM into μ-law.
///
/// ## Returns:
/// - **Ok(Vec<u8>)**: one byte per input sample (half the input length)
/// - **Err(BridgeError::Format)**: the buffer does not hold whole 16-bit samples
pub fn encode(pcm: &[u8]) -> Result<Vec<u8>, BridgeError> {
    if pcm.len() % 2 != 0 {
        return Err(BridgeError::Format(format!(
            "PCM16 buffer length must be even, got {} bytes",
            pcm.len()
        )));
    }

    let mut cursor = Cursor::new(pcm);
    let mut encoded = Vec::with_capacity(pcm.len() / 2);

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        encoded.push(linear_to_ulaw(sample));
    }

    Ok(encoded)
}

/// Decode μ-law bytes into 16-bit little-endian PCM (twice the input length).
pub fn decode(ulaw: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(ulaw.len() * 2);

    for &byte in ulaw {
        // Writing into a Vec cannot fail.
        let _ = pcm.write_i16::<LittleEndian>(ulaw_to_linear(byte));
    }

    pcm
}
