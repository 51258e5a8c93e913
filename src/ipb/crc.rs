//! # IPB Checksum
//!
//! 16-bit CRC used to seal both the header and the body of every IPB frame.
//!
//! **Polynomial**: 0x11021 (x^16 + x^12 + x^5 + 1)
//! **Initial Value**: 0x1021
//! **Reflection**: none (MSB first), no final XOR

/// Generator polynomial without the implicit x^16 term
const CRC16_POLY: u16 = 0x1021;

/// Register value before the first byte is shifted in
pub const CRC16_INIT: u16 = 0x1021;

/// Precomputed CRC16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the IPB checksum using the lookup table
///
/// # Arguments
///
/// * `data` - Header bytes `[0..6]` or body bytes (message type + payload)
///
/// # Returns
///
/// * `u16` - Checksum, transmitted big-endian on the wire
///
/// # Examples
///
/// ```
/// use ipb_bus::ipb::crc::ipb_checksum;
///
/// let header = [0x4B, 0x00, 0xFE, 0xFF, 0x00, 0x03];
/// assert_eq!(ipb_checksum(&header), 0xD3C4);
/// ```
pub fn ipb_checksum(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        let index = ((crc >> 8) as u8 ^ byte) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[index];
    }

    crc
}

/// Bit-serial variant, kept to cross-check the table
#[allow(dead_code)]
fn ipb_checksum_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
