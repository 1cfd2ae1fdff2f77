//! # CRC-16 Engines
//!
//! The two checksums carried by ERT broadcasts.
//!
//! | Engine | Polynomial | Init   | Residual | Used by     |
//! |--------|------------|--------|----------|-------------|
//! | BCH    | 0x6F63     | 0x0000 | 0x0000   | SCM         |
//! | CCITT  | 0x1021     | 0xFFFF | 0x1D0F   | SCM+, IDM   |
//!
//! Messages are validated by residual: the register is run over the payload
//! *including* its trailing CRC field and compared against the fixed residual.
//! The CCITT checksum is transmitted complemented, which is why its residual
//! is non-zero.

/// BCH code generator polynomial
pub const BCH_POLY: u16 = 0x6F63;

/// BCH register initial value
pub const BCH_INIT: u16 = 0x0000;

/// BCH accept residual
pub const BCH_RESIDUAL: u16 = 0x0000;

/// CRC-16-CCITT generator polynomial
pub const CCITT_POLY: u16 = 0x1021;

/// CCITT register initial value
pub const CCITT_INIT: u16 = 0xFFFF;

/// CCITT accept residual (complemented checksum)
pub const CCITT_RESIDUAL: u16 = 0x1D0F;

/// Precomputed BCH lookup table
const BCH_TABLE: [u16; 256] = generate_crc16_table(BCH_POLY);

/// Precomputed CCITT lookup table
const CCITT_TABLE: [u16; 256] = generate_crc16_table(CCITT_POLY);

/// Generate an MSB-first CRC-16 lookup table at compile time
const fn generate_crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ poly;
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

#[inline]
fn run_register(table: &[u16; 256], init: u16, data: &[u8]) -> u16 {
    let mut crc = init;

    for &byte in data {
        crc = (crc << 8) ^ table[((crc >> 8) as u8 ^ byte) as usize];
    }

    crc
}

/// Run the BCH register over `data`
///
/// Over a payload without its CRC this is the checksum to append (big-endian).
/// Over a payload with its CRC it is the residual.
pub fn bch_crc16(data: &[u8]) -> u16 {
    run_register(&BCH_TABLE, BCH_INIT, data)
}

/// Check a BCH-protected range (payload followed by its CRC)
pub fn bch_valid(data: &[u8]) -> bool {
    bch_crc16(data) == BCH_RESIDUAL
}

/// Run the CCITT register over `data`
///
/// Over a payload with its CRC this is the residual.
pub fn ccitt_crc16(data: &[u8]) -> u16 {
    run_register(&CCITT_TABLE, CCITT_INIT, data)
}

/// Checksum to transmit after `data` (complemented CCITT register, big-endian)
pub fn ccitt_checksum(data: &[u8]) -> u16 {
    !ccitt_crc16(data)
}

/// Check a CCITT-protected range (payload followed by its CRC)
pub fn ccitt_valid(data: &[u8]) -> bool {
    ccitt_crc16(data) == CCITT_RESIDUAL
}

/// Bitwise CRC-16 (slow, for verifying the tables)
#[allow(dead_code)]
fn crc16_slow(poly: u16, init: u16, data: &[u8]) -> u16 {
    let mut crc = init;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ poly;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
