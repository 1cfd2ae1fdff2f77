//! # AMR Message Encoder
//!
//! Builds CRC-sealed raw SCM, SCM+ and IDM messages from records, and
//! Manchester-encodes byte streams into line samples. Used to synthesize
//! captures for replay and to drive the receiver under test.
//!
//! CRC fields carried in the input records are ignored; the encoder always
//! writes the checksum computed over the encoded bytes.

use super::bits::write_bits;
use super::crc::{bch_crc16, ccitt_checksum};
use super::protocol::*;
use crate::error::Result;

/// Encode a Standard Consumption Message
///
/// Fields wider than their wire slot are truncated to it (26-bit id, 24-bit
/// consumption, 4-bit type, 2-bit tamper flags).
///
/// # Examples
///
/// ```
/// use amr_decoder::amr::encoder::encode_scm;
/// use amr_decoder::amr::protocol::ScmMessage;
///
/// let raw = encode_scm(&ScmMessage {
///     id: 32_839_945,
///     ert_type: 3,
///     tamper_phy: 1,
///     tamper_enc: 2,
///     consumption: 12345,
///     crc: 0,
/// });
/// assert_eq!(&raw[10..], &[0x11, 0xC7]);
/// ```
pub fn encode_scm(msg: &ScmMessage) -> [u8; SCM_RAW_SIZE] {
    let mut raw = [0u8; SCM_RAW_SIZE];

    // Preamble occupies the top 21 bits of bytes 0-2
    raw[..3].copy_from_slice(&SCM_PREAMBLE.to_be_bytes()[1..]);
    raw[2] |= (((msg.id >> 24) & 0x03) as u8) << 1;

    raw[3] = ((msg.tamper_phy & 0x03) << 6) | ((msg.ert_type & 0x0F) << 2) | (msg.tamper_enc & 0x03);
    raw[4..7].copy_from_slice(&msg.consumption.to_be_bytes()[1..]);
    raw[7..10].copy_from_slice(&msg.id.to_be_bytes()[1..]);

    let crc = bch_crc16(&raw[2..10]);
    raw[10..12].copy_from_slice(&crc.to_be_bytes());

    raw
}

/// Encode a Standard Consumption Message Plus
///
/// The frame sync is always written as `0x16A3`.
pub fn encode_scm_plus(msg: &ScmPlusMessage) -> [u8; SCM_PLUS_RAW_SIZE] {
    let mut raw = [0u8; SCM_PLUS_RAW_SIZE];

    raw[0..2].copy_from_slice(&SCM_PLUS_SYNC.to_be_bytes());
    raw[2] = msg.protocol_id;
    raw[3] = msg.endpoint_type;
    raw[4..8].copy_from_slice(&msg.endpoint_id.to_be_bytes());
    raw[8..12].copy_from_slice(&msg.consumption.to_be_bytes());
    raw[12..14].copy_from_slice(&msg.tamper.to_be_bytes());

    let crc = ccitt_checksum(&raw[2..14]);
    raw[14..16].copy_from_slice(&crc.to_be_bytes());

    raw
}

/// Encode an Interval Data Message
///
/// The preamble is always written as `0x555516A3`. Byte 8 carries the ERT
/// type; for the IDM18 layout it is written as `0x18` whatever `ert_type`
/// says, so the decoder picks the same layout back.
///
/// # Errors
///
/// Only fails if a packed interval cannot be placed, which the fixed layout
/// rules out.
pub fn encode_idm(msg: &IdmMessage) -> Result<[u8; IDM_RAW_SIZE]> {
    let mut raw = [0u8; IDM_RAW_SIZE];

    raw[0..4].copy_from_slice(&IDM_PREAMBLE.to_be_bytes());
    raw[4] = msg.packet_type_id;
    raw[5] = msg.packet_length;
    raw[6] = msg.hamming_code;
    raw[7] = msg.app_version;
    raw[9..13].copy_from_slice(&msg.ert_id.to_be_bytes());
    raw[13] = msg.interval_count;

    match &msg.payload {
        IdmPayload::Standard(data) => {
            raw[8] = msg.ert_type & 0x0F;
            raw[14] = data.module_programming_state;
            raw[15..21].copy_from_slice(&data.tamper_counters);
            raw[21..23].copy_from_slice(&data.async_count.to_be_bytes());
            raw[23..29].copy_from_slice(&data.power_outage_flags);
            raw[29..33].copy_from_slice(&data.last_consumption.to_be_bytes());
            pack_intervals(&mut raw, 33 * 8, 9, &data.differential_consumption)?;
        }
        IdmPayload::X18(data) => {
            raw[8] = 0x10 | IDM18_ERT_TYPE;
            raw[14..18].copy_from_slice(&data.unknown);
            raw[18..22].copy_from_slice(&data.last_consumption.to_be_bytes());
            raw[22..25].copy_from_slice(&data.last_excess.to_be_bytes()[1..]);
            raw[25..28].copy_from_slice(&data.last_residual.to_be_bytes()[1..]);
            raw[28..32].copy_from_slice(&data.last_consumption_high_res.to_be_bytes());
            pack_intervals(&mut raw, 32 * 8, 14, &data.differential_consumption)?;
        }
    }

    raw[86..88].copy_from_slice(&msg.tx_time_offset.to_be_bytes());
    raw[88..90].copy_from_slice(&msg.serial_number_crc.to_be_bytes());

    let crc = ccitt_checksum(&raw[4..90]);
    raw[90..92].copy_from_slice(&crc.to_be_bytes());

    Ok(raw)
}

fn pack_intervals(raw: &mut [u8], start: usize, width: u8, values: &[u16]) -> Result<()> {
    let mask = (1u32 << width) - 1;
    for (i, &value) in values.iter().enumerate() {
        write_bits(raw, start + i * width as usize, width, value as u32 & mask)?;
    }
    Ok(())
}

/// Manchester-encode bytes into line samples, MSB first
///
/// A data 1 becomes `high, low` and a data 0 becomes `low, high`, so the
/// output holds two samples per data bit.
pub fn manchester_encode(bytes: &[u8]) -> Vec<bool> {
    let mut samples = Vec::with_capacity(bytes.len() * 16);

    for &byte in bytes {
        for bit in (0..8).rev() {
            let one = (byte >> bit) & 1 == 1;
            samples.push(one);
            samples.push(!one);
        }
    }

    samples
}
