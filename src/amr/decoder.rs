//! # AMR Message Decoder
//!
//! Decodes byte-aligned raw SCM, SCM+ and IDM payloads into typed records.
//! Every decoder checks the CRC before touching any field, so a rejected
//! payload never yields a partial record.

use super::bits::read_packed;
use super::crc::{bch_crc16, ccitt_crc16, BCH_RESIDUAL, CCITT_RESIDUAL};
use super::protocol::*;
use crate::error::{AmrError, Result};

/// Byte range covered by the SCM BCH checksum
const SCM_CRC_RANGE: std::ops::Range<usize> = 2..SCM_RAW_SIZE;

/// Byte range covered by the SCM+ CCITT checksum
const SCM_PLUS_CRC_RANGE: std::ops::Range<usize> = 2..SCM_PLUS_RAW_SIZE;

/// Byte range covered by the IDM CCITT checksum
const IDM_CRC_RANGE: std::ops::Range<usize> = 4..IDM_RAW_SIZE;

/// First bit of the standard IDM differential array (byte 33)
const IDM_STD_DELTA_BIT: usize = 33 * 8;

/// First bit of the IDM18 differential array (byte 32)
const IDM_X18_DELTA_BIT: usize = 32 * 8;

fn ensure_len(raw: &[u8], kind: MessageKind) -> Result<()> {
    let expected = kind.raw_size();
    if raw.len() < expected {
        return Err(AmrError::Truncated {
            kind,
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

fn be_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

fn be_u24(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([0, raw[at], raw[at + 1], raw[at + 2]])
}

fn be_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn array<const N: usize>(raw: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[at..at + N]);
    out
}

/// Decode a Standard Consumption Message
///
/// # Arguments
///
/// * `raw` - Byte-aligned raw message, at least 12 bytes (extra bytes ignored)
///
/// # Errors
///
/// Returns error if:
/// - Payload is shorter than 12 bytes
/// - BCH residual over bytes 2..12 is non-zero
pub fn decode_scm(raw: &[u8]) -> Result<ScmMessage> {
    ensure_len(raw, MessageKind::Scm)?;

    let residual = bch_crc16(&raw[SCM_CRC_RANGE]);
    if residual != BCH_RESIDUAL {
        return Err(AmrError::Checksum {
            kind: MessageKind::Scm,
            residual,
        });
    }

    // ID: 2 high bits from byte 2, low 24 bits from bytes 7-9
    let id_high = ((raw[2] >> 1) & 0x03) as u32;
    let id = (id_high << 24) | be_u24(raw, 7);

    Ok(ScmMessage {
        id,
        ert_type: (raw[3] >> 2) & 0x0F,
        tamper_phy: raw[3] >> 6,
        tamper_enc: raw[3] & 0x03,
        consumption: be_u24(raw, 4),
        crc: be_u16(raw, 10),
    })
}

/// Decode a Standard Consumption Message Plus
///
/// # Errors
///
/// Returns error if the payload is shorter than 16 bytes or the CCITT
/// residual over bytes 2..16 does not match.
pub fn decode_scm_plus(raw: &[u8]) -> Result<ScmPlusMessage> {
    ensure_len(raw, MessageKind::ScmPlus)?;

    let residual = ccitt_crc16(&raw[SCM_PLUS_CRC_RANGE]);
    if residual != CCITT_RESIDUAL {
        return Err(AmrError::Checksum {
            kind: MessageKind::ScmPlus,
            residual,
        });
    }

    Ok(ScmPlusMessage {
        frame_sync: be_u16(raw, 0),
        protocol_id: raw[2],
        endpoint_type: raw[3],
        endpoint_id: be_u32(raw, 4),
        consumption: be_u32(raw, 8),
        tamper: be_u16(raw, 12),
        crc: be_u16(raw, 14),
    })
}

/// Decode an Interval Data Message
///
/// The payload layout is chosen by the low nibble of byte 8: ERT type 8
/// carries the IDM18 layout, anything else the standard one.
///
/// # Errors
///
/// Returns error if the payload is shorter than 92 bytes or the CCITT
/// residual over bytes 4..92 does not match.
pub fn decode_idm(raw: &[u8]) -> Result<IdmMessage> {
    ensure_len(raw, MessageKind::Idm)?;

    let residual = ccitt_crc16(&raw[IDM_CRC_RANGE]);
    if residual != CCITT_RESIDUAL {
        return Err(AmrError::Checksum {
            kind: MessageKind::Idm,
            residual,
        });
    }

    let ert_type = raw[8] & 0x0F;

    let payload = if ert_type == IDM18_ERT_TYPE {
        IdmPayload::X18(IdmX18Data {
            unknown: array(raw, 14),
            last_consumption: be_u32(raw, 18),
            last_excess: be_u24(raw, 22),
            last_residual: be_u24(raw, 25),
            last_consumption_high_res: be_u32(raw, 28),
            differential_consumption: read_packed(raw, IDM_X18_DELTA_BIT, 14)?,
        })
    } else {
        IdmPayload::Standard(IdmStandardData {
            module_programming_state: raw[14],
            tamper_counters: array(raw, 15),
            async_count: be_u16(raw, 21),
            power_outage_flags: array(raw, 23),
            last_consumption: be_u32(raw, 29),
            differential_consumption: read_packed(raw, IDM_STD_DELTA_BIT, 9)?,
        })
    };

    Ok(IdmMessage {
        preamble: be_u32(raw, 0),
        packet_type_id: raw[4],
        packet_length: raw[5],
        hamming_code: raw[6],
        app_version: raw[7],
        ert_type,
        ert_id: be_u32(raw, 9),
        interval_count: raw[13],
        payload,
        tx_time_offset: be_u16(raw, 86),
        serial_number_crc: be_u16(raw, 88),
        packet_crc: be_u16(raw, 90),
    })
}

/// Decode a raw payload according to its frame kind
///
/// `Idm` and `Idm18` both go through [`decode_idm`]; the record itself
/// reports which layout was found.
pub fn decode_message(kind: MessageKind, raw: &[u8]) -> Result<AmrMessage> {
    match kind {
        MessageKind::Scm => decode_scm(raw).map(AmrMessage::Scm),
        MessageKind::ScmPlus => decode_scm_plus(raw).map(AmrMessage::ScmPlus),
        MessageKind::Idm | MessageKind::Idm18 => decode_idm(raw).map(AmrMessage::Idm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::crc::ccitt_checksum;

    const SCM_VECTOR: [u8; 12] = [
        0xF9, 0x53, 0x02, 0x4E, 0x00, 0x30, 0x39, 0xF5, 0x19, 0x09, 0x11, 0xC7,
    ];

    /// Seal a raw message by writing the CCITT checksum over `range` into
    /// the last two bytes of that range
    fn seal_ccitt(raw: &mut [u8], range: std::ops::Range<usize>) {
        let end = range.end;
        let crc = ccitt_checksum(&raw[range.start..end - 2]);
        raw[end - 2..end].copy_from_slice(&crc.to_be_bytes());
    }

    /// IDM where byte i holds i (before sealing), with the given ERT type
    fn idm_counting_bytes(ert_type: u8) -> [u8; IDM_RAW_SIZE] {
        let mut raw = [0u8; IDM_RAW_SIZE];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = i as u8;
        }
        raw[..4].copy_from_slice(&IDM_PREAMBLE.to_be_bytes());
        raw[8] = ert_type;
        seal_ccitt(&mut raw, IDM_CRC_RANGE);
        raw
    }

    /// Bit-by-bit reference for packed fields
    fn naive_field(raw: &[u8], start: usize, width: usize) -> u16 {
        (start..start + width).fold(0u16, |acc, pos| {
            (acc << 1) | ((raw[pos / 8] >> (7 - pos % 8)) & 1) as u16
        })
    }

    #[test]
    fn test_decode_scm_known_vector() {
        let scm = decode_scm(&SCM_VECTOR).unwrap();
        assert_eq!(scm.id, 32_839_945);
        assert_eq!(scm.consumption, 12345);
        assert_eq!(scm.ert_type, 3);
        assert_eq!(scm.tamper_phy, 1);
        assert_eq!(scm.tamper_enc, 2);
        assert_eq!(scm.crc, 0x11C7);
    }

    #[test]
    fn test_decode_scm_ignores_trailing_carry_byte() {
        let mut raw = SCM_VECTOR.to_vec();
        raw.push(0xA5);
        assert_eq!(decode_scm(&raw).unwrap().id, 32_839_945);
    }

    #[test]
    fn test_decode_scm_bad_crc() {
        let mut raw = SCM_VECTOR;
        raw[5] ^= 0x10;
        match decode_scm(&raw) {
            Err(AmrError::Checksum { kind, residual }) => {
                assert_eq!(kind, MessageKind::Scm);
                assert_ne!(residual, 0);
            }
            other => panic!("expected checksum error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_scm_preamble_not_covered_by_crc() {
        // Bytes 0-1 sit outside the BCH range
        let mut raw = SCM_VECTOR;
        raw[0] = 0x00;
        assert!(decode_scm(&raw).is_ok());
    }

    #[test]
    fn test_decode_scm_too_short() {
        match decode_scm(&SCM_VECTOR[..11]) {
            Err(AmrError::Truncated { expected, actual, .. }) => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 11);
            }
            other => panic!("expected truncation error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_scm_plus() {
        let mut raw = [
            0x16, 0xA3, 0x1E, 0x07, 0x12, 0x34, 0x56, 0x78, 0x00, 0x01, 0xE2, 0x40, 0x08, 0x01,
            0x00, 0x00,
        ];
        seal_ccitt(&mut raw, SCM_PLUS_CRC_RANGE);

        let msg = decode_scm_plus(&raw).unwrap();
        assert_eq!(msg.frame_sync, SCM_PLUS_SYNC);
        assert_eq!(msg.protocol_id, 0x1E);
        assert_eq!(msg.endpoint_type, 0x07);
        assert_eq!(msg.endpoint_id, 0x1234_5678);
        assert_eq!(msg.consumption, 123_456);
        assert_eq!(msg.tamper, 0x0801);
        assert_eq!(msg.crc, u16::from_be_bytes([raw[14], raw[15]]));
    }

    #[test]
    fn test_decode_scm_plus_bad_crc() {
        let mut raw = [0u8; SCM_PLUS_RAW_SIZE];
        raw[..2].copy_from_slice(&SCM_PLUS_SYNC.to_be_bytes());
        seal_ccitt(&mut raw, SCM_PLUS_CRC_RANGE);
        raw[9] ^= 0x01;
        assert!(matches!(
            decode_scm_plus(&raw),
            Err(AmrError::Checksum {
                kind: MessageKind::ScmPlus,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_idm_standard_header_and_trailer() {
        let raw = idm_counting_bytes(0x17);
        let idm = decode_idm(&raw).unwrap();

        assert_eq!(idm.preamble, IDM_PREAMBLE);
        assert_eq!(idm.packet_type_id, 4);
        assert_eq!(idm.packet_length, 5);
        assert_eq!(idm.hamming_code, 6);
        assert_eq!(idm.app_version, 7);
        assert_eq!(idm.ert_type, 7);
        assert_eq!(idm.ert_id, 0x090A_0B0C);
        assert_eq!(idm.interval_count, 13);
        assert_eq!(idm.tx_time_offset, 0x5657);
        assert_eq!(idm.serial_number_crc, 0x5859);
        assert_eq!(idm.kind(), MessageKind::Idm);

        match idm.payload {
            IdmPayload::Standard(ref data) => {
                assert_eq!(data.module_programming_state, 14);
                assert_eq!(data.tamper_counters, [15, 16, 17, 18, 19, 20]);
                assert_eq!(data.async_count, 0x1516);
                assert_eq!(data.power_outage_flags, [23, 24, 25, 26, 27, 28]);
                assert_eq!(data.last_consumption, 0x1D1E_1F20);
            }
            IdmPayload::X18(_) => panic!("expected standard layout"),
        }
    }

    #[test]
    fn test_decode_idm_standard_deltas() {
        let raw = idm_counting_bytes(0x17);
        let idm = decode_idm(&raw).unwrap();

        let IdmPayload::Standard(data) = idm.payload else {
            panic!("expected standard layout");
        };

        // Bytes 33, 34, 35 = 0x21 0x22 0x23 = 00100001 00100010 00100011
        // first 9 bits 001000010 = 66, next 9 bits 010001000 = 136
        assert_eq!(data.differential_consumption[0], 66);
        assert_eq!(data.differential_consumption[1], 136);

        for (i, &delta) in data.differential_consumption.iter().enumerate() {
            assert_eq!(
                delta,
                naive_field(&raw, IDM_STD_DELTA_BIT + i * 9, 9),
                "interval {}",
                i
            );
        }
    }

    #[test]
    fn test_decode_idm18_fields_and_deltas() {
        let raw = idm_counting_bytes(0x18);
        let idm = decode_idm(&raw).unwrap();

        assert_eq!(idm.ert_type, 8);
        assert_eq!(idm.kind(), MessageKind::Idm18);

        let IdmPayload::X18(data) = idm.payload else {
            panic!("expected IDM18 layout");
        };

        assert_eq!(data.unknown, [14, 15, 16, 17]);
        assert_eq!(data.last_consumption, 0x1213_1415);
        assert_eq!(data.last_excess, 0x16_1718);
        assert_eq!(data.last_residual, 0x19_1A1B);
        assert_eq!(data.last_consumption_high_res, 0x1C1D_1E1F);

        // Bytes 32, 33, 34 = 00100000 00100001 00100010
        // first 14 bits 00100000001000 = 2056, next 14 = 01001000100010 = 4642
        assert_eq!(data.differential_consumption[0], 2056);
        assert_eq!(data.differential_consumption[1], 4642);

        for (i, &delta) in data.differential_consumption.iter().enumerate() {
            assert_eq!(
                delta,
                naive_field(&raw, IDM_X18_DELTA_BIT + i * 14, 14),
                "interval {}",
                i
            );
        }
    }

    #[test]
    fn test_decode_idm_bad_crc() {
        let mut raw = idm_counting_bytes(0x17);
        raw[50] ^= 0x80;
        assert!(matches!(
            decode_idm(&raw),
            Err(AmrError::Checksum {
                kind: MessageKind::Idm,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_idm_too_short() {
        let raw = idm_counting_bytes(0x17);
        assert!(matches!(
            decode_idm(&raw[..91]),
            Err(AmrError::Truncated { expected: 92, .. })
        ));
    }

    #[test]
    fn test_decode_message_routes_by_kind() {
        let msg = decode_message(MessageKind::Scm, &SCM_VECTOR).unwrap();
        assert_eq!(msg.kind(), MessageKind::Scm);

        let raw = idm_counting_bytes(0x18);
        let msg = decode_message(MessageKind::Idm, &raw).unwrap();
        assert_eq!(msg.kind(), MessageKind::Idm18);
        let msg = decode_message(MessageKind::Idm18, &raw).unwrap();
        assert_eq!(msg.kind(), MessageKind::Idm18);
    }
}
