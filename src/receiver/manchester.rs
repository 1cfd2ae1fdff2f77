//! # Manchester Bit Decoder
//!
//! Turns raw line samples into captured messages.
//!
//! The receiver does not know which of two consecutive samples starts a
//! Manchester symbol, so it decodes both phases at once: samples alternate
//! between two buffers, and each buffer sees the stream decoded with one of
//! the two possible symbol alignments. Whichever buffer is in phase with the
//! transmitter holds the true data bits.
//!
//! Each buffer is a circular window one IDM wide, written twice per bit:
//!
//! ```text
//!  0                 WINDOW_BITS              2 * WINDOW_BITS
//!  |  live window     |  duplicate window      |carry|
//!         ^cursor              ^cursor + WINDOW_BITS
//! ```
//!
//! Thanks to the duplicate, the latest `WINDOW_BITS` bits are always the
//! contiguous range `cursor + 1 ..= cursor + WINDOW_BITS`, so a message
//! ending at the newest bit can be sliced out without unwrapping.
//!
//! Runs once per sample: no allocation, no logging, bounded work.

use crate::amr::protocol::*;

/// Window width in bytes (one IDM)
pub const WINDOW_BYTES: usize = MAX_RAW_SIZE;

/// Window width in bits
pub const WINDOW_BITS: usize = WINDOW_BYTES * 8;

/// Live window, duplicate window, and one carry byte
const BUFFER_BYTES: usize = 2 * WINDOW_BYTES + 1;

/// A message found at the end of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture<'a> {
    pub kind: MessageKind,
    /// Bit position of the message start within `raw[0]` (0 = MSB)
    pub bit_offset: u8,
    /// Message bytes as stored, `raw_size() + 1` long; shift left by
    /// `bit_offset` to byte-align
    pub raw: &'a [u8],
}

/// Dual-alignment Manchester decoder and preamble matcher
pub struct BitDecoder {
    buffers: [[u8; BUFFER_BYTES]; 2],
    /// Buffer written by the latest sample
    active: usize,
    /// Next bit position in the live window
    cursor: usize,
    /// Previous raw sample
    prev: bool,
}

impl BitDecoder {
    pub fn new() -> Self {
        Self {
            buffers: [[0u8; BUFFER_BYTES]; 2],
            // First sample toggles to buffer 0
            active: 1,
            cursor: 0,
            prev: false,
        }
    }

    /// Feed one raw line sample
    ///
    /// Returns the capture when a preamble lines up with the end of the
    /// window. IDM is checked first, then SCM+, then SCM.
    pub fn push_sample(&mut self, sample: bool) -> Option<Capture<'_>> {
        self.active ^= 1;

        // High then low is a 1, anything else a 0
        let bit = self.prev && !sample;
        self.prev = sample;

        let cursor = self.cursor;
        let buffer = &mut self.buffers[self.active];
        set_bit(buffer, cursor, bit);
        set_bit(buffer, cursor + WINDOW_BITS, bit);

        // Both phases share a cursor; advance once both have been written
        if self.active == 1 {
            self.cursor = (cursor + 1) % WINDOW_BITS;
        }

        match_window(&self.buffers[self.active], cursor)
    }

    /// Forget all captured history
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for BitDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn set_bit(buffer: &mut [u8], pos: usize, bit: bool) {
    let mask = 0x80u8 >> (pos % 8);
    if bit {
        buffer[pos / 8] |= mask;
    } else {
        buffer[pos / 8] &= !mask;
    }
}

/// 32 bits starting at bit `pos`
#[inline]
fn word_at(buffer: &[u8], pos: usize) -> u32 {
    let i = pos / 8;
    let acc = u64::from_be_bytes([
        0,
        0,
        0,
        buffer[i],
        buffer[i + 1],
        buffer[i + 2],
        buffer[i + 3],
        buffer[i + 4],
    ]);
    (acc >> (8 - pos % 8)) as u32
}

fn match_window(buffer: &[u8], cursor: usize) -> Option<Capture<'_>> {
    // Newest bit sits at cursor + WINDOW_BITS
    let start = |kind: MessageKind| cursor + WINDOW_BITS + 1 - kind.raw_size() * 8;

    let kind = if word_at(buffer, start(MessageKind::Idm)) == IDM_PREAMBLE {
        MessageKind::Idm
    } else if (word_at(buffer, start(MessageKind::ScmPlus)) >> 16) as u16 == SCM_PLUS_SYNC {
        MessageKind::ScmPlus
    } else if (word_at(buffer, start(MessageKind::Scm)) >> 8) & SCM_PREAMBLE_MASK == SCM_PREAMBLE {
        MessageKind::Scm
    } else {
        return None;
    };

    let pos = start(kind);
    let first = pos / 8;

    Some(Capture {
        kind,
        bit_offset: (pos % 8) as u8,
        raw: &buffer[first..first + kind.raw_size() + 1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::bits::realign;
    use crate::amr::encoder::{encode_idm, encode_scm, encode_scm_plus, manchester_encode};

    fn scm_bytes() -> Vec<u8> {
        encode_scm(&ScmMessage {
            id: 32_839_945,
            ert_type: 3,
            tamper_phy: 1,
            tamper_enc: 2,
            consumption: 12345,
            crc: 0,
        })
        .to_vec()
    }

    fn scm_plus_bytes() -> Vec<u8> {
        encode_scm_plus(&ScmPlusMessage {
            protocol_id: 0x1E,
            endpoint_type: 0x07,
            endpoint_id: 0x0102_0304,
            consumption: 555,
            ..Default::default()
        })
        .to_vec()
    }

    fn idm_bytes() -> Vec<u8> {
        let mut deltas = [0u16; IDM_STD_INTERVALS];
        for (i, d) in deltas.iter_mut().enumerate() {
            *d = (i * 7) as u16;
        }
        encode_idm(&IdmMessage {
            preamble: IDM_PREAMBLE,
            packet_type_id: 0x1C,
            packet_length: 0x5C,
            hamming_code: 0xC6,
            app_version: 0x04,
            ert_type: 0x07,
            ert_id: 0x1234_5678,
            interval_count: 9,
            payload: IdmPayload::Standard(IdmStandardData {
                module_programming_state: 0x20,
                tamper_counters: [0; 6],
                async_count: 0,
                power_outage_flags: [0; 6],
                last_consumption: 100_000,
                differential_consumption: deltas,
            }),
            tx_time_offset: 0,
            serial_number_crc: 0xBEEF,
            packet_crc: 0,
        })
        .unwrap()
        .to_vec()
    }

    /// Samples for `lead_zeros` zero data bits then `message`, optionally
    /// preceded by one stray sample to flip the phase
    fn samples(message: &[u8], lead_zeros: usize, stray: bool) -> Vec<bool> {
        let mut out = Vec::new();
        if stray {
            out.push(false);
        }
        for _ in 0..lead_zeros {
            out.extend_from_slice(&[false, true]);
        }
        out.extend(manchester_encode(message));
        out
    }

    /// Feed all samples and return the capture made by the last one
    fn feed(decoder: &mut BitDecoder, samples: &[bool]) -> Option<(MessageKind, u8, Vec<u8>)> {
        let (last, rest) = samples.split_last()?;
        for &s in rest {
            decoder.push_sample(s);
        }
        decoder
            .push_sample(*last)
            .map(|c| (c.kind, c.bit_offset, c.raw.to_vec()))
    }

    fn check_capture(kind: MessageKind, message: &[u8]) {
        for stray in [false, true] {
            for lead in 0..8 {
                let mut decoder = BitDecoder::new();
                let (found, offset, mut raw) = feed(&mut decoder, &samples(message, lead, stray))
                    .unwrap_or_else(|| panic!("{} not captured (lead {}, stray {})", kind, lead, stray));

                // The stray sample pushes the message one bit later in buffer 0
                let expected_offset = (lead + stray as usize) % 8;

                assert_eq!(found, kind, "lead {} stray {}", lead, stray);
                assert_eq!(offset as usize, expected_offset, "lead {} stray {}", lead, stray);
                assert_eq!(raw.len(), message.len() + 1);

                realign(&mut raw, offset);
                assert_eq!(&raw[..message.len()], message, "lead {} stray {}", lead, stray);
            }
        }
    }

    #[test]
    fn test_word_at_unaligned() {
        let buffer = [0x0F, 0x95, 0x30, 0x00, 0x00, 0x00];
        assert_eq!(word_at(&buffer, 4), 0xF953_0000);
        assert_eq!(word_at(&buffer, 0), 0x0F95_3000);
    }

    #[test]
    fn test_scm_captured_at_every_offset_and_phase() {
        check_capture(MessageKind::Scm, &scm_bytes());
    }

    #[test]
    fn test_scm_plus_captured_at_every_offset_and_phase() {
        check_capture(MessageKind::ScmPlus, &scm_plus_bytes());
    }

    #[test]
    fn test_idm_captured_at_every_offset_and_phase() {
        check_capture(MessageKind::Idm, &idm_bytes());
    }

    #[test]
    fn test_capture_across_cursor_wrap() {
        let message = scm_bytes();
        // Start the message 40 bits before the live window wraps
        let mut decoder = BitDecoder::new();
        let (kind, offset, mut raw) =
            feed(&mut decoder, &samples(&message, WINDOW_BITS - 40, false)).unwrap();

        assert_eq!(kind, MessageKind::Scm);
        realign(&mut raw, offset);
        assert_eq!(&raw[..message.len()], message.as_slice());
    }

    #[test]
    fn test_capture_after_long_history() {
        let message = scm_plus_bytes();
        let mut decoder = BitDecoder::new();
        // Several laps of alternating noise bits before the message
        let noise: Vec<u8> = (0..300).map(|i| if i % 3 == 0 { 0xA5 } else { 0x3C }).collect();
        for s in manchester_encode(&noise) {
            decoder.push_sample(s);
        }

        let (kind, offset, mut raw) = feed(&mut decoder, &manchester_encode(&message)).unwrap();
        assert_eq!(kind, MessageKind::ScmPlus);
        realign(&mut raw, offset);
        assert_eq!(&raw[..message.len()], message.as_slice());
    }

    #[test]
    fn test_idm_preferred_over_scm_plus() {
        // An IDM also carries 0x16A3 at bytes 2-3; the full preamble wins
        let message = idm_bytes();
        let mut decoder = BitDecoder::new();
        let (kind, _, _) = feed(&mut decoder, &samples(&message, 3, false)).unwrap();
        assert_eq!(kind, MessageKind::Idm);
    }

    #[test]
    fn test_silence_captures_nothing() {
        let mut decoder = BitDecoder::new();
        for i in 0..4 * WINDOW_BITS {
            assert!(decoder.push_sample(i % 2 == 0).is_none());
            assert!(decoder.push_sample(false).is_none());
        }
    }

    #[test]
    fn test_reset_clears_history() {
        let message = scm_bytes();
        let all = samples(&message, 0, false);
        let (head, tail) = all.split_at(all.len() / 2);

        let mut decoder = BitDecoder::new();
        for &s in head {
            decoder.push_sample(s);
        }
        decoder.reset();
        assert!(feed(&mut decoder, tail).is_none());
    }
}
