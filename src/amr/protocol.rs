//! # AMR Protocol Constants and Types
//!
//! Wire sizes, preamble patterns, frame header, and the typed records
//! produced for SCM, SCM+ and IDM broadcasts.

use serde::{Serialize, Serializer};
use std::fmt;

/// SCM raw message size in bytes
pub const SCM_RAW_SIZE: usize = 12;

/// SCM+ raw message size in bytes
pub const SCM_PLUS_RAW_SIZE: usize = 16;

/// IDM raw message size in bytes
pub const IDM_RAW_SIZE: usize = 92;

/// Largest raw message
pub const MAX_RAW_SIZE: usize = IDM_RAW_SIZE;

/// SCM preamble: 21 significant bits (0x1F2A60) left-aligned in 24
pub const SCM_PREAMBLE: u32 = 0xF9_5300;

/// SCM preamble mask over the first 24 bits; the bottom 3 are don't-care
pub const SCM_PREAMBLE_MASK: u32 = 0xFF_FFF8;

/// SCM+ frame sync word
pub const SCM_PLUS_SYNC: u16 = 0x16A3;

/// IDM training sequence and frame sync
pub const IDM_PREAMBLE: u32 = 0x5555_16A3;

/// IDM ERT type (low nibble) selecting the IDM18 payload layout
pub const IDM18_ERT_TYPE: u8 = 0x08;

/// Number of 9-bit differential intervals in a standard IDM
pub const IDM_STD_INTERVALS: usize = 47;

/// Number of 14-bit differential intervals in an IDM18
pub const IDM_X18_INTERVALS: usize = 27;

/// Frame header size inside the ring: tag(1) + timestamp(4) + offset(1)
pub const FRAME_HEADER_SIZE: usize = 6;

/// Message types tagged in frame headers and passed to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Standard Consumption Message
    Scm = 0,
    /// Standard Consumption Message Plus
    ScmPlus = 1,
    /// Interval Data Message
    Idm = 2,
    /// Interval Data Message, ERT type 8 layout
    Idm18 = 3,
}

impl MessageKind {
    /// Parse a header tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Scm),
            1 => Some(Self::ScmPlus),
            2 => Some(Self::Idm),
            3 => Some(Self::Idm18),
            _ => None,
        }
    }

    /// Header tag value
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Raw wire size of this message type
    pub fn raw_size(self) -> usize {
        match self {
            Self::Scm => SCM_RAW_SIZE,
            Self::ScmPlus => SCM_PLUS_RAW_SIZE,
            Self::Idm | Self::Idm18 => IDM_RAW_SIZE,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scm => "SCM",
            Self::ScmPlus => "SCM+",
            Self::Idm => "IDM",
            Self::Idm18 => "IDM18",
        };
        f.write_str(name)
    }
}

/// Header written in front of every captured payload in the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type tag; kept raw so unknown tags survive to the dispatcher
    pub tag: u8,
    /// Capture time in milliseconds
    pub timestamp_ms: u32,
    /// Bit offset (0-7) of the preamble within the first captured byte
    pub bit_offset: u8,
}

impl FrameHeader {
    /// Create a header for a captured message
    pub fn new(kind: MessageKind, timestamp_ms: u32, bit_offset: u8) -> Self {
        Self {
            tag: kind.tag(),
            timestamp_ms,
            bit_offset,
        }
    }

    /// Message kind, if the tag is known
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(self.tag)
    }

    /// Serialize into the ring layout
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let ts = self.timestamp_ms.to_le_bytes();
        [self.tag, ts[0], ts[1], ts[2], ts[3], self.bit_offset]
    }

    /// Parse from the ring layout; `None` if fewer than 6 bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return None;
        }

        Some(Self {
            tag: bytes[0],
            timestamp_ms: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            bit_offset: bytes[5],
        })
    }
}

/// Standard Consumption Message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScmMessage {
    /// ERT identifier (26 bits)
    pub id: u32,

    /// ERT type (4 bits)
    pub ert_type: u8,

    /// Physical tamper flags (2 bits)
    pub tamper_phy: u8,

    /// Encoder tamper flags (2 bits)
    pub tamper_enc: u8,

    /// Consumption (24 bits)
    pub consumption: u32,

    /// BCH checksum as transmitted
    pub crc: u16,
}

/// Standard Consumption Message Plus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScmPlusMessage {
    /// Frame sync (always 0x16A3)
    pub frame_sync: u16,

    /// Protocol identifier
    pub protocol_id: u8,

    /// Endpoint type
    pub endpoint_type: u8,

    /// Endpoint identifier
    pub endpoint_id: u32,

    /// Consumption
    pub consumption: u32,

    /// Tamper flags
    pub tamper: u16,

    /// CCITT checksum as transmitted
    pub crc: u16,
}

/// Interval Data Message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdmMessage {
    pub preamble: u32,
    pub packet_type_id: u8,
    pub packet_length: u8,
    pub hamming_code: u8,
    pub app_version: u8,
    /// ERT type, low nibble only
    pub ert_type: u8,
    pub ert_id: u32,
    pub interval_count: u8,
    pub payload: IdmPayload,
    pub tx_time_offset: u16,
    pub serial_number_crc: u16,
    pub packet_crc: u16,
}

impl IdmMessage {
    /// Message kind reported to callbacks for this record
    pub fn kind(&self) -> MessageKind {
        match self.payload {
            IdmPayload::Standard(_) => MessageKind::Idm,
            IdmPayload::X18(_) => MessageKind::Idm18,
        }
    }
}

/// IDM payload layout, selected by ERT type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layout")]
pub enum IdmPayload {
    Standard(IdmStandardData),
    X18(IdmX18Data),
}

/// Standard IDM payload (47 intervals of 9 bits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdmStandardData {
    pub module_programming_state: u8,
    pub tamper_counters: [u8; 6],
    pub async_count: u16,
    pub power_outage_flags: [u8; 6],
    pub last_consumption: u32,
    #[serde(serialize_with = "serialize_intervals")]
    pub differential_consumption: [u16; IDM_STD_INTERVALS],
}

/// IDM18 payload (27 intervals of 14 bits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdmX18Data {
    pub unknown: [u8; 4],
    pub last_consumption: u32,
    /// 24-bit counter
    pub last_excess: u32,
    /// 24-bit counter
    pub last_residual: u32,
    pub last_consumption_high_res: u32,
    #[serde(serialize_with = "serialize_intervals")]
    pub differential_consumption: [u16; IDM_X18_INTERVALS],
}

/// Any decoded record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AmrMessage {
    Scm(ScmMessage),
    ScmPlus(ScmPlusMessage),
    Idm(IdmMessage),
}

impl AmrMessage {
    /// Message kind of the contained record
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Scm(_) => MessageKind::Scm,
            Self::ScmPlus(_) => MessageKind::ScmPlus,
            Self::Idm(idm) => idm.kind(),
        }
    }
}

// serde only derives for arrays up to 32 elements
fn serialize_intervals<S: Serializer, const N: usize>(
    values: &[u16; N],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter())
}
