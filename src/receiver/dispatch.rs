//! # Dispatch Loop
//!
//! Drains captured frames from the ring, restores byte alignment, parses
//! them, and hands accepted records to the registered callback.

use serde::Serialize;
use tracing::{debug, trace};

use crate::amr::bits::realign;
use crate::amr::decoder::decode_message;
use crate::amr::protocol::*;
use crate::error::{AmrError, Result};
use crate::ring::RingConsumer;

/// Record callback: `(record, kind, byte-aligned raw message)`
pub type MessageCallback = Box<dyn FnMut(&AmrMessage, MessageKind, &[u8]) + Send>;

/// Running dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Records that passed their checksum
    pub accepted: u64,
    /// Frames rejected by checksum
    pub crc_failures: u64,
    /// Frames with a tag no parser handles
    pub unknown_kind: u64,
    /// Frames too short or too long to hold a message
    pub malformed: u64,
}

/// Poll-side half of the receiver
pub struct Dispatcher {
    consumer: RingConsumer,
    callback: Option<MessageCallback>,
    scratch: [u8; MAX_RAW_SIZE + 1],
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(consumer: RingConsumer) -> Self {
        Self {
            consumer,
            callback: None,
            scratch: [0u8; MAX_RAW_SIZE + 1],
            stats: DispatchStats::default(),
        }
    }

    /// Register the record callback, replacing any previous one
    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&AmrMessage, MessageKind, &[u8]) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Remove the record callback; records are still parsed and counted
    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Drain every queued frame
    ///
    /// Never blocks. Rejected frames are logged at debug level and counted.
    pub fn process_messages(&mut self) {
        while let Some(frame) = self.consumer.peek() {
            match unpack_frame(frame, &mut self.scratch) {
                Ok((header, message, raw)) => {
                    let kind = message.kind();
                    trace!(
                        "{} accepted (captured at {} ms, bit offset {})",
                        kind,
                        header.timestamp_ms,
                        header.bit_offset
                    );
                    self.stats.accepted += 1;

                    if let Some(callback) = self.callback.as_mut() {
                        callback(&message, kind, raw);
                    }
                }
                Err(e) => {
                    debug!("Dropping frame: {}", e);
                    match e {
                        AmrError::Checksum { .. } => self.stats.crc_failures += 1,
                        AmrError::UnknownKind(_) => self.stats.unknown_kind += 1,
                        _ => self.stats.malformed += 1,
                    }
                }
            }

            self.consumer.pop(None);
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Frames dropped by the producer since the last call (resets the count)
    pub fn overflow_count(&self) -> u32 {
        self.consumer.overflow_count()
    }
}

/// Split a ring frame into header and parsed record
///
/// The payload is copied into `scratch` and realigned there; the returned
/// slice is the byte-aligned message without its carry byte.
fn unpack_frame<'s>(
    frame: &[u8],
    scratch: &'s mut [u8; MAX_RAW_SIZE + 1],
) -> Result<(FrameHeader, AmrMessage, &'s [u8])> {
    let header =
        FrameHeader::from_bytes(frame).ok_or(AmrError::MalformedFrame { len: frame.len() })?;
    let kind = header.kind().ok_or(AmrError::UnknownKind(header.tag))?;

    let payload = &frame[FRAME_HEADER_SIZE..];
    if payload.len() > scratch.len() {
        return Err(AmrError::MalformedFrame { len: frame.len() });
    }

    let raw = &mut scratch[..payload.len()];
    raw.copy_from_slice(payload);
    realign(raw, header.bit_offset);

    let message = decode_message(kind, raw)?;
    let len = kind.raw_size().min(raw.len());

    Ok((header, message, &scratch[..len]))
}
