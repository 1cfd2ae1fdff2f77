//! # Receiver
//!
//! Owns the bit decoder, the frame ring, and the dispatcher.
//!
//! Used from one context, [`Receiver`] takes bits through
//! [`process_bit`](Receiver::process_bit) and delivers records from
//! [`process_messages`](Receiver::process_messages). For a sampling
//! interrupt (or thread) feeding a separate poll loop,
//! [`split`](Receiver::split) it into a [`BitSampler`] and a [`Dispatcher`].
//!
//! ```
//! use amr_decoder::amr::encoder::{encode_scm, manchester_encode};
//! use amr_decoder::amr::protocol::{AmrMessage, ScmMessage};
//! use amr_decoder::receiver::Receiver;
//! use std::sync::{Arc, Mutex};
//!
//! let mut receiver = Receiver::new(512);
//! let ids = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&ids);
//! receiver.register_callback(move |msg, _kind, _raw| {
//!     if let AmrMessage::Scm(scm) = msg {
//!         sink.lock().unwrap().push(scm.id);
//!     }
//! });
//!
//! let raw = encode_scm(&ScmMessage { id: 4242, ..Default::default() });
//! for sample in manchester_encode(&raw) {
//!     receiver.process_bit(sample);
//! }
//! receiver.process_messages();
//!
//! assert_eq!(*ids.lock().unwrap(), vec![4242]);
//! ```

pub mod clock;
pub mod dispatch;
pub mod manchester;

pub use clock::{Clock, MonotonicClock};
pub use dispatch::{DispatchStats, Dispatcher, MessageCallback};
pub use manchester::{BitDecoder, Capture};

use crate::amr::protocol::*;
use crate::ring::{FramedRing, RingProducer};

/// Default ring storage in bytes (room for several IDM frames)
pub const DEFAULT_RING_CAPACITY: usize = 512;

/// Largest ring frame: header plus an IDM and its carry byte
const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_RAW_SIZE + 1;

/// Bit-clock half of the receiver
///
/// Every call is bounded and allocation-free. A full ring drops the frame
/// and bumps the ring's overflow counter.
pub struct BitSampler<C: Clock = MonotonicClock> {
    decoder: BitDecoder,
    producer: RingProducer,
    clock: C,
    frame: [u8; MAX_FRAME_SIZE],
    enabled: bool,
}

impl<C: Clock> BitSampler<C> {
    /// Create an enabled sampler pushing into `producer`
    pub fn new(producer: RingProducer, clock: C) -> Self {
        Self {
            decoder: BitDecoder::new(),
            producer,
            clock,
            frame: [0u8; MAX_FRAME_SIZE],
            enabled: true,
        }
    }

    /// Feed one raw line sample; ignored while disabled
    pub fn process_bit(&mut self, sample: bool) {
        if !self.enabled {
            return;
        }

        let Some(capture) = self.decoder.push_sample(sample) else {
            return;
        };

        let header = FrameHeader::new(capture.kind, self.clock.now_ms(), capture.bit_offset);
        let len = FRAME_HEADER_SIZE + capture.raw.len();
        self.frame[..FRAME_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        self.frame[FRAME_HEADER_SIZE..len].copy_from_slice(capture.raw);

        // Overflow is counted by the ring
        let _ = self.producer.push(&self.frame[..len]);
    }

    /// Gate sampling; decoder state is kept while disabled
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Single-context receiver
pub struct Receiver<C: Clock = MonotonicClock> {
    sampler: BitSampler<C>,
    dispatcher: Dispatcher,
}

impl Receiver<MonotonicClock> {
    /// Create a receiver with `ring_capacity` bytes of frame storage
    pub fn new(ring_capacity: usize) -> Self {
        Self::with_clock(ring_capacity, MonotonicClock::new())
    }
}

impl Default for Receiver<MonotonicClock> {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl<C: Clock> Receiver<C> {
    /// Create a receiver stamping captures with `clock`
    pub fn with_clock(ring_capacity: usize, clock: C) -> Self {
        let (producer, consumer) = FramedRing::with_capacity(ring_capacity).split();

        Self {
            sampler: BitSampler::new(producer, clock),
            dispatcher: Dispatcher::new(consumer),
        }
    }

    /// See [`BitSampler::process_bit`]
    pub fn process_bit(&mut self, sample: bool) {
        self.sampler.process_bit(sample);
    }

    /// See [`Dispatcher::process_messages`]
    pub fn process_messages(&mut self) {
        self.dispatcher.process_messages();
    }

    /// Register the record callback, replacing any previous one
    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&AmrMessage, MessageKind, &[u8]) + Send + 'static,
    {
        self.dispatcher.register_callback(callback);
    }

    pub fn clear_callback(&mut self) {
        self.dispatcher.clear_callback();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.sampler.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.sampler.is_enabled()
    }

    /// Frames dropped on a full ring since the last call (resets the count)
    pub fn overflow_count(&self) -> u32 {
        self.dispatcher.overflow_count()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Split into the bit-clock and poll halves
    pub fn split(self) -> (BitSampler<C>, Dispatcher) {
        (self.sampler, self.dispatcher)
    }
}
