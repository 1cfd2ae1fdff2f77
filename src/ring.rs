//! # Framed Ring Buffer
//!
//! A single-producer, single-consumer lock-free byte ring that stores
//! variable-length frames.
//!
//! ## Layout
//!
//! Every frame is a little-endian `u16` length prefix followed by the payload.
//! A frame never straddles the physical end of storage: when it does not fit
//! the producer leaves a zero-length prefix (the wrap sentinel) and starts
//! again at offset 0.
//!
//! ```text
//! tail                 head
//!  |                     |
//!  [len][payload][len][payload][0 0]....
//! ```
//!
//! Head never advances onto tail, so one byte of storage is always unusable
//! and `head == tail` means empty.
//!
//! ## Memory Ordering
//!
//! - Producer: writes the frame, then Release-stores head
//! - Consumer: Acquire-loads head, reads, then Release-stores tail
//! - Each side Acquire-loads the index owned by the other

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::RingError;

/// Length prefix size in bytes
pub const PREFIX_SIZE: usize = 2;

/// Largest usable storage (frame lengths are stored as `u16`)
pub const MAX_STORAGE: usize = u16::MAX as usize;

struct Shared {
    /// Empty when the ring is uninitialized
    storage: Box<[UnsafeCell<u8>]>,
    /// Write offset (owned by the producer)
    head: AtomicUsize,
    /// Read offset (owned by the consumer)
    tail: AtomicUsize,
    /// Rejected pushes since the last `overflow_count` call
    overflow: AtomicU32,
}

// SAFETY: the producer only writes bytes outside the published
// [tail, head) region and the consumer only reads inside it. Ownership of a
// byte range changes hands through the Release/Acquire pair on head and tail.
unsafe impl Sync for Shared {}

impl Shared {
    fn new(storage: Box<[u8]>) -> Self {
        let len = storage.len();
        let storage: Box<[UnsafeCell<u8>]> = if len <= PREFIX_SIZE || len > MAX_STORAGE {
            warn!(
                "Ring storage of {} bytes is outside {}..={}; ring left uninitialized",
                len,
                PREFIX_SIZE + 1,
                MAX_STORAGE
            );
            Box::new([])
        } else {
            (0..len).map(|_| UnsafeCell::new(0)).collect()
        };

        Self {
            storage,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow: AtomicU32::new(0),
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    fn write(&self, at: usize, data: &[u8]) {
        debug_assert!(at + data.len() <= self.size());
        // SAFETY: in bounds, and only called by the producer on bytes the
        // consumer cannot see until head is published
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(at), data.len());
        }
    }

    fn read(&self, at: usize, len: usize) -> &[u8] {
        debug_assert!(at + len <= self.size());
        // SAFETY: in bounds, and only called by the consumer on bytes inside
        // the published region, which the producer does not touch
        unsafe { std::slice::from_raw_parts(self.base().add(at), len) }
    }

    fn read_prefix(&self, at: usize) -> usize {
        let bytes = self.read(at, PREFIX_SIZE);
        u16::from_le_bytes([bytes[0], bytes[1]]) as usize
    }

    /// Largest frame that can be pushed right now
    fn free_space(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        self.free_between(head, tail)
    }

    fn free_between(&self, head: usize, tail: usize) -> usize {
        let size = self.size();
        if size == 0 {
            return 0;
        }

        if head >= tail {
            // Writing up to the end is only allowed if head may wrap to 0
            let avail = if tail == 0 { size - 1 } else { size };
            let high = avail.saturating_sub(head + PREFIX_SIZE);
            let low = tail.saturating_sub(PREFIX_SIZE + 1);
            high.max(low)
        } else {
            (tail - head).saturating_sub(PREFIX_SIZE + 1)
        }
    }

    fn push(&self, data: &[u8]) -> Result<(), RingError> {
        let size = self.size();
        if size == 0 {
            return Err(RingError::Uninitialized);
        }
        if data.is_empty() {
            return Err(RingError::EmptyFrame);
        }

        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let free = self.free_between(head, tail);
        if data.len() > free {
            self.overflow.fetch_add(1, Ordering::Relaxed);
            return Err(RingError::Full {
                requested: data.len(),
                free,
            });
        }

        let avail = if tail == 0 { size - 1 } else { size };

        let start = if head < tail || head + PREFIX_SIZE + data.len() <= avail {
            head
        } else {
            if head + PREFIX_SIZE <= size {
                self.write(head, &0u16.to_le_bytes());
            }
            0
        };

        // data.len() <= free < size <= u16::MAX
        self.write(start, &(data.len() as u16).to_le_bytes());
        self.write(start + PREFIX_SIZE, data);

        let mut next = start + PREFIX_SIZE + data.len();
        if next == size {
            next = 0;
        }
        self.head.store(next, Ordering::Release);

        Ok(())
    }

    /// Locate the oldest frame as (payload offset, length), following wraps
    fn front(&self) -> Option<(usize, usize)> {
        let size = self.size();
        if size == 0 {
            return None;
        }

        let head = self.head.load(Ordering::Acquire);
        let mut tail = self.tail.load(Ordering::Relaxed);
        if tail == head {
            return None;
        }

        let mut len = if tail + PREFIX_SIZE >= size {
            0
        } else {
            self.read_prefix(tail)
        };

        if len == 0 {
            tail = 0;
            self.tail.store(0, Ordering::Release);
            if tail == head {
                return None;
            }
            len = self.read_prefix(0);
        }

        let start = tail + PREFIX_SIZE;
        if len == 0 || start + len > size {
            return None;
        }

        Some((start, len))
    }

    fn peek(&self) -> Option<&[u8]> {
        self.front().map(|(start, len)| self.read(start, len))
    }

    fn pop(&self, out: Option<&mut [u8]>) -> usize {
        let Some((start, len)) = self.front() else {
            return 0;
        };

        let copied = match out {
            Some(buf) if !buf.is_empty() => {
                let n = buf.len().min(len);
                buf[..n].copy_from_slice(self.read(start, n));
                n
            }
            _ => len,
        };

        let mut next = start + len;
        if next == self.size() {
            next = 0;
        }
        self.tail.store(next, Ordering::Release);

        copied
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    fn take_overflow(&self) -> u32 {
        self.overflow.swap(0, Ordering::Relaxed)
    }
}

/// Framed ring owning both ends
///
/// Use directly from a single context, or [`split`](Self::split) it into a
/// producer and consumer for two.
///
/// # Examples
///
/// ```
/// use amr_decoder::ring::FramedRing;
///
/// let mut ring = FramedRing::with_capacity(32);
/// ring.push(&[1, 2, 3]).unwrap();
/// assert_eq!(ring.peek(), Some(&[1u8, 2, 3][..]));
///
/// let mut out = [0u8; 8];
/// assert_eq!(ring.pop(Some(&mut out)), 3);
/// assert!(ring.is_empty());
/// ```
pub struct FramedRing {
    shared: Arc<Shared>,
}

impl FramedRing {
    /// Build a ring over `storage`
    ///
    /// Storage of `PREFIX_SIZE` bytes or less, or above `u16::MAX`, yields an
    /// uninitialized ring on which every operation fails safely.
    pub fn new(storage: Box<[u8]>) -> Self {
        Self {
            shared: Arc::new(Shared::new(storage)),
        }
    }

    /// Build a ring over freshly allocated zeroed storage
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(vec![0u8; capacity].into_boxed_slice())
    }

    /// Storage size in bytes (0 if uninitialized)
    pub fn capacity(&self) -> usize {
        self.shared.size()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.size() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Largest payload the next push can accept
    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }

    /// Append a frame
    ///
    /// # Errors
    ///
    /// Returns error if the ring is uninitialized, `data` is empty, or
    /// `data` exceeds [`free_space`](Self::free_space). The last case also
    /// bumps the overflow counter.
    pub fn push(&mut self, data: &[u8]) -> Result<(), RingError> {
        self.shared.push(data)
    }

    /// Borrow the oldest frame without consuming it
    pub fn peek(&mut self) -> Option<&[u8]> {
        self.shared.peek()
    }

    /// Remove the oldest frame, copying up to `out.len()` bytes into `out`
    ///
    /// Returns the number of bytes copied, or the frame's full length when
    /// `out` is `None` or empty. Returns 0 when there is nothing to pop.
    pub fn pop(&mut self, out: Option<&mut [u8]>) -> usize {
        self.shared.pop(out)
    }

    /// Return and reset the count of rejected pushes
    pub fn overflow_count(&self) -> u32 {
        self.shared.take_overflow()
    }

    /// Split into producer and consumer halves
    pub fn split(self) -> (RingProducer, RingConsumer) {
        (
            RingProducer {
                shared: Arc::clone(&self.shared),
            },
            RingConsumer {
                shared: self.shared,
            },
        )
    }
}

/// Write half of a split [`FramedRing`]
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }

    /// See [`FramedRing::push`]
    pub fn push(&mut self, data: &[u8]) -> Result<(), RingError> {
        self.shared.push(data)
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.size() > 0
    }
}

/// Read half of a split [`FramedRing`]
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// See [`FramedRing::peek`]
    pub fn peek(&mut self) -> Option<&[u8]> {
        self.shared.peek()
    }

    /// See [`FramedRing::pop`]
    pub fn pop(&mut self, out: Option<&mut [u8]>) -> usize {
        self.shared.pop(out)
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.size() > 0
    }

    /// Return and reset the count of rejected pushes
    pub fn overflow_count(&self) -> u32 {
        self.shared.take_overflow()
    }
}
