pub mod reservation;

use std::sync::Arc;

use self::reservation::Reservation;
use crate::error::Result;
use crate::ringbuf::Ringbuf;

/// A registered producer of the ring buffer.
///
/// Each producer owns one worker slot for its lifetime; the slot is
/// returned to the pool on drop. At most one reservation can be
/// outstanding per producer, which the `&mut self` borrow on
/// [`acquire`] enforces.
///
/// [`acquire`]: RingbufProducer::acquire
pub struct RingbufProducer {
    ringbuf: Arc<Ringbuf>,
    index: usize,
}

impl RingbufProducer {
    /// Register a producer on worker slot `index`.
    pub fn register(ringbuf: Arc<Ringbuf>, index: usize) -> Result<Self> {
        ringbuf.register(index)?;
        Ok(RingbufProducer { ringbuf, index })
    }

    /// Get the worker slot index of this producer.
    pub fn worker_index(&self) -> usize {
        self.index
    }

    /// Reserve a contiguous range of `len` bytes.
    ///
    /// Fails with `NotEnoughSpace` when the range cannot be granted
    /// without crossing the consumer; this is the normal back-pressure
    /// signal and the caller decides whether to retry or drop.
    pub fn acquire(&mut self, len: usize) -> Result<Reservation<'_>> {
        let offset = self.ringbuf.acquire(self.index, len as u64)?;
        Ok(Reservation::new(self, offset, len as u64))
    }

    pub(crate) fn ringbuf(&self) -> &Ringbuf {
        &self.ringbuf
    }
}

impl Drop for RingbufProducer {
    fn drop(&mut self) {
        self.ringbuf.unregister(self.index);
    }
}
