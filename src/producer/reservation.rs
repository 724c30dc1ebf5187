use std::ptr;
use std::slice;

use snafu::ensure;

use super::RingbufProducer;
use crate::error;
use crate::error::Result;

/// A contiguous range of the ring buffer granted to a producer.
///
/// The range is exclusively owned until it is published: fill it with
/// [`write`] and hand it to the consumer with [`commit`]. Dropping a
/// reservation also publishes it, with whatever content was written, so
/// an abandoned reservation cannot hold back the consumer forever.
///
/// [`write`]: Reservation::write
/// [`commit`]: Reservation::commit
pub struct Reservation<'a> {
    producer: &'a mut RingbufProducer,
    offset: u64,
    len: u64,
    written: u64,
    committed: bool,
}

impl<'a> Reservation<'a> {
    pub(super) fn new(
        producer: &'a mut RingbufProducer,
        offset: u64,
        len: u64,
    ) -> Self {
        Reservation {
            producer,
            offset,
            len,
            written: 0,
            committed: false,
        }
    }

    /// Offset of the range within the ring buffer.
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the range not yet filled.
    pub fn remaining(&self) -> usize {
        (self.len - self.written) as usize
    }

    /// Get the slice of the written data.
    pub fn slice(&self) -> &[u8] {
        unsafe {
            let start = self.producer.ringbuf().data_ptr(self.offset);
            slice::from_raw_parts(start, self.written as usize)
        }
    }

    /// Append `data` to the range.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let data_len = data.len() as u64;

        ensure!(
            data_len <= self.len - self.written,
            error::NotEnoughSpaceSnafu { requested: data_len }
        );

        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let position = self
                .producer
                .ringbuf()
                .data_ptr(self.offset + self.written);
            ptr::copy_nonoverlapping(data.as_ptr(), position, data.len());
        }

        self.written += data_len;
        Ok(())
    }

    /// Publish the range. The consumer can read the data once every
    /// earlier reservation has been published as well.
    pub fn commit(mut self) {
        self.publish();
    }

    fn publish(&mut self) {
        if !self.committed {
            self.committed = true;
            let index = self.producer.index;
            self.producer.ringbuf().produce(index);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.publish();
    }
}
