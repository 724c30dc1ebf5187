use std::slice;
use std::sync::Arc;

use snafu::ensure;

use crate::error;
use crate::error::Result;
use crate::ringbuf::Ringbuf;

/// The single consumer of the ring buffer.
///
/// Only one consumer may be attached to a ring buffer at a time;
/// attaching claims the role and dropping the consumer releases it.
pub struct RingbufConsumer {
    ringbuf: Arc<Ringbuf>,
}

impl RingbufConsumer {
    /// Attach the consumer to the ring buffer.
    pub fn attach(ringbuf: Arc<Ringbuf>) -> Result<Self> {
        ensure!(ringbuf.attach_consumer(), error::ConsumerAttachedSnafu);
        Ok(RingbufConsumer { ringbuf })
    }

    /// Get the contiguous range which is ready to be consumed, ending
    /// on a producer boundary. Returns `None` when nothing is ready.
    ///
    /// The range stays consumable until it is released: consuming again
    /// without releasing returns the same range.
    pub fn consume(&mut self) -> Option<Consumed<'_>> {
        let (offset, len) = self.ringbuf.consume();
        if len == 0 {
            return None;
        }
        Some(Consumed {
            consumer: self,
            offset,
            len,
        })
    }
}

impl Drop for RingbufConsumer {
    fn drop(&mut self) {
        self.ringbuf.detach_consumer();
    }
}

/// A fully-produced contiguous range handed to the consumer.
///
/// [`release`] returns the range to the producers; dropping without
/// releasing leaves it consumable.
///
/// [`release`]: Consumed::release
pub struct Consumed<'a> {
    consumer: &'a mut RingbufConsumer,
    offset: u64,
    len: u64,
}

impl Consumed<'_> {
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

    /// Get the slice of the produced data.
    pub fn as_slice(&self) -> &[u8] {
        unsafe {
            let start = self.consumer.ringbuf.data_ptr(self.offset);
            slice::from_raw_parts(start, self.len as usize)
        }
    }

    /// Release the range for reuse by the producers.
    pub fn release(self) {
        self.consumer.ringbuf.release(self.len);
    }
}
