pub(crate) mod offset;
pub(crate) mod worker;

use std::cell::UnsafeCell;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use crossbeam_utils::CachePadded;
use snafu::ensure;
use tracing::debug;
use tracing::trace;

use self::offset::is_locked;
use self::offset::offset_of;
use self::offset::pack;
use self::offset::wrap_incr;
use self::offset::wrap_of;
use self::offset::OFF_MASK;
use self::offset::OFF_MAX;
use self::offset::WRAP_LOCK_BIT;
use self::worker::Worker;
use crate::error;
use crate::error::Result;
use crate::settings::RingbufSettings;

/// Lock-free multi-producer single-consumer ring buffer with passive
/// tail update and contiguous range operations.
///
/// There are three offsets -- think of clock hands:
///
/// ```text
///        written                  seen (oldest)          next
///           |                       |                      |
///           v                       v                      v
/// +---------+-----------------------+----------------------+---------+
/// | free    | produced              | reserved             | free    |
/// +---------+-----------------------+----------------------+---------+
/// 0                                                            capacity
/// ```
///
/// - `next` marks the beginning of the available space. Producers
///   advance it by CAS to reserve a contiguous range.
/// - `written` is the point up to which consumed data has been
///   released. Only the consumer advances it.
/// - `ready`, the end of the consumable region, is not stored: the
///   consumer derives it as the minimum of `next` and every registered
///   producer's stable `seen_off` that is not behind `written`.
///
/// Producers observe and save the `next` offset, reserve `len` bytes by
/// atomically advancing it, fill the range, then publish by clearing the
/// saved value. The consumer drains everything between `written` and
/// `ready` in one contiguous shot, ending on a producer boundary.
///
/// Key invariant: producers never cross `written`; only the consumer may
/// catch up with `next`.
///
/// Wrap-around: when a reservation does not fit at the end of the
/// buffer, the producer restarts at offset 0, taking the wrap lock bit
/// inside the `next` word to publish the `end` offset (the last valid
/// byte of the pre-wrap region). A 31-bit counter in the `next` word is
/// incremented on every wrap so a stalled producer's CAS cannot succeed
/// against a re-aliased offset (the ABA problem).
///
/// The byte storage lives inside the buffer; a reservation hands out
/// exclusive write access to its subrange and the consumer gets a shared
/// view of fully-produced bytes.
pub struct Ringbuf {
    /// Ring buffer space in bytes.
    space: u64,

    /// The `next` hand: packed offset, wrap counter and wrap lock bit.
    /// Atomically updated by the producers.
    next: CachePadded<AtomicU64>,

    /// Offset of the last valid byte before the current wrap-around;
    /// `OFF_MAX` when unset. Written under the wrap lock.
    end: AtomicU64,

    /// The `written` hand. Updated only by the consumer.
    written: CachePadded<AtomicU64>,

    /// One record per registerable producer.
    workers: Box<[Worker]>,

    /// Whether a consumer handle currently exists.
    consumer: AtomicBool,

    /// Backing byte storage of `space` bytes.
    data: Box<[UnsafeCell<u8>]>,
}

unsafe impl Send for Ringbuf {}
unsafe impl Sync for Ringbuf {}

impl Ringbuf {
    /// Create a ring buffer with the given settings.
    pub fn new(settings: RingbufSettings) -> Result<Self> {
        let RingbufSettings { capacity, nworkers } = settings;

        ensure!(
            capacity > 0,
            error::InvalidParameterSnafu {
                detail: "capacity must be greater than zero",
            }
        );
        // Offsets must fit in the low 32 bits of the packed word, with
        // the all-ones value reserved as the idle/unset sentinel.
        ensure!(
            (capacity as u64) < OFF_MASK,
            error::InvalidCapacitySnafu { capacity }
        );

        let workers = (0..nworkers).map(|_| Worker::new()).collect();
        let data = (0..capacity).map(|_| UnsafeCell::new(0)).collect();

        Ok(Ringbuf {
            space: capacity as u64,
            next: CachePadded::new(AtomicU64::new(0)),
            end: AtomicU64::new(OFF_MAX),
            written: CachePadded::new(AtomicU64::new(0)),
            workers,
            consumer: AtomicBool::new(false),
            data,
        })
    }

    /// Get the capacity of the ring buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.space as usize
    }

    /// Get the number of worker slots.
    pub fn nworkers(&self) -> usize {
        self.workers.len()
    }

    /// Sizes of the control structures for the given worker count, as
    /// `(buffer_bytes, worker_bytes)`. The byte storage itself is not
    /// included; callers sizing a shared allocation add the capacity.
    pub fn sizes(nworkers: usize) -> (usize, usize) {
        let worker_size = mem::size_of::<Worker>();
        (mem::size_of::<Ringbuf>() + nworkers * worker_size, worker_size)
    }

    pub(crate) fn worker(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    /// Claim worker slot `index` for a producer.
    pub(crate) fn register(&self, index: usize) -> Result<()> {
        ensure!(index < self.workers.len(), {
            let detail = format!(
                "worker index {} out of range, nworkers is {}",
                index,
                self.workers.len()
            );
            error::InvalidParameterSnafu { detail }
        });
        ensure!(
            self.workers[index].try_register(),
            error::OutOfWorkersSnafu { index }
        );
        debug!(index, "registered producer");
        Ok(())
    }

    /// Return worker slot `index` to the pool. The producer must not
    /// hold a reservation.
    pub(crate) fn unregister(&self, index: usize) {
        self.workers[index].unregister();
        debug!(index, "unregistered producer");
    }

    /// Claim the consumer role. Returns false if it is already taken.
    pub(crate) fn attach_consumer(&self) -> bool {
        self.consumer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn detach_consumer(&self) {
        self.consumer.store(false, Ordering::Release);
    }

    /// Capture a stable value of the `next` offset, spinning past a
    /// producer that holds the wrap lock.
    fn stable_next(&self) -> u64 {
        let backoff = Backoff::new();
        loop {
            let next = self.next.load(Ordering::Acquire);
            if !is_locked(next) {
                debug_assert!(offset_of(next) < self.space);
                return next;
            }
            backoff.snooze();
        }
    }

    /// Request a contiguous range of `len` bytes in the ring buffer.
    ///
    /// On success returns the offset at which the range starts. Fails
    /// with `NotEnoughSpace` when granting the range would cross the
    /// `written` offset; this is the normal back-pressure signal, not an
    /// exceptional condition.
    pub(crate) fn acquire(&self, index: usize, len: u64) -> Result<u64> {
        ensure!(
            len > 0,
            error::InvalidParameterSnafu {
                detail: "acquire length must be greater than zero",
            }
        );
        ensure!(
            len <= self.space,
            error::ExceedCapacitySnafu {
                expected: len,
                capacity: self.space,
            }
        );

        let w = self.worker(index);
        debug_assert!(w.is_registered());
        debug_assert_eq!(w.seen(), OFF_MAX);

        let mut next;
        let mut target;
        loop {
            // Get the stable `next` offset and save the observed value,
            // marked unstable so the consumer ignores it. The CAS below
            // issues a release and thus ensures the saved value reaches
            // global visibility together with the new `next`.
            let seen = self.stable_next();
            next = offset_of(seen);
            w.set_seen_unstable(next | WRAP_LOCK_BIT);

            // Compute the target offset. Key invariant: we cannot go
            // beyond the `written` offset or catch up with it.
            target = next + len;
            let written = self.written.load(Ordering::Acquire);
            if next < written && target >= written {
                w.clear_seen();
                trace!(len, next, written, "acquire refused");
                return error::NotEnoughSpaceSnafu { requested: len }.fail();
            }

            if target >= self.space {
                // Wrap-around and start from the beginning. If the
                // range would exceed the buffer, take the wrap lock and
                // use the space at the beginning; if it fills the space
                // exactly to the end, reset to 0. Re-check the
                // invariant against the post-wrap start offset.
                let exceed = target > self.space;
                let start = if exceed { len } else { 0 };
                if start >= written {
                    w.clear_seen();
                    trace!(len, next, written, "acquire refused at wrap");
                    return error::NotEnoughSpaceSnafu { requested: len }
                        .fail();
                }
                target = pack(start, wrap_incr(wrap_of(seen)), exceed);
            } else {
                // Preserve the wrap-around counter.
                target = pack(target, wrap_of(seen), false);
            }

            if self
                .next
                .compare_exchange_weak(
                    seen,
                    target,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }

        // Acquired the range; the observed value is now stable.
        w.publish_seen(next);

        // If we are performing the wrap-around, publish the `end`
        // offset and only then release the wrap lock.
        if is_locked(target) {
            // Cannot wrap-around again if the consumer did not catch up.
            debug_assert!(self.written.load(Ordering::Relaxed) <= next);
            debug_assert_eq!(self.end.load(Ordering::Relaxed), OFF_MAX);
            self.end.store(next, Ordering::Relaxed);
            trace!(end = next, len, "producer wrap-around");

            self.next.store(target & !WRAP_LOCK_BIT, Ordering::Release);
            next = 0;
        }
        debug_assert!(offset_of(target) <= self.space);
        Ok(next)
    }

    /// Indicate that the acquired range has been filled and is ready to
    /// be consumed.
    pub(crate) fn produce(&self, index: usize) {
        let w = self.worker(index);
        debug_assert!(w.is_registered());
        debug_assert_ne!(w.seen(), OFF_MAX);
        w.clear_seen();
    }

    /// Get a contiguous range which is ready to be consumed, as
    /// `(offset, len)`. A zero `len` means nothing is ready.
    ///
    /// Must only be called by the single consumer.
    pub(crate) fn consume(&self) -> (u64, u64) {
        let mut written = self.written.load(Ordering::Relaxed);
        loop {
            let next = offset_of(self.stable_next());
            if written == next {
                // Producers did not advance; nothing to do.
                return (written, 0);
            }

            // Observe the stable `seen` offset of each producer to
            // bound the frontier by the oldest in-flight reservation.
            // Values behind `written` are from before a wrap-around and
            // are filtered out; the idle sentinel falls through the
            // minimum harmlessly.
            let mut ready = OFF_MAX;
            for w in self.workers.iter() {
                if !w.is_registered() {
                    continue;
                }
                let seen = w.stable_seen();
                if seen >= written {
                    ready = ready.min(seen);
                }
                debug_assert!(ready >= written);
            }

            // Determine whether a wrap-around occurred and deduce the
            // safe frontier.
            if next < written {
                let end = self.space.min(self.end.load(Ordering::Relaxed));

                if ready == OFF_MAX && written == end {
                    // All producers are past the cut off and the tail
                    // of the buffer is drained: wrap the consumer
                    // around as well. The sentinel store must be
                    // visible before the new `written`.
                    self.end.store(OFF_MAX, Ordering::Relaxed);
                    self.written.store(0, Ordering::Release);
                    written = 0;
                    debug!("consumer wrap-around");
                    continue;
                }
                ready = ready.min(end);
                debug_assert!(ready >= written);
            } else {
                ready = ready.min(next);
            }
            return (written, ready - written);
        }
    }

    /// Indicate that the consumed range can now be released for reuse
    /// by the producers.
    pub(crate) fn release(&self, nbytes: u64) {
        if nbytes == 0 {
            return;
        }
        let written = self.written.load(Ordering::Relaxed);
        let nwritten = written + nbytes;

        debug_assert!(nwritten <= self.space);
        debug_assert!(nwritten <= self.end.load(Ordering::Relaxed));

        let nwritten = if nwritten == self.space { 0 } else { nwritten };
        self.written.store(nwritten, Ordering::Release);
    }

    /// Raw pointer to the byte at `off`.
    ///
    /// # Safety
    ///
    /// The caller must hold either an unproduced reservation covering
    /// the bytes it writes, or an unreleased consumed range covering the
    /// bytes it reads.
    pub(crate) unsafe fn data_ptr(&self, off: u64) -> *mut u8 {
        debug_assert!(off < self.space);
        self.data[off as usize].get()
    }
}
