use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

use super::offset::is_locked;
use super::offset::OFF_MAX;

/// Per-producer record.
///
/// `seen_off` is the offset the producer observed as `next` at the start
/// of its acquisition. It cycles through three states:
///
/// ```text
/// OFF_MAX ----------------> offset | WRAP_LOCK_BIT ----------------> offset
///   idle    (acquire start)   unstable, ignore me    (CAS landed)    stable
///    ^                                                                 |
///    +------------------------- (produce) ----------------------------+
/// ```
///
/// The consumer uses the stable value to bound the ready frontier from
/// below by the oldest in-flight reservation.
#[derive(Debug)]
pub(crate) struct Worker {
    seen_off: AtomicU64,
    registered: AtomicBool,
}

impl Worker {
    pub(crate) fn new() -> Self {
        Worker {
            seen_off: AtomicU64::new(OFF_MAX),
            registered: AtomicBool::new(false),
        }
    }

    /// Claim this slot for a producer. Fails if it is already taken.
    pub(crate) fn try_register(&self) -> bool {
        // The idle sentinel must be in place before the slot becomes
        // visible to the consumer scan.
        self.seen_off.store(OFF_MAX, Ordering::Relaxed);
        self.registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Return the slot to the pool.
    pub(crate) fn unregister(&self) {
        debug_assert_eq!(self.seen_off.load(Ordering::Relaxed), OFF_MAX);
        self.registered.store(false, Ordering::Release);
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Relaxed)
    }

    /// Record the observed `next` offset, still marked unstable.
    #[inline]
    pub(crate) fn set_seen_unstable(&self, off: u64) {
        self.seen_off.store(off, Ordering::Relaxed);
    }

    /// Mark the observed offset as stable; the consumer may use it now.
    #[inline]
    pub(crate) fn publish_seen(&self, off: u64) {
        self.seen_off.store(off, Ordering::Release);
    }

    /// Drop the reservation: back to idle, after a release so the bytes
    /// written into the reserved range are visible first.
    #[inline]
    pub(crate) fn clear_seen(&self) {
        self.seen_off.store(OFF_MAX, Ordering::Release);
    }

    #[inline]
    pub(crate) fn seen(&self) -> u64 {
        self.seen_off.load(Ordering::Relaxed)
    }

    /// Capture a usable `seen_off`: either the idle sentinel or a stable
    /// offset. Spins past the short window in which a producer has
    /// observed `next` but its CAS has not landed yet.
    pub(crate) fn stable_seen(&self) -> u64 {
        let backoff = Backoff::new();
        loop {
            let seen = self.seen_off.load(Ordering::Acquire);
            if seen == OFF_MAX || !is_locked(seen) {
                return seen;
            }
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ringbuf::offset::WRAP_LOCK_BIT;

    #[test]
    fn test_register_cycle() {
        let w = Worker::new();
        assert!(!w.is_registered());

        assert!(w.try_register());
        assert!(w.is_registered());
        assert!(!w.try_register());

        w.unregister();
        assert!(!w.is_registered());
        assert!(w.try_register());
    }

    #[test]
    fn test_seen_states() {
        let w = Worker::new();
        assert_eq!(w.stable_seen(), OFF_MAX);

        w.set_seen_unstable(100 | WRAP_LOCK_BIT);
        assert_eq!(w.seen(), 100 | WRAP_LOCK_BIT);

        w.publish_seen(100);
        assert_eq!(w.stable_seen(), 100);

        w.clear_seen();
        assert_eq!(w.stable_seen(), OFF_MAX);
    }
}
