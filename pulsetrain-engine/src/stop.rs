//! Cooperative stop flag shared between the controlling thread and the
//! engine thread.
//!
//! This is the only cross-thread mutable datum in a run. It trips once,
//! never resets, and pairs the flag with a condvar so a bounded wait can
//! be interrupted the moment a stop is requested instead of always
//! sleeping out the full poll quantum.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Cloneable one-shot stop flag. All clones observe the same trip.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tripped: Mutex<bool>,
    cv: Condvar,
}

impl StopToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent; safe from any thread at any time,
    /// including before the run starts or after it finished.
    pub fn trip(&self) {
        let mut tripped = self
            .inner
            .tripped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *tripped = true;
        self.inner.cv.notify_all();
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        *self
            .inner
            .tripped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `dur`, waking early on a trip. Returns whether the
    /// token is tripped by the time this returns.
    pub fn wait_for(&self, dur: Duration) -> bool {
        let tripped = self
            .inner
            .tripped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *tripped {
            return true;
        }
        let (tripped, _timeout) = self
            .inner
            .cv
            .wait_timeout(tripped, dur)
            .unwrap_or_else(PoisonError::into_inner);
        *tripped
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn starts_untripped_and_trips_once() {
        let t = StopToken::new();
        assert!(!t.is_tripped());
        t.trip();
        t.trip(); // idempotent
        assert!(t.is_tripped());
        assert!(t.wait_for(Duration::from_millis(50)));
    }

    #[test]
    fn wait_times_out_when_untripped() {
        let t = StopToken::new();
        let begin = Instant::now();
        assert!(!t.wait_for(Duration::from_millis(20)));
        assert!(begin.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn trip_interrupts_a_pending_wait() {
        let t = StopToken::new();
        let remote = t.clone();
        let begin = Instant::now();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.trip();
        });
        assert!(t.wait_for(Duration::from_secs(5)));
        assert!(begin.elapsed() < Duration::from_secs(1));
        worker.join().unwrap();
    }
}
