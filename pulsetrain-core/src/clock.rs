//! Phase clock: where is a run at, given only elapsed wall-clock time?
//!
//! [`phase_at`] maps `(parameters, elapsed seconds)` to the current
//! [`Phase`], the time remaining in that phase, and the cycle index.
//! It is a pure function with no accumulated state, so a display layer
//! can sample it at any cadence without drift and two calls with the
//! same inputs always agree.
//!
//! The engine does not use this to drive hardware; timing there comes
//! from the device sample clock. This is the status/readout view only.

use crate::params::{GenerationParameters, RepeatMode};

/// The four externally visible phases of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// One-time neutral lead-in before the first trigger.
    InitialDelay,
    /// Output held at the active voltage.
    Active,
    /// Neutral stretch between triggers.
    Interval,
    /// Finite run has emitted all its cycles. Terminal.
    Done,
}

/// Snapshot returned by [`phase_at`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseStatus {
    pub phase: Phase,
    /// Seconds left in the current phase. Zero once [`Phase::Done`].
    pub remaining: f64,
    /// Zero-based cycle counter. For [`Phase::InitialDelay`] this is 0;
    /// for [`Phase::Done`] it is the total cycle count.
    pub cycle_index: u64,
}

/// Locate `elapsed` seconds (measured from run start) inside the run.
///
/// Negative `elapsed` is clamped to zero so a status tick racing the
/// recorded start timestamp cannot produce nonsense.
pub fn phase_at(p: &GenerationParameters, elapsed: f64) -> PhaseStatus {
    let elapsed = elapsed.max(0.0);
    let delay = p.initial_trigger_delay();

    if elapsed < delay {
        return PhaseStatus {
            phase: Phase::InitialDelay,
            remaining: delay - elapsed,
            cycle_index: 0,
        };
    }

    let t = elapsed - delay;
    let cycle = p.cycle_duration();

    if let RepeatMode::Finite(n) = p.repeat() {
        if t >= f64::from(n) * cycle {
            return PhaseStatus {
                phase: Phase::Done,
                remaining: 0.0,
                cycle_index: u64::from(n),
            };
        }
    }

    let cycle_index = (t / cycle).floor() as u64;
    let pos = t % cycle;
    if pos < p.trigger_duration() {
        PhaseStatus {
            phase: Phase::Active,
            remaining: p.trigger_duration() - pos,
            cycle_index,
        }
    } else {
        PhaseStatus {
            phase: Phase::Interval,
            remaining: cycle - pos,
            cycle_index,
        }
    }
}

// ------------------------------------ Tests --------------------------------------
