//! Engine-side error taxonomy and the terminal run outcome.
//!
//! Invalid parameters never reach this crate — they are rejected when
//! `GenerationParameters` is constructed. What remains is hardware:
//! a channel that cannot be opened, or a fault mid-run. Both are caught
//! at the point of occurrence, never abort the safe-shutdown sequence,
//! and collapse into a single terminal [`Outcome::Error`].

use thiserror::Error;

use crate::driver::DriverError;

/// Hardware-layer failures surfaced by the generation engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The output channel could not be opened at all (busy, absent,
    /// misconfigured device).
    #[error("output channel unavailable: {0}")]
    HardwareUnavailable(#[source] DriverError),

    /// Any driver error after the channel was opened.
    #[error("hardware fault during {stage}: {source}")]
    HardwareFault {
        stage: &'static str,
        #[source]
        source: DriverError,
    },
}

/// How a run ended. Delivered exactly once, strictly after the
/// safe-shutdown sequence has forced the channel back to neutral.
///
/// `Cancelled` is a normal outcome, not a failure: for both `Cancelled`
/// and `Error` the channel is safe, only the displayed reason differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A finite run played every cycle.
    Done,
    /// A stop request was observed at a poll point.
    Cancelled,
    /// A hardware fault ended the run early.
    Error(String),
}

impl Outcome {
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }
}

impl From<EngineError> for Outcome {
    fn from(e: EngineError) -> Self {
        Outcome::Error(e.to_string())
    }
}
