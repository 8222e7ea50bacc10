//! The narrow hardware-access interface the engine drives.
//!
//! Modeled on vendor analog-output APIs (create channel, configure the
//! sample clock, write a buffer, start/stop/clear the task): the engine
//! only ever needs these few calls, so the whole hardware binding hides
//! behind two small traits.
//!
//! - [`OutputDriver`]  : opens voltage-output sessions on a channel path
//! - [`OutputSession`] : one opened task; clock config, buffer write,
//!   start/stop/close, bounded completion waits, optional scalar write
//!
//! Static dispatch: the engine is generic over the driver type, the same
//! way the rest of the workspace avoids trait objects on hot paths.

use std::time::Duration;

use thiserror::Error;

/// Stringly-typed driver failure, as vendor C APIs report them.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Sample-clock mode for a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimingMode {
    /// Play exactly this many samples, then the task is done.
    Finite(usize),
    /// Loop the written buffer until stopped.
    Continuous,
}

/// Result of a bounded completion wait.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Completed,
    TimedOut,
}

/// Factory for output sessions on a device channel.
pub trait OutputDriver {
    type Session: OutputSession;

    /// Open a voltage-output session on `channel_path` (e.g. `"Dev2/ao0"`)
    /// with the given output range in volts.
    fn open_output_channel(
        &self,
        channel_path: &str,
        volt_min: f64,
        volt_max: f64,
    ) -> Result<Self::Session, DriverError>;
}

/// One opened hardware task. Owned by the engine thread for its whole
/// lifetime; never shared across threads.
pub trait OutputSession {
    fn configure_clock(&mut self, rate_hz: f64, mode: TimingMode) -> Result<(), DriverError>;

    /// Write samples (volts) into the task buffer before `start`.
    fn write_buffer(&mut self, samples: &[f64]) -> Result<(), DriverError>;

    fn start(&mut self) -> Result<(), DriverError>;

    fn stop(&mut self) -> Result<(), DriverError>;

    /// Release the task. Must be safe to call even after `stop` failed.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Block until the task finishes, at most `timeout`. Returns
    /// [`WaitStatus::TimedOut`] when the task is still running; callers
    /// poll in short bounded rounds so a stop request stays prompt.
    fn wait_until_done(&mut self, timeout: Duration) -> Result<WaitStatus, DriverError>;

    /// Whether [`write_scalar`](Self::write_scalar) is available.
    /// When it is not, callers fall back to a one-sample finite buffer.
    fn supports_scalar_write(&self) -> bool {
        false
    }

    /// Immediately drive the line to `voltage` on a started session.
    fn write_scalar(&mut self, _voltage: f64) -> Result<(), DriverError> {
        Err(DriverError::new("scalar write not supported by this driver"))
    }
}
