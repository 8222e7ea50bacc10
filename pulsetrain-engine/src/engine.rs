//! The generation engine: one run of a trigger train, start to safe stop.
//!
//! Lifecycle
//! `Idle -> InitialDelay -> Cycling -> (Done | Cancelled | Faulted) ->
//! ShuttingDown -> Stopped`; a fresh engine is built per run and
//! consumed by [`GenerationEngine::run`].
//!
//! Rules the whole module is built around:
//! - Every wait is short and bounded (one poll quantum), so a stop
//!   request is observed within one quantum.
//! - The engine never raises past its own boundary mid-run: driver
//!   errors are caught, the shutdown sequence still executes, and the
//!   caller sees a single terminal [`Outcome`].
//! - The safe-shutdown sequence runs on every exit path, including
//!   "could not even open the channel". It releases whatever task is
//!   still active, lets the channel settle, then forces the line to the
//!   neutral voltage through a fresh minimal task.
//!
//! Phase/countdown readout for display is *not* tracked here; that is
//! the pure phase clock's job, sampled by the controlling thread.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use pulsetrain_core::params::{defaults, GenerationParameters, RepeatMode};
use pulsetrain_core::waveform;

use crate::driver::{DriverError, OutputDriver, OutputSession, TimingMode, WaitStatus};
use crate::error::{EngineError, Outcome};
use crate::stop::StopToken;

// ------------------------------- Configuration -----------------------------------

/// Timing knobs for the poll/shutdown machinery. Defaults mirror what
/// the hardware tolerates comfortably; tests shrink them to keep runs
/// in the millisecond range.
#[derive(Copy, Clone, Debug)]
pub struct EngineConfig {
    /// Bounded-wait quantum; stop requests are observed within one.
    pub poll: Duration,
    /// Pause between releasing the last task and opening the
    /// forced-neutral task, so the hardware frees the channel.
    pub settle: Duration,
    /// Slack past the nominal initial delay before the wait is declared
    /// hung.
    pub delay_grace: Duration,
    /// Slack past the nominal finite-run length before the wait is
    /// declared hung.
    pub finite_grace: Duration,
    /// Completion wait for the one-sample neutral write fallback.
    pub fallback_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(100),
            settle: Duration::from_millis(50),
            delay_grace: Duration::from_secs(5),
            finite_grace: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(10),
        }
    }
}

// --------------------------------- Run stages ------------------------------------

/// Coarse lifecycle of a run, for logging and post-mortems. The fine
/// Active/Interval alternation lives in the hardware buffer, not here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RunStage {
    Idle,
    InitialDelay,
    Cycling,
    Done,
    Cancelled,
    Faulted,
    ShuttingDown,
    Stopped,
}

/// How the drive portion of a run ended (faults travel as `Err`).
enum RunEnd {
    Completed,
    Cancelled,
}

/// Outcome of one bounded-wait poll loop.
enum Poll {
    Completed,
    Cancelled,
}

#[inline]
fn fault(stage: &'static str) -> impl FnOnce(DriverError) -> EngineError {
    move |source| EngineError::HardwareFault { stage, source }
}

// ----------------------------------- Engine --------------------------------------

/// Drives one run on its own thread context. Owns the hardware session
/// for the run's whole duration; the only thing shared with the outside
/// is the [`StopToken`].
pub struct GenerationEngine<D: OutputDriver> {
    driver: D,
    params: GenerationParameters,
    cfg: EngineConfig,
    stop: StopToken,
    stage: RunStage,
}

impl<D: OutputDriver> GenerationEngine<D> {
    pub fn new(driver: D, params: GenerationParameters, stop: StopToken) -> Self {
        Self::with_config(driver, params, stop, EngineConfig::default())
    }

    pub fn with_config(
        driver: D,
        params: GenerationParameters,
        stop: StopToken,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            driver,
            params,
            cfg,
            stop,
            stage: RunStage::Idle,
        }
    }

    /// Execute the run to completion. Consumes the engine: `Stopped` is
    /// terminal and a new run needs a new engine.
    ///
    /// Returns strictly after the safe-shutdown sequence, so when this
    /// function hands back an [`Outcome`] the channel is already at the
    /// neutral voltage (or the failure to force it has been logged).
    pub fn run(mut self) -> Outcome {
        let mut active: Option<D::Session> = None;
        let end = self.drive(&mut active);

        match &end {
            Ok(RunEnd::Completed) => self.set_stage(RunStage::Done),
            Ok(RunEnd::Cancelled) => self.set_stage(RunStage::Cancelled),
            Err(e) => {
                warn!("run aborted: {e}");
                self.set_stage(RunStage::Faulted);
            }
        }

        self.set_stage(RunStage::ShuttingDown);
        self.safe_shutdown(active);
        self.set_stage(RunStage::Stopped);

        match end {
            Ok(RunEnd::Completed) => Outcome::Done,
            Ok(RunEnd::Cancelled) => Outcome::Cancelled,
            Err(e) => e.into(),
        }
    }

    fn set_stage(&mut self, next: RunStage) {
        debug!("engine stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    // ------------------------------ drive paths -----------------------------------

    fn drive(&mut self, active: &mut Option<D::Session>) -> Result<RunEnd, EngineError> {
        match self.params.repeat() {
            RepeatMode::Infinite => self.drive_infinite(active),
            RepeatMode::Finite(n) => self.drive_finite(active, n),
        }
    }

    /// Infinite mode: play the lead-in as its own finite task, release
    /// it, then hand the hardware one cycle to loop until a stop.
    fn drive_infinite(&mut self, active: &mut Option<D::Session>) -> Result<RunEnd, EngineError> {
        if self.params.initial_delay_samples() > 0 {
            self.set_stage(RunStage::InitialDelay);
            let delay = waveform::delay_buffer(&self.params);
            let mode = TimingMode::Finite(delay.len());
            self.begin_playback(active, &delay, mode)?;

            let deadline = Duration::from_secs_f64(self.params.initial_trigger_delay())
                + self.cfg.delay_grace;
            if let Poll::Cancelled = self.poll_playback(active, deadline)? {
                return Ok(RunEnd::Cancelled);
            }

            // Release the lead-in task before opening the looping one on
            // the same channel.
            if let Some(sess) = active.as_mut() {
                sess.stop().map_err(fault("lead-in stop"))?;
                sess.close().map_err(fault("lead-in close"))?;
            }
            *active = None;
        }

        if self.stop.is_tripped() {
            return Ok(RunEnd::Cancelled);
        }

        self.set_stage(RunStage::Cycling);
        let cycle = waveform::cycle_buffer(&self.params);
        self.begin_playback(active, &cycle, TimingMode::Continuous)?;

        // The hardware loops the cycle on its own clock; all that is
        // left is watching for a stop.
        loop {
            if self.stop.wait_for(self.cfg.poll) {
                return Ok(RunEnd::Cancelled);
            }
        }
    }

    /// Finite mode: one task, one buffer (lead-in + N cycles), one
    /// bounded completion wait.
    fn drive_finite(
        &mut self,
        active: &mut Option<D::Session>,
        repeats: u32,
    ) -> Result<RunEnd, EngineError> {
        self.set_stage(if self.params.initial_delay_samples() > 0 {
            RunStage::InitialDelay
        } else {
            RunStage::Cycling
        });

        let buf = waveform::finite_buffer(&self.params, repeats);
        let mode = TimingMode::Finite(buf.len());
        self.begin_playback(active, &buf, mode)?;

        let expected = self.params.expected_duration().unwrap_or(0.0);
        let deadline = Duration::from_secs_f64(expected) + self.cfg.finite_grace;
        match self.poll_playback(active, deadline)? {
            Poll::Completed => Ok(RunEnd::Completed),
            Poll::Cancelled => Ok(RunEnd::Cancelled),
        }
    }

    // ------------------------------- primitives -----------------------------------

    fn open(&self) -> Result<D::Session, EngineError> {
        self.driver
            .open_output_channel(
                self.params.channel_path(),
                defaults::VOLTAGE_MIN,
                defaults::VOLTAGE_MAX,
            )
            .map_err(EngineError::HardwareUnavailable)
    }

    /// Open a session, load `samples`, start the clock. The session is
    /// parked in `active` even when setup fails, so the shutdown
    /// sequence can release it.
    fn begin_playback(
        &mut self,
        active: &mut Option<D::Session>,
        samples: &[f64],
        mode: TimingMode,
    ) -> Result<(), EngineError> {
        let mut sess = self.open()?;
        let setup = Self::setup_playback(&mut sess, self.params.sampling_rate(), samples, mode);
        *active = Some(sess);
        setup
    }

    fn setup_playback(
        sess: &mut D::Session,
        rate_hz: f64,
        samples: &[f64],
        mode: TimingMode,
    ) -> Result<(), EngineError> {
        sess.configure_clock(rate_hz, mode)
            .map_err(fault("clock configuration"))?;
        sess.write_buffer(samples).map_err(fault("buffer write"))?;
        sess.start().map_err(fault("task start"))
    }

    /// Wait for the active task to finish in bounded rounds, observing
    /// the stop flag between rounds. `deadline` is the nominal playback
    /// length plus grace; past it the hardware is declared hung.
    fn poll_playback(
        &mut self,
        active: &mut Option<D::Session>,
        deadline: Duration,
    ) -> Result<Poll, EngineError> {
        let begin = Instant::now();
        loop {
            if self.stop.is_tripped() {
                return Ok(Poll::Cancelled);
            }
            let sess = active.as_mut().ok_or_else(|| EngineError::HardwareFault {
                stage: "completion wait",
                source: DriverError::new("no active task"),
            })?;
            match sess
                .wait_until_done(self.cfg.poll)
                .map_err(fault("completion wait"))?
            {
                WaitStatus::Completed => return Ok(Poll::Completed),
                WaitStatus::TimedOut => {}
            }
            if begin.elapsed() > deadline {
                return Err(EngineError::HardwareFault {
                    stage: "completion wait",
                    source: DriverError::new("playback did not finish within its deadline"),
                });
            }
        }
    }

    // ------------------------------ safe shutdown ----------------------------------

    /// Unconditional cleanup: release whatever task is active, let the
    /// channel settle, then force the line to the neutral voltage with a
    /// fresh minimal task. Errors here are logged, never raised — this
    /// runs on every exit path and must finish.
    fn safe_shutdown(&mut self, active: Option<D::Session>) {
        if let Some(mut sess) = active {
            if let Err(e) = sess.stop() {
                warn!("stopping the active task during shutdown failed: {e}");
            }
            if let Err(e) = sess.close() {
                warn!("closing the active task during shutdown failed: {e}");
            }
        }

        thread::sleep(self.cfg.settle);

        let neutral = self.params.neutral_voltage();
        match self.open() {
            Err(e) => warn!("cannot reopen channel to force neutral output: {e}"),
            Ok(mut sess) => {
                let forced = if sess.supports_scalar_write() {
                    sess.start().and_then(|()| sess.write_scalar(neutral))
                } else {
                    // One-sample finite playback of the neutral level.
                    sess.configure_clock(defaults::SAMPLING_RATE_HZ, TimingMode::Finite(1))
                        .and_then(|()| sess.write_buffer(&[neutral]))
                        .and_then(|()| sess.start())
                        .and_then(|()| sess.wait_until_done(self.cfg.fallback_timeout).map(|_| ()))
                };
                match forced {
                    Ok(()) => debug!("output forced to {neutral} V"),
                    Err(e) => warn!("forcing neutral output failed: {e}"),
                }
                if let Err(e) = sess.stop() {
                    warn!("stopping the neutral task failed: {e}");
                }
                if let Err(e) = sess.close() {
                    warn!("closing the neutral task failed: {e}");
                }
            }
        }
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDriver;

    fn test_cfg() -> EngineConfig {
        EngineConfig {
            poll: Duration::from_millis(2),
            settle: Duration::from_millis(1),
            ..EngineConfig::default()
        }
    }

    fn finite_params(n: u32) -> GenerationParameters {
        // 10 ms trigger + 10 ms interval, no lead-in
        GenerationParameters::new("Dev2/ao0", 1000.0, 0.01, 0.01, 0.0, RepeatMode::Finite(n))
            .unwrap()
    }

    #[test]
    fn finite_run_completes_and_forces_neutral_once() {
        let drv = SimDriver::new();
        let probe = drv.probe();
        let p = finite_params(3);
        let engine = GenerationEngine::with_config(drv, p.clone(), StopToken::new(), test_cfg());

        assert_eq!(engine.run(), Outcome::Done);
        assert_eq!(probe.forced_levels(), vec![p.neutral_voltage()]);
        assert_eq!(probe.level(), p.neutral_voltage());
        assert_eq!(probe.open_count(), probe.close_count());
    }

    #[test]
    fn fallback_neutral_write_when_scalar_is_unsupported() {
        let drv = SimDriver::new().without_scalar_write();
        let probe = drv.probe();
        let p = finite_params(2);
        let engine = GenerationEngine::with_config(drv, p.clone(), StopToken::new(), test_cfg());

        assert_eq!(engine.run(), Outcome::Done);
        assert_eq!(probe.forced_levels(), vec![p.neutral_voltage()]);
        assert_eq!(probe.level(), p.neutral_voltage());
    }

    #[test]
    fn pre_tripped_stop_cancels_an_infinite_run_quickly() {
        let drv = SimDriver::new();
        let probe = drv.probe();
        let p = GenerationParameters::new(
            "Dev2/ao0",
            1000.0,
            0.2,
            20.0,
            5.0,
            RepeatMode::Infinite,
        )
        .unwrap();
        let stop = StopToken::new();
        stop.trip();
        let engine = GenerationEngine::with_config(drv, p.clone(), stop, test_cfg());

        let begin = Instant::now();
        assert_eq!(engine.run(), Outcome::Cancelled);
        // nowhere near the 5 s lead-in
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(probe.forced_levels(), vec![p.neutral_voltage()]);
    }

    #[test]
    fn unopenable_channel_surfaces_error_without_panicking() {
        let drv = SimDriver::new().failing_open();
        let probe = drv.probe();
        let p = finite_params(1);
        let engine = GenerationEngine::with_config(drv, p, StopToken::new(), test_cfg());

        let out = engine.run();
        assert!(out.is_error(), "got {out:?}");
        // shutdown tried and failed to reopen; nothing was forced, but
        // nothing panicked either
        assert!(probe.forced_levels().is_empty());
    }

    #[test]
    fn mid_run_fault_still_forces_neutral() {
        let drv = SimDriver::new().failing_writes();
        let probe = drv.probe();
        let p = finite_params(2);
        let engine = GenerationEngine::with_config(drv, p.clone(), StopToken::new(), test_cfg());

        let out = engine.run();
        assert!(out.is_error(), "got {out:?}");
        assert_eq!(probe.forced_levels(), vec![p.neutral_voltage()]);
        assert_eq!(probe.level(), p.neutral_voltage());
        assert_eq!(probe.open_count(), probe.close_count());
    }
}
