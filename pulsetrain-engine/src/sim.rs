//! Software-clocked simulation driver.
//!
//! Stands in for real DAQ hardware the way the original tooling runs
//! without its vendor library: sessions are plain structs whose "task"
//! completes on the wall clock at `samples / rate` seconds. Doubles as
//! the test harness — a [`SimProbe`] records every driver call and the
//! line's final level, and faults can be injected at open or write.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::driver::{DriverError, OutputDriver, OutputSession, TimingMode, WaitStatus};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Open(String),
    ConfigureClock { rate_hz: f64, mode: TimingMode },
    WriteBuffer { len: usize, first: f64, last: f64 },
    Start,
    Stop,
    Close,
    WriteScalar(f64),
}

/// Shared observer handed out by [`SimDriver::probe`]. Clones see the
/// same recording.
#[derive(Clone, Debug, Default)]
pub struct SimProbe {
    events: Arc<Mutex<Vec<SimEvent>>>,
    level: Arc<Mutex<f64>>,
}

impl SimProbe {
    fn record(&self, ev: SimEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ev);
    }

    fn set_level(&self, v: f64) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = v;
    }

    /// Snapshot of every call made so far, in order.
    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The voltage the line sits at right now.
    pub fn level(&self) -> f64 {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Open(_)))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Close))
            .count()
    }

    /// Voltages pushed by forced single-value outputs: scalar writes plus
    /// one-sample buffer writes. This is what the safe-shutdown sequence
    /// produces, in either of its two flavors.
    pub fn forced_levels(&self) -> Vec<f64> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::WriteScalar(v) => Some(*v),
                SimEvent::WriteBuffer { len: 1, last, .. } => Some(*last),
                _ => None,
            })
            .collect()
    }
}

/// Simulated analog-output driver.
#[derive(Clone, Debug)]
pub struct SimDriver {
    scalar_write: bool,
    fail_open: bool,
    fail_write: bool,
    probe: SimProbe,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            scalar_write: true,
            fail_open: false,
            fail_write: false,
            probe: SimProbe::default(),
        }
    }

    /// Pretend the vendor API lacks the immediate scalar write, forcing
    /// the one-sample-buffer fallback.
    #[must_use]
    pub fn without_scalar_write(mut self) -> Self {
        self.scalar_write = false;
        self
    }

    /// Every `open_output_channel` fails, as with absent/busy hardware.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Every multi-sample buffer write fails mid-run. Single-sample
    /// writes still succeed so the shutdown fallback stays testable.
    #[must_use]
    pub fn failing_writes(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }
}

impl OutputDriver for SimDriver {
    type Session = SimSession;

    fn open_output_channel(
        &self,
        channel_path: &str,
        _volt_min: f64,
        _volt_max: f64,
    ) -> Result<SimSession, DriverError> {
        if self.fail_open {
            return Err(DriverError::new(format!(
                "cannot open {channel_path}: device unavailable"
            )));
        }
        self.probe.record(SimEvent::Open(channel_path.to_string()));
        Ok(SimSession {
            probe: self.probe.clone(),
            scalar_write: self.scalar_write,
            fail_write: self.fail_write,
            rate_hz: 0.0,
            mode: None,
            pending_len: 0,
            pending_last: 0.0,
            started_at: None,
        })
    }
}

/// A simulated task. Finite playback completes when wall-clock time
/// reaches `pending_len / rate` after `start`.
#[derive(Debug)]
pub struct SimSession {
    probe: SimProbe,
    scalar_write: bool,
    fail_write: bool,
    rate_hz: f64,
    mode: Option<TimingMode>,
    pending_len: usize,
    pending_last: f64,
    started_at: Option<Instant>,
}

impl SimSession {
    fn playback(&self) -> Duration {
        if self.rate_hz <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.pending_len as f64 / self.rate_hz)
    }
}

impl OutputSession for SimSession {
    fn configure_clock(&mut self, rate_hz: f64, mode: TimingMode) -> Result<(), DriverError> {
        self.rate_hz = rate_hz;
        self.mode = Some(mode);
        self.probe.record(SimEvent::ConfigureClock { rate_hz, mode });
        Ok(())
    }

    fn write_buffer(&mut self, samples: &[f64]) -> Result<(), DriverError> {
        if samples.is_empty() {
            return Err(DriverError::new("empty buffer write"));
        }
        if self.fail_write && samples.len() > 1 {
            return Err(DriverError::new("buffer write refused (injected fault)"));
        }
        self.pending_len = samples.len();
        self.pending_last = samples[samples.len() - 1];
        self.probe.record(SimEvent::WriteBuffer {
            len: samples.len(),
            first: samples[0],
            last: self.pending_last,
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.started_at = Some(Instant::now());
        self.probe.record(SimEvent::Start);
        // A finite task leaves the line at its buffer's final sample.
        if matches!(self.mode, Some(TimingMode::Finite(_))) {
            self.probe.set_level(self.pending_last);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.probe.record(SimEvent::Stop);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.probe.record(SimEvent::Close);
        Ok(())
    }

    fn wait_until_done(&mut self, timeout: Duration) -> Result<WaitStatus, DriverError> {
        let Some(started) = self.started_at else {
            return Err(DriverError::new("wait on a task that was never started"));
        };
        match self.mode {
            Some(TimingMode::Finite(_)) => {
                let done_at = started + self.playback();
                let now = Instant::now();
                if now >= done_at {
                    return Ok(WaitStatus::Completed);
                }
                thread::sleep((done_at - now).min(timeout));
                if Instant::now() >= done_at {
                    Ok(WaitStatus::Completed)
                } else {
                    Ok(WaitStatus::TimedOut)
                }
            }
            Some(TimingMode::Continuous) => {
                thread::sleep(timeout);
                Ok(WaitStatus::TimedOut)
            }
            None => Err(DriverError::new("wait on an unconfigured task")),
        }
    }

    fn supports_scalar_write(&self) -> bool {
        self.scalar_write
    }

    fn write_scalar(&mut self, voltage: f64) -> Result<(), DriverError> {
        if !self.scalar_write {
            return Err(DriverError::new("scalar write not supported by this driver"));
        }
        self.probe.record(SimEvent::WriteScalar(voltage));
        self.probe.set_level(voltage);
        Ok(())
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_task_completes_on_the_wall_clock() {
        let drv = SimDriver::new();
        let mut s = drv.open_output_channel("Dev2/ao0", -10.0, 10.0).unwrap();
        s.configure_clock(1000.0, TimingMode::Finite(30)).unwrap();
        s.write_buffer(&[1.0; 30]).unwrap();
        s.start().unwrap();
        // 30 samples at 1 kHz = 30 ms
        let mut done = false;
        for _ in 0..20 {
            if s.wait_until_done(Duration::from_millis(10)).unwrap() == WaitStatus::Completed {
                done = true;
                break;
            }
        }
        assert!(done);
        assert_eq!(drv.probe().level(), 1.0);
    }

    #[test]
    fn continuous_task_never_completes() {
        let drv = SimDriver::new();
        let mut s = drv.open_output_channel("Dev2/ao0", -10.0, 10.0).unwrap();
        s.configure_clock(1000.0, TimingMode::Continuous).unwrap();
        s.write_buffer(&[2.0, 0.0]).unwrap();
        s.start().unwrap();
        assert_eq!(
            s.wait_until_done(Duration::from_millis(5)).unwrap(),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn probe_sees_calls_in_order() {
        let drv = SimDriver::new();
        let mut s = drv.open_output_channel("Dev2/ao0", -10.0, 10.0).unwrap();
        s.configure_clock(1000.0, TimingMode::Finite(2)).unwrap();
        s.write_buffer(&[2.0, 0.0]).unwrap();
        s.start().unwrap();
        s.stop().unwrap();
        s.close().unwrap();
        let ev = drv.probe().events();
        assert_eq!(ev[0], SimEvent::Open("Dev2/ao0".into()));
        assert!(matches!(ev[1], SimEvent::ConfigureClock { .. }));
        assert_eq!(ev[4], SimEvent::Stop);
        assert_eq!(ev[5], SimEvent::Close);
    }

    #[test]
    fn injected_faults_fire() {
        let drv = SimDriver::new().failing_open();
        assert!(drv.open_output_channel("Dev2/ao0", -10.0, 10.0).is_err());

        let drv = SimDriver::new().failing_writes();
        let mut s = drv.open_output_channel("Dev2/ao0", -10.0, 10.0).unwrap();
        assert!(s.write_buffer(&[0.0, 1.0]).is_err());
        // one-sample writes stay usable for the shutdown fallback
        assert!(s.write_buffer(&[0.0]).is_ok());
    }
}
