//! Run parameters for a trigger train.
//!
//! Provided here:
//! - [`RepeatMode`]           : finite cycle count vs. run-until-stopped
//! - [`GenerationParameters`] : validated, immutable description of one run
//! - [`defaults`]             : the single configuration-defaults table
//! - [`build_channel_path`]   : `"Dev2"` + `"ao0"` -> `"Dev2/ao0"`
//!
//! Conventions:
//! - Durations are seconds (`f64`), rates are Hz.
//! - Sample counts use round-to-nearest on `duration * sampling_rate`;
//!   the resulting quantization is the actual timing. No resampling.
//! - Validation happens once, at construction. Everything downstream
//!   (waveform building, the phase clock, the engine) may assume a valid
//!   parameter set and has no failure mode of its own.

use thiserror::Error;

// ----------------------------- Defaults table ------------------------------------

/// The one configuration-defaults table. Every load path (CLI flags,
/// settings file, missing fields) consults this module and nothing else.
pub mod defaults {
    pub const DEVICE: &str = "Dev2";
    pub const CHANNEL: &str = "ao0";
    pub const SAMPLING_RATE_HZ: f64 = 1000.0;
    pub const TRIGGER_DURATION_S: f64 = 0.2;
    pub const INTER_TRIGGER_INTERVAL_S: f64 = 20.0;
    pub const INITIAL_TRIGGER_DELAY_S: f64 = 5.0;
    pub const INFINITE: bool = true;
    pub const NB_TRIGGERS: u32 = 5;
    pub const ACTIVE_VOLTAGE: f64 = 2.0;
    pub const NEUTRAL_VOLTAGE: f64 = 0.0;
    /// Analog-output range handed to the driver when opening a channel.
    pub const VOLTAGE_MIN: f64 = -10.0;
    pub const VOLTAGE_MAX: f64 = 10.0;
}

/// Build the full channel path for the driver layer.
/// Blank or whitespace-only parts fall back to the defaults table.
#[inline]
pub fn build_channel_path(device: &str, channel: &str) -> String {
    let dev = device.trim();
    let dev = if dev.is_empty() { defaults::DEVICE } else { dev };
    let ch = channel.trim();
    let ch = if ch.is_empty() { defaults::CHANNEL } else { ch };
    format!("{dev}/{ch}")
}

// ------------------------------- Repeat mode -------------------------------------

/// How many trigger cycles a run emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    /// Emit exactly this many cycles, then the run is done. Must be >= 1.
    Finite(u32),
    /// Loop the cycle until a stop is requested.
    Infinite,
}

impl RepeatMode {
    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, RepeatMode::Infinite)
    }
}

// ------------------------------ Validation errors --------------------------------

/// Rejected parameter sets. These surface synchronously at construction;
/// the engine never sees an invalid parameter set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("sampling rate must be a positive finite number of Hz, got {0}")]
    InvalidSamplingRate(f64),
    #[error("trigger duration must be a positive finite number of seconds, got {0}")]
    InvalidTriggerDuration(f64),
    #[error("inter-trigger interval must be a non-negative finite number of seconds, got {0}")]
    InvalidInterval(f64),
    #[error("initial trigger delay must be a non-negative finite number of seconds, got {0}")]
    InvalidInitialDelay(f64),
    #[error("cycle rounds to zero samples at {rate} Hz (trigger {trigger} s + interval {interval} s)")]
    DegenerateCycle { trigger: f64, interval: f64, rate: f64 },
    #[error("finite mode needs at least one trigger")]
    ZeroTriggers,
}

// ---------------------------- Generation parameters ------------------------------

/// Immutable description of one generation run.
///
/// Construct with [`GenerationParameters::new`]; voltages default to the
/// table values and can be overridden with [`with_voltages`].
///
/// [`with_voltages`]: GenerationParameters::with_voltages
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParameters {
    channel_path: String,
    sampling_rate: f64,
    trigger_duration: f64,
    inter_trigger_interval: f64,
    initial_trigger_delay: f64,
    repeat: RepeatMode,
    active_voltage: f64,
    neutral_voltage: f64,
}

impl GenerationParameters {
    /// Validate and build a parameter set. `channel_path` is the full
    /// device/channel path (see [`build_channel_path`]).
    pub fn new(
        channel_path: impl Into<String>,
        sampling_rate: f64,
        trigger_duration: f64,
        inter_trigger_interval: f64,
        initial_trigger_delay: f64,
        repeat: RepeatMode,
    ) -> Result<Self, ParamError> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(ParamError::InvalidSamplingRate(sampling_rate));
        }
        if !(trigger_duration.is_finite() && trigger_duration > 0.0) {
            return Err(ParamError::InvalidTriggerDuration(trigger_duration));
        }
        if !(inter_trigger_interval.is_finite() && inter_trigger_interval >= 0.0) {
            return Err(ParamError::InvalidInterval(inter_trigger_interval));
        }
        if !(initial_trigger_delay.is_finite() && initial_trigger_delay >= 0.0) {
            return Err(ParamError::InvalidInitialDelay(initial_trigger_delay));
        }
        if let RepeatMode::Finite(0) = repeat {
            return Err(ParamError::ZeroTriggers);
        }
        let p = Self {
            channel_path: channel_path.into(),
            sampling_rate,
            trigger_duration,
            inter_trigger_interval,
            initial_trigger_delay,
            repeat,
            active_voltage: defaults::ACTIVE_VOLTAGE,
            neutral_voltage: defaults::NEUTRAL_VOLTAGE,
        };
        if p.samples_per_cycle() == 0 {
            return Err(ParamError::DegenerateCycle {
                trigger: trigger_duration,
                interval: inter_trigger_interval,
                rate: sampling_rate,
            });
        }
        Ok(p)
    }

    /// Override the two output levels (active / neutral).
    #[inline]
    #[must_use]
    pub fn with_voltages(mut self, active: f64, neutral: f64) -> Self {
        self.active_voltage = active;
        self.neutral_voltage = neutral;
        self
    }

    // -- accessors --

    #[inline] pub fn channel_path(&self) -> &str { &self.channel_path }
    #[inline] pub fn sampling_rate(&self) -> f64 { self.sampling_rate }
    #[inline] pub fn trigger_duration(&self) -> f64 { self.trigger_duration }
    #[inline] pub fn inter_trigger_interval(&self) -> f64 { self.inter_trigger_interval }
    #[inline] pub fn initial_trigger_delay(&self) -> f64 { self.initial_trigger_delay }
    #[inline] pub fn repeat(&self) -> RepeatMode { self.repeat }
    #[inline] pub fn active_voltage(&self) -> f64 { self.active_voltage }
    #[inline] pub fn neutral_voltage(&self) -> f64 { self.neutral_voltage }

    // -- derived timing --

    /// One cycle = trigger phase + interval phase, in seconds.
    #[inline]
    pub fn cycle_duration(&self) -> f64 {
        self.trigger_duration + self.inter_trigger_interval
    }

    /// Samples held at the active voltage at the start of each cycle.
    #[inline]
    pub fn active_samples(&self) -> usize {
        round_samples(self.trigger_duration, self.sampling_rate)
    }

    /// Total samples in one cycle. The split point is `active_samples`;
    /// the interval share is whatever remains after rounding.
    #[inline]
    pub fn samples_per_cycle(&self) -> usize {
        round_samples(self.cycle_duration(), self.sampling_rate)
    }

    /// Samples at the neutral voltage in each cycle.
    #[inline]
    pub fn interval_samples(&self) -> usize {
        self.samples_per_cycle() - self.active_samples()
    }

    /// Samples in the one-time neutral lead-in. May be zero.
    #[inline]
    pub fn initial_delay_samples(&self) -> usize {
        round_samples(self.initial_trigger_delay, self.sampling_rate)
    }

    /// Expected wall-clock length of the run, if it has one.
    /// `None` for [`RepeatMode::Infinite`].
    #[inline]
    pub fn expected_duration(&self) -> Option<f64> {
        match self.repeat {
            RepeatMode::Finite(n) => {
                Some(self.initial_trigger_delay + f64::from(n) * self.cycle_duration())
            }
            RepeatMode::Infinite => None,
        }
    }
}

/// Round-to-nearest sample count for a non-negative duration.
#[inline]
fn round_samples(duration_s: f64, rate_hz: f64) -> usize {
    (duration_s * rate_hz).round() as usize
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(trigger: f64, interval: f64, delay: f64, repeat: RepeatMode) -> GenerationParameters {
        GenerationParameters::new("Dev2/ao0", 1000.0, trigger, interval, delay, repeat).unwrap()
    }

    #[test]
    fn channel_path_falls_back_to_defaults() {
        assert_eq!(build_channel_path("Dev2", "ao0"), "Dev2/ao0");
        assert_eq!(build_channel_path("  Dev3 ", "ao1"), "Dev3/ao1");
        assert_eq!(build_channel_path("", ""), "Dev2/ao0");
        assert_eq!(build_channel_path("   ", "ao5"), "Dev2/ao5");
    }

    #[test]
    fn sample_counts_add_up() {
        let p = params(0.2, 20.0, 5.0, RepeatMode::Infinite);
        assert_eq!(p.active_samples(), 200);
        assert_eq!(p.interval_samples(), 20_000);
        assert_eq!(p.samples_per_cycle(), 20_200);
        assert_eq!(p.initial_delay_samples(), 5_000);
        assert_eq!(p.samples_per_cycle(), p.active_samples() + p.interval_samples());
    }

    #[test]
    fn sample_counts_round_to_nearest() {
        let p = GenerationParameters::new("Dev2/ao0", 3.0, 0.25, 0.0, 0.0, RepeatMode::Infinite)
            .unwrap();
        // 0.25 s at 3 Hz = 0.75 samples -> rounds to 1
        assert_eq!(p.active_samples(), 1);
        assert_eq!(p.samples_per_cycle(), 1);
        assert_eq!(p.interval_samples(), 0);
    }

    #[test]
    fn rejects_bad_parameters() {
        let r = GenerationParameters::new("d", 0.0, 0.2, 20.0, 5.0, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::InvalidSamplingRate(_))));
        let r = GenerationParameters::new("d", 1000.0, 0.0, 20.0, 5.0, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::InvalidTriggerDuration(_))));
        let r = GenerationParameters::new("d", 1000.0, 0.2, -1.0, 5.0, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::InvalidInterval(_))));
        let r = GenerationParameters::new("d", 1000.0, 0.2, 20.0, -0.5, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::InvalidInitialDelay(_))));
        let r = GenerationParameters::new("d", 1000.0, 0.2, 20.0, 5.0, RepeatMode::Finite(0));
        assert!(matches!(r, Err(ParamError::ZeroTriggers)));
        let r = GenerationParameters::new("d", 1000.0, f64::NAN, 20.0, 5.0, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::InvalidTriggerDuration(_))));
    }

    #[test]
    fn rejects_cycle_that_rounds_to_zero_samples() {
        // 0.1 ms trigger at 1 kHz is 0.1 samples -> whole cycle rounds to 0
        let r = GenerationParameters::new("d", 1000.0, 0.0001, 0.0, 0.0, RepeatMode::Infinite);
        assert!(matches!(r, Err(ParamError::DegenerateCycle { .. })));
    }

    #[test]
    fn expected_duration_only_for_finite() {
        let p = params(0.2, 0.0, 0.0, RepeatMode::Finite(3));
        assert!((p.expected_duration().unwrap() - 0.6).abs() < 1e-12);
        let p = params(0.2, 20.0, 5.0, RepeatMode::Infinite);
        assert!(p.expected_duration().is_none());
    }

    #[test]
    fn voltages_default_and_override() {
        let p = params(0.2, 20.0, 5.0, RepeatMode::Infinite);
        assert_eq!(p.active_voltage(), defaults::ACTIVE_VOLTAGE);
        assert_eq!(p.neutral_voltage(), defaults::NEUTRAL_VOLTAGE);
        let p = p.with_voltages(5.0, 0.5);
        assert_eq!(p.active_voltage(), 5.0);
        assert_eq!(p.neutral_voltage(), 0.5);
    }
}
