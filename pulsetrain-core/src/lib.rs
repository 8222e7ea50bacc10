//! Pulsetrain Core — pure trigger-train primitives. No I/O, no clocks.
//!
//! Modules
//! - [`params`]   : validated run parameters, defaults table, channel paths
//! - [`waveform`] : two-level sample-buffer construction
//! - [`clock`]    : phase readout from elapsed time alone
//!
//! Design
//! - No hardware or wall-clock access anywhere in this crate; everything
//!   is a function of its arguments and is exercised directly by tests
//! - Validation happens once, in `params`; the other modules assume a
//!   valid parameter set and cannot fail
//! - Sample counts are round-to-nearest of `duration * rate` and the
//!   quantized result is the actual timing

pub mod clock;
pub mod params;
pub mod waveform;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::clock::{phase_at, Phase, PhaseStatus};
    pub use crate::params::{
        build_channel_path, defaults, GenerationParameters, ParamError, RepeatMode,
    };
    pub use crate::waveform::{cycle_buffer, delay_buffer, finite_buffer};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let p = GenerationParameters::new(
            build_channel_path("Dev2", "ao0"),
            defaults::SAMPLING_RATE_HZ,
            defaults::TRIGGER_DURATION_S,
            defaults::INTER_TRIGGER_INTERVAL_S,
            defaults::INITIAL_TRIGGER_DELAY_S,
            RepeatMode::Infinite,
        )
        .unwrap();
        let _ = cycle_buffer(&p);
        let _ = phase_at(&p, 0.0);
    }
}
