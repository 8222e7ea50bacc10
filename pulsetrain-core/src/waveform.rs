//! Sample-buffer construction for a trigger train.
//!
//! Three builders, all pure and deterministic:
//! - [`delay_buffer`]  : the one-time neutral lead-in (may be empty)
//! - [`cycle_buffer`]  : one cycle, active voltage first then neutral
//! - [`finite_buffer`] : lead-in + N cycles concatenated, for drivers
//!   that only play finite buffers
//!
//! The signal is strictly two-level; there are no ramps and no shaping.
//! Invalid parameter sets are rejected at [`GenerationParameters`]
//! construction, so nothing here can fail.

use crate::params::GenerationParameters;

/// Neutral-voltage lead-in played once before the first cycle.
/// Empty when the initial delay rounds to zero samples.
pub fn delay_buffer(p: &GenerationParameters) -> Vec<f64> {
    vec![p.neutral_voltage(); p.initial_delay_samples()]
}

/// One cycle: `active_samples` at the active voltage, the rest at neutral.
pub fn cycle_buffer(p: &GenerationParameters) -> Vec<f64> {
    let mut buf = vec![p.neutral_voltage(); p.samples_per_cycle()];
    let active = p.active_samples().min(buf.len());
    for s in &mut buf[..active] {
        *s = p.active_voltage();
    }
    buf
}

/// Lead-in plus `repeats` copies of the cycle, as a single buffer.
///
/// Used for finite playback where the driver is handed the whole run
/// up front and simply clocks it out.
pub fn finite_buffer(p: &GenerationParameters, repeats: u32) -> Vec<f64> {
    let cycle = cycle_buffer(p);
    let mut buf =
        Vec::with_capacity(p.initial_delay_samples() + cycle.len() * repeats as usize);
    buf.extend(delay_buffer(p));
    for _ in 0..repeats {
        buf.extend_from_slice(&cycle);
    }
    buf
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RepeatMode;

    fn params(trigger: f64, interval: f64, delay: f64) -> GenerationParameters {
        GenerationParameters::new("Dev2/ao0", 1000.0, trigger, interval, delay, RepeatMode::Infinite)
            .unwrap()
    }

    #[test]
    fn cycle_is_two_level_with_split_at_active_samples() {
        let p = params(0.2, 0.3, 0.0);
        let buf = cycle_buffer(&p);
        assert_eq!(buf.len(), 500);
        assert!(buf[..200].iter().all(|&v| v == p.active_voltage()));
        assert!(buf[200..].iter().all(|&v| v == p.neutral_voltage()));
    }

    #[test]
    fn delay_buffer_is_neutral_and_sized() {
        let p = params(0.2, 0.3, 0.05);
        let buf = delay_buffer(&p);
        assert_eq!(buf.len(), 50);
        assert!(buf.iter().all(|&v| v == p.neutral_voltage()));
    }

    #[test]
    fn zero_delay_gives_empty_buffer() {
        let p = params(0.2, 0.3, 0.0);
        assert!(delay_buffer(&p).is_empty());
    }

    #[test]
    fn zero_interval_cycle_is_all_active() {
        let p = params(0.2, 0.0, 0.0);
        let buf = cycle_buffer(&p);
        assert_eq!(buf.len(), 200);
        assert!(buf.iter().all(|&v| v == p.active_voltage()));
    }

    #[test]
    fn finite_buffer_concatenates_delay_and_cycles() {
        let p = params(0.01, 0.02, 0.005);
        let buf = finite_buffer(&p, 3);
        assert_eq!(buf.len(), 5 + 3 * 30);
        // lead-in
        assert!(buf[..5].iter().all(|&v| v == p.neutral_voltage()));
        // each cycle: 10 active then 20 neutral
        for c in 0..3 {
            let start = 5 + c * 30;
            assert!(buf[start..start + 10].iter().all(|&v| v == p.active_voltage()));
            assert!(buf[start + 10..start + 30].iter().all(|&v| v == p.neutral_voltage()));
        }
    }

    #[test]
    fn custom_voltages_flow_through() {
        let p = params(0.2, 0.3, 0.0).with_voltages(3.3, -0.1);
        let buf = cycle_buffer(&p);
        assert_eq!(buf[0], 3.3);
        assert_eq!(buf[499], -0.1);
    }
}
