//! Settings file and run-record log.
//!
//! Settings are one flat JSON object. Missing fields fall back to the
//! defaults table in `pulsetrain_core::params::defaults`; unknown
//! fields are ignored, so files written by other tools load fine.
//! Completed runs are appended to a JSON-lines log, one record each.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pulsetrain_core::params::{
    build_channel_path, defaults, GenerationParameters, ParamError, RepeatMode,
};
use pulsetrain_engine::RunRecord;

fn d_device() -> String {
    defaults::DEVICE.to_string()
}
fn d_channel() -> String {
    defaults::CHANNEL.to_string()
}
fn d_rate() -> f64 {
    defaults::SAMPLING_RATE_HZ
}
fn d_trigger() -> f64 {
    defaults::TRIGGER_DURATION_S
}
fn d_interval() -> f64 {
    defaults::INTER_TRIGGER_INTERVAL_S
}
fn d_delay() -> f64 {
    defaults::INITIAL_TRIGGER_DELAY_S
}
fn d_infinite() -> bool {
    defaults::INFINITE
}
fn d_nb() -> u32 {
    defaults::NB_TRIGGERS
}

/// The persisted parameter set, field-for-field what the form on top of
/// the original tooling saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default = "d_device")]
    pub device: String,
    #[serde(default = "d_channel")]
    pub channel: String,
    #[serde(default = "d_rate")]
    pub sampling_rate: f64,
    #[serde(default = "d_trigger")]
    pub trigger_duration: f64,
    #[serde(default = "d_interval")]
    pub inter_trigger_interval: f64,
    #[serde(default = "d_delay")]
    pub initial_trigger_delay: f64,
    #[serde(default = "d_infinite")]
    pub infinite: bool,
    #[serde(default = "d_nb")]
    pub nb_triggers: u32,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            device: d_device(),
            channel: d_channel(),
            sampling_rate: d_rate(),
            trigger_duration: d_trigger(),
            inter_trigger_interval: d_interval(),
            initial_trigger_delay: d_delay(),
            infinite: d_infinite(),
            nb_triggers: d_nb(),
        }
    }
}

impl TriggerSettings {
    /// Load settings; a missing file simply means "all defaults".
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate into engine parameters. This is where a bad parameter
    /// set is rejected, before anything touches hardware.
    pub fn to_params(&self) -> Result<GenerationParameters, ParamError> {
        let repeat = if self.infinite {
            RepeatMode::Infinite
        } else {
            RepeatMode::Finite(self.nb_triggers)
        };
        GenerationParameters::new(
            build_channel_path(&self.device, &self.channel),
            self.sampling_rate,
            self.trigger_duration,
            self.inter_trigger_interval,
            self.initial_trigger_delay,
            repeat,
        )
    }
}

/// Append one completed-run record as a JSON line.
pub fn append_run_record(path: &Path, record: &RunRecord) -> Result<(), Box<dyn Error>> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())?;
    Ok(())
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = TriggerSettings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s, TriggerSettings::default());
        assert_eq!(s.sampling_rate, 1000.0);
        assert_eq!(s.trigger_duration, 0.2);
        assert_eq!(s.inter_trigger_interval, 20.0);
        assert_eq!(s.initial_trigger_delay, 5.0);
        assert!(s.infinite);
        assert_eq!(s.nb_triggers, 5);
    }

    #[test]
    fn missing_and_unknown_fields_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(
            &path,
            r#"{"device": "Dev7", "trigger_duration": 0.5, "legacy_field": 42}"#,
        )
        .unwrap();
        let s = TriggerSettings::load(&path).unwrap();
        assert_eq!(s.device, "Dev7");
        assert_eq!(s.trigger_duration, 0.5);
        // everything else defaulted
        assert_eq!(s.channel, "ao0");
        assert_eq!(s.nb_triggers, 5);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let s = TriggerSettings {
            device: "Dev3".into(),
            infinite: false,
            nb_triggers: 12,
            ..TriggerSettings::default()
        };
        s.save(&path).unwrap();
        assert_eq!(TriggerSettings::load(&path).unwrap(), s);
    }

    #[test]
    fn to_params_validates() {
        let mut s = TriggerSettings::default();
        let p = s.to_params().unwrap();
        assert_eq!(p.channel_path(), "Dev2/ao0");
        s.sampling_rate = -5.0;
        assert!(s.to_params().is_err());
        s.sampling_rate = 1000.0;
        s.infinite = false;
        s.nb_triggers = 0;
        assert!(s.to_params().is_err());
    }

    #[test]
    fn run_records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let record = RunRecord {
            device: "Dev2".into(),
            channel: "ao0".into(),
            sampling_rate: 1000.0,
            trigger_duration: 0.2,
            inter_trigger_interval: 20.0,
            initial_trigger_delay: 5.0,
            infinite: true,
            nb_triggers: 5,
            duration_seconds: 12.5,
            start_time: 1_700_000_000.0,
            end_time: 1_700_000_012.5,
        };
        append_run_record(&path, &record).unwrap();
        append_run_record(&path, &record).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let back: RunRecord = serde_json::from_str(line).unwrap();
            assert_eq!(back, record);
        }
    }
}
