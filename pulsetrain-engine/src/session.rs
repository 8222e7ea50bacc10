//! Controlling-side surface: start a run, watch it, stop it, collect
//! the one terminal outcome and a run record.
//!
//! The engine gets its own thread and exclusive ownership of the
//! hardware; the handle kept here holds only the three things that are
//! safe to touch from the controlling thread:
//! - the [`StopToken`] (the single cross-thread mutable datum),
//! - a one-shot channel carrying the terminal [`Outcome`],
//! - the immutable parameters plus the start instant, which feed the
//!   pure phase clock for display.
//!
//! Status polls therefore never block on, or race with, the engine.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pulsetrain_core::clock::{phase_at, PhaseStatus};
use pulsetrain_core::params::{defaults, GenerationParameters, RepeatMode};

use crate::driver::OutputDriver;
use crate::engine::{EngineConfig, GenerationEngine};
use crate::error::Outcome;
use crate::stop::StopToken;

/// Spawn an engine thread for one run. Parameters are validated at
/// construction, so the only way this fails is the OS refusing a
/// thread.
pub fn start<D>(driver: D, params: GenerationParameters) -> io::Result<RunHandle>
where
    D: OutputDriver + Send + 'static,
{
    start_with_config(driver, params, EngineConfig::default())
}

pub fn start_with_config<D>(
    driver: D,
    params: GenerationParameters,
    cfg: EngineConfig,
) -> io::Result<RunHandle>
where
    D: OutputDriver + Send + 'static,
{
    let stop = StopToken::new();
    let (tx, rx) = bounded::<Outcome>(1);
    let engine = GenerationEngine::with_config(driver, params.clone(), stop.clone(), cfg);

    let thread = thread::Builder::new()
        .name("pulsetrain-engine".into())
        .spawn(move || {
            let outcome = engine.run();
            debug!("engine finished: {outcome:?}");
            // Receiver may be gone if the controller dropped the handle.
            let _ = tx.send(outcome);
        })?;

    Ok(RunHandle {
        params,
        started: Instant::now(),
        start_time: SystemTime::now(),
        stop,
        rx,
        outcome: None,
        thread: Some(thread),
    })
}

/// Handle for one run. Receives exactly one terminal [`Outcome`]; after
/// [`RunHandle::wait`] the run is over and the handle is consumed.
pub struct RunHandle {
    params: GenerationParameters,
    started: Instant,
    start_time: SystemTime,
    stop: StopToken,
    rx: Receiver<Outcome>,
    outcome: Option<Outcome>,
    thread: Option<JoinHandle<()>>,
}

impl RunHandle {
    #[inline]
    pub fn params(&self) -> &GenerationParameters {
        &self.params
    }

    /// A cloneable stop control, e.g. for a ctrl-c or input-watcher
    /// thread.
    #[inline]
    pub fn stopper(&self) -> StopToken {
        self.stop.clone()
    }

    /// Request a stop. Idempotent; calling again, or after the run
    /// already ended, is a no-op.
    #[inline]
    pub fn request_stop(&self) {
        self.stop.trip();
    }

    /// Wall-clock seconds since the run started.
    #[inline]
    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Phase/countdown snapshot for display, computed purely from
    /// elapsed time. Never blocks, never touches the engine.
    #[inline]
    pub fn status(&self) -> PhaseStatus {
        phase_at(&self.params, self.elapsed_seconds())
    }

    /// Non-blocking check for the terminal outcome. Once this returns
    /// `Some`, the safe-shutdown sequence has already completed.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        if self.outcome.is_none() {
            if let Ok(out) = self.rx.try_recv() {
                self.outcome = Some(out);
            }
        }
        self.outcome.clone()
    }

    /// Block until the run ends, join the engine thread, and snapshot a
    /// [`RunRecord`].
    pub fn wait(mut self) -> (Outcome, RunRecord) {
        let outcome = match self.outcome.take() {
            Some(out) => out,
            None => self.rx.recv().unwrap_or_else(|_| {
                Outcome::Error("engine thread ended without a terminal signal".into())
            }),
        };
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("engine thread panicked after signalling");
            }
        }
        let record = RunRecord::new(
            &self.params,
            self.started.elapsed().as_secs_f64(),
            self.start_time,
            SystemTime::now(),
        );
        (outcome, record)
    }
}

// ---------------------------------- Run record -----------------------------------

/// Flat snapshot persisted once per completed run. Field names match
/// the settings file so records and settings share one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub device: String,
    pub channel: String,
    pub sampling_rate: f64,
    pub trigger_duration: f64,
    pub inter_trigger_interval: f64,
    pub initial_trigger_delay: f64,
    pub infinite: bool,
    pub nb_triggers: u32,
    pub duration_seconds: f64,
    /// Unix seconds.
    pub start_time: f64,
    /// Unix seconds.
    pub end_time: f64,
}

impl RunRecord {
    fn new(
        p: &GenerationParameters,
        duration_seconds: f64,
        start: SystemTime,
        end: SystemTime,
    ) -> Self {
        let (device, channel) = split_channel_path(p.channel_path());
        let (infinite, nb_triggers) = match p.repeat() {
            RepeatMode::Infinite => (true, defaults::NB_TRIGGERS),
            RepeatMode::Finite(n) => (false, n),
        };
        Self {
            device,
            channel,
            sampling_rate: p.sampling_rate(),
            trigger_duration: p.trigger_duration(),
            inter_trigger_interval: p.inter_trigger_interval(),
            initial_trigger_delay: p.initial_trigger_delay(),
            infinite,
            nb_triggers,
            duration_seconds,
            start_time: unix_seconds(start),
            end_time: unix_seconds(end),
        }
    }
}

fn unix_seconds(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn split_channel_path(path: &str) -> (String, String) {
    match path.split_once('/') {
        Some((dev, ch)) => (dev.to_string(), ch.to_string()),
        None => (path.to_string(), String::new()),
    }
}

// ------------------------------------ Tests --------------------------------------
