//! Sound-card output backend (feature `audio`).
//!
//! Plays the trigger waveform on the default cpal output device instead
//! of DAQ hardware — handy for bench checks with an oscilloscope on the
//! headphone jack, or just for hearing the train. Voltages are scaled
//! by the channel's `volt_max` into [-1, 1] samples; the configured
//! generation rate is mapped onto the device rate by nearest-index
//! stepping, which is plenty for a two-level signal.
//!
//! Scalar writes are not supported here, so the shutdown sequence takes
//! its one-sample-buffer fallback path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use crate::driver::{DriverError, OutputDriver, OutputSession, TimingMode, WaitStatus};

/// Opens sessions on the host's default output device.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioDriver;

impl AudioDriver {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDriver for AudioDriver {
    type Session = AudioSession;

    fn open_output_channel(
        &self,
        channel_path: &str,
        _volt_min: f64,
        volt_max: f64,
    ) -> Result<AudioSession, DriverError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DriverError::new("no default audio output device"))?;
        let sup = device
            .default_output_config()
            .map_err(|e| DriverError::new(e.to_string()))?;
        if sup.sample_format() != cpal::SampleFormat::F32 {
            return Err(DriverError::new(format!(
                "unsupported device sample format: {:?}",
                sup.sample_format()
            )));
        }
        info!("audio device standing in for {channel_path}");
        Ok(AudioSession {
            device,
            config: sup.config(),
            volt_scale: if volt_max > 0.0 { 1.0 / volt_max } else { 1.0 },
            rate_hz: 0.0,
            mode: None,
            buffer: Vec::new(),
            stream: None,
            done: Arc::new(AtomicBool::new(false)),
            started_at: None,
        })
    }
}

/// One playback "task" on the audio device.
pub struct AudioSession {
    device: cpal::Device,
    config: cpal::StreamConfig,
    volt_scale: f64,
    rate_hz: f64,
    mode: Option<TimingMode>,
    buffer: Vec<f32>,
    stream: Option<cpal::Stream>,
    done: Arc<AtomicBool>,
    started_at: Option<Instant>,
}

impl OutputSession for AudioSession {
    fn configure_clock(&mut self, rate_hz: f64, mode: TimingMode) -> Result<(), DriverError> {
        if rate_hz <= 0.0 {
            return Err(DriverError::new("non-positive sample rate"));
        }
        self.rate_hz = rate_hz;
        self.mode = Some(mode);
        Ok(())
    }

    fn write_buffer(&mut self, samples: &[f64]) -> Result<(), DriverError> {
        if samples.is_empty() {
            return Err(DriverError::new("empty buffer write"));
        }
        self.buffer = samples
            .iter()
            .map(|&v| (v * self.volt_scale).clamp(-1.0, 1.0) as f32)
            .collect();
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let Some(mode) = self.mode else {
            return Err(DriverError::new("start before clock configuration"));
        };
        if self.rate_hz <= 0.0 || self.buffer.is_empty() {
            return Err(DriverError::new("start before a buffer write"));
        }

        let buf = Arc::new(std::mem::take(&mut self.buffer));
        let done = Arc::clone(&self.done);
        let finite = matches!(mode, TimingMode::Finite(_));
        let channels = self.config.channels as usize;
        let step = self.rate_hz / f64::from(self.config.sample_rate.0);
        let mut cursor = 0.0f64;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |out: &mut [f32], _| {
                    for frame in out.chunks_mut(channels) {
                        let idx = cursor as usize;
                        let v = if finite {
                            if idx >= buf.len() {
                                done.store(true, Ordering::Release);
                                0.0
                            } else {
                                buf[idx]
                            }
                        } else {
                            buf[idx % buf.len()]
                        };
                        for ch in frame.iter_mut() {
                            *ch = v;
                        }
                        cursor += step;
                        if !finite && cursor >= buf.len() as f64 {
                            cursor -= buf.len() as f64;
                        }
                    }
                },
                |e| warn!("audio stream error: {e}"),
                None,
            )
            .map_err(|e| DriverError::new(e.to_string()))?;
        stream.play().map_err(|e| DriverError::new(e.to_string()))?;

        self.stream = Some(stream);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("pausing audio stream failed: {e}");
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.stream = None;
        Ok(())
    }

    fn wait_until_done(&mut self, timeout: Duration) -> Result<WaitStatus, DriverError> {
        if self.started_at.is_none() {
            return Err(DriverError::new("wait on a task that was never started"));
        }
        match self.mode {
            Some(TimingMode::Finite(_)) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if self.done.load(Ordering::Acquire) {
                        return Ok(WaitStatus::Completed);
                    }
                    if Instant::now() >= deadline {
                        return Ok(WaitStatus::TimedOut);
                    }
                    thread::sleep(Duration::from_millis(1).min(timeout));
                }
            }
            Some(TimingMode::Continuous) => {
                thread::sleep(timeout);
                Ok(WaitStatus::TimedOut)
            }
            None => Err(DriverError::new("wait on an unconfigured task")),
        }
    }
}
