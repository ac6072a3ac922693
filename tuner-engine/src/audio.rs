//! # Audio Capture Module
//!
//! Microphone capture through CPAL (Cross-Platform Audio Library).
//!
//! An [`AudioSession`] is created with [`AudioSession::configure`], started
//! with a channel that receives fixed-size mono blocks, and torn down with
//! [`AudioSession::stop`] (or by dropping it). There is no shared global
//! audio state; every session owns its stream.
//!
//! ## Features
//! - Default input device, preferring mono 32-bit float configurations
//! - Sample rate clamped into the device's supported range
//! - Multi-channel input downmixed to mono
//! - Device buffers re-framed into exact analysis blocks

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error, info, warn};

use crate::config::AudioConfig;
use crate::error::{Result, TunerError};

/// Re-frames interleaved device buffers into fixed-size mono blocks.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize, channels: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Appends interleaved samples and emits every complete block.
    ///
    /// A trailing partial frame (fewer samples than channels) is ignored.
    pub fn push<F: FnMut(Vec<f32>)>(&mut self, data: &[f32], mut emit: F) {
        if self.channels == 1 {
            self.pending.extend_from_slice(data);
        } else {
            let channels = self.channels as f32;
            self.pending.extend(
                data.chunks_exact(self.channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels),
            );
        }

        while self.pending.len() >= self.block_size {
            let block = self.pending.drain(..self.block_size).collect();
            emit(block);
        }
    }

    /// Samples waiting for the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// An explicitly owned microphone capture session.
pub struct AudioSession {
    config: AudioConfig,
    stream: Option<cpal::Stream>,
    sample_rate: Option<u32>,
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl AudioSession {
    /// Validates capture parameters. No device is opened yet.
    pub fn configure(config: AudioConfig) -> Result<Self> {
        if config.buffer_size == 0 || config.sample_rate == 0 {
            return Err(TunerError::InvalidConfig(format!(
                "buffer_size and sample_rate must be non-zero, got {} and {}",
                config.buffer_size, config.sample_rate
            )));
        }
        Ok(Self {
            config,
            stream: None,
            sample_rate: None,
        })
    }

    /// Opens the default input device and starts streaming blocks.
    ///
    /// Blocks of exactly `buffer_size` mono samples are sent to `sender`.
    /// When the receiver falls behind, blocks are dropped rather than
    /// queued, so the consumer always sees recent audio.
    ///
    /// # Returns
    /// * `Ok(sample_rate)` - The rate the device actually runs at
    /// * `Err(e)` - No device, no usable format, or the stream failed
    pub fn start(&mut self, sender: Sender<Vec<f32>>) -> Result<u32> {
        if self.stream.is_some() {
            return Err(TunerError::Audio("session already started".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| TunerError::Audio("no input device available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        info!(device = %device_name, "using audio input device");

        let configs = device
            .supported_input_configs()
            .map_err(audio_error)?
            .collect::<Vec<_>>();
        let (supported, sample_rate) = find_supported_config(configs, self.config.sample_rate)
            .ok_or_else(|| TunerError::Audio("no suitable f32 input format found".to_string()))?;

        let stream_config: cpal::StreamConfig =
            supported.with_sample_rate(cpal::SampleRate(sample_rate)).into();
        let channels = usize::from(stream_config.channels);
        info!(sample_rate, channels, buffer_size = self.config.buffer_size, "selected input format");

        let mut framer = BlockFramer::new(self.config.buffer_size, channels);
        let err_fn = |err: cpal::StreamError| error!(%err, "audio stream error");
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    framer.push(data, |block| match sender.try_send(block) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("analysis lagging, dropped block"),
                        Err(TrySendError::Disconnected(_)) => {}
                    });
                },
                err_fn,
                None,
            )
            .map_err(audio_error)?;
        stream.play().map_err(audio_error)?;

        self.stream = Some(stream);
        self.sample_rate = Some(sample_rate);
        Ok(sample_rate)
    }

    /// Stops capture. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!(%err, "error pausing stream");
            }
            drop(stream);
            info!("audio capture stopped");
        }
        self.sample_rate = None;
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Device sample rate while running.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_error<E: std::fmt::Display>(err: E) -> TunerError {
    TunerError::Audio(err.to_string())
}

/// Picks the f32 configuration best suited to the target sample rate.
///
/// Mono configurations win over multi-channel ones; among those, the
/// range closest to `target_rate` wins. The returned rate is `target_rate`
/// clamped into the chosen range.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<(SupportedStreamConfigRange, u32)> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            (c, rate)
        })
        .min_by_key(|(c, rate)| (c.channels() != 1, rate.abs_diff(target_rate)))
}
