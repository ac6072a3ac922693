//! # Sample Throttler
//!
//! Turns a stream of raw, nullable frequency estimates arriving at
//! audio-buffer rate into at most one display update per display interval.
//!
//! The producer side ([`SampleFeed`]) overwrites a single lock-free slot with
//! the latest estimate. The consumer side ([`Throttler`]) reads that slot on
//! each display tick, classifies it, and decides what the display shows.
//! Nothing is buffered or averaged unless exponential smoothing is enabled.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TunerError};
use crate::tuning::{self, AccidentalMode, PitchedNote};

/// Default ceiling above which samples are ignored.
pub const DEFAULT_MAX_FREQUENCY: f64 = 10_000.0;

/// Default display refresh rate.
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Canonical quiet NaN, used as the "no sample" marker.
const EMPTY_SLOT: u64 = 0x7ff8_0000_0000_0000;

/// What the display does on a tick where no pitch is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilencePolicy {
    /// Replace the note with a waiting state.
    #[default]
    Clear,
    /// Keep showing the last note.
    Hold,
}

/// Optional smoothing applied by the producer before storing a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    /// Last value wins.
    #[default]
    None,
    /// `avg += alpha * (sample - avg)`, reset whenever a sample is missing.
    ExponentialMovingAverage { alpha: f64 },
}

/// Throttling and filtering parameters for one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Minimum time between two accepted display updates.
    pub min_interval: Duration,
    pub accidental_mode: AccidentalMode,
    pub silence_policy: SilencePolicy,
    /// Samples at or above this frequency are treated as missing.
    /// `None` disables the ceiling.
    pub max_frequency: Option<f64>,
    pub smoothing: Smoothing,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: interval_for_fps(DEFAULT_TARGET_FPS),
            accidental_mode: AccidentalMode::default(),
            silence_policy: SilencePolicy::default(),
            max_frequency: Some(DEFAULT_MAX_FREQUENCY),
            smoothing: Smoothing::default(),
        }
    }
}

impl ThrottleConfig {
    /// Builds a config whose interval matches a target display rate.
    pub fn from_fps(target_fps: u32) -> Result<Self> {
        if target_fps == 0 {
            return Err(TunerError::InvalidConfig(
                "target_fps must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            min_interval: interval_for_fps(target_fps),
            ..Self::default()
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_frequency {
            if !(max.is_finite() && max > 0.0) {
                return Err(TunerError::InvalidConfig(format!(
                    "max_frequency must be a positive number, got {max}"
                )));
            }
        }
        if let Smoothing::ExponentialMovingAverage { alpha } = self.smoothing {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(TunerError::InvalidConfig(format!(
                    "smoothing alpha must be in (0, 1], got {alpha}"
                )));
            }
        }
        Ok(())
    }
}

fn interval_for_fps(target_fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(target_fps.max(1)))
}

/// What the display should show after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DisplayUpdate {
    /// A classified pitch, with the detected frequency rounded to 0.1 Hz.
    Pitch { note: PitchedNote, detected: f64 },
    /// No pitch is currently detected.
    Waiting,
}

/// Single-value, lock-free holder for the latest raw sample.
#[derive(Debug)]
struct SampleSlot(AtomicU64);

impl SampleSlot {
    fn empty() -> Self {
        Self(AtomicU64::new(EMPTY_SLOT))
    }

    fn store(&self, sample: Option<f64>) {
        let bits = sample.map_or(EMPTY_SLOT, f64::to_bits);
        self.0.store(bits, Ordering::Relaxed);
    }

    fn load(&self) -> Option<f64> {
        let value = f64::from_bits(self.0.load(Ordering::Relaxed));
        (!value.is_nan()).then_some(value)
    }
}

/// Creates the producer and consumer halves for one capture session.
///
/// The feed goes to whatever thread runs the frequency estimator; the
/// throttler stays with the display driver.
pub fn session(config: &ThrottleConfig) -> Result<(SampleFeed, Throttler)> {
    config.validate()?;
    let slot = Arc::new(SampleSlot::empty());
    let feed = SampleFeed {
        slot: Arc::clone(&slot),
        max_frequency: config.max_frequency,
        smoothing: config.smoothing,
        average: None,
    };
    let throttler = Throttler {
        slot,
        min_interval: config.min_interval,
        mode: config.accidental_mode,
        silence_policy: config.silence_policy,
        last_accepted: None,
        last_update: None,
    };
    Ok((feed, throttler))
}

/// Producer half: records the most recent raw estimate.
#[derive(Debug)]
pub struct SampleFeed {
    slot: Arc<SampleSlot>,
    max_frequency: Option<f64>,
    smoothing: Smoothing,
    average: Option<f64>,
}

impl SampleFeed {
    /// Overwrites the latest sample. `None` means no pitch in this buffer.
    pub fn push(&mut self, sample: Option<f64>) {
        // Anything classify would reject must not reach the average.
        let plausible = sample.filter(|&freq| {
            freq.is_finite() && freq > 0.0 && self.max_frequency.is_none_or(|max| freq < max)
        });
        if plausible.is_none() && sample.is_some() {
            debug!(?sample, "dropping implausible sample");
        }

        let value = match (plausible, self.smoothing) {
            (None, _) => {
                self.average = None;
                None
            }
            (Some(freq), Smoothing::None) => Some(freq),
            (Some(freq), Smoothing::ExponentialMovingAverage { alpha }) => {
                let next = match self.average {
                    Some(avg) => avg + alpha * (freq - avg),
                    None => freq,
                };
                self.average = Some(next);
                Some(next)
            }
        };
        self.slot.store(value);
    }
}

/// Consumer half: decides, once per display tick, what to show.
#[derive(Debug)]
pub struct Throttler {
    slot: Arc<SampleSlot>,
    min_interval: Duration,
    mode: AccidentalMode,
    silence_policy: SilencePolicy,
    last_accepted: Option<Instant>,
    last_update: Option<DisplayUpdate>,
}

impl Throttler {
    /// Advances the display at time `now`.
    ///
    /// Returns `None` when the display should not change: the tick came too
    /// soon after the last accepted update, or there is no pitch and the
    /// silence policy says to hold (or the display is already waiting).
    pub fn tick(&mut self, now: Instant) -> Option<DisplayUpdate> {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        let classified = self.slot.load().and_then(|freq| {
            match tuning::classify(freq, self.mode) {
                Ok(note) => Some((note, freq)),
                Err(err) => {
                    debug!(%err, "sample rejected by classifier");
                    None
                }
            }
        });

        let update = match classified {
            Some((note, freq)) => DisplayUpdate::Pitch {
                note,
                detected: (freq * 10.0).round() / 10.0,
            },
            None => match self.silence_policy {
                SilencePolicy::Hold => return None,
                SilencePolicy::Clear if self.last_update == Some(DisplayUpdate::Waiting) => {
                    return None;
                }
                SilencePolicy::Clear => DisplayUpdate::Waiting,
            },
        };

        self.last_accepted = Some(now);
        self.last_update = Some(update);
        Some(update)
    }

    /// The update currently on display, if any has been emitted.
    pub fn last_update(&self) -> Option<DisplayUpdate> {
        self.last_update
    }

    pub fn accidental_mode(&self) -> AccidentalMode {
        self.mode
    }

    /// Changes spelling for subsequent ticks.
    pub fn set_accidental_mode(&mut self, mode: AccidentalMode) {
        self.mode = mode;
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
