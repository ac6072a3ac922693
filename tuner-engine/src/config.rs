//! Tuner configuration.
//!
//! Every section has defaults, so a config file only needs the values it
//! changes. Files are JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TunerError};
use crate::throttle::{
    DEFAULT_MAX_FREQUENCY, DEFAULT_TARGET_FPS, SilencePolicy, Smoothing, ThrottleConfig,
};
use crate::tuning::AccidentalMode;

/// Complete tuner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub audio: AudioConfig,
    pub display: DisplayConfig,
    pub estimator: EstimatorConfig,
}

/// Capture parameters handed to the audio session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per analysis block.
    pub buffer_size: usize,
    /// Requested sample rate in Hz; the device may settle on another.
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            sample_rate: 22_050,
        }
    }
}

/// Display cadence and what gets shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub target_fps: u32,
    pub accidental_mode: AccidentalMode,
    pub silence_policy: SilencePolicy,
    /// `null` disables the ceiling.
    pub max_frequency: Option<f64>,
    pub smoothing: Smoothing,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            accidental_mode: AccidentalMode::default(),
            silence_policy: SilencePolicy::default(),
            max_frequency: Some(DEFAULT_MAX_FREQUENCY),
            smoothing: Smoothing::default(),
        }
    }
}

impl DisplayConfig {
    pub fn to_throttle_config(&self) -> Result<ThrottleConfig> {
        Ok(ThrottleConfig {
            accidental_mode: self.accidental_mode,
            silence_policy: self.silence_policy,
            max_frequency: self.max_frequency,
            smoothing: self.smoothing,
            ..ThrottleConfig::from_fps(self.target_fps)?
        })
    }
}

/// Frequency estimator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Minimum block RMS before pitch detection is attempted.
    pub amplitude_threshold: f32,
    /// Refine YIN estimates against an FFT magnitude spectrum.
    pub spectral_refinement: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            spectral_refinement: false,
        }
    }
}

impl TunerConfig {
    /// Loads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                info!("no configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks ranges that the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if self.audio.buffer_size < 64 {
            return Err(TunerError::InvalidConfig(format!(
                "audio.buffer_size must be at least 64, got {}",
                self.audio.buffer_size
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(TunerError::InvalidConfig(
                "audio.sample_rate must be greater than zero".to_string(),
            ));
        }
        if !(self.estimator.amplitude_threshold >= 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "estimator.amplitude_threshold must be non-negative, got {}",
                self.estimator.amplitude_threshold
            )));
        }
        self.display.to_throttle_config()?.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = TunerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audio.sample_rate, 22_050);
        assert_eq!(config.audio.buffer_size, 2048);
        assert_eq!(config.display.max_frequency, Some(10_000.0));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: TunerConfig = serde_json::from_str(
            r#"{ "display": { "accidental_mode": "flat", "silence_policy": "hold" } }"#,
        )
        .unwrap();
        assert_eq!(config.display.accidental_mode, AccidentalMode::Flat);
        assert_eq!(config.display.silence_policy, SilencePolicy::Hold);
        assert_eq!(config.display.target_fps, 30);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn null_ceiling_disables_filter() {
        let config: TunerConfig =
            serde_json::from_str(r#"{ "display": { "max_frequency": null } }"#).unwrap();
        assert_eq!(config.display.max_frequency, None);
    }

    #[test]
    fn smoothing_is_tagged() {
        let config: TunerConfig = serde_json::from_str(
            r#"{ "display": { "smoothing": { "kind": "exponential_moving_average", "alpha": 0.25 } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.display.smoothing,
            Smoothing::ExponentialMovingAverage { alpha: 0.25 }
        );
    }

    #[test]
    fn display_maps_to_throttle_config() {
        let display = DisplayConfig {
            target_fps: 10,
            accidental_mode: AccidentalMode::Flat,
            ..DisplayConfig::default()
        };
        let throttle = display.to_throttle_config().unwrap();
        assert_eq!(throttle.min_interval, Duration::from_millis(100));
        assert_eq!(throttle.accidental_mode, AccidentalMode::Flat);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = TunerConfig::default();
        config.audio.buffer_size = 8;
        assert!(matches!(config.validate(), Err(TunerError::InvalidConfig(_))));

        let mut config = TunerConfig::default();
        config.display.target_fps = 0;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.display.smoothing = Smoothing::ExponentialMovingAverage { alpha: 0.0 };
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.display.max_frequency = Some(f64::INFINITY);
        assert!(matches!(config.validate(), Err(TunerError::InvalidConfig(_))));
    }

    #[test]
    fn missing_path_uses_defaults() {
        assert_eq!(TunerConfig::load_or_default(None).unwrap(), TunerConfig::default());
    }
}
