// tuner-engine/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate classifies measured frequencies against equal temperament,
//! throttles noisy per-buffer estimates down to a steady display rate, and
//! provides the audio capture and pitch detection that feed it. It is
//! completely headless and contains no display code.
//!
//! Data flows audio block → [`pitch::FrequencyEstimator`] →
//! [`throttle::SampleFeed`] → [`throttle::Throttler::tick`] →
//! [`tuning::classify`] → [`throttle::DisplayUpdate`].

pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod replay;
pub mod throttle;
pub mod tuning;
pub mod worker;

pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use throttle::{DisplayUpdate, SampleFeed, Throttler};
pub use tuning::{Accidental, AccidentalMode, Letter, PitchedNote, classify};
