//! Offline analysis of recorded audio.
//!
//! Runs a recording through the same estimator and throttler as live
//! capture. A simulated clock stands in for the display timer: the display
//! is ticked after every block at the block's end time.

use std::time::{Duration, Instant};

use crate::error::{Result, TunerError};
use crate::pitch::FrequencyEstimator;
use crate::throttle::{self, DisplayUpdate, ThrottleConfig};

/// A display update stamped with its position in the recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedUpdate {
    pub at: Duration,
    pub update: DisplayUpdate,
}

/// Splits `samples` into `block_size` blocks and replays them.
///
/// A trailing partial block is dropped, as it would be by the capture
/// session.
pub fn replay<E: FrequencyEstimator>(
    samples: &[f32],
    sample_rate: u32,
    block_size: usize,
    estimator: &mut E,
    config: &ThrottleConfig,
) -> Result<Vec<TimedUpdate>> {
    if sample_rate == 0 || block_size == 0 {
        return Err(TunerError::InvalidConfig(
            "sample_rate and block_size must be non-zero".to_string(),
        ));
    }

    let (mut feed, mut throttler) = throttle::session(config)?;
    let origin = Instant::now();
    let mut updates = Vec::new();

    for (index, block) in samples.chunks_exact(block_size).enumerate() {
        feed.push(estimator.estimate(block).map(f64::from));

        let frames = (index as u64 + 1) * block_size as u64;
        let at = Duration::from_nanos(frames * 1_000_000_000 / u64::from(sample_rate));
        if let Some(update) = throttler.tick(origin + at) {
            updates.push(TimedUpdate { at, update });
        }
    }
    Ok(updates)
}
