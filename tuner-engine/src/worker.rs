//! # Analysis Worker
//!
//! A dedicated thread that turns audio blocks into raw frequency estimates.
//! It receives blocks from the capture callback over a channel, runs the
//! frequency estimator on each, and writes the result into the throttler's
//! sample feed. The display side never waits on this thread.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::pitch::FrequencyEstimator;
use crate::throttle::SampleFeed;

/// Handle to a running analysis thread.
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct AnalysisWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<u64>>,
}

impl AnalysisWorker {
    /// Spawns the analysis thread.
    ///
    /// The thread runs until [`stop`](Self::stop) is called or the block
    /// channel disconnects (the audio session was dropped).
    pub fn spawn<E>(mut estimator: E, blocks: Receiver<Vec<f32>>, mut feed: SampleFeed) -> Result<Self>
    where
        E: FrequencyEstimator + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("tuner-analysis".to_string())
            .spawn(move || {
                info!("analysis worker started");
                let mut processed = 0u64;
                loop {
                    crossbeam_channel::select! {
                        recv(blocks) -> msg => match msg {
                            Ok(block) => {
                                // A panicking estimator costs one block, not the session.
                                let estimate = panic::catch_unwind(AssertUnwindSafe(|| {
                                    estimator.estimate(&block)
                                }))
                                .unwrap_or_else(|_| {
                                    error!("frequency estimator panicked, treating block as unpitched");
                                    None
                                });
                                feed.push(estimate.map(f64::from));
                                processed += 1;
                            }
                            Err(_) => {
                                debug!("audio block channel closed");
                                break;
                            }
                        },
                        recv(shutdown_rx) -> _ => {
                            debug!("received shutdown signal");
                            break;
                        },
                    }
                }
                info!(processed, "analysis worker finished");
                processed
            })?;

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Signals the thread to exit and waits for it.
    ///
    /// Returns the number of blocks analysed.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    /// True once the thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn shutdown(&mut self) -> u64 {
        let _ = self.shutdown_tx.try_send(());
        match self.thread_handle.take().map(JoinHandle::join) {
            Some(Ok(processed)) => processed,
            Some(Err(_)) => {
                error!("analysis worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::{self, DisplayUpdate, ThrottleConfig};
    use std::time::{Duration, Instant};

    fn wait_for_pitch(throttler: &mut throttle::Throttler) -> Option<DisplayUpdate> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(update @ DisplayUpdate::Pitch { .. }) = throttler.tick(Instant::now()) {
                return Some(update);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn estimates_reach_the_throttler() {
        let config = ThrottleConfig {
            min_interval: Duration::ZERO,
            ..ThrottleConfig::default()
        };
        let (feed, mut throttler) = throttle::session(&config).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = AnalysisWorker::spawn(|_: &[f32]| Some(440.0_f32), rx, feed).unwrap();

        tx.send(vec![0.0; 16]).unwrap();
        match wait_for_pitch(&mut throttler) {
            Some(DisplayUpdate::Pitch { note, .. }) => assert_eq!(note.to_string(), "A4"),
            other => panic!("no pitch arrived: {other:?}"),
        }
        assert_eq!(worker.stop(), 1);
    }

    #[test]
    fn exits_when_audio_channel_closes() {
        let (feed, _throttler) = throttle::session(&ThrottleConfig::default()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = AnalysisWorker::spawn(|_: &[f32]| None::<f32>, rx, feed).unwrap();
        tx.send(vec![0.0; 16]).unwrap();
        tx.send(vec![0.0; 16]).unwrap();
        drop(tx);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
        assert_eq!(worker.stop(), 2);
    }

    #[test]
    fn survives_a_panicking_estimator() {
        let config = ThrottleConfig {
            min_interval: Duration::ZERO,
            ..ThrottleConfig::default()
        };
        let (feed, mut throttler) = throttle::session(&config).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let estimator = |block: &[f32]| {
            if block.is_empty() {
                panic!("empty block");
            }
            Some(261.63_f32)
        };
        let worker = AnalysisWorker::spawn(estimator, rx, feed).unwrap();

        tx.send(Vec::new()).unwrap();
        tx.send(vec![1.0]).unwrap();
        match wait_for_pitch(&mut throttler) {
            Some(DisplayUpdate::Pitch { note, .. }) => assert_eq!(note.to_string(), "C4"),
            other => panic!("no pitch arrived: {other:?}"),
        }
        drop(tx);
        assert_eq!(worker.stop(), 2);
    }
}
