//! # Tuner - Command Line Front End
//!
//! Drives the tuner engine from a terminal.
//!
//! ## Architecture
//! - **Audio Thread**: cpal callback framing microphone input into blocks
//! - **Analysis Thread**: frequency estimation, feeding the throttler
//! - **Main Thread**: display timer, ticking the throttler and printing updates
//! - **Communication**: Crossbeam channels between all three

mod display;
mod wav;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, select};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tuner_engine::audio::AudioSession;
use tuner_engine::pitch::YinEstimator;
use tuner_engine::replay::replay;
use tuner_engine::throttle::{self, SilencePolicy};
use tuner_engine::worker::AnalysisWorker;
use tuner_engine::{AccidentalMode, TunerConfig, classify};

/// Chromatic tuner: names the note you are playing and how far off it is.
#[derive(Parser)]
#[command(name = "tuner")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to the default microphone and display the detected note
    Listen {
        #[command(flatten)]
        display: DisplayArgs,

        /// Stop after this many seconds (default: until Enter is pressed)
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Classify frequencies given in Hz
    Classify {
        /// Frequencies in Hz
        #[arg(required = true)]
        frequencies: Vec<f64>,

        /// Spell chromatic notes with flats
        #[arg(long)]
        flat: bool,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Run a WAV recording through the tuner as if it were live
    Analyze {
        /// Path to a WAV file
        path: PathBuf,

        #[command(flatten)]
        display: DisplayArgs,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

/// Overrides for the display section of the config file.
#[derive(Args)]
struct DisplayArgs {
    /// Spell chromatic notes with flats
    #[arg(long)]
    flat: bool,

    /// Display updates per second
    #[arg(long)]
    fps: Option<u32>,

    /// Keep the last note on screen during silence
    #[arg(long)]
    hold: bool,

    /// Accept estimates at any frequency
    #[arg(long)]
    no_ceiling: bool,
}

impl DisplayArgs {
    fn apply(&self, config: &mut TunerConfig) {
        if self.flat {
            config.display.accidental_mode = AccidentalMode::Flat;
        }
        if let Some(fps) = self.fps {
            config.display.target_fps = fps;
        }
        if self.hold {
            config.display.silence_policy = SilencePolicy::Hold;
        }
        if self.no_ceiling {
            config.display.max_frequency = None;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = TunerConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Listen { display, duration } => {
            display.apply(&mut config);
            config.validate()?;
            listen(&config, duration)
        }
        Commands::Classify {
            frequencies,
            flat,
            json,
        } => {
            let mode = if flat {
                AccidentalMode::Flat
            } else {
                config.display.accidental_mode
            };
            classify_all(&frequencies, mode, json)
        }
        Commands::Analyze {
            path,
            display,
            json,
        } => {
            display.apply(&mut config);
            config.validate()?;
            analyze(&config, &path, json)
        }
        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays clean for readings.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn listen(config: &TunerConfig, duration: Option<f64>) -> Result<()> {
    let deadline = match duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            crossbeam_channel::after(Duration::from_secs_f64(secs))
        }
        Some(secs) => bail!("--duration must be a positive number of seconds, got {secs}"),
        None => crossbeam_channel::never(),
    };
    let (feed, mut throttler) = throttle::session(&config.display.to_throttle_config()?)?;

    let (block_tx, block_rx) = crossbeam_channel::bounded(8);
    let mut audio = AudioSession::configure(config.audio.clone())?;
    let sample_rate = audio.start(block_tx).context("failed to start audio capture")?;

    let estimator = YinEstimator::new(sample_rate, &config.estimator);
    let worker = AnalysisWorker::spawn(estimator, block_rx, feed)?;

    let mut quit = enter_pressed();
    let ticker = crossbeam_channel::tick(throttler.min_interval());

    info!(sample_rate, "listening");
    eprintln!("Listening at {sample_rate} Hz. Press Enter to stop.");
    loop {
        let mut stdin_closed = false;
        select! {
            recv(ticker) -> now => {
                let Ok(now) = now else { break };
                if let Some(update) = throttler.tick(now) {
                    println!("{}", display::render(&update));
                }
            }
            recv(quit) -> msg => match msg {
                Ok(()) => break,
                Err(_) => stdin_closed = true,
            },
            recv(deadline) -> _ => break,
        }
        // No newline will ever arrive; only --duration or a signal stops us.
        if stdin_closed {
            debug!("stdin closed");
            quit = crossbeam_channel::never();
        }
    }

    audio.stop();
    let processed = worker.stop();
    info!(processed, "stopped listening");
    Ok(())
}

/// Fires once when a line is read from stdin.
fn enter_pressed() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = thread::Builder::new()
        .name("tuner-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
                let _ = tx.send(());
            }
        });
    if let Err(err) = spawned {
        warn!(%err, "could not watch stdin, Enter will not stop the tuner");
    }
    rx
}

fn classify_all(frequencies: &[f64], mode: AccidentalMode, json: bool) -> Result<()> {
    let mut rejected = 0;
    for &frequency in frequencies {
        match classify(frequency, mode) {
            Ok(note) if json => println!("{}", serde_json::to_string(&note)?),
            Ok(note) => println!("{}", display::render_note(&note, None)),
            Err(err) => {
                eprintln!("{frequency}: {err}");
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        bail!("{rejected} of {} frequencies could not be classified", frequencies.len());
    }
    Ok(())
}

fn analyze(config: &TunerConfig, path: &std::path::Path, json: bool) -> Result<()> {
    let recording = wav::load(path)?;
    info!(
        sample_rate = recording.sample_rate,
        seconds = recording.duration_secs(),
        "analyzing recording"
    );

    if recording.block_count(config.audio.buffer_size) == 0 {
        warn!(
            buffer_size = config.audio.buffer_size,
            "recording is shorter than one analysis block"
        );
    }

    let mut estimator = YinEstimator::new(recording.sample_rate, &config.estimator);
    let updates = replay(
        &recording.samples,
        recording.sample_rate,
        config.audio.buffer_size,
        &mut estimator,
        &config.display.to_throttle_config()?,
    )?;

    for timed in &updates {
        let at = timed.at.as_secs_f64();
        if json {
            let mut value = serde_json::to_value(timed.update)?;
            value["at"] = serde_json::json!(at);
            println!("{value}");
        } else {
            println!("{at:>8.3}s  {}", display::render(&timed.update));
        }
    }
    Ok(())
}
