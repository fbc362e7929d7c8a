//! Prosthex Application
//!
//! Command-line entry point for the Prosthex EMG decoders. Checks model
//! directories, replays recorded armband data through a controller and
//! prints the resulting control signals as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! # Validate a trained echo state network
//! prosthex check --controller esn --model-dir models/EchoStateNetwork
//!
//! # Replay a recording through the GMLVQ decoder with event ingestion
//! prosthex replay --controller gmlvq --model-dir models/gmlvq --input session.json --ingest event
//!
//! # Use the controller and model directory stored in a settings file
//! prosthex --settings settings.json replay --input session.json
//!
//! # Print per-channel RMS activation every 50 frames
//! prosthex monitor --input session.json --window 50
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use prosthex_core::types::Frame;
use prosthex_native::decoder::{
    shared, ArmbandEvent, Controller, ControllerKind, Ingestion, IngestionMode, Settings,
};
use prosthex_native::processing::ChannelEnvelope;

/// Prosthex EMG decoding
#[derive(Parser, Debug)]
#[command(name = "prosthex")]
#[command(author, version, about = "EMG decoding for prosthesis control", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Settings document selecting the controller and its model directory
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a model directory and report whether the controller accepts it
    Check {
        /// Controller to configure
        #[arg(short, long, value_enum)]
        controller: Option<ControllerArg>,

        /// Model directory (defaults to the settings entry)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,
    },

    /// Replay recorded armband data and print control signals
    Replay {
        /// Controller to drive
        #[arg(short, long, value_enum)]
        controller: Option<ControllerArg>,

        /// Model directory (defaults to the settings entry)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// Recording: a JSON list of frames or of armband events
        #[arg(short, long)]
        input: PathBuf,

        /// Frame delivery strategy
        #[arg(long, value_enum, default_value = "polled")]
        ingest: IngestArg,

        /// Queue length for event ingestion
        #[arg(long, default_value = "256")]
        capacity: usize,
    },

    /// Print per-channel RMS activation of a recording
    Monitor {
        /// Recording: a JSON list of frames or of armband events
        #[arg(short, long)]
        input: PathBuf,

        /// Frames per RMS window
        #[arg(short, long, default_value = "50")]
        window: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ControllerArg {
    /// Echo state network
    Esn,
    /// GMLVQ models
    Gmlvq,
    /// Armband gesture rules
    Pose,
}

impl From<ControllerArg> for ControllerKind {
    fn from(arg: ControllerArg) -> Self {
        match arg {
            ControllerArg::Esn => Self::EchoState,
            ControllerArg::Gmlvq => Self::Gmlvq,
            ControllerArg::Pose => Self::PoseRule,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IngestArg {
    /// Apply each frame on the reading loop
    Polled,
    /// Push frames through a channel to a background task
    Event,
}

impl From<IngestArg> for IngestionMode {
    fn from(arg: IngestArg) -> Self {
        match arg {
            IngestArg::Polled => Self::Polled,
            IngestArg::Event => Self::Event,
        }
    }
}

/// Recorded session
#[derive(Deserialize)]
#[serde(untagged)]
enum Recording {
    /// Bare EMG frames
    Frames(Vec<Vec<f64>>),
    /// Mixed armband events
    Events(Vec<ArmbandEvent>),
}

impl Recording {
    fn load(path: &Path) -> anyhow::Result<Vec<ArmbandEvent>> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let recording: Self = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(match recording {
            Self::Frames(frames) => frames.into_iter().map(|f| ArmbandEvent::Emg(Frame::new(f))).collect(),
            Self::Events(events) => events,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Prosthex v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.settings {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Check { controller, model_dir } => {
            let (mut controller, dir) = build_controller(&settings, controller, model_dir)?;
            configure(&mut controller, dir.as_deref())?;
            println!("{}: OK", controller.name());
            describe(&controller);
        }
        Commands::Replay { controller, model_dir, input, ingest, capacity } => {
            let (mut controller, dir) = build_controller(&settings, controller, model_dir)?;
            configure(&mut controller, dir.as_deref())?;
            let events = Recording::load(&input)?;
            run_replay(controller, events, ingest.into(), capacity)?;
        }
        Commands::Monitor { input, window } => {
            run_monitor(&Recording::load(&input)?, window)?;
        }
    }

    Ok(())
}

/// Pick the controller from the flag or the settings document, and its
/// model directory from the flag or the matching settings entry
fn build_controller(
    settings: &Settings,
    arg: Option<ControllerArg>,
    model_dir: Option<PathBuf>,
) -> anyhow::Result<(Controller, Option<PathBuf>)> {
    let kind = match arg {
        Some(arg) => arg.into(),
        None => ControllerKind::from_name(&settings.current_controller).with_context(|| {
            format!("no --controller given and settings name unknown controller {:?}", settings.current_controller)
        })?,
    };
    let controller = Controller::new(kind, settings)?;
    let dir = model_dir.or_else(|| settings.configuration_for(kind.name()));
    Ok((controller, dir))
}

fn configure(controller: &mut Controller, dir: Option<&Path>) -> anyhow::Result<()> {
    if !controller.needs_configuration() {
        return Ok(());
    }
    let Some(dir) = dir else {
        anyhow::bail!("{} needs a model directory (--model-dir or settings)", controller.name());
    };
    let result = controller.set_configuration(dir);
    if result.is_error() {
        anyhow::bail!("{} rejected {}: {}", controller.name(), dir.display(), result.message());
    }
    Ok(())
}

/// Print the dimensions of the loaded model
fn describe(controller: &Controller) {
    match controller {
        Controller::EchoState(c) => {
            if let Some(esn) = c.network() {
                println!(
                    "  {} inputs, {} reservoir neurons, {} outputs, dt {}",
                    esn.num_inputs(),
                    esn.num_neurons(),
                    esn.num_outputs(),
                    esn.dt()
                );
            }
        }
        Controller::Gmlvq(c) => {
            if let Some(models) = c.models() {
                for (i, m) in models.models.iter().enumerate() {
                    println!("  model {i}: {} prototypes in {} dimensions", m.num_prototypes(), m.dimension());
                }
                if let Some(t) = &models.transfer {
                    println!("  transfer mapping {} x {}", t.nrows(), t.ncols());
                }
            }
        }
        Controller::PoseRule(_) | Controller::Keyboard(_) => {}
    }
}

/// Replay events and print one JSON line per control signal
fn run_replay(
    controller: Controller,
    events: Vec<ArmbandEvent>,
    mode: IngestionMode,
    capacity: usize,
) -> anyhow::Result<()> {
    use tokio::runtime::Runtime;

    info!("Replaying {} events through {} ({:?} ingestion)", events.len(), controller.name(), mode);

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let mut ingestion = Ingestion::new(mode, shared(controller), capacity);
        let mut rx = ingestion.subscribe();

        let printer = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => match serde_json::to_string(&signal) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("Unprintable signal: {e}"),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Printer lagged, dropped {} signals", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        for event in events {
            if ingestion.deliver(event).await.is_err() {
                break;
            }
        }
        let stats = ingestion.finish().await;
        printer.await?;

        let stats = stats?;
        info!("{} frames, {} windows decoded, {} ignored", stats.frames, stats.windows, stats.ignored);
        Ok::<(), anyhow::Error>(())
    })
}

/// Print the RMS envelope of every channel once per `window` frames
fn run_monitor(events: &[ArmbandEvent], window: usize) -> anyhow::Result<()> {
    if window == 0 {
        anyhow::bail!("--window must be at least one frame");
    }
    let frames: Vec<&Frame> = events
        .iter()
        .filter_map(|e| match e {
            ArmbandEvent::Emg(frame) => Some(frame),
            _ => None,
        })
        .collect();
    let Some(first) = frames.first() else {
        warn!("Recording holds no EMG frames");
        return Ok(());
    };

    let mut envelope = ChannelEnvelope::new(first.channels(), window);
    for (t, frame) in frames.iter().enumerate() {
        envelope.push_frame(frame.as_slice())?;
        if (t + 1) % window == 0 {
            println!("{}", serde_json::to_string(&envelope.values())?);
        }
    }
    Ok(())
}
