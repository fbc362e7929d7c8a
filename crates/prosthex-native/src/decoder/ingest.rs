//! Frame delivery into a shared controller
//!
//! The active controller lives behind a [`SharedDecoder`]. Every armband
//! event is applied under its lock, so buffer contents, filter memory and
//! reservoir state only ever see one decode step at a time.
//!
//! Two delivery strategies are available at runtime:
//!
//! - **Polled**: the host calls [`Ingestion::deliver`] once per tick and the
//!   event is applied immediately.
//! - **Event**: a driver pushes events into a bounded `tokio` channel and a
//!   background task drains it. Dropping the ingestion (or calling
//!   [`Ingestion::finish`]) closes the channel and stops the task.
//!
//! Control signals produced by either strategy are published on a broadcast
//! channel.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use prosthex_core::types::{Frame, Orientation, Pose};

use super::controller::{Controller, ControllerKind};
use super::error::{DecoderError, DecoderResult};

/// Controller shared between the delivery path and its readers
pub type SharedDecoder = Arc<Mutex<Controller>>;

/// Wrap a controller for shared use
#[must_use]
pub fn shared(controller: Controller) -> SharedDecoder {
    Arc::new(Mutex::new(controller))
}

/// Input from the armband driver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmbandEvent {
    /// One EMG frame
    Emg(Frame),
    /// Recognized gesture
    Pose(Pose),
    /// Current orientation
    Orientation(Orientation),
    /// Take the current orientation as neutral
    Calibrate,
}

/// Controller output after an event
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlSignal {
    /// Opening velocity in `[-1, 1]`
    pub opening: f64,
    /// Rotation velocity in `[-1, 1]`
    pub rotation: f64,
    /// Position in `[0, 1]²`
    pub position: (f64, f64),
}

impl ControlSignal {
    /// Snapshot of `controller`
    #[must_use]
    pub fn of(controller: &Controller) -> Self {
        Self {
            opening: controller.opening_velocity(),
            rotation: controller.rotation_velocity(),
            position: controller.position(),
        }
    }
}

/// Counters kept by an ingestion strategy
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// EMG frames delivered
    pub frames: u64,
    /// Frames that completed a decoded window
    pub windows: u64,
    /// Frames dropped because the controller was not configured
    pub ignored: u64,
}

/// Delivery strategy
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    /// Host polls once per tick
    #[default]
    Polled,
    /// Driver pushes through a channel
    Event,
}

/// Apply one event to a locked controller
fn apply(
    controller: &mut Controller,
    event: ArmbandEvent,
    stats: &mut IngestStats,
) -> DecoderResult<Option<ControlSignal>> {
    match event {
        ArmbandEvent::Emg(frame) => {
            stats.frames += 1;
            match controller.on_emg(frame.as_slice()) {
                Ok(true) => {
                    stats.windows += 1;
                    Ok(Some(ControlSignal::of(controller)))
                }
                Ok(false) => Ok(None),
                Err(DecoderError::NotConfigured { controller: name }) => {
                    stats.ignored += 1;
                    debug!("Ignoring frame: {name} is not configured");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
        ArmbandEvent::Pose(pose) => {
            controller.on_pose(pose);
            Ok((controller.kind() == ControllerKind::PoseRule).then(|| ControlSignal::of(controller)))
        }
        ArmbandEvent::Orientation(orientation) => {
            controller.on_orientation(orientation);
            Ok(None)
        }
        ArmbandEvent::Calibrate => {
            controller.calibrate();
            Ok(None)
        }
    }
}

fn apply_shared(
    decoder: &SharedDecoder,
    event: ArmbandEvent,
    stats: &mut IngestStats,
) -> DecoderResult<Option<ControlSignal>> {
    let mut controller = decoder.lock().map_err(|_| DecoderError::Poisoned)?;
    apply(&mut controller, event, stats)
}

enum Mode {
    Polled { stats: IngestStats },
    Event { sender: mpsc::Sender<ArmbandEvent>, task: JoinHandle<DecoderResult<IngestStats>> },
}

/// Delivers armband events to a shared controller
pub struct Ingestion {
    decoder: SharedDecoder,
    signals: broadcast::Sender<ControlSignal>,
    mode: Mode,
}

impl Ingestion {
    /// Events are applied on the caller's thread.
    #[must_use]
    pub fn polled(decoder: SharedDecoder) -> Self {
        let (signals, _) = broadcast::channel(64);
        Self { decoder, signals, mode: Mode::Polled { stats: IngestStats::default() } }
    }

    /// Events are queued (up to `capacity`) and applied by a background task.
    ///
    /// Must be called from within a `tokio` runtime.
    #[must_use]
    pub fn event(decoder: SharedDecoder, capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(64);
        let (sender, task) = spawn_event_ingestion(Arc::clone(&decoder), capacity, signals.clone());
        Self { decoder, signals, mode: Mode::Event { sender, task } }
    }

    /// Create the strategy selected by `mode`
    #[must_use]
    pub fn new(mode: IngestionMode, decoder: SharedDecoder, capacity: usize) -> Self {
        match mode {
            IngestionMode::Polled => Self::polled(decoder),
            IngestionMode::Event => Self::event(decoder, capacity),
        }
    }

    /// Active strategy
    #[must_use]
    pub const fn mode(&self) -> IngestionMode {
        match self.mode {
            Mode::Polled { .. } => IngestionMode::Polled,
            Mode::Event { .. } => IngestionMode::Event,
        }
    }

    /// Controller receiving the events
    #[must_use]
    pub const fn decoder(&self) -> &SharedDecoder {
        &self.decoder
    }

    /// Receive every control signal produced from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControlSignal> {
        self.signals.subscribe()
    }

    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// - Polled: any decode error that stops the pipeline, or
    ///   [`DecoderError::Poisoned`]
    /// - Event: [`DecoderError::IngestionStopped`] once the background task
    ///   has exited; await [`finish`](Self::finish) for the cause
    pub async fn deliver(&mut self, event: ArmbandEvent) -> DecoderResult<()> {
        match &mut self.mode {
            Mode::Polled { stats } => {
                if let Some(signal) = apply_shared(&self.decoder, event, stats)? {
                    let _ = self.signals.send(signal);
                }
                Ok(())
            }
            Mode::Event { sender, .. } => sender.send(event).await.map_err(|_| DecoderError::IngestionStopped),
        }
    }

    /// Stop delivering and return the counters.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped event ingestion, or
    /// [`DecoderError::IngestionStopped`] if the task panicked.
    pub async fn finish(self) -> DecoderResult<IngestStats> {
        match self.mode {
            Mode::Polled { stats } => Ok(stats),
            Mode::Event { sender, task } => {
                drop(sender);
                task.await.map_err(|_| DecoderError::IngestionStopped)?
            }
        }
    }
}

/// Spawn a task that drains events from a channel into `decoder`.
///
/// The task ends when every sender is dropped, or with the first decode
/// error that stops the pipeline.
pub fn spawn_event_ingestion(
    decoder: SharedDecoder,
    capacity: usize,
    signals: broadcast::Sender<ControlSignal>,
) -> (mpsc::Sender<ArmbandEvent>, JoinHandle<DecoderResult<IngestStats>>) {
    let (tx, mut rx) = mpsc::channel::<ArmbandEvent>(capacity.max(1));
    let task = tokio::spawn(async move {
        info!("Event ingestion started");
        let mut stats = IngestStats::default();
        while let Some(event) = rx.recv().await {
            match apply_shared(&decoder, event, &mut stats) {
                Ok(Some(signal)) => {
                    let _ = signals.send(signal);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Event ingestion stopped: {e}");
                    return Err(e);
                }
            }
        }
        info!("Event ingestion finished after {} frames, {} windows", stats.frames, stats.windows);
        Ok(stats)
    });
    (tx, task)
}
