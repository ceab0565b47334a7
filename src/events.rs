//! Outbound notifications and the sinks that deliver them.
//!
//! The simulation loop never waits on a consumer: [`Emitter::emit`] drops an event
//! when the bounded queue is full, and a dedicated writer thread drains the queue
//! into one or more [`EventSink`]s.

use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    io::Write,
    sync::mpsc::{self, Receiver, SyncSender, TrySendError},
    thread::{self, JoinHandle},
};

/// Colour tags cycled over population slots.
pub const COLORS: [&str; 12] = [
    "#FF0055", "#00FFFF", "#FFFF00", "#39FF14", "#FF00FF", "#FF8000", "#8000FF", "#0080FF",
    "#FFFFFF", "#64FF64", "#FF6464", "#6464FF",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Per-frame population snapshot.
    Update(Snapshot),
    /// Summary of a completed generation.
    GenLog(GenerationSummary),
    /// A new generation has started.
    Reset { generation: u64 },
    /// Acknowledges a hard reset.
    HardReset { generation: u64 },
    /// Acknowledges a pause toggle.
    PauseState { paused: bool },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Update(_) => "update",
            Event::GenLog(_) => "gen_log",
            Event::Reset { .. } => "reset",
            Event::HardReset { .. } => "hard_reset",
            Event::PauseState { .. } => "pause_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub steps: usize,
    pub alive: usize,
    pub cars: Vec<CarSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub alive: bool,
    /// Crashed since the previous snapshot.
    pub crashed: bool,
    /// `(distance, angle offset)` per radar ray.
    pub sensors: Vec<(f64, f64)>,
    pub color: String,
    pub policy_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u64,
    /// Best progress distance.
    pub distance: f64,
    /// Exploration rate of the elite.
    pub epsilon: f64,
    pub mean_distance: f64,
    pub std_distance: f64,
}

pub fn round_to(val: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (val * scale).round() / scale
}

enum Message {
    Event(Event),
    Close,
}

/// Non-blocking handle for publishing events.
#[derive(Clone)]
pub struct Emitter {
    tx: SyncSender<Message>,
}

/// Receiving end of an [`Emitter`] queue.
pub struct EventQueue {
    rx: Receiver<Message>,
}

impl Emitter {
    /// Create an emitter backed by a queue holding at most `capacity` events.
    pub fn channel(capacity: usize) -> (Emitter, EventQueue) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Emitter { tx }, EventQueue { rx })
    }

    /// Queue an event, dropping it if the queue is full or closed.
    pub fn emit(&self, event: Event) -> bool {
        match self.tx.try_send(Message::Event(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(Message::Event(event))) => {
                log::debug!("event queue full; dropping {} event", event.kind());
                false
            }
            Err(_) => {
                log::debug!("event queue disconnected");
                false
            }
        }
    }

    /// Ask the writer to stop once every event queued so far has been delivered.
    pub fn close(&self) {
        // Blocks only while the queue is full, which the writer is draining.
        self.tx.send(Message::Close).ok();
    }
}

#[cfg(test)]
impl EventQueue {
    /// Next queued event, if any, without blocking.
    pub fn try_next(&self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(Message::Event(event)) => return Some(event),
                Ok(Message::Close) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Every event currently queued.
    pub fn drain(&self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Destination for outbound events.
pub trait EventSink {
    fn write_event(&mut self, event: &Event) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn write_event(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event).context("failed to serialize event")?;
        self.writer
            .write_all(b"\n")
            .context("failed to write line break")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush writer stream")
    }
}

/// Concatenated MessagePack values, structs encoded as maps.
pub struct MsgpackSink<W: Write> {
    writer: W,
}

impl<W: Write> MsgpackSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for MsgpackSink<W> {
    fn write_event(&mut self, event: &Event) -> Result<()> {
        encode::write_named(&mut self.writer, event).context("failed to serialize event")
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush writer stream")
    }
}

pub type BoxedSink = Box<dyn EventSink + Send>;

/// Spawn the thread delivering queued events to `sinks`.
///
/// The thread ends after [`Emitter::close`] or once every emitter is dropped.
pub fn spawn_writer(queue: EventQueue, mut sinks: Vec<BoxedSink>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("events".into())
        .spawn(move || {
            'outer: while let Ok(mut msg) = queue.rx.recv() {
                loop {
                    match msg {
                        Message::Event(event) => deliver(&mut sinks, &event),
                        Message::Close => break 'outer,
                    }
                    match queue.rx.try_recv() {
                        Ok(next) => msg = next,
                        Err(_) => break,
                    }
                }
                flush_all(&mut sinks);
            }
            flush_all(&mut sinks);
        })
        .context("failed to spawn event writer")
}

fn deliver(sinks: &mut [BoxedSink], event: &Event) {
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.write_event(event) {
            log::warn!("failed to deliver {} event: {error:#}", event.kind());
        }
    }
}

fn flush_all(sinks: &mut [BoxedSink]) {
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.flush() {
            log::warn!("{error:#}");
        }
    }
}
