//! Fire-and-forget viewing telemetry.
//!
//! Lease decisions never wait on telemetry: events go through a bounded
//! channel and are dropped with a warning when it is full or gone.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::lease::{LinkToken, SessionToken};

pub const DEFAULT_EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Session lifecycle, emitted by the server.
    Granted,
    Renewed,
    Denied,
    Released,
    // Playback, reported by the viewer.
    View,
    Play,
    Pause,
    Ended,
}

impl EventKind {
    /// Kinds a viewer may report; lifecycle kinds are server-only.
    pub fn is_client_reportable(self) -> bool {
        matches!(self, Self::View | Self::Play | Self::Pause | Self::Ended)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewingEvent {
    pub link_token: LinkToken,
    /// Absent for denied requests: no session exists to key them by.
    pub session_token: Option<SessionToken>,
    pub event_type: EventKind,
    pub media_id: Option<Uuid>,
    pub details: Option<String>,
    pub at: DateTime<Utc>,
}

impl ViewingEvent {
    pub fn new(link_token: LinkToken, session_token: Option<SessionToken>, event_type: EventKind) -> Self {
        Self {
            link_token,
            session_token,
            event_type,
            media_id: None,
            details: None,
            at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media_id: Option<Uuid>) -> Self {
        self.media_id = media_id;
        self
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError>;
}

/// Writes each event as a structured tracing line.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "reelpass::events",
            link = %event.link_token,
            session = event.session_token.as_ref().map(SessionToken::as_str),
            kind = ?event.event_type,
            media = ?event.media_id,
            "viewing event"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line)?;
        Ok(())
    }
}

/// Hands every event to each inner sink in turn.
///
/// A failing sink does not stop the rest; the first error is reported.
pub struct FanOutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanOutSink {
    fn record(&self, event: &ViewingEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Cheap cloneable handle used by request handlers to emit events.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<ViewingEvent>,
}

impl EventDispatcher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ViewingEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an event without waiting. Never fails from the caller's side.
    pub fn emit(&self, event: ViewingEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    "event queue full, dropping {:?} for link {}",
                    event.event_type,
                    event.link_token
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!("event sink closed, dropping {:?}", event.event_type);
            }
        }
    }
}

/// Drain queued events into `sink` until shutdown. Failures are logged and the
/// event is dropped; nothing is retried.
///
/// Sinks may block on file I/O, so each delivery runs on the blocking pool.
/// Deliveries are awaited one at a time to keep events in order.
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<ViewingEvent>,
    sink: Arc<dyn EventSink>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => deliver(&sink, event).await,
                    None => return,
                }
            }
            _ = shutdown_rx.recv() => {
                while let Ok(event) = rx.try_recv() {
                    deliver(&sink, event).await;
                }
                tracing::debug!("event dispatcher stopping");
                return;
            }
        }
    }
}

async fn deliver(sink: &Arc<dyn EventSink>, event: ViewingEvent) {
    let sink = Arc::clone(sink);
    let kind = event.event_type;
    match tokio::task::spawn_blocking(move || sink.record(&event)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("dropping {:?} event: {}", kind, e),
        Err(e) => tracing::warn!("event sink task failed on {:?}: {}", kind, e),
    }
}
