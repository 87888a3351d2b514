//! Event types for the reconstruction event system
//!
//! The UI (or CLI) layer never calls into a running job; it only observes
//! `ReconEvent`s. Per job the stream is: optional `JobStarted`, any number of
//! `Progress`, then exactly one terminal `Finished` or `Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Reconstruction backend selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Monocular depth inference + back-projection
    Ai,
    /// External structure-from-motion / multi-view stereo toolchain
    ExternalPipeline,
}

/// Reconstruction event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReconEvent {
    /// Job accepted and its worker started
    JobStarted {
        job_id: Uuid,
        backend: BackendKind,
        timestamp: DateTime<Utc>,
    },

    /// Progress message. `percent < 0` means "message only, no percent update".
    Progress {
        job_id: Uuid,
        message: String,
        percent: i32,
        timestamp: DateTime<Utc>,
    },

    /// Job completed; `result_path` is the workspace (AI) or model file (pipeline)
    Finished {
        job_id: Uuid,
        result_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Job terminated with an error (cancellation included, see `code`)
    Failed {
        job_id: Uuid,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ReconEvent {
    /// Build a progress event stamped now
    pub fn progress(job_id: Uuid, message: impl Into<String>, percent: i32) -> Self {
        ReconEvent::Progress {
            job_id,
            message: message.into(),
            percent,
            timestamp: Utc::now(),
        }
    }

    /// Build a finished event stamped now
    pub fn finished(job_id: Uuid, result_path: impl Into<String>) -> Self {
        ReconEvent::Finished {
            job_id,
            result_path: result_path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a failure event from a terminal error
    pub fn failed(job_id: Uuid, error: &crate::Error) -> Self {
        ReconEvent::Failed {
            job_id,
            code: error.code().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            ReconEvent::JobStarted { job_id, .. }
            | ReconEvent::Progress { job_id, .. }
            | ReconEvent::Finished { job_id, .. }
            | ReconEvent::Failed { job_id, .. } => *job_id,
        }
    }

    /// True for `Finished` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconEvent::Finished { .. } | ReconEvent::Failed { .. })
    }
}

/// Destination for job events
///
/// Jobs emit synchronously from their worker thread; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ReconEvent);
}

/// Buffered events per subscriber; stage logs can burst thousands of lines
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Broadcast event bus
///
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReconEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers start lagging.
    ///   Pipeline stages can print thousands of lines; see [`DEFAULT_EVENT_CAPACITY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use imgto3d_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ReconEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<ReconEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ReconEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: ReconEvent) {
        if event.is_terminal() {
            tracing::debug!(job_id = %event.job_id(), "Emitting terminal event");
        }
        self.emit_lossy(event);
    }
}
