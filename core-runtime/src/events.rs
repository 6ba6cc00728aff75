//! # Event Bus System
//!
//! Event-driven notifications for the offline core using `tokio::sync::broadcast`.
//! Components publish typed events; the UI status surface (pending-operation
//! badge, download progress bars, offline banner) subscribes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐
//! │ Connectivity     ├─────────>│           │
//! └──────────────────┘          │           │
//! ┌──────────────────┐   emit   │ EventBus  │  subscribe  ┌────────────┐
//! │ Sync Queue       ├─────────>│ (broadcast├────────────>│ Subscriber │
//! └──────────────────┘          │  channel) │             └────────────┘
//! ┌──────────────────┐   emit   │           │
//! │ Offline Media    ├─────────>│           │
//! └──────────────────┘          │           │
//! ┌──────────────────┐   emit   │           │
//! │ Interceptor      ├─────────>│           │
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Connectivity(ConnectivityEvent::Changed { online: false }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Connectivity(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: all senders were dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns an error. Publishers in this workspace
//! ignore it with `.ok()`; nobody listening is not a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Download progress is the chattiest publisher; subscribers that can't
/// keep up receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Online/offline transitions
    Connectivity(ConnectivityEvent),
    /// Pending-operation queue activity
    Sync(SyncEvent),
    /// Offline media downloads and removals
    Media(MediaEvent),
    /// Response cache lifecycle
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connectivity(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Media(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::TaskDropped { .. }) => EventSeverity::Error,
            CoreEvent::Media(MediaEvent::DownloadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::TaskRetryScheduled { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::PrecacheFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Connectivity(_) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::DrainCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Media(MediaEvent::DownloadCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::GenerationActivated { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Connectivity Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    /// The observable online flag flipped.
    Changed { online: bool },
}

impl ConnectivityEvent {
    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::Changed { online: true } => "Connectivity restored",
            ConnectivityEvent::Changed { online: false } => "Connectivity lost",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the pending-operation queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A mutation was durably queued.
    TaskEnqueued {
        task_id: String,
        /// Operation kind, e.g. "favorite_toggle".
        kind: String,
        /// Queue length after the append.
        pending: usize,
    },
    /// A drain started working on a snapshot.
    DrainStarted { snapshot_size: usize },
    /// A queued task was applied and removed.
    TaskApplied { task_id: String, kind: String },
    /// A task failed and stays queued for the next drain.
    TaskRetryScheduled {
        task_id: String,
        kind: String,
        attempt_count: u32,
        message: String,
    },
    /// A task hit the retry ceiling and moved to the dead-letter list.
    TaskDropped {
        task_id: String,
        kind: String,
        attempt_count: u32,
        message: String,
    },
    /// A drain finished its snapshot.
    DrainCompleted {
        applied: usize,
        retried: usize,
        dropped: usize,
        deferred: usize,
        /// Queue length after the drain (may include tasks enqueued meanwhile).
        pending: usize,
    },
    /// All pending tasks were discarded administratively.
    QueueCleared { removed: usize },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::TaskEnqueued { .. } => "Operation queued for replay",
            SyncEvent::DrainStarted { .. } => "Replaying queued operations",
            SyncEvent::TaskApplied { .. } => "Queued operation applied",
            SyncEvent::TaskRetryScheduled { .. } => "Queued operation failed, will retry",
            SyncEvent::TaskDropped { .. } => "Queued operation dropped after max retries",
            SyncEvent::DrainCompleted { .. } => "Queue replay finished",
            SyncEvent::QueueCleared { .. } => "Pending operations cleared",
        }
    }
}

// ============================================================================
// Media Events
// ============================================================================

/// Events emitted by the offline media manager. `key` is `"<content_id>:<category>"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    DownloadStarted { key: String },
    DownloadProgress {
        key: String,
        received_bytes: u64,
        total_bytes: Option<u64>,
        /// Percentage (0-100), absent when the total size is unknown.
        percent: Option<u8>,
    },
    DownloadCompleted { key: String, size_bytes: u64 },
    DownloadFailed { key: String, message: String },
    /// Entry removed to make room for a new download.
    Evicted { key: String, size_bytes: u64 },
    /// Entry removed explicitly, by revocation, or by expiry cleanup.
    Removed { key: String },
}

impl MediaEvent {
    fn description(&self) -> &str {
        match self {
            MediaEvent::DownloadStarted { .. } => "Offline download started",
            MediaEvent::DownloadProgress { .. } => "Offline download in progress",
            MediaEvent::DownloadCompleted { .. } => "Offline download completed",
            MediaEvent::DownloadFailed { .. } => "Offline download failed",
            MediaEvent::Evicted { .. } => "Offline media evicted to free space",
            MediaEvent::Removed { .. } => "Offline media removed",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events emitted by the network interception layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A cache generation became active after purging older ones.
    GenerationActivated {
        generation: String,
        purged_entries: usize,
        precached: usize,
    },
    /// A manifest path could not be precached.
    PrecacheFailed { path: String, message: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::GenerationActivated { .. } => "Response cache generation activated",
            CacheEvent::PrecacheFailed { .. } => "Failed to precache critical asset",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let media_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Media(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueued(task_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::TaskEnqueued {
            task_id: task_id.to_string(),
            kind: "favorite_toggle".to_string(),
            pending: 1,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(enqueued("t1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Connectivity(ConnectivityEvent::Changed { online: true });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Media(_)));

        bus.emit(enqueued("t1")).ok();
        let media = CoreEvent::Media(MediaEvent::DownloadCompleted {
            key: "42:movie".to_string(),
            size_bytes: 1024,
        });
        bus.emit(media.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), media);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(enqueued(&format!("t{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let dropped = CoreEvent::Sync(SyncEvent::TaskDropped {
            task_id: "t1".to_string(),
            kind: "rental_create".to_string(),
            attempt_count: 3,
            message: "offline".to_string(),
        });
        assert_eq!(dropped.severity(), EventSeverity::Error);

        let progress = CoreEvent::Media(MediaEvent::DownloadProgress {
            key: "42:movie".to_string(),
            received_bytes: 10,
            total_bytes: None,
            percent: None,
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);

        let online = CoreEvent::Connectivity(ConnectivityEvent::Changed { online: true });
        assert_eq!(online.severity(), EventSeverity::Info);
        assert_eq!(online.description(), "Connectivity restored");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Cache(CacheEvent::GenerationActivated {
            generation: "v7".to_string(),
            purged_entries: 12,
            precached: 3,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("GenerationActivated"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(enqueued("t1")).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, enqueued("t1"));
    }
}
