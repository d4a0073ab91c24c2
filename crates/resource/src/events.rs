//! Event broadcasting for node lifecycle observability.
//!
//! Provides [`NodeEvent`] variants emitted while a node materializes and
//! tears down, and an [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// NodeEvent
// ---------------------------------------------------------------------------

/// Events emitted during node lifecycle transitions.
///
/// All variants carry the `node` name. Subscribers receive cloned copies via
/// [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The factory ran and produced a value (or deliberately none).
    Materialized {
        /// The node name.
        node: String,
        /// Whether the factory produced a value.
        has_value: bool,
    },
    /// The factory failed; the node resolves to an absent value.
    MaterializeFailed {
        /// The node name.
        node: String,
        /// Human-readable error description.
        error: String,
    },
    /// The last user released the node and an idle timer was armed.
    TeardownScheduled {
        /// The node name.
        node: String,
        /// The grace period before teardown.
        after: Duration,
    },
    /// A new user arrived before the idle timer fired.
    TeardownCancelled {
        /// The node name.
        node: String,
    },
    /// Teardown finished; dependencies were released.
    TornDown {
        /// The node name.
        node: String,
    },
    /// A teardown action or hook failed. The node stays reusable.
    TeardownFailed {
        /// The node name.
        node: String,
        /// Human-readable error description.
        error: String,
    },
}

impl NodeEvent {
    /// Name of the node that emitted this event.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::Materialized { node, .. }
            | Self::MaterializeFailed { node, .. }
            | Self::TeardownScheduled { node, .. }
            | Self::TeardownCancelled { node }
            | Self::TornDown { node }
            | Self::TeardownFailed { node, .. } => node,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for node lifecycle events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the
/// emitting node).
pub struct EventBus {
    sender: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: NodeEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls behind by more than the buffer size receives
    /// a `Lagged` error and skips to the latest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
