//! Error types for resource nodes
use thiserror::Error;

/// Boxed error returned by user factories and teardown actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for resource node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures observed while a node materializes or tears down.
///
/// None of these reach callers of `acquire` or `value`: the node collapses
/// them into an absent value (or skips the failed teardown), logs them and
/// publishes them on its event bus.
#[derive(Error, Debug)]
pub enum Error {
    /// The factory returned an error
    #[error("Materialization failed for node '{node}': {source}")]
    Materialize {
        /// The node name
        node: String,
        /// The factory error
        #[source]
        source: BoxError,
    },

    /// A teardown action or teardown hook returned an error
    #[error("Teardown failed for node '{node}': {source}")]
    Teardown {
        /// The node name
        node: String,
        /// The teardown error
        #[source]
        source: BoxError,
    },

    /// A spawned transition task panicked or was cancelled by the runtime
    #[error("{operation} task for node '{node}' did not complete")]
    TaskPanicked {
        /// The node name
        node: String,
        /// The transition that was running
        operation: &'static str,
    },
}

impl Error {
    /// Create a materialization error
    pub fn materialize(node: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Materialize {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Create a teardown error
    pub fn teardown(node: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Teardown {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Get the name of the node this error belongs to
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::Materialize { node, .. }
            | Self::Teardown { node, .. }
            | Self::TaskPanicked { node, .. } => node,
        }
    }
}
