//! Node configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Grace period used when a node does not configure one.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

/// What happens to a materialized value once its last user releases it.
///
/// Serialized as signed milliseconds: `0` is [`Immediate`](Self::Immediate),
/// a positive number is [`After`](Self::After), any negative number is
/// [`Never`](Self::Never).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "i64", into = "i64"))]
pub enum IdleTimeout {
    /// Tear down as soon as in-flight work on the node has settled.
    Immediate,
    /// Tear down after the node stayed unused for the given duration.
    After(Duration),
    /// Keep the value for the lifetime of the node.
    Never,
}

impl IdleTimeout {
    /// Build from signed milliseconds.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Self::Immediate,
            m if m < 0 => Self::Never,
            m => Self::After(Duration::from_millis(m.unsigned_abs())),
        }
    }

    /// Signed milliseconds, the inverse of [`from_millis`](Self::from_millis).
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        match self {
            Self::Immediate => 0,
            Self::After(d) if d.is_zero() => 0,
            Self::After(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            Self::Never => -1,
        }
    }
}

impl Default for IdleTimeout {
    fn default() -> Self {
        Self::After(DEFAULT_IDLE_TIMEOUT)
    }
}

impl From<i64> for IdleTimeout {
    fn from(millis: i64) -> Self {
        Self::from_millis(millis)
    }
}

impl From<IdleTimeout> for i64 {
    fn from(timeout: IdleTimeout) -> Self {
        timeout.as_millis()
    }
}

impl From<Duration> for IdleTimeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Immediate
        } else {
            Self::After(duration)
        }
    }
}

/// Configuration recognized by a node at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NodeConfig {
    /// Idle teardown policy
    pub timeout: IdleTimeout,
    /// Label used in logs and events; generated when absent
    pub name: Option<String>,
}

impl NodeConfig {
    /// Config with the given idle timeout and no explicit name.
    #[must_use]
    pub fn with_timeout(timeout: impl Into<IdleTimeout>) -> Self {
        Self {
            timeout: timeout.into(),
            name: None,
        }
    }
}
