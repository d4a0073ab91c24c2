//! # Keel Resource Graph
//!
//! Lazily created, shared, reference-counted resources whose construction is
//! asynchronous and may depend on other resources.
//!
//! - [`ResourceNode`]: a value cell that materializes on first use, is
//!   shared by every concurrent user, and is torn down after an idle grace
//!   period once nobody uses it.
//! - [`dependency_closure`]: the deduplicated transitive set of nodes
//!   reachable from a root set.
//! - [`BatchLoader`]: acquires a whole closure, waits for it with progress
//!   reporting, and releases it again.
//!
//! ```rust,no_run
//! use keel_resource::{Built, ResourceNode};
//!
//! # async fn demo() {
//! let texture = ResourceNode::sync_builder(|_| Ok(Built::new("brick.png")))
//!     .name("texture")
//!     .timeout(0)
//!     .build();
//! let material = ResourceNode::sync_builder(|deps| {
//!     Ok(Built::new(format!("material({:?})", deps.get::<&str>("texture"))))
//! })
//! .depends_on("texture", &texture)
//! .build();
//!
//! material.acquire();
//! let value = material.value().await;
//! material.release();
//! # }
//! ```

pub mod closure;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod guard;
pub mod loader;
pub mod node;

pub use closure::dependency_closure;
pub use config::{IdleTimeout, NodeConfig};
pub use error::{BoxError, Error, Result};
pub use events::{EventBus, NodeEvent};
pub use factory::{AnyValue, Built, Factory, Resolved, Teardown};
pub use guard::Lease;
pub use loader::BatchLoader;
pub use node::{AsNode, Node, NodeBuilder, NodeStats, Pending, ResourceNode};
