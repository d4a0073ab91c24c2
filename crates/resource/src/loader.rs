//! Batch loading of a resource graph with progress reporting.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::closure::dependency_closure;
use crate::node::{AsNode, Node};

/// Loads and unloads the dependency closure of a set of root nodes.
///
/// The closure is computed once, when the loader is created; later graph
/// changes are not tracked.
pub struct BatchLoader {
    nodes: Vec<Arc<dyn Node>>,
}

impl BatchLoader {
    /// Compute and freeze the dependency closure of `roots`.
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsNode,
    {
        let nodes = dependency_closure(roots);
        tracing::debug!(nodes = nodes.len(), "batch loader created");
        Self { nodes }
    }

    /// The frozen closure, in discovery order.
    #[must_use]
    pub fn dependencies(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// Number of nodes in the closure.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the closure is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Acquire every node of the closure, then wait for all of them to settle.
    ///
    /// The nodes are acquired synchronously, before this returns.
    /// `on_progress(current, total)` is called once per settled node with
    /// `current` counting from 1 up to `total`. A node that settles to an
    /// absent value still counts: progress tracks completion, not success.
    pub fn load<F>(&self, mut on_progress: F) -> impl Future<Output = ()> + Send + use<F>
    where
        F: FnMut(usize, usize) + Send,
    {
        for node in &self.nodes {
            node.acquire();
        }

        let total = self.nodes.len();
        let mut settling: FuturesUnordered<_> =
            self.nodes.iter().map(|node| node.settled()).collect();

        async move {
            let mut current = 0;
            while settling.next().await.is_some() {
                current += 1;
                tracing::trace!(current, total, "node settled");
                on_progress(current, total);
            }
            tracing::debug!(total, "batch loaded");
        }
    }

    /// Release every node of the closure. Does not wait for teardown.
    pub fn unload(&self) {
        for node in &self.nodes {
            node.release();
        }
        tracing::debug!(total = self.nodes.len(), "batch unloaded");
    }
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field(
                "nodes",
                &self.nodes.iter().map(|node| node.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
