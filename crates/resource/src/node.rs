//! Reference-counted, lazily materialized resource nodes.
//!
//! A [`ResourceNode`] builds its value the first time somebody
//! [`acquire`](ResourceNode::acquire)s it, shares that value with every
//! concurrent user, and tears it down once the last user
//! [`release`](ResourceNode::release)s it and the node's [`IdleTimeout`]
//! has elapsed.
//!
//! Every materialization and teardown of a node runs as a spawned task
//! chained behind the previous one, so transitions never overlap and run in
//! the order of the `0 -> 1` / `1 -> 0` use-count transitions that caused
//! them. `acquire` and `release` never block and must be called from within
//! a Tokio runtime.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{IdleTimeout, NodeConfig};
use crate::error::{BoxError, Error};
use crate::events::{EventBus, NodeEvent};
use crate::factory::{AnyValue, Built, Factory, Resolved, Teardown};
use crate::guard::Lease;

/// Shared future of a node's current value. Never fails; `None` is the
/// absent value.
pub type Pending<T> = Shared<BoxFuture<'static, Option<Arc<T>>>>;

type TeardownHook<T> = Box<dyn Fn(Arc<T>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Node (type-erased view)
// ---------------------------------------------------------------------------

/// Type-erased view of a node, used for dependency edges and graph traversal.
///
/// Identity is the address of the `Arc` allocation: two handles denote the
/// same node exactly when they point to the same allocation.
pub trait Node: Send + Sync + 'static {
    /// Label used in logs and events.
    fn name(&self) -> &str;

    /// Declare one more interested user.
    fn acquire(&self);

    /// Declare that one user is no longer interested.
    fn release(&self);

    /// Current value future, type-erased.
    fn settled(&self) -> BoxFuture<'static, Option<AnyValue>>;

    /// Directly declared dependencies (not the closure).
    fn dependencies(&self) -> &[Arc<dyn Node>];

    /// Number of interested users.
    fn use_count(&self) -> usize;
}

/// Anything that can be turned into a dependency edge.
pub trait AsNode {
    /// Type-erased handle to the same node.
    fn as_node(&self) -> Arc<dyn Node>;
}

impl AsNode for Arc<dyn Node> {
    fn as_node(&self) -> Arc<dyn Node> {
        Arc::clone(self)
    }
}

impl<N: AsNode + ?Sized> AsNode for &N {
    fn as_node(&self) -> Arc<dyn Node> {
        (**self).as_node()
    }
}

// ---------------------------------------------------------------------------
// NodeStats
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of a node's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Current number of interested users.
    pub use_count: usize,
    /// Completed factory calls that returned `Ok`.
    pub materializations: u64,
    /// Factory calls that returned an error.
    pub failures: u64,
    /// Completed teardowns.
    pub teardowns: u64,
    /// An idle timer is armed.
    pub teardown_pending: bool,
    /// The node holds (or is building) a value that has not been queued for
    /// teardown.
    pub live: bool,
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct IdleTimer {
    generation: u64,
    cancel: CancellationToken,
}

struct State<T> {
    use_count: usize,
    pending: Pending<T>,
    teardown: Option<Teardown>,
    idle_timer: Option<IdleTimer>,
    timer_generation: u64,
    live: bool,
    materializations: u64,
    failures: u64,
    teardowns: u64,
}

struct NodeInner<T> {
    name: String,
    timeout: IdleTimeout,
    factory: Box<dyn Factory<T>>,
    dependencies: Vec<Arc<dyn Node>>,
    dependency_names: Vec<Option<String>>,
    on_teardown: Option<TeardownHook<T>>,
    events: Option<Arc<EventBus>>,
    this: Weak<NodeInner<T>>,
    state: Mutex<State<T>>,
}

fn settled_none<T: Send + Sync + 'static>() -> Pending<T> {
    futures::future::ready(None).boxed().shared()
}

/// Run one transition on the runtime and expose its outcome as a shared
/// future. A panicking transition resolves to the absent value.
fn spawn_transition<T, F>(node: &str, operation: &'static str, transition: F) -> Pending<T>
where
    T: Send + Sync + 'static,
    F: Future<Output = Option<Arc<T>>> + Send + 'static,
{
    let handle = tokio::spawn(transition);
    let node = node.to_owned();
    async move {
        match handle.await {
            Ok(value) => value,
            Err(cause) => {
                let err = Error::TaskPanicked { node, operation };
                tracing::error!(error = %err, %cause, "node transition aborted");
                None
            }
        }
    }
    .boxed()
    .shared()
}

impl<T: Send + Sync + 'static> NodeInner<T> {
    fn emit(&self, event: NodeEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn pending(&self) -> Pending<T> {
        self.state.lock().pending.clone()
    }

    fn add_user(&self) {
        let mut state = self.state.lock();
        state.use_count += 1;
        if state.use_count > 1 {
            return;
        }

        if let Some(timer) = state.idle_timer.take() {
            timer.cancel.cancel();
            drop(state);
            tracing::debug!(node = %self.name, "idle teardown cancelled, reusing value");
            self.emit(NodeEvent::TeardownCancelled {
                node: self.name.clone(),
            });
            return;
        }

        if state.live {
            tracing::trace!(node = %self.name, "reusing retained value");
            return;
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        state.live = true;
        let previous = state.pending.clone();
        state.pending = spawn_transition(&self.name, "materialize", async move {
            // Wait for an in-flight teardown before building again.
            let _ = previous.await;
            this.materialize().await
        });
    }

    fn remove_user(&self) {
        let mut state = self.state.lock();
        if state.use_count == 0 {
            tracing::trace!(node = %self.name, "release on unused node ignored");
            return;
        }
        state.use_count -= 1;
        if state.use_count > 0 {
            return;
        }

        match self.timeout {
            IdleTimeout::Immediate => self.schedule_teardown(&mut state),
            IdleTimeout::After(after) => {
                let Some(this) = self.this.upgrade() else {
                    return;
                };
                state.timer_generation += 1;
                let generation = state.timer_generation;
                let cancel = CancellationToken::new();
                state.idle_timer = Some(IdleTimer {
                    generation,
                    cancel: cancel.clone(),
                });
                drop(state);

                tokio::spawn(async move {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(after) => this.expire(generation),
                    }
                });
                tracing::debug!(node = %self.name, ?after, "idle teardown scheduled");
                self.emit(NodeEvent::TeardownScheduled {
                    node: self.name.clone(),
                    after,
                });
            }
            IdleTimeout::Never => {
                tracing::trace!(node = %self.name, "node idle, value retained");
            }
        }
    }

    /// Idle timer callback. Ignored unless `generation` is still the armed
    /// timer; a timer that lost the race against `acquire` is a no-op.
    fn expire(&self, generation: u64) {
        let mut state = self.state.lock();
        if state
            .idle_timer
            .as_ref()
            .is_none_or(|timer| timer.generation != generation)
        {
            return;
        }
        state.idle_timer = None;
        tracing::debug!(node = %self.name, "idle timeout elapsed");
        self.schedule_teardown(&mut state);
    }

    fn schedule_teardown(&self, state: &mut State<T>) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        state.live = false;
        let previous = state.pending.clone();
        state.pending = spawn_transition(&self.name, "teardown", async move {
            // Wait for the materialization this teardown undoes.
            let value = previous.await;
            this.teardown(value).await
        });
    }

    async fn materialize(self: Arc<Self>) -> Option<Arc<T>> {
        tracing::debug!(
            node = %self.name,
            dependencies = self.dependencies.len(),
            "materializing"
        );

        for dependency in &self.dependencies {
            dependency.acquire();
        }
        let values =
            futures::future::join_all(self.dependencies.iter().map(|dep| dep.settled())).await;
        let resolved = Resolved::new(&self.dependency_names, values);

        match self.factory.build(resolved).await {
            Ok(Built { value, teardown }) => {
                let has_value = value.is_some();
                {
                    let mut state = self.state.lock();
                    state.teardown = teardown;
                    state.materializations += 1;
                }
                tracing::debug!(node = %self.name, has_value, "materialized");
                self.emit(NodeEvent::Materialized {
                    node: self.name.clone(),
                    has_value,
                });
                value.map(Arc::new)
            }
            Err(source) => {
                let err = Error::materialize(&self.name, source);
                {
                    let mut state = self.state.lock();
                    state.teardown = None;
                    state.failures += 1;
                }
                tracing::warn!(node = %self.name, error = %err, "factory failed, value is absent");
                self.emit(NodeEvent::MaterializeFailed {
                    node: self.name.clone(),
                    error: err.to_string(),
                });
                None
            }
        }
    }

    async fn teardown(self: Arc<Self>, value: Option<Arc<T>>) -> Option<Arc<T>> {
        tracing::debug!(node = %self.name, "tearing down");

        for dependency in &self.dependencies {
            dependency.release();
        }

        let action = self.state.lock().teardown.take();
        if let Some(action) = action
            && let Err(source) = action.run().await
        {
            self.teardown_failed(source);
        }

        if let (Some(hook), Some(value)) = (&self.on_teardown, value)
            && let Err(source) = hook(value).await
        {
            self.teardown_failed(source);
        }

        self.state.lock().teardowns += 1;
        tracing::debug!(node = %self.name, "torn down");
        self.emit(NodeEvent::TornDown {
            node: self.name.clone(),
        });
        None
    }

    fn teardown_failed(&self, source: BoxError) {
        let err = Error::teardown(&self.name, source);
        tracing::warn!(node = %self.name, error = %err, "teardown failed, continuing");
        self.emit(NodeEvent::TeardownFailed {
            node: self.name.clone(),
            error: err.to_string(),
        });
    }
}

impl<T: Send + Sync + 'static> Node for NodeInner<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) {
        self.add_user();
    }

    fn release(&self) {
        self.remove_user();
    }

    fn settled(&self) -> BoxFuture<'static, Option<AnyValue>> {
        self.pending()
            .map(|value| value.map(|value| value as AnyValue))
            .boxed()
    }

    fn dependencies(&self) -> &[Arc<dyn Node>] {
        &self.dependencies
    }

    fn use_count(&self) -> usize {
        self.state.lock().use_count
    }
}

// ---------------------------------------------------------------------------
// ResourceNode
// ---------------------------------------------------------------------------

/// Handle to a lazily materialized, reference-counted value.
///
/// Cloning the handle does not create a new node; every clone drives the
/// same use count and shares the same value.
pub struct ResourceNode<T> {
    inner: Arc<NodeInner<T>>,
}

impl<T> Clone for ResourceNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> ResourceNode<T> {
    /// Start building a node around an async factory closure.
    pub fn builder<F, Fut>(factory: F) -> NodeBuilder<T>
    where
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Built<T>, BoxError>> + Send + 'static,
    {
        NodeBuilder::new(Box::new(factory))
    }

    /// Start building a node around a synchronous factory closure.
    pub fn sync_builder<F>(factory: F) -> NodeBuilder<T>
    where
        F: Fn(Resolved) -> Result<Built<T>, BoxError> + Send + Sync + 'static,
    {
        Self::builder(move |deps| futures::future::ready(factory(deps)))
    }

    /// Start building a node around any [`Factory`] implementation.
    pub fn with_factory(factory: impl Factory<T>) -> NodeBuilder<T> {
        NodeBuilder::new(Box::new(factory))
    }

    /// Declare one more interested user.
    ///
    /// On the `0 -> 1` transition this cancels a pending idle teardown (the
    /// current value is reused), or queues a materialization that acquires
    /// every dependency, waits for their values and calls the factory.
    pub fn acquire(&self) {
        self.inner.add_user();
    }

    /// Declare that one user is no longer interested.
    ///
    /// On the `1 -> 0` transition teardown is queued, armed on a timer, or
    /// skipped, depending on the node's [`IdleTimeout`]. Releasing an unused
    /// node does nothing.
    pub fn release(&self) {
        self.inner.remove_user();
    }

    /// Future of the current value. Resolves to `None` before the first
    /// acquire, after teardown, and when the factory failed or produced
    /// nothing.
    pub fn value(&self) -> Pending<T> {
        self.inner.pending()
    }

    /// Acquire the node and wait for its value; released when the lease drops.
    pub async fn lease(&self) -> Lease<T> {
        let mut lease = Lease::new(self.clone());
        let value = self.value().await;
        lease.set_value(value);
        lease
    }

    /// Directly declared dependencies.
    pub fn dependencies(&self) -> &[Arc<dyn Node>] {
        &self.inner.dependencies
    }

    /// Label used in logs and events.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The node's idle teardown policy.
    pub fn timeout(&self) -> IdleTimeout {
        self.inner.timeout
    }

    /// Number of interested users.
    pub fn use_count(&self) -> usize {
        self.inner.state.lock().use_count
    }

    /// Snapshot of the node's counters.
    pub fn stats(&self) -> NodeStats {
        let state = self.inner.state.lock();
        NodeStats {
            use_count: state.use_count,
            materializations: state.materializations,
            failures: state.failures,
            teardowns: state.teardowns,
            teardown_pending: state.idle_timer.is_some(),
            live: state.live,
        }
    }

    /// Whether both handles denote the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl ResourceNode<()> {
    /// A node that only groups its dependencies and produces no value.
    pub fn group() -> NodeBuilder<()> {
        Self::sync_builder(|_| Ok(Built::empty()))
    }
}

impl<T: Send + Sync + 'static> AsNode for ResourceNode<T> {
    fn as_node(&self) -> Arc<dyn Node> {
        self.inner.clone()
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for ResourceNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceNode")
            .field("name", &self.inner.name)
            .field("timeout", &self.inner.timeout)
            .field("dependencies", &self.inner.dependencies.len())
            .field("stats", &self.stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeBuilder
// ---------------------------------------------------------------------------

/// Builder for [`ResourceNode`]. Dependencies are fixed once built.
pub struct NodeBuilder<T> {
    factory: Box<dyn Factory<T>>,
    config: NodeConfig,
    dependencies: Vec<Arc<dyn Node>>,
    dependency_names: Vec<Option<String>>,
    on_teardown: Option<TeardownHook<T>>,
    events: Option<Arc<EventBus>>,
}

impl<T: Send + Sync + 'static> NodeBuilder<T> {
    fn new(factory: Box<dyn Factory<T>>) -> Self {
        Self {
            factory,
            config: NodeConfig::default(),
            dependencies: Vec::new(),
            dependency_names: Vec::new(),
            on_teardown: None,
            events: None,
        }
    }

    /// Apply a whole [`NodeConfig`].
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Label used in logs and events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Idle teardown policy; signed milliseconds are accepted.
    pub fn timeout(mut self, timeout: impl Into<IdleTimeout>) -> Self {
        self.config.timeout = timeout.into();
        self
    }

    /// Add a dependency looked up by name in [`Resolved::get`].
    pub fn depends_on(mut self, name: impl Into<String>, dependency: &impl AsNode) -> Self {
        self.dependencies.push(dependency.as_node());
        self.dependency_names.push(Some(name.into()));
        self
    }

    /// Add a positional dependency looked up in [`Resolved::at`].
    pub fn depends(mut self, dependency: &impl AsNode) -> Self {
        self.dependencies.push(dependency.as_node());
        self.dependency_names.push(None);
        self
    }

    /// Hook run after the value's own teardown action, only for present
    /// values.
    pub fn on_teardown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_teardown = Some(Box::new(move |value| hook(value).boxed()));
        self
    }

    /// Publish lifecycle events on `events`.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Create the node. Nothing is materialized until the first acquire.
    pub fn build(self) -> ResourceNode<T> {
        let name = self.config.name.unwrap_or_else(|| {
            format!("node-{}", NEXT_NODE.fetch_add(1, Ordering::Relaxed))
        });
        let inner = Arc::new_cyclic(|this| NodeInner {
            name,
            timeout: self.config.timeout,
            factory: self.factory,
            dependencies: self.dependencies,
            dependency_names: self.dependency_names,
            on_teardown: self.on_teardown,
            events: self.events,
            this: this.clone(),
            state: Mutex::new(State {
                use_count: 0,
                pending: settled_none(),
                teardown: None,
                idle_timer: None,
                timer_generation: 0,
                live: false,
                materializations: 0,
                failures: 0,
                teardowns: 0,
            }),
        });
        ResourceNode { inner }
    }
}
