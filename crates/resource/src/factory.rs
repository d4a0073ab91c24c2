//! Factory contract: how a node produces its value and its teardown action.
//!
//! A [`Factory`] receives the [`Resolved`] values of the node's declared
//! dependencies (absent slots included) and returns a [`Built`] value with an
//! optional [`Teardown`] action. Closures of the shape
//! `Fn(Resolved) -> impl Future<Output = Result<Built<T>, BoxError>>`
//! implement the trait directly.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::BoxError;

/// Type-erased resolved value, as seen across heterogeneous dependency edges.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Zero-argument action run once when the value it belongs to is torn down.
pub struct Teardown {
    action: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>,
}

impl Teardown {
    /// Asynchronous teardown action.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            action: Box::new(move || action().boxed()),
        }
    }

    /// Synchronous teardown action.
    pub fn sync<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self::new(move || futures::future::ready(action()))
    }

    pub(crate) fn run(self) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.action)()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Built
// ---------------------------------------------------------------------------

/// Result of a successful factory call.
///
/// `value` may legitimately be `None`: the factory ran and decided to
/// produce nothing.
#[derive(Debug)]
pub struct Built<T> {
    /// The constructed value, if any.
    pub value: Option<T>,
    /// Action to run when this value is torn down.
    pub teardown: Option<Teardown>,
}

impl<T> Built<T> {
    /// A value without a teardown action.
    pub fn new(value: T) -> Self {
        Self {
            value: Some(value),
            teardown: None,
        }
    }

    /// No value and no teardown action.
    pub fn empty() -> Self {
        Self {
            value: None,
            teardown: None,
        }
    }

    /// Attach an asynchronous teardown action.
    pub fn with_teardown<F, Fut>(mut self, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.teardown = Some(Teardown::new(action));
        self
    }

    /// Attach a synchronous teardown action.
    pub fn with_sync_teardown<F>(mut self, action: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.teardown = Some(Teardown::sync(action));
        self
    }
}

impl<T> From<Option<T>> for Built<T> {
    fn from(value: Option<T>) -> Self {
        Self {
            value,
            teardown: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Slot {
    name: Option<String>,
    value: Option<AnyValue>,
}

/// Settled values of a node's dependencies, in declaration order.
///
/// Every declared dependency has a slot, including those whose own factory
/// produced nothing; lookups return `None` for absent slots and for slots
/// holding a value of a different type.
#[derive(Clone, Default)]
pub struct Resolved {
    slots: Vec<Slot>,
}

impl Resolved {
    pub(crate) fn new(names: &[Option<String>], values: Vec<Option<AnyValue>>) -> Self {
        Self {
            slots: names
                .iter()
                .cloned()
                .zip(values)
                .map(|(name, value)| Slot { name, value })
                .collect(),
        }
    }

    /// Number of declared dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the node declared no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value of the dependency declared under `name`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.slots
            .iter()
            .find(|slot| slot.name.as_deref() == Some(name))
            .and_then(|slot| downcast(slot.value.as_ref()))
    }

    /// Value of the dependency at `index` (declaration order).
    #[must_use]
    pub fn at<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.slots
            .get(index)
            .and_then(|slot| downcast(slot.value.as_ref()))
    }

    /// Whether the slot at `index` settled to an absent value.
    ///
    /// Out-of-range indices count as absent.
    #[must_use]
    pub fn is_absent(&self, index: usize) -> bool {
        self.slots.get(index).is_none_or(|slot| slot.value.is_none())
    }

    /// Declared names, `None` for positional dependencies.
    pub fn names(&self) -> impl Iterator<Item = Option<&str>> {
        self.slots.iter().map(|slot| slot.name.as_deref())
    }
}

fn downcast<T: Any + Send + Sync>(value: Option<&AnyValue>) -> Option<Arc<T>> {
    value.cloned().and_then(|value| value.downcast::<T>().ok())
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.slots
                    .iter()
                    .map(|slot| (slot.name.as_deref(), slot.value.is_some())),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Produces a node's value from its resolved dependencies.
///
/// Factories are not assumed pure: they run once per materialization, which
/// may happen many times over the lifetime of a node.
pub trait Factory<T>: Send + Sync + 'static {
    /// Build the value.
    fn build(&self, dependencies: Resolved) -> BoxFuture<'static, Result<Built<T>, BoxError>>;
}

impl<T, F, Fut> Factory<T> for F
where
    F: Fn(Resolved) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Built<T>, BoxError>> + Send + 'static,
{
    fn build(&self, dependencies: Resolved) -> BoxFuture<'static, Result<Built<T>, BoxError>> {
        self(dependencies).boxed()
    }
}
