//! RAII lease over a resource node

use std::sync::Arc;

use crate::node::ResourceNode;

/// RAII guard holding one use of a [`ResourceNode`].
///
/// Created by [`ResourceNode::lease`]. When the lease is dropped the node is
/// released, which may schedule its teardown. Use
/// [`into_value`](Self::into_value) to keep the value while still giving the
/// use back.
pub struct Lease<T: Send + Sync + 'static> {
    node: ResourceNode<T>,
    value: Option<Arc<T>>,
}

impl<T: Send + Sync + 'static> Lease<T> {
    pub(crate) fn new(node: ResourceNode<T>) -> Self {
        node.acquire();
        Self { node, value: None }
    }

    pub(crate) fn set_value(&mut self, value: Option<Arc<T>>) {
        self.value = value;
    }

    /// The leased value, `None` when the node produced nothing.
    #[must_use]
    pub fn value(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    /// The node this lease holds.
    #[must_use]
    pub fn node(&self) -> &ResourceNode<T> {
        &self.node
    }

    /// Release the node and keep the value.
    ///
    /// The returned `Arc` outlives the lease, but the node may tear the
    /// underlying resource down once its idle timeout elapses.
    #[must_use]
    pub fn into_value(mut self) -> Option<Arc<T>> {
        self.value.take()
    }
}

impl<T: Send + Sync + 'static> std::ops::Deref for Lease<T> {
    type Target = Option<Arc<T>>;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Send + Sync + 'static> Drop for Lease<T> {
    fn drop(&mut self) {
        self.node.release();
    }
}

impl<T: Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("node", &self.node.name())
            .field("value", &self.value)
            .finish()
    }
}
