//! Dependency closure discovery over resource nodes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::node::{AsNode, Node};

/// Address of the node allocation, used as its identity.
fn identity(node: &Arc<dyn Node>) -> *const () {
    Arc::as_ptr(node).cast::<()>()
}

/// All nodes reachable from `roots` through dependency edges, roots included.
///
/// Each node appears exactly once, in depth-first discovery order. Nodes
/// already visited are never expanded again, so diamonds are shared and
/// cycles terminate.
pub fn dependency_closure<I>(roots: I) -> Vec<Arc<dyn Node>>
where
    I: IntoIterator,
    I::Item: AsNode,
{
    let mut visited = HashSet::new();
    let mut closure = Vec::new();
    let roots: Vec<Arc<dyn Node>> = roots.into_iter().map(|root| root.as_node()).collect();
    collect(&roots, &mut visited, &mut closure);
    closure
}

fn collect(
    nodes: &[Arc<dyn Node>],
    visited: &mut HashSet<*const ()>,
    closure: &mut Vec<Arc<dyn Node>>,
) {
    for node in nodes {
        if visited.insert(identity(node)) {
            closure.push(Arc::clone(node));
            collect(node.dependencies(), visited, closure);
        }
    }
}
