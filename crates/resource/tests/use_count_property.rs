//! Property tests for use counting and dependency closure discovery

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_resource::{AsNode, Built, Node, ResourceNode, dependency_closure};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime should build")
}

/// Reference model: releasing an unused node is a no-op.
fn model_count(ops: &[bool]) -> usize {
    ops.iter().fold(0usize, |count, &acquire| {
        if acquire {
            count + 1
        } else {
            count.saturating_sub(1)
        }
    })
}

/// Random DAG: node `i` may only depend on nodes with a larger index.
fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::sample::subsequence((i + 1..n).collect::<Vec<_>>(), 0..=n - i - 1))
            .collect::<Vec<_>>()
    })
}

fn reachable(edges: &[Vec<usize>], root: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        if seen.insert(i) {
            stack.extend(edges[i].iter().copied());
        }
    }
    seen
}

proptest! {
    /// The use count follows the saturating model, and the node holds a
    /// value exactly when it is in use.
    #[test]
    fn use_count_matches_model(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
        let rt = runtime();
        let (count, present, stats) = rt.block_on(async {
            let node = ResourceNode::sync_builder(|_| Ok(Built::new(())))
                .timeout(0)
                .build();
            for &acquire in &ops {
                if acquire {
                    node.acquire();
                } else {
                    node.release();
                }
            }
            let present = node.value().await.is_some();
            (node.use_count(), present, node.stats())
        });

        let expected = model_count(&ops);
        prop_assert_eq!(count, expected);
        prop_assert_eq!(present, expected > 0);
        prop_assert_eq!(
            stats.materializations - stats.teardowns,
            u64::from(expected > 0),
            "open materializations must match in-use state"
        );
    }

    /// The closure of a root is exactly the set of nodes reachable from it,
    /// each listed once, root first.
    #[test]
    fn closure_matches_reachability(edges in arb_dag()) {
        let mut nodes: Vec<Option<ResourceNode<()>>> = vec![None; edges.len()];
        for i in (0..edges.len()).rev() {
            let mut builder = ResourceNode::group().name(i.to_string());
            for &dep in &edges[i] {
                let dep = nodes[dep].as_ref().expect("dependencies are built first");
                builder = builder.depends(dep);
            }
            nodes[i] = Some(builder.build());
        }
        let root = nodes[0].as_ref().expect("root is built");

        let closure = dependency_closure([root]);
        let names: Vec<usize> = closure
            .iter()
            .map(|node| node.name().parse().expect("numeric name"))
            .collect();
        let unique: BTreeSet<usize> = names.iter().copied().collect();

        prop_assert_eq!(names.first().copied(), Some(0));
        prop_assert_eq!(unique.len(), names.len(), "closure lists a node twice");
        prop_assert_eq!(unique, reachable(&edges, 0));
    }

    /// Overlapping roots never duplicate a node in the closure.
    #[test]
    fn closure_deduplicates_roots(
        edges in arb_dag(),
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let mut nodes: Vec<Option<ResourceNode<()>>> = vec![None; edges.len()];
        for i in (0..edges.len()).rev() {
            let mut builder = ResourceNode::group();
            for &dep in &edges[i] {
                let dep = nodes[dep].as_ref().expect("dependencies are built first");
                builder = builder.depends(dep);
            }
            nodes[i] = Some(builder.build());
        }
        let roots: Vec<Arc<dyn Node>> = picks
            .iter()
            .map(|pick| {
                nodes[pick.index(nodes.len())]
                    .as_ref()
                    .expect("built")
                    .as_node()
            })
            .collect();

        let closure = dependency_closure(roots.clone());
        for root in &roots {
            let hits = closure
                .iter()
                .filter(|node| Arc::ptr_eq(node, root))
                .count();
            prop_assert_eq!(hits, 1);
        }
        let mut addresses: Vec<*const ()> = closure
            .iter()
            .map(|node| Arc::as_ptr(node).cast::<()>())
            .collect();
        let total = addresses.len();
        addresses.sort_unstable();
        addresses.dedup();
        prop_assert_eq!(addresses.len(), total);
    }
}
