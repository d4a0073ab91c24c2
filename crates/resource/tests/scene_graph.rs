//! End-to-end scenarios over a small scene graph: images, textures,
//! materials, models and a grouping node.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keel_resource::{BatchLoader, Built, ResourceNode};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct Named {
    name: String,
}

impl Named {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Material {
    name: String,
    texture: Option<Arc<Named>>,
}

fn named_node(name: &'static str, timeout: i64) -> ResourceNode<Named> {
    ResourceNode::sync_builder(move |_| Ok(Built::new(Named::new(name))))
        .name(name)
        .timeout(timeout)
        .build()
}

fn material_node(
    name: &'static str,
    texture: &ResourceNode<Named>,
    timeout: i64,
) -> ResourceNode<Material> {
    ResourceNode::sync_builder(move |deps| {
        Ok(Built::new(Material {
            name: name.to_string(),
            texture: deps.get::<Named>("texture"),
        }))
    })
    .name(name)
    .timeout(timeout)
    .depends_on("texture", texture)
    .build()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn material_resolves_texture_and_releases_it() {
    let texture = named_node("tex", 0);
    let material = material_node("mat", &texture, 0);

    material.acquire();
    let value = material.value().await.expect("material should materialize");
    assert_eq!(
        *value,
        Material {
            name: "mat".to_string(),
            texture: Some(Arc::new(Named::new("tex"))),
        }
    );
    assert_eq!(texture.use_count(), 1);

    material.release();
    assert!(material.value().await.is_none());
    assert_eq!(texture.use_count(), 0);
    assert!(texture.value().await.is_none());
}

#[tokio::test]
async fn absent_dependency_is_passed_as_empty_slot() {
    let texture: ResourceNode<Named> = ResourceNode::sync_builder(|_| Ok(Built::empty()))
        .name("missing-texture")
        .timeout(0)
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let material = ResourceNode::sync_builder(move |deps| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert_eq!(deps.len(), 1);
        assert!(deps.is_absent(0));
        Ok(Built::new(Material {
            name: "fallback".to_string(),
            texture: deps.get::<Named>("texture"),
        }))
    })
    .timeout(0)
    .depends_on("texture", &texture)
    .build();

    material.acquire();
    let value = material.value().await.expect("factory still runs");
    assert_eq!(value.texture, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn positional_dependencies_resolve_in_order() {
    let albedo = named_node("albedo", 0);
    let normal = named_node("normal", 0);
    let pair = ResourceNode::sync_builder(|deps| {
        let first = deps.at::<Named>(0).map(|n| n.name.clone());
        let second = deps.at::<Named>(1).map(|n| n.name.clone());
        Ok(Built::new((first, second)))
    })
    .timeout(0)
    .depends(&albedo)
    .depends(&normal)
    .build();

    let lease = pair.lease().await;
    assert_eq!(
        lease.value().map(|v| (**v).clone()),
        Some((Some("albedo".to_string()), Some("normal".to_string())))
    );
}

#[tokio::test]
async fn shared_dependency_is_built_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let texture = ResourceNode::builder(move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Built::new(Named::new("shared")))
        }
    })
    .timeout(0)
    .build();

    let left = material_node("left", &texture, 0);
    let right = material_node("right", &texture, 0);

    left.acquire();
    right.acquire();
    let l = left.value().await.unwrap();
    let r = right.value().await.unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(
        l.texture.as_ref().unwrap(),
        r.texture.as_ref().unwrap()
    ));
    assert_eq!(texture.use_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn loader_reports_progress_for_whole_scene() {
    let image = ResourceNode::sync_builder(|_| Ok(Built::new(Named::new("myImage"))))
        .name("image")
        .build();
    let texture = ResourceNode::builder(|_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Built::new(Named::new("myTexture")))
    })
    .name("texture")
    .depends_on("image", &image)
    .build();
    let mat1 = material_node("myMat1", &texture, 5000);
    let mat2 = material_node("myMat2", &texture, 5000);
    let model = ResourceNode::builder(|_| async {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        Ok(Built::new(Named::new("myModel")))
    })
    .name("model")
    .depends_on("material", &mat1)
    .build();
    let group = ResourceNode::group()
        .name("group")
        .depends_on("model", &model)
        .depends_on("mat1", &mat1)
        .depends_on("mat2", &mat2)
        .build();

    let loader = BatchLoader::new([&group]);
    let names: Vec<_> = loader.dependencies().iter().map(|n| n.name()).collect();
    assert_eq!(
        names,
        vec!["group", "model", "myMat1", "texture", "image", "myMat2"]
    );

    let mut progress = Vec::new();
    loader.load(|current, total| progress.push((current, total))).await;
    assert_eq!(progress.len(), 6);
    assert!(progress.iter().enumerate().all(|(i, p)| *p == (i + 1, 6)));

    let model_value = model.value().await.unwrap();
    assert_eq!(model_value.name, "myModel");

    loader.unload();
    // Default grace period keeps everything alive for a while.
    assert!(mat1.stats().teardown_pending || mat1.use_count() > 0);
    tokio::time::sleep(Duration::from_secs(30)).await;
    for node in loader.dependencies() {
        assert_eq!(node.use_count(), 0, "{} still in use", node.name());
    }
    assert!(image.value().await.is_none());
}
