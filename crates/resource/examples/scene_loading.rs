// Scene loading example: a small asset graph loaded as one batch.
//
// Images feed a texture, the texture feeds two materials, one material feeds
// a model, and a group node ties everything together. The loader acquires
// the whole closure, reports progress while values settle, and releases it
// again. Run with `RUST_LOG=keel_resource=debug` to watch the transitions.

use std::sync::Arc;
use std::time::Duration;

use keel_resource::{BatchLoader, Built, EventBus, ResourceNode};
use tracing_subscriber::EnvFilter;

// -- Assets -----------------------------------------------------------------

#[derive(Debug)]
struct Image {
    path: &'static str,
}

#[derive(Debug)]
struct Texture {
    image: Option<Arc<Image>>,
}

#[derive(Debug)]
struct Material {
    name: &'static str,
    texture: Option<Arc<Texture>>,
}

#[derive(Debug)]
struct Model {
    material: Option<Arc<Material>>,
}

fn material(
    name: &'static str,
    texture: &ResourceNode<Texture>,
    events: &Arc<EventBus>,
) -> ResourceNode<Material> {
    ResourceNode::sync_builder(move |deps| {
        Ok(Built::new(Material {
            name,
            texture: deps.get("texture"),
        }))
    })
    .name(name)
    .timeout(200)
    .depends_on("texture", texture)
    .events(Arc::clone(events))
    .build()
}

// -- Main -------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Scene Loading Example ===\n");

    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();

    // 1. Declare the graph. Nothing is built yet.
    let image = ResourceNode::sync_builder(|_| Ok(Built::new(Image { path: "brick.png" })))
        .name("image")
        .timeout(500)
        .events(Arc::clone(&events))
        .build();
    let texture = ResourceNode::builder(|deps| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let texture = Texture {
            image: deps.get("image"),
        };
        Ok(Built::new(texture).with_sync_teardown(|| {
            println!("  texture memory freed");
            Ok(())
        }))
    })
    .name("texture")
    .timeout(100)
    .depends_on("image", &image)
    .events(Arc::clone(&events))
    .build();
    let wall = material("wall", &texture, &events);
    let floor = material("floor", &texture, &events);
    let model = ResourceNode::builder(|deps| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Built::new(Model {
            material: deps.get("material"),
        }))
    })
    .name("model")
    .timeout(200)
    .depends_on("material", &wall)
    .events(Arc::clone(&events))
    .build();
    let scene = ResourceNode::group()
        .name("scene")
        .timeout(0)
        .depends_on("model", &model)
        .depends_on("wall", &wall)
        .depends_on("floor", &floor)
        .events(Arc::clone(&events))
        .build();

    // 2. Load the closure with progress reporting.
    let loader = BatchLoader::new([&scene]);
    println!("Loading {} nodes: {:?}", loader.len(), loader);
    loader
        .load(|current, total| println!("  progress {current}/{total}"))
        .await;

    // 3. Use the values.
    if let Some(model) = model.value().await {
        let material = model.material.as_ref();
        println!(
            "\nModel uses material {:?} with image {:?}",
            material.map(|m| m.name),
            material
                .and_then(|m| m.texture.as_ref())
                .and_then(|t| t.image.as_ref())
                .map(|i| i.path),
        );
    }
    println!("floor: {:?}", floor.stats());

    // 4. Unload and let the idle timers run out.
    loader.unload();
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("\nAfter unload, image value: {:?}", image.value().await);

    println!("\nLifecycle events:");
    while let Ok(event) = rx.try_recv() {
        println!("  {event:?}");
    }
}
