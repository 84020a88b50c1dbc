//! Refract testing utilities.
//!
//! Builders for exercising the full request pipeline against in-memory
//! collaborators: a seeded object store, the in-memory transform cache, and
//! a scripted transform backend that records its calls.

pub mod backend;

pub use backend::ScriptedTransformBackend;

use axum::Router;
use bytes::Bytes;
use refract_gateway::server::GatewayServer;
use refract_kernel::config::Settings;
use refract_kernel::storage::OriginKind;
use refract_storage::{MemoryObjectStore, MemoryTransformCache};
use std::sync::Arc;

/// Everything a pipeline test needs to observe.
pub struct TestHarness {
    pub app: Router,
    pub store: Arc<MemoryObjectStore>,
    pub kv: Arc<MemoryTransformCache>,
    pub backend: Arc<ScriptedTransformBackend>,
}

/// Settings wired for a hermetic pipeline: object store only, production
/// environment (so the cache is live), detector on.
pub fn hermetic_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.environment = "production".to_string();
    settings.transform.endpoint = "http://transform.invalid".to_string();
    settings.storage.default.priority = vec![OriginKind::ObjectStore];
    settings.storage.default.object_store = Some(Default::default());
    settings
}

/// Build the axum app against in-memory collaborators and seed one image.
pub fn harness(settings: Settings, backend: ScriptedTransformBackend) -> TestHarness {
    let store = Arc::new(MemoryObjectStore::new());
    store.put("img.jpg", Bytes::from_static(b"source-jpeg-bytes"), "image/jpeg");

    let kv = Arc::new(MemoryTransformCache::new());
    let backend = Arc::new(backend);

    let app = GatewayServer::new(settings)
        .with_object_store(Arc::clone(&store) as _)
        .with_transform_cache(Arc::clone(&kv) as _)
        .with_backend(Arc::clone(&backend) as _)
        .build_app()
        .expect("test settings build a router");

    TestHarness {
        app,
        store,
        kv,
        backend,
    }
}
