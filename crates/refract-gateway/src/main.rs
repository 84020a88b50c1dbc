//! Refract gateway — entry point.
//!
//! Loads settings, wires the default component graph, and serves.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REFRACT_CONFIG` | *(none)* | Path to a settings file (TOML/YAML/JSON/INI/RON/JSON5). |
//! | `REFRACT_*` | — | Per-field overrides, `__` as the nesting separator (e.g. `REFRACT_SERVER__PORT=9000`). |
//! | `REFRACT_S3_BUCKET` | *(none)* | With the `s3` feature: bind an S3 bucket as the object-store origin. |
//! | `REFRACT_S3_REGION` | `us-east-1` | Region for the S3 binding. |
//! | `REFRACT_S3_ENDPOINT` | *(none)* | Custom S3 endpoint (MinIO / LocalStack). |
//! | `RUST_LOG` | `refract_gateway=info` | Tracing filter. |
//!
//! Secrets referenced by auth descriptors (`token_env`, `access_key_env`,
//! ...) are read from the environment at request time, never at startup.

use refract_gateway::server::GatewayServer;
use refract_kernel::config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("refract_gateway=info".parse().expect("static directive")),
        )
        .init();

    let settings = match std::env::var("REFRACT_CONFIG") {
        Ok(path) => config::load_settings(&path),
        Err(_) => config::settings_from_env(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("refract: configuration rejected: {err}");
            std::process::exit(1);
        }
    };

    info!(
        port = settings.server.port,
        environment = settings.server.environment.as_str(),
        legacy_compat = settings.features.legacy_compat,
        transform_endpoint = settings.transform.endpoint.as_str(),
        "configuration loaded"
    );

    #[allow(unused_mut)]
    let mut server = GatewayServer::new(settings);

    #[cfg(feature = "s3")]
    if let Ok(bucket) = std::env::var("REFRACT_S3_BUCKET") {
        let region =
            std::env::var("REFRACT_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let mut s3 = refract_storage::S3Config::new(region, bucket);
        if let Ok(endpoint) = std::env::var("REFRACT_S3_ENDPOINT") {
            s3 = s3.with_endpoint(endpoint);
        }
        let store = refract_storage::S3ObjectStore::new(s3).await;
        server = server.with_object_store(std::sync::Arc::new(store));
        info!("s3 object store bound");
    }

    if let Err(err) = server.start().await {
        eprintln!("refract: gateway error: {err}");
        std::process::exit(1);
    }
}
