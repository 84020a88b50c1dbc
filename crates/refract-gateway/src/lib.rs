//! Refract gateway — the edge HTTP service.
//!
//! Serves on-the-fly transformed images: per request it resolves transform
//! options from four URL syntaxes plus client signals
//! (`refract-params`), fetches source bytes across tiered origins
//! (`refract-storage`), delegates pixel work to the external transform
//! primitive, and manages cache placement, invalidation tags, and
//! conditional revalidation.
//!
//! # Example
//!
//! ```rust,no_run
//! use refract_gateway::server::GatewayServer;
//! use refract_kernel::config::Settings;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut settings = Settings::default();
//!     settings.server.port = 8080;
//!
//!     GatewayServer::new(settings)
//!         .start()
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod cache;
pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod state;
pub mod transform;

pub use cache::{CacheController, CacheStatus};
pub use detector::ClientDetector;
pub use error::{GatewayError, GatewayResult};
pub use orchestrator::{RenderedImage, TransformOrchestrator};
pub use server::{GatewayServer, ServerError};
pub use state::AppState;
pub use transform::HttpTransformBackend;
