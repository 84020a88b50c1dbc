//! Per-request context: identity, breadcrumbs, background work.
//!
//! [`RequestContext`] is created when a request enters the gateway and
//! consumed when the response is emitted. It replaces any notion of an
//! ambient "current request": every stage that needs the request id, the
//! debug flag, or the breadcrumb trail receives the context explicitly.
//!
//! Breadcrumbs are the request-scoped trace: cheap structured entries that
//! surface through debug headers and trace-level logs. Operational logging
//! stays on `tracing`.

use crate::client::ClientCapabilities;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

/// Upper bound on how long a fire-and-forget background task may run.
const BACKGROUND_DEADLINE: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Breadcrumb
// ─────────────────────────────────────────────────────────────────────────────

/// One time-stamped entry in the request trace.
#[derive(Debug, Clone, Serialize)]
pub struct Breadcrumb {
    /// Milliseconds since the request started.
    pub at_ms: u64,
    /// Coarse stage label (`params`, `storage`, `cache`, ...).
    pub category: &'static str,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestContext
// ─────────────────────────────────────────────────────────────────────────────

/// Request-scoped bag threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    id: String,
    started: Instant,
    debug: bool,
    breadcrumbs: Mutex<Vec<Breadcrumb>>,
    /// Detector output, memoized so detection runs at most once per request.
    client: Mutex<Option<ClientCapabilities>>,
}

impl RequestContext {
    /// Create a fresh context with a random request id.
    pub fn new(debug: bool) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4().to_string(),
                started: Instant::now(),
                debug,
                breadcrumbs: Mutex::new(Vec::new()),
                client: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn debug(&self) -> bool {
        self.inner.debug
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.inner.started.elapsed().as_millis() as u64
    }

    /// Append a breadcrumb to the request trace.
    pub fn breadcrumb(&self, category: &'static str, message: impl Into<String>) {
        self.inner.breadcrumbs.lock().push(Breadcrumb {
            at_ms: self.elapsed_ms(),
            category,
            message: message.into(),
        });
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.inner.breadcrumbs.lock().clone()
    }

    pub fn breadcrumb_count(&self) -> usize {
        self.inner.breadcrumbs.lock().len()
    }

    /// Memoized client capability record. The closure runs only on the first
    /// call for this request.
    pub fn client_capabilities<F>(&self, detect: F) -> ClientCapabilities
    where
        F: FnOnce() -> ClientCapabilities,
    {
        let mut slot = self.inner.client.lock();
        slot.get_or_insert_with(detect).clone()
    }

    /// Spawn fire-and-forget background work (cache writes).
    ///
    /// The task is detached immediately: it never blocks the response. A
    /// bounded deadline stops runaway work, and failures are logged with the
    /// request id rather than surfaced.
    pub fn spawn_background<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let request_id = self.inner.id.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(BACKGROUND_DEADLINE, work).await.is_err() {
                warn!(
                    request_id = %request_id,
                    task = label,
                    deadline_s = BACKGROUND_DEADLINE.as_secs(),
                    "background task exceeded deadline"
                );
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
