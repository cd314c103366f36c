//! Request scope — the value attached to each in-flight request.
//!
//! [`ScopeMiddleware`] inserts a fresh scope under the request handle before
//! routing. Services and later middleware only receive the handle and look the
//! scope up in the [`ScopeRegistry`]. A scope is immutable once shared;
//! [`RequestScope::with_value`] derives a new one that callers insert under the
//! same handle, replacing the old one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctxmap::{ContextRegistry, RequestHandle};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::middleware::{Middleware, MiddlewareResult};

/// Registry of live request scopes. An entry holding `None` marks a request
/// whose scope was explicitly detached.
pub type ScopeRegistry = ContextRegistry<RequestHandle, Option<Arc<RequestScope>>>;

/// Cancellation and metadata carrier for one request.
#[derive(Debug, Clone)]
pub struct RequestScope {
    handle: RequestHandle,
    method: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    values: Map<String, Value>,
}

/// Serializable view of a scope, returned by `scope/get`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSnapshot {
    pub handle: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub cancelled: bool,
    pub values: Map<String, Value>,
}

impl RequestScope {
    pub fn new(handle: RequestHandle, method: impl Into<String>) -> Self {
        Self {
            handle,
            method: method.into(),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            values: Map::new(),
        }
    }

    /// Derive a scope carrying one more value. Shares the cancellation token.
    pub fn with_value(&self, key: impl Into<String>, value: Value) -> Self {
        let mut derived = self.clone();
        derived.values.insert(key.into(), value);
        derived
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Signal cancellation to everything working on this request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token for work done on behalf of this request. Outlives replacement
    /// of the scope in the registry.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            handle: self.handle.to_string(),
            method: self.method.clone(),
            started_at: self.started_at,
            cancelled: self.is_cancelled(),
            values: self.values.clone(),
        }
    }
}

/// Attaches a fresh [`RequestScope`] to every request. Runs first.
pub struct ScopeMiddleware {
    registry: Arc<ScopeRegistry>,
}

impl ScopeMiddleware {
    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for ScopeMiddleware {
    async fn before(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> MiddlewareResult {
        let scope = RequestScope::new(*handle, method);
        self.registry.insert(*handle, Some(Arc::new(scope)));
        debug!("Scope attached: {handle} ({method})");
        MiddlewareResult::allow(params)
    }

    fn name(&self) -> &str {
        "scope"
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }
}
