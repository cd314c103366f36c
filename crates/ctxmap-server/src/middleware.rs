//! Middleware chain for request processing.
//!
//! Middleware can inspect/modify requests before routing and inspect
//! results after execution. They run in priority order and receive the
//! request handle, so they can reach the request's scope through the registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ctxmap::RequestHandle;
use serde_json::Value;
use tracing::debug;

use crate::scope::ScopeRegistry;

/// Whether a middleware lets the request through.
pub struct MiddlewareResult {
    /// Whether the request should proceed
    pub allowed: bool,
    /// Optionally modified params
    pub params: Option<Value>,
    /// Feedback message if blocked
    pub feedback: Option<String>,
}

impl MiddlewareResult {
    pub fn allow(params: Option<Value>) -> Self {
        Self {
            allowed: true,
            params,
            feedback: None,
        }
    }

    pub fn block(feedback: impl Into<String>) -> Self {
        Self {
            allowed: false,
            params: None,
            feedback: Some(feedback.into()),
        }
    }
}

/// Trait for request middleware.
pub trait Middleware: Send + Sync {
    /// Process a request before it reaches the service.
    fn before(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> impl Future<Output = MiddlewareResult> + Send;

    /// Process a result after the service returns (optional).
    fn after(
        &self,
        _handle: &RequestHandle,
        _method: &str,
        _params: &Value,
        _result: &Value,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Middleware name for debugging.
    fn name(&self) -> &str;

    /// Priority (lower runs first).
    fn priority(&self) -> i32 {
        0
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`Middleware`]. All refs share lifetime `'a`.
trait MiddlewareDyn: Send + Sync {
    fn before_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, MiddlewareResult>;

    fn after_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: &'a Value,
        result: &'a Value,
    ) -> BoxFuture<'a, ()>;

    fn name_dyn(&self) -> &str;
    fn priority_dyn(&self) -> i32;
}

impl<T: Middleware> MiddlewareDyn for T {
    fn before_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(self.before(handle, method, params))
    }

    fn after_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: &'a Value,
        result: &'a Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.after(handle, method, params, result))
    }

    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn priority_dyn(&self) -> i32 {
        self.priority()
    }
}

/// A chain of middleware executed in priority order.
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn MiddlewareDyn>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
        self.middlewares.sort_by_key(|m| m.priority_dyn());
    }

    /// Run the before-chain. Returns the (possibly modified) params or a block.
    pub async fn run_before(
        &self,
        handle: &RequestHandle,
        method: &str,
        mut params: Option<Value>,
    ) -> MiddlewareResult {
        for mw in &self.middlewares {
            let result = mw.before_dyn(handle, method, params.clone()).await;
            if !result.allowed {
                debug!("Request {handle} blocked by middleware '{}'", mw.name_dyn());
                return result;
            }
            if let Some(modified) = result.params {
                params = Some(modified);
            }
        }
        MiddlewareResult::allow(params)
    }

    /// Run the after-chain.
    pub async fn run_after(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: &Value,
        result: &Value,
    ) {
        for mw in &self.middlewares {
            mw.after_dyn(handle, method, params, result).await;
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name_dyn()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs how long each successful request took, measured from its scope.
pub struct TimingMiddleware {
    registry: Arc<ScopeRegistry>,
}

impl TimingMiddleware {
    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for TimingMiddleware {
    async fn before(
        &self,
        _handle: &RequestHandle,
        _method: &str,
        params: Option<Value>,
    ) -> MiddlewareResult {
        MiddlewareResult::allow(params)
    }

    async fn after(&self, handle: &RequestHandle, method: &str, _params: &Value, _result: &Value) {
        if let Some(scope) = self.registry.lookup(handle) {
            debug!(
                "{method} completed in {}ms ({handle})",
                scope.elapsed().num_milliseconds()
            );
        }
    }

    fn name(&self) -> &str {
        "timing"
    }

    fn priority(&self) -> i32 {
        100
    }
}
