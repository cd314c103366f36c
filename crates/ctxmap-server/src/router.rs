//! Server router — dispatches JSON-RPC requests to services.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ctxmap::RequestHandle;
use ctxmap_protocol::{HandlerResult, Methods, RpcError, RpcErrorCode};
use ctxmap_transport::RequestHandler;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::middleware::{Middleware, MiddlewareChain};
use crate::scope::{ScopeMiddleware, ScopeRegistry};
use crate::service::Service;

/// Owns services and middleware, and routes requests to them.
///
/// The server inserts scopes into the registry but never removes them; that is
/// the job of the lifecycle adapter wrapped around it (the transport's
/// `ClearLayer`, or `ctxmap::clear_after` for direct callers).
pub struct Server {
    /// Request scopes, shared with the transport's clear layer
    registry: Arc<ScopeRegistry>,
    /// Registered services (boxed for object safety)
    services: Vec<Box<dyn ServiceDyn>>,
    /// Middleware chain
    middleware: MiddlewareChain,
    /// Server state
    state: RwLock<ServerState>,
    /// Per-request processing deadline
    request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Running,
    Shutdown,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for the Service trait.
trait ServiceDyn: Send + Sync {
    fn namespace_dyn(&self) -> &str;
    fn handle_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, HandlerResult>;
    fn init_dyn(&self) -> BoxFuture<'_, Result<(), Box<dyn std::error::Error + Send + Sync>>>;
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()>;
}

impl<T: Service> ServiceDyn for T {
    fn namespace_dyn(&self) -> &str {
        self.namespace()
    }
    fn handle_dyn<'a>(
        &'a self,
        handle: &'a RequestHandle,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.handle(handle, method, params))
    }
    fn init_dyn(&self) -> BoxFuture<'_, Result<(), Box<dyn std::error::Error + Send + Sync>>> {
        Box::pin(self.init())
    }
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

impl Server {
    /// Create a server over `registry`. The scope middleware is installed
    /// up front so every request gets a scope before anything else runs.
    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        let mut middleware = MiddlewareChain::new();
        middleware.add(ScopeMiddleware::new(registry.clone()));

        Self {
            registry,
            services: Vec::new(),
            middleware,
            state: RwLock::new(ServerState::Uninitialized),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Register a service with the server.
    pub fn register_service<S: Service + 'static>(&mut self, service: S) {
        info!("Registering service: {}", service.namespace());
        self.services.push(Box::new(service));
    }

    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        info!("Adding middleware: {}", middleware.name());
        self.middleware.add(middleware);
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// Initialize all services.
    pub async fn initialize(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for service in &self.services {
            service.init_dyn().await?;
        }

        *self.state.write() = ServerState::Running;
        info!("Server initialized ({} services)", self.services.len());
        Ok(())
    }

    /// Shutdown all services.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == ServerState::Shutdown {
                return;
            }
            *state = ServerState::Shutdown;
        }

        info!("Shutting down server...");
        for service in &self.services {
            service.shutdown_dyn().await;
        }

        let leftover = self.registry.len();
        if leftover > 0 {
            warn!("{leftover} request scopes still registered at shutdown");
        }
        info!("Server shutdown complete");
    }

    /// Route a request to the appropriate service.
    async fn route_request(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        let namespace = method.split('/').next().unwrap_or("");

        if namespace == "server" {
            return self.server_method(method);
        }

        for service in &self.services {
            if service.namespace_dyn() == namespace {
                return service.handle_dyn(handle, method, params).await;
            }
        }

        Err(RpcError::method_not_found(method))
    }

    fn server_method(&self, method: &str) -> HandlerResult {
        match method {
            Methods::SERVER_PING => Ok(json!("pong")),
            Methods::SERVER_STATS => Ok(json!({
                "entries": self.registry.len(),
                "services": self.services.iter().map(|s| s.namespace_dyn()).collect::<Vec<_>>(),
                "middleware": self.middleware.names(),
            })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    /// Run the routed call, enforcing the request deadline if one is set.
    /// On expiry the request's scope is cancelled so spawned work can stop.
    async fn route_with_deadline(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        let Some(limit) = self.request_timeout else {
            return self.route_request(handle, method, params).await;
        };

        match tokio::time::timeout(limit, self.route_request(handle, method, params)).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(scope) = self.registry.lookup(handle) {
                    scope.cancel();
                }
                warn!("Request {handle} ({method}) exceeded {}ms", limit.as_millis());
                Err(RpcError::cancelled(limit))
            }
        }
    }
}

impl RequestHandler for Server {
    async fn handle_request(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        // Check server state
        let state = *self.state.read();
        match state {
            ServerState::Shutdown => return Err(RpcError::shutting_down()),
            ServerState::Uninitialized => return Err(RpcError::not_initialized()),
            ServerState::Running => {}
        }

        debug!("Request {handle}: {method}");

        // Run middleware before-chain
        let mw_result = self.middleware.run_before(handle, method, params).await;
        if !mw_result.allowed {
            return Err(RpcError::blocked(mw_result.feedback));
        }

        let final_params = mw_result.params;

        let result = self.route_with_deadline(handle, method, final_params.clone()).await;

        // Run middleware after-chain on success
        match &result {
            Ok(value) => {
                let params_value = final_params.unwrap_or(Value::Null);
                self.middleware.run_after(handle, method, &params_value, value).await;
            }
            Err(e) if e.error_code() == RpcErrorCode::MethodNotFound => {
                debug!("Request {handle}: unknown method {method}");
            }
            Err(e) => debug!("Request {handle} failed: {e}"),
        }

        result
    }
}
