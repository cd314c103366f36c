//! HTTP transport server using Axum.
//!
//! `POST /rpc` carries one JSON-RPC request per HTTP request. The request
//! handle minted by [`RequestHandleLayer`] is passed to the handler, and
//! [`ClearLayer`] removes the handle's registry entry after the response is
//! produced (or the request is abandoned).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Extension, Router,
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use ctxmap::{ContextRegistry, RequestHandle};
use ctxmap_protocol::{HandlerResult, RequestId, RpcError, RpcRequest, RpcResponse};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::layer::{ClearLayer, RequestHandleLayer};

/// Trait implemented by the server to handle incoming requests.
/// The transport calls this once per JSON-RPC request with that request's handle.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_request(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Log every request at info level instead of debug
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7171,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            verbose_logging: false,
        }
    }
}

/// Shared state for the transport routes.
struct AppState<H: RequestHandler, V> {
    handler: Arc<H>,
    registry: Arc<ContextRegistry<RequestHandle, V>>,
    verbose_logging: bool,
    /// Requests currently being processed (for health check)
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter on every exit path.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Build the router with the handle and clear layers applied.
///
/// `registry` must be the same instance the handler inserts into, or entries
/// will outlive their requests.
pub fn build_router<H, V>(
    config: &TransportConfig,
    handler: Arc<H>,
    registry: Arc<ContextRegistry<RequestHandle, V>>,
) -> Router
where
    H: RequestHandler,
    V: Send + Sync + 'static,
{
    let state = Arc::new(AppState {
        handler,
        registry: registry.clone(),
        verbose_logging: config.verbose_logging,
        in_flight: Arc::new(AtomicUsize::new(0)),
    });

    let router = Router::new()
        .route("/rpc", post(rpc_handler::<H, V>))
        .route("/health", get(health_handler::<H, V>))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(RequestHandleLayer)
                .layer(ClearLayer::new(registry)),
        );

    if config.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Running HTTP listener. Owns the serve task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start serving with the given handler and registry.
    pub async fn start<H, V>(
        config: TransportConfig,
        handler: Arc<H>,
        registry: Arc<ContextRegistry<RequestHandle, V>>,
    ) -> Result<Self, TransportError>
    where
        H: RequestHandler,
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let app = build_router(&config, handler, registry);

        let addr_str = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = addr_str.parse().map_err(|source| TransportError::InvalidAddress {
            addr: addr_str.clone(),
            source,
        })?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr: addr_str, source })?;
        let actual_port = listener.local_addr()?.port();

        info!("ctxmap transport listening on http://{}:{}/rpc", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server, letting in-flight requests finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("ctxmap transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn rpc_handler<H: RequestHandler, V: Send + Sync + 'static>(
    State(state): State<Arc<AppState<H, V>>>,
    Extension(handle): Extension<RequestHandle>,
    body: String,
) -> impl IntoResponse {
    let _in_flight = InFlight::enter(&state.in_flight);
    let response = handle_message(&body, &handle, &state.handler, state.verbose_logging).await;
    Json(response)
}

async fn health_handler<H: RequestHandler, V: Send + Sync + 'static>(
    State(state): State<Arc<AppState<H, V>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "inFlight": state.in_flight.load(Ordering::Relaxed),
        "entries": state.registry.len(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_message<H: RequestHandler>(
    text: &str,
    handle: &RequestHandle,
    handler: &Arc<H>,
    verbose: bool,
) -> RpcResponse {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return RpcResponse::error(None, RpcError::parse_error(e)),
    };

    // Echo the id on shape errors whenever it is readable.
    let id: Option<RequestId> = parsed.get("id").cloned().and_then(|v| serde_json::from_value(v).ok());
    let request: RpcRequest = match serde_json::from_value(parsed) {
        Ok(request) => request,
        Err(e) => {
            return RpcResponse::error(id, RpcError::invalid_request(format!("Invalid request: {e}")));
        }
    };
    if !request.is_valid() {
        return RpcResponse::error(
            Some(request.id),
            RpcError::invalid_request("Invalid JSON-RPC 2.0 request"),
        );
    }

    let RpcRequest { id, method, params, .. } = request;
    if verbose {
        info!("{handle} -> {method}");
    } else {
        debug!("{handle} -> {method}");
    }

    RpcResponse::from_result(id, handler.handle_request(handle, &method, params).await)
}
