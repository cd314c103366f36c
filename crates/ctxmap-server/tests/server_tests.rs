//! Server tests — routing, middleware, request scopes, and cleanup when the
//! server is driven through `ctxmap::clear_after`.

use std::sync::Arc;
use std::time::Duration;

use ctxmap::{RequestHandle, clear_after};
use ctxmap_protocol::{HandlerResult, RpcErrorCode};
use ctxmap_server::{
    Middleware, MiddlewareResult, ScopeRegistry, ScopeService, Server, TimingMiddleware,
};
use ctxmap_transport::RequestHandler;
use serde_json::{Value, json};

async fn running_server() -> Server {
    let registry = Arc::new(ScopeRegistry::new());
    let mut server = Server::new(registry.clone());
    server.register_service(ScopeService::new(registry.clone()));
    server.add_middleware(TimingMiddleware::new(registry));
    server.initialize().await.unwrap();
    server
}

/// One request, wrapped the way the transport wraps it.
async fn call(server: &Server, method: &str, params: Option<Value>) -> HandlerResult {
    let handle = RequestHandle::new();
    clear_after(
        server.registry().clone(),
        handle,
        server.handle_request(&handle, method, params),
    )
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rejects_requests_before_initialize() {
    let server = Server::new(Arc::new(ScopeRegistry::new()));
    let err = call(&server, "server/ping", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::ServerNotInitialized);
}

#[tokio::test]
async fn rejects_requests_after_shutdown() {
    let server = running_server().await;
    server.shutdown().await;
    server.shutdown().await;
    let err = call(&server, "server/ping", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::ServerShuttingDown);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scopes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scope_is_visible_to_the_service() {
    let server = running_server().await;
    let handle = RequestHandle::new();

    let result = clear_after(
        server.registry().clone(),
        handle,
        server.handle_request(&handle, "scope/get", None),
    )
    .await
    .unwrap();

    assert_eq!(result["attached"], true);
    assert_eq!(result["scope"]["method"], "scope/get");
    assert_eq!(result["scope"]["handle"], handle.to_string());
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn set_overwrites_within_one_request() {
    let server = running_server().await;
    let result = call(&server, "scope/set", Some(json!({"key": "user", "value": "alice"})))
        .await
        .unwrap();
    assert_eq!(result["values"], json!({"user": "alice"}));
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn detached_scope_is_present_but_empty() {
    let server = running_server().await;
    let handle = RequestHandle::new();

    let info = server.handle_request(&handle, "scope/detach", None).await.unwrap();
    assert_eq!(info["present"], true);
    assert_eq!(info["attached"], false);
    assert_eq!(server.registry().lookup_with_presence(&handle), (None, true));

    server.registry().remove(&handle);
    assert_eq!(server.registry().lookup_with_presence(&handle), (None, false));
}

#[tokio::test]
async fn failing_request_is_cleared() {
    let server = running_server().await;
    let err = call(&server, "scope/fail", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::InternalError);
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn unwrapped_failing_request_leaks() {
    let server = running_server().await;
    let handle = RequestHandle::new();

    let err = server.handle_request(&handle, "scope/fail", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::InternalError);

    // Without a lifecycle adapter the entry stays behind.
    let scope = server.registry().lookup(&handle).expect("entry leaked");
    assert_eq!(scope.value("failed"), Some(&json!(true)));
    server.registry().remove(&handle);
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn deadline_cancels_the_scope() {
    let registry = Arc::new(ScopeRegistry::new());
    let mut server = Server::new(registry.clone()).with_request_timeout(Duration::from_millis(50));
    server.register_service(ScopeService::new(registry.clone()));
    server.initialize().await.unwrap();

    let handle = RequestHandle::new();
    let err = server
        .handle_request(&handle, "scope/wait", Some(json!({"ms": 10_000})))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::RequestCancelled);

    // The deadline cancels but does not remove; removal is the adapter's job.
    let scope = registry.lookup(&handle).expect("scope still registered");
    assert!(scope.is_cancelled());
    registry.remove(&handle);
}

#[tokio::test]
async fn wait_finishes_inside_deadline() {
    let registry = Arc::new(ScopeRegistry::new());
    let mut server = Server::new(registry.clone()).with_request_timeout(Duration::from_secs(5));
    server.register_service(ScopeService::new(registry.clone()));
    server.initialize().await.unwrap();

    let result = call(&server, "scope/wait", Some(json!({"ms": 1}))).await.unwrap();
    assert_eq!(result["cancelled"], false);
    assert!(registry.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing and middleware
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn server_methods() {
    let server = running_server().await;
    assert_eq!(call(&server, "server/ping", None).await.unwrap(), json!("pong"));

    let stats = call(&server, "server/stats", None).await.unwrap();
    // The stats request's own scope is still registered while it runs.
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["services"], json!(["scope"]));
    assert_eq!(stats["middleware"], json!(["scope", "timing"]));
}

#[tokio::test]
async fn unknown_namespace() {
    let server = running_server().await;
    let err = call(&server, "nope/x", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::MethodNotFound);
    assert!(server.registry().is_empty());
}

struct DenyAll;

impl Middleware for DenyAll {
    async fn before(
        &self,
        _handle: &RequestHandle,
        method: &str,
        _params: Option<Value>,
    ) -> MiddlewareResult {
        MiddlewareResult::block(format!("{method} is not allowed"))
    }

    fn name(&self) -> &str {
        "deny-all"
    }
}

#[tokio::test]
async fn blocked_request_is_cleared() {
    let registry = Arc::new(ScopeRegistry::new());
    let mut server = Server::new(registry.clone());
    server.register_service(ScopeService::new(registry.clone()));
    server.add_middleware(DenyAll);
    server.initialize().await.unwrap();

    let err = call(&server, "scope/get", None).await.unwrap_err();
    assert_eq!(err.error_code(), RpcErrorCode::Blocked);
    assert_eq!(err.message, "scope/get is not allowed");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn concurrent_requests_leave_no_entries() {
    let server = Arc::new(running_server().await);
    let mut tasks = Vec::new();

    for i in 0..64 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            let method = if i % 4 == 0 { "scope/fail" } else { "scope/set" };
            let result = call(&server, method, Some(json!({"key": "n", "value": i}))).await;
            (i, result)
        }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        if i % 4 == 0 {
            assert!(result.is_err());
        } else {
            assert_eq!(result.unwrap()["values"]["n"], i);
        }
    }
    assert!(server.registry().is_empty());
}
