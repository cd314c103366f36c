//! Service trait — a namespace of JSON-RPC methods.

use std::future::Future;

use ctxmap::RequestHandle;
use ctxmap_protocol::HandlerResult;

/// Trait implemented by all services.
///
/// Each service handles a namespace of methods (e.g., "scope/*"). Services
/// get the request handle rather than the request scope itself; a service
/// that needs the scope looks it up in the registry it was built with.
pub trait Service: Send + Sync {
    /// The namespace prefix this service handles (e.g., "scope").
    fn namespace(&self) -> &str;

    /// Handle a JSON-RPC request within this service's namespace.
    ///
    /// `method` is the full method string (e.g., "scope/get").
    fn handle(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> impl Future<Output = HandlerResult> + Send;

    /// Initialize the service (called once at startup).
    fn init(&self) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send {
        async { Ok(()) }
    }

    /// Shutdown the service (called once at server shutdown).
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
