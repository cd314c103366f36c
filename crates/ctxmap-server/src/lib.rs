//! ctxmap server — routes JSON-RPC requests to services.
//!
//! The server owns the services, runs the middleware chain, and provides the
//! `RequestHandler` implementation for the transport layer. Per-request state
//! lives in a [`RequestScope`] stored in the shared [`ScopeRegistry`]; any
//! code holding the request handle can look it up.

pub mod middleware;
pub mod router;
pub mod scope;
pub mod scope_service;
pub mod service;

pub use middleware::{Middleware, MiddlewareChain, MiddlewareResult, TimingMiddleware};
pub use router::Server;
pub use scope::{RequestScope, ScopeMiddleware, ScopeRegistry};
pub use scope_service::ScopeService;
pub use service::Service;
