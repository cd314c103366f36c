//! ctxmap transport layer
//!
//! Serves JSON-RPC over HTTP. Every HTTP request gets a fresh
//! [`RequestHandle`](ctxmap::RequestHandle) from [`RequestHandleLayer`], and
//! [`ClearLayer`] removes that handle's registry entry once the request has
//! been fully processed.
//!
//! The transport is decoupled from the server logic via the `RequestHandler` trait.

pub mod error;
pub mod layer;
pub mod server;

pub use error::TransportError;
pub use layer::{ClearLayer, ClearService, RequestHandleLayer, RequestHandleService};
pub use server::{RequestHandler, TransportConfig, TransportServer, build_router};
