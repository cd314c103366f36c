//! ctxmap protocol types
//!
//! JSON-RPC 2.0 request/response shapes, error codes, and the method names
//! served by the built-in services. Shared by the server and transport crates.

pub mod error;
pub mod jsonrpc;
pub mod methods;

pub use error::{RpcError, RpcErrorCode};
pub use jsonrpc::{
    HandlerResult, RequestId, RpcErrorResponse, RpcRequest, RpcResponse, RpcSuccessResponse,
};
pub use methods::Methods;
