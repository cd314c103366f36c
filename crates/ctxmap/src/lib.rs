//! ctxmap — a registry mapping in-flight request handles to attached values.
//!
//! Request-processing code that only receives a [`RequestHandle`] can look up
//! state that an earlier stage of the same request attached to it. The
//! registry is an explicitly constructed, shared instance (usually held in an
//! `Arc`) rather than ambient global state.
//!
//! Entries must be removed when their request ends. The lifecycle adapters in
//! [`clear`] bind that removal to the end of processing:
//! - [`ClearGuard`] removes on drop (normal return, `?`, panic unwinding, or a
//!   dropped future);
//! - [`ClearHandler`] wraps a synchronous processing function;
//! - [`clear_after`] wraps a future.

pub mod clear;
pub mod handle;
pub mod registry;

pub use clear::{ClearGuard, ClearHandler, clear_after};
pub use handle::RequestHandle;
pub use registry::ContextRegistry;
