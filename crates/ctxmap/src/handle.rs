//! Request handle — the identity of one in-flight request.

use std::fmt;

use uuid::Uuid;

/// Opaque identity of a single in-flight request.
///
/// Minted by the dispatch layer once per request. Backed by a random v4 UUID,
/// so a handle is never reused for a different request while entries keyed
/// by an earlier one may still exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(Uuid);

impl RequestHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0.simple())
    }
}
