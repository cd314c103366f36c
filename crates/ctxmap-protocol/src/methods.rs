//! Method name constants for the built-in services.

/// All built-in method names, grouped by service namespace.
pub struct Methods;

impl Methods {
    // ── Scope ───────────────────────────────────────────────────────────
    pub const SCOPE_GET: &str = "scope/get";
    pub const SCOPE_SET: &str = "scope/set";
    pub const SCOPE_INFO: &str = "scope/info";
    pub const SCOPE_DETACH: &str = "scope/detach";
    pub const SCOPE_WAIT: &str = "scope/wait";
    pub const SCOPE_FAIL: &str = "scope/fail";

    // ── Server ──────────────────────────────────────────────────────────
    pub const SERVER_PING: &str = "server/ping";
    pub const SERVER_STATS: &str = "server/stats";
}
