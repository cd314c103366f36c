//! Scope service — `scope/*` methods over the current request's scope.
//!
//! Every method works from the request handle alone and finds the scope in the
//! registry, the same way any downstream code would.

use std::sync::Arc;
use std::time::Duration;

use ctxmap::RequestHandle;
use ctxmap_protocol::{HandlerResult, Methods, RpcError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::scope::{RequestScope, ScopeRegistry};
use crate::service::Service;

pub struct ScopeService {
    registry: Arc<ScopeRegistry>,
}

#[derive(Debug, Deserialize)]
struct SetParams {
    key: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WaitParams {
    ms: u64,
}

impl ScopeService {
    pub fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self { registry }
    }

    fn current(&self, handle: &RequestHandle) -> Result<Arc<RequestScope>, RpcError> {
        self.registry
            .lookup(handle)
            .ok_or_else(RpcError::no_scope)
    }

    fn get(&self, handle: &RequestHandle) -> HandlerResult {
        match self.registry.lookup(handle) {
            Some(scope) => Ok(json!({
                "attached": true,
                "scope": scope.snapshot(),
            })),
            None => Ok(json!({ "attached": false, "scope": null })),
        }
    }

    fn set(&self, handle: &RequestHandle, params: Option<Value>) -> HandlerResult {
        let params: SetParams = parse_params(params)?;
        let scope = self.current(handle)?;
        let derived = scope.with_value(params.key.clone(), params.value);
        let values = derived.values().clone();
        self.registry.insert(*handle, Some(Arc::new(derived)));
        debug!("Scope value set: {handle} {}", params.key);
        Ok(json!({ "values": values }))
    }

    fn info(&self, handle: &RequestHandle) -> HandlerResult {
        let (scope, present) = self.registry.lookup_with_presence(handle);
        Ok(json!({
            "handle": handle.to_string(),
            "present": present,
            "attached": scope.is_some(),
            "entries": self.registry.len(),
        }))
    }

    fn detach(&self, handle: &RequestHandle) -> HandlerResult {
        self.registry.insert(*handle, None);
        self.info(handle)
    }

    async fn wait(&self, handle: &RequestHandle, params: Option<Value>) -> HandlerResult {
        let params: WaitParams = parse_params(params)?;
        let token = self.current(handle)?.cancel_token();
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(params.ms)) => false,
            _ = token.cancelled() => true,
        };
        Ok(json!({ "cancelled": cancelled }))
    }

    fn fail(&self, handle: &RequestHandle) -> HandlerResult {
        let scope = self.current(handle)?;
        self.registry
            .insert(*handle, Some(Arc::new(scope.with_value("failed", json!(true)))));
        Err(RpcError::internal("scope/fail requested a failure"))
    }
}

impl Service for ScopeService {
    fn namespace(&self) -> &str {
        "scope"
    }

    async fn handle(
        &self,
        handle: &RequestHandle,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        match method {
            Methods::SCOPE_GET => self.get(handle),
            Methods::SCOPE_SET => self.set(handle, params),
            Methods::SCOPE_INFO => self.info(handle),
            Methods::SCOPE_DETACH => self.detach(handle),
            Methods::SCOPE_WAIT => self.wait(handle, params).await,
            Methods::SCOPE_FAIL => self.fail(handle),
            _ => Err(RpcError::method_not_found(method)),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}
