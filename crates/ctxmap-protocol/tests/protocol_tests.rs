//! Protocol layer tests — JSON-RPC serialization, error codes, method names.

#[cfg(test)]
mod tests {
    use ctxmap_protocol::*;
    use serde_json::json;
    use std::time::Duration;

    // ─────────────────────────────────────────────────────────────────────
    // RequestId
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn request_id_number_and_string() {
        assert_eq!(serde_json::to_value(RequestId::Number(42)).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(RequestId::String("abc".into())).unwrap(), json!("abc"));

        let id: RequestId = serde_json::from_value(json!("req-1")).unwrap();
        assert_eq!(id, RequestId::String("req-1".into()));
    }

    // ─────────────────────────────────────────────────────────────────────
    // RpcRequest
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn request_without_params() {
        let req: RpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "scope/get"
        }))
        .unwrap();
        assert_eq!(req.method, Methods::SCOPE_GET);
        assert!(req.params.is_none());
        assert!(req.is_valid());
    }

    #[test]
    fn request_invalid_version_or_method() {
        let mut req = RpcRequest::new(RequestId::Number(1), "scope/get", None);
        req.jsonrpc = "1.0".into();
        assert!(!req.is_valid());

        let req = RpcRequest::new(RequestId::Number(1), "", None);
        assert!(!req.is_valid());
    }

    #[test]
    fn request_skips_missing_params() {
        let req = RpcRequest::new(RequestId::Number(3), "server/ping", None);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("params").is_none());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Responses
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn success_response_wire_format() {
        let resp = RpcResponse::success(RequestId::Number(7), json!({"ok": true}));
        assert!(resp.is_success());
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}})
        );
    }

    #[test]
    fn error_response_null_id() {
        let resp = RpcResponse::error(None, RpcError::parse_error("bad json"));
        assert!(resp.is_error());
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], json!(null));
        assert_eq!(value["error"]["code"], -32700);
        assert_eq!(value["error"]["message"], "Failed to parse JSON");
        assert_eq!(value["error"]["data"]["detail"], "bad json");
    }

    #[test]
    fn from_result_maps_both_arms() {
        let ok = RpcResponse::from_result(RequestId::Number(4), Ok(json!(1)));
        match ok {
            RpcResponse::Success(s) => assert_eq!(s.id, RequestId::Number(4)),
            RpcResponse::Error(_) => panic!("expected success"),
        }

        let err = RpcResponse::from_result(
            RequestId::String("x".into()),
            Err(RpcError::cancelled(Duration::from_millis(250))),
        );
        match err {
            RpcResponse::Error(e) => {
                assert_eq!(e.id, Some(RequestId::String("x".into())));
                assert_eq!(e.error.error_code(), RpcErrorCode::RequestCancelled);
                assert_eq!(e.error.message, "Request exceeded 250ms deadline");
            }
            RpcResponse::Success(_) => panic!("expected error"),
        }
    }

    #[test]
    fn response_deserializes_untagged() {
        let resp: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found: nope/x"}
        }))
        .unwrap();
        assert!(resp.is_error());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn error_codes_serialize_as_integers() {
        for (code, wire) in [
            (RpcErrorCode::ParseError, -32700),
            (RpcErrorCode::InvalidRequest, -32600),
            (RpcErrorCode::MethodNotFound, -32601),
            (RpcErrorCode::InvalidParams, -32602),
            (RpcErrorCode::InternalError, -32603),
            (RpcErrorCode::NoScope, -32000),
            (RpcErrorCode::ServerNotInitialized, -32001),
            (RpcErrorCode::ServerShuttingDown, -32002),
            (RpcErrorCode::RequestCancelled, -32003),
            (RpcErrorCode::Blocked, -32004),
        ] {
            assert_eq!(code.code(), wire);
            assert_eq!(serde_json::to_value(code).unwrap(), json!(wire));
            assert_eq!(RpcErrorCode::try_from(wire), Ok(code));
        }
    }

    #[test]
    fn unknown_error_code_is_rejected() {
        assert!(RpcErrorCode::try_from(1234).is_err());
        let parsed: Result<RpcError, _> =
            serde_json::from_value(json!({"code": 1234, "message": "??"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn scope_errors() {
        let err = RpcError::no_scope();
        assert_eq!(err.error_code(), RpcErrorCode::NoScope);
        assert_eq!(err.message, "No scope attached to this request");

        let err = RpcError::blocked(Some("scope/set is read-only".into()));
        assert_eq!(err.error_code(), RpcErrorCode::Blocked);
        assert_eq!(err.message, "scope/set is read-only");
        assert_eq!(
            RpcError::blocked(None).message,
            "Request blocked by middleware"
        );
    }

    #[test]
    fn error_with_data_and_display() {
        let err = RpcError::invalid_params("missing key").with_data(json!({"field": "key"}));
        assert_eq!(err.data, Some(json!({"field": "key"})));
        assert_eq!(err.to_string(), "InvalidParams (-32602): missing key");

        let value = serde_json::to_value(RpcError::internal("boom")).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn method_not_found_names_method() {
        let err = RpcError::method_not_found("nope/x");
        assert_eq!(err.message, "Method not found: nope/x");
        assert_eq!(err.error_code(), RpcErrorCode::MethodNotFound);
    }
}
