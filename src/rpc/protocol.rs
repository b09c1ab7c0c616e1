use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Error response whose `data.kind` names the failure.
    pub fn from_error(id: Value, err: &GatewayError) -> Self {
        let mut response = Self::error(id, err.code(), err.to_string());
        if let Some(error) = response.error.as_mut() {
            error.data = Some(serde_json::json!({ "kind": err.kind() }));
        }
        response
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard codes plus the gateway's codes in the server-error range.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const NOT_AUTHENTICATED: i32 = -32001;
    pub const INVALID_CREDENTIALS: i32 = -32002;
    pub const NEEDS_2FA: i32 = -32003;
    pub const RATE_LIMITED: i32 = -32004;
    pub const NETWORK_ERROR: i32 = -32005;
    pub const REMOTE_ERROR: i32 = -32006;
    pub const REMOTE_TIMEOUT: i32 = -32007;
    pub const NO_SAVED_SESSION: i32 = -32008;
    pub const LOGIN_IN_PROGRESS: i32 = -32009;
    pub const ENTITLEMENTS_STALE: i32 = -32010;
    pub const NOT_ENTITLED: i32 = -32011;
    pub const FILE_ERROR: i32 = -32012;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_deserialization() {
        let json = r#"{"jsonrpc":"2.0","id":7,"method":"list_apps"}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "list_apps");
        assert_eq!(request.id, Some(Value::from(7)));
        assert!(request.params.is_none());
    }

    #[test]
    fn test_success_response_omits_error() {
        let response = JsonRpcResponse::success(Value::from("a"), Value::Bool(true));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"jsonrpc": "2.0", "id": "a", "result": true}));
    }

    #[test]
    fn test_error_response_carries_kind() {
        let response = JsonRpcResponse::from_error(Value::from(3), &GatewayError::NotAuthenticated);
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::NOT_AUTHENTICATED);
        assert_eq!(error.message, "not authenticated");
        assert_eq!(error.data.unwrap()["kind"], "NotAuthenticated");
    }
}
