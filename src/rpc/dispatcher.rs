//! Turns one inbound JSON-RPC message into at most one response.

use super::methods::GatewayRequest;
use super::protocol::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::GatewayContext;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<GatewayContext>,
}

impl Dispatcher {
    pub fn new(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }

    /// Handles one message.
    ///
    /// Returns `None` for notifications and for messages whose id cannot be
    /// recovered; those are logged and dropped.
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Dropping unparseable message");
                return None;
            }
        };

        let id = match value.get("id") {
            None => None,
            Some(id @ (Value::Null | Value::Number(_) | Value::String(_))) => Some(id.clone()),
            Some(_) => {
                warn!("Dropping message with invalid id");
                return None;
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return self.reject(id, GatewayError::InvalidRequest(err.to_string()));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            let err = GatewayError::InvalidRequest(format!(
                "unsupported jsonrpc version: {}",
                request.jsonrpc
            ));
            return self.reject(id, err);
        }

        let method = request.method;
        let result = match GatewayRequest::parse(&method, request.params) {
            Ok(call) => self.invoke(call).await,
            Err(err) => Err(err),
        };

        // Notifications (no id) run but are never answered.
        let id = id?;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => {
                debug!(method = %method, error = %err, "Request failed");
                JsonRpcResponse::from_error(id, &err)
            }
        })
    }

    /// Runs one validated request against the gateway.
    pub async fn invoke(&self, call: GatewayRequest) -> GatewayResult<Value> {
        debug!(method = call.method(), "Dispatching");
        let context = &self.context;
        match call {
            GatewayRequest::IsLoggedIn => to_json(context.is_logged_in()),
            GatewayRequest::SetCredentialLocation { path } => {
                to_json(context.set_credential_location(&path))
            }
            GatewayRequest::ReloginAvailable => to_json(context.relogin_available()),
            GatewayRequest::Relogin { user } => to_json(context.relogin(user.as_deref()).await?),
            GatewayRequest::Login(request) => to_json(context.login(request).await?),
            GatewayRequest::Logout => {
                context.logout().await;
                to_json(true)
            }
            GatewayRequest::GetProductInfo(params) => {
                to_json(context.get_product_info(&params).await?)
            }
            GatewayRequest::GetProductName { apps } => {
                to_json(context.get_product_name(&apps).await?)
            }
            GatewayRequest::ListApps => to_json(context.list_apps().await?),
            GatewayRequest::LoadVdf { path } => context.load_vdf(path).await,
        }
    }

    fn reject(&self, id: Option<Value>, err: GatewayError) -> Option<JsonRpcResponse> {
        match id {
            Some(id) => Some(JsonRpcResponse::from_error(id, &err)),
            None => {
                warn!(error = %err, "Dropping malformed message without id");
                None
            }
        }
    }
}

fn to_json<T: Serialize>(value: T) -> GatewayResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| GatewayError::Internal(format!("failed to serialize result: {}", err)))
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
