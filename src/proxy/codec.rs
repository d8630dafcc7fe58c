// Keygate — Message codec
//
// JSON-RPC 2.0 message types for the daemon protocol, newline-framed over
// the Unix domain socket. We implement this directly rather than pulling in
// a crate, since we only need a handful of types. Outbound requests carry an
// operation id and serialized arguments under a caller-assigned correlation
// id; inbound messages are either correlated responses (status + payload) or
// uncorrelated slot-change notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KeygateError, Result};

/// A request message: operation id + serialized arguments + correlation id.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: u64,
}

/// A correlated response: status (error) and serialized result.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

/// The error member of a response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A server-pushed notification: no correlation id, never answered.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// One proxy call before correlation: the transporter assigns the id.
#[derive(Debug)]
pub struct RpcCall {
    pub method: &'static str,
    pub params: Value,
}

/// Classified inbound message.
#[derive(Debug)]
pub enum Inbound {
    Response(RpcResponse),
    Notification(RpcNotification),
}

// Standard JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Operation ids of the daemon protocol.
pub mod op {
    pub const FIND_SLOT: &str = "find_slot";
    pub const IS_EMPTY: &str = "is_empty";
    pub const OPEN_AS_USER: &str = "open_as_user";
    pub const OPEN_AS_OWNER: &str = "open_as_owner";
    pub const CLOSE_SLOT: &str = "close_slot";
    pub const SAVE_COPY: &str = "save_copy";
    pub const CLEAR_SLOT: &str = "clear_slot";
    pub const GET_CONTENT_PROPS: &str = "get_content_props";
    pub const GET_PROTOTYPED_PROPS: &str = "get_prototyped_props";
    pub const GET_DEFAULT_CRYPTO_PROVIDER_UID: &str = "get_default_crypto_provider_uid";
    pub const GET_OWNER: &str = "get_owner";
    pub const BEGIN_TRANSACTION: &str = "begin_transaction";
    pub const COMMIT_TRANSACTION: &str = "commit_transaction";
    pub const ROLLBACK_TRANSACTION: &str = "rollback_transaction";
    pub const REGISTER_OBSERVER: &str = "register_observer";
    pub const UNSUBSCRIBE_SLOT: &str = "unsubscribe_slot";
    pub const FIND_REFERRING_SLOT: &str = "find_referring_slot";
    pub const X509_IMPORT: &str = "x509_import_certificate";
    pub const X509_REMOVE: &str = "x509_remove_certificate";

    /// Notification method for externally caused slot content changes.
    pub const SLOT_UPDATED: &str = "slot_updated";
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Validate that this is a proper JSON-RPC 2.0 request.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.jsonrpc != "2.0" {
            return Err("jsonrpc must be \"2.0\"".to_string());
        }
        if self.method.is_empty() {
            return Err("method must not be empty".to_string());
        }
        Ok(())
    }

    /// Serialize to one wire line (newline framing is the transport's job).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    /// Report a catalog error under its wire code.
    pub fn fault(id: u64, error: &KeygateError) -> Self {
        Self::error(id, error.wire_code(), error.to_string())
    }
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Classify one inbound wire line. A `method` member marks a notification;
/// anything else must be a correlated response.
pub fn parse_inbound(line: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| KeygateError::RuntimeFault(format!("malformed inbound message: {}", e)))?;

    if value.get("method").is_some() {
        let notification: RpcNotification = serde_json::from_value(value).map_err(|e| {
            KeygateError::RuntimeFault(format!("malformed notification: {}", e))
        })?;
        Ok(Inbound::Notification(notification))
    } else {
        let response: RpcResponse = serde_json::from_value(value)
            .map_err(|e| KeygateError::RuntimeFault(format!("malformed response: {}", e)))?;
        Ok(Inbound::Response(response))
    }
}

/// Check the status member and surface the payload.
///
/// The error member is inspected before the result is interpreted: a caller
/// can never observe a success value for a server-reported fault. Standard
/// JSON-RPC codes map into the catalog (`method not found` means the
/// deployment does not implement the operation); domain codes round-trip
/// through `KeygateError::from_wire`.
pub fn decode_result(response: RpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(match error.code {
            METHOD_NOT_FOUND => KeygateError::Unsupported(error.message),
            INVALID_PARAMS | INVALID_REQUEST | PARSE_ERROR => {
                KeygateError::InvalidArgument(error.message)
            }
            INTERNAL_ERROR => KeygateError::RuntimeFault(error.message),
            code => KeygateError::from_wire(code, &error.message),
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
