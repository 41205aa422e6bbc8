use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::types::{JsonRpcVersion, RequestId};

/// Result type for peer operations
pub type PeerResult<T> = Result<T, PeerError>;

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64), // -32099 to -32000
    Application(i64),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => crate::error_codes::PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => crate::error_codes::INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => crate::error_codes::METHOD_NOT_FOUND,
            JsonRpcErrorCode::InvalidParams => crate::error_codes::INVALID_PARAMS,
            JsonRpcErrorCode::InternalError => crate::error_codes::INTERNAL_ERROR,
            JsonRpcErrorCode::ServerError(code) | JsonRpcErrorCode::Application(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::ServerError(_) => "Server error",
            JsonRpcErrorCode::Application(_) => "Application error",
        }
    }

    /// Map a wire code back onto the enum
    pub fn from_code(code: i64) -> Self {
        match code {
            crate::error_codes::PARSE_ERROR => JsonRpcErrorCode::ParseError,
            crate::error_codes::INVALID_REQUEST => JsonRpcErrorCode::InvalidRequest,
            crate::error_codes::METHOD_NOT_FOUND => JsonRpcErrorCode::MethodNotFound,
            crate::error_codes::INVALID_PARAMS => JsonRpcErrorCode::InvalidParams,
            crate::error_codes::INTERNAL_ERROR => JsonRpcErrorCode::InternalError,
            crate::error_codes::SERVER_ERROR_START..=crate::error_codes::SERVER_ERROR_END => {
                JsonRpcErrorCode::ServerError(code)
            }
            other => JsonRpcErrorCode::Application(other),
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC error object: the `error` member of an error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, None, data)
    }

    pub fn invalid_request(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, None, data)
    }

    /// Method-not-found without naming the method. The dispatcher fills in
    /// the method of the request being answered.
    pub fn method_not_found() -> Self {
        Self::new(JsonRpcErrorCode::MethodNotFound, None, None)
    }

    /// Method-not-found carrying the method name as `data`
    pub fn method_not_found_for(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            None,
            Some(Value::String(method.to_string())),
        )
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::InvalidParams,
            Some(message.to_string()),
            None,
        )
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }

    /// Implementation-defined server error.
    ///
    /// # Panics
    ///
    /// Panics if `code` is outside -32099..=-32000.
    pub fn server_error(code: i64, message: &str, data: Option<Value>) -> Self {
        assert!(
            (crate::error_codes::SERVER_ERROR_START..=crate::error_codes::SERVER_ERROR_END)
                .contains(&code),
            "Server error code must be in range -32099 to -32000"
        );
        Self::new(
            JsonRpcErrorCode::ServerError(code),
            Some(message.to_string()),
            data,
        )
    }

    /// Application-defined error outside the reserved range
    pub fn application(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(
            JsonRpcErrorCode::Application(code),
            Some(message.into()),
            data,
        )
    }

    pub fn error_code(&self) -> JsonRpcErrorCode {
        JsonRpcErrorCode::from_code(self.code)
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == crate::error_codes::METHOD_NOT_FOUND
    }
}

impl fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// JSON-RPC error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    /// `None` for protocol-level errors with no correlation target;
    /// serialized as `"id": null`
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            error,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorObject::parse_error(None))
    }

    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorObject::invalid_request(None))
    }

    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(Some(id), JsonRpcErrorObject::method_not_found_for(method))
    }

    pub fn internal_error(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::internal_error(message))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JSON-RPC Error {}: {}",
            self.error.code, self.error.message
        )
    }
}

impl std::error::Error for JsonRpcError {}

/// Trait for errors that can be converted to JSON-RPC error objects
pub trait ToJsonRpcError: std::error::Error + Send + Sync + 'static {
    fn to_error_object(&self) -> JsonRpcErrorObject;
}

/// Local faults raised by a peer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeerError {
    /// The remote peer answered a request with an error payload
    #[error("Remote error (code {code}): {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// Pending request failed locally via `fail_all`
    #[error("Request aborted: {0}")]
    Aborted(String),

    /// The peer ended before a response arrived
    #[error("Peer closed")]
    Closed,

    /// A response or error arrived for an id with no pending request
    #[error("No pending request with id {0}")]
    UnknownRequestId(RequestId),

    /// The codec could not serialize an outgoing payload
    #[error("Failed to encode {kind}: {message}")]
    Encode { kind: &'static str, message: String },

    /// `write` was called outside of a tokio runtime
    #[error("No tokio runtime available to dispatch inbound message")]
    NoRuntime,
}

impl PeerError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    pub fn encode(kind: &'static str, error: impl fmt::Display) -> Self {
        Self::Encode {
            kind,
            message: error.to_string(),
        }
    }

    /// Error code if this is a remote error
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl From<JsonRpcErrorObject> for PeerError {
    fn from(error: JsonRpcErrorObject) -> Self {
        Self::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(JsonRpcErrorCode::ParseError.code(), -32700);
        assert_eq!(JsonRpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(
            JsonRpcErrorCode::from_code(-32050),
            JsonRpcErrorCode::ServerError(-32050)
        );
        assert_eq!(JsonRpcErrorCode::from_code(17), JsonRpcErrorCode::Application(17));
    }

    #[test]
    fn test_id_less_error_serializes_null_id() {
        let error = JsonRpcError::parse_error();
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
        );
    }

    #[test]
    fn test_method_not_found_variants() {
        assert!(JsonRpcErrorObject::method_not_found().data.is_none());
        assert_eq!(
            JsonRpcErrorObject::method_not_found_for("foo").data,
            Some(json!("foo"))
        );
        assert!(JsonRpcErrorObject::method_not_found().is_method_not_found());
    }

    #[test]
    fn test_server_error_in_range() {
        let error = JsonRpcErrorObject::server_error(-32001, "Storage offline", None);
        assert_eq!(error.error_code(), JsonRpcErrorCode::ServerError(-32001));
    }

    #[test]
    #[should_panic(expected = "Server error code must be in range")]
    fn test_server_error_out_of_range_panics() {
        JsonRpcErrorObject::server_error(-31999, "Too high", None);
    }

    #[test]
    fn test_peer_error_from_error_object() {
        let error: PeerError =
            JsonRpcErrorObject::application(1, "boom", Some(json!({"k": 1}))).into();

        assert_eq!(error.error_code(), Some(1));
        assert_eq!(error.to_string(), "Remote error (code 1): boom");
        assert!(error.is_remote());
    }
}
