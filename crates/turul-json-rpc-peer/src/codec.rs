//! Wire codec: raw text to typed payloads and back.
//!
//! The peer only talks to the [`Codec`] trait. [`JsonCodec`] is the serde_json
//! implementation used unless a builder supplies another one.

use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{JsonRpcError, JsonRpcErrorObject, PeerError, PeerResult},
    message::{Decoded, Payload},
    notification::JsonRpcNotification,
    request::{JsonRpcRequest, RequestParams},
    response::{JsonRpcResponse, ResponseResult},
    types::RequestId,
};

/// Converts between raw wire text and JSON-RPC payloads
pub trait Codec: Send + Sync + 'static {
    /// Decode a raw message. Malformed input fails with the error object to
    /// report back to the sender.
    fn decode(&self, raw: &str) -> Result<Decoded, JsonRpcErrorObject>;

    fn encode_request(
        &self,
        id: &RequestId,
        method: &str,
        params: Option<&RequestParams>,
    ) -> PeerResult<String>;

    fn encode_notification(&self, method: &str, params: Option<&RequestParams>)
    -> PeerResult<String>;

    fn encode_response(&self, id: &RequestId, result: &ResponseResult) -> PeerResult<String>;

    fn encode_error(&self, id: Option<&RequestId>, error: &JsonRpcErrorObject)
    -> PeerResult<String>;
}

/// Payload kind determined from which members are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Request,
    Notification,
    Response,
    Error,
}

impl Shape {
    fn of(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("jsonrpc").and_then(Value::as_str) != Some(crate::JSONRPC_VERSION) {
            return None;
        }

        let has_method = obj.contains_key("method");
        match obj.get("id") {
            Some(Value::Null) if has_method => None,
            Some(_) if has_method => Some(Shape::Request),
            None if has_method => Some(Shape::Notification),
            _ if obj.contains_key("error") => Some(Shape::Error),
            Some(_) if obj.contains_key("result") => Some(Shape::Response),
            _ => None,
        }
    }
}

/// serde_json based codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Classify one JSON value as a payload
    pub fn decode_value(&self, value: Value) -> Result<Payload, JsonRpcErrorObject> {
        let shape = Shape::of(&value).ok_or_else(|| JsonRpcErrorObject::invalid_request(None))?;

        let payload = match shape {
            Shape::Request => serde_json::from_value(value).map(Payload::Request),
            Shape::Notification => serde_json::from_value(value).map(Payload::Notification),
            Shape::Response => serde_json::from_value(value).map(Payload::Response),
            Shape::Error => serde_json::from_value(value).map(Payload::Error),
        };

        payload.map_err(|e| JsonRpcErrorObject::invalid_request(Some(Value::String(e.to_string()))))
    }

    fn encode<T: Serialize>(&self, kind: &'static str, payload: &T) -> PeerResult<String> {
        serde_json::to_string(payload).map_err(|e| PeerError::encode(kind, e))
    }
}

impl Codec for JsonCodec {
    fn decode(&self, raw: &str) -> Result<Decoded, JsonRpcErrorObject> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| JsonRpcErrorObject::parse_error(Some(Value::String(e.to_string()))))?;

        match value {
            Value::Array(elements) => Ok(Decoded::Batch(
                elements
                    .into_iter()
                    .map(|element| self.decode_value(element))
                    .collect(),
            )),
            other => self.decode_value(other).map(Decoded::Single),
        }
    }

    fn encode_request(
        &self,
        id: &RequestId,
        method: &str,
        params: Option<&RequestParams>,
    ) -> PeerResult<String> {
        let request = JsonRpcRequest::new(id.clone(), method, params.cloned());
        self.encode("request", &request)
    }

    fn encode_notification(
        &self,
        method: &str,
        params: Option<&RequestParams>,
    ) -> PeerResult<String> {
        let notification = JsonRpcNotification::new(method, params.cloned());
        self.encode("notification", &notification)
    }

    fn encode_response(&self, id: &RequestId, result: &ResponseResult) -> PeerResult<String> {
        let response = JsonRpcResponse::new(id.clone(), result.clone());
        self.encode("response", &response)
    }

    fn encode_error(
        &self,
        id: Option<&RequestId>,
        error: &JsonRpcErrorObject,
    ) -> PeerResult<String> {
        let error = JsonRpcError::new(id.cloned(), error.clone());
        self.encode("error", &error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_codes::{INVALID_REQUEST, PARSE_ERROR};
    use serde_json::json;

    fn decode_single(raw: &str) -> Result<Payload, JsonRpcErrorObject> {
        match JsonCodec.decode(raw)? {
            Decoded::Single(payload) => Ok(payload),
            Decoded::Batch(_) => panic!("expected a single payload"),
        }
    }

    #[test]
    fn test_classifies_request_and_notification() {
        let request = decode_single(r#"{"jsonrpc": "2.0", "method": "test", "id": 1}"#).unwrap();
        assert!(matches!(request, Payload::Request(ref r) if r.id == RequestId::Number(1)));

        let notification = decode_single(r#"{"jsonrpc": "2.0", "method": "notify"}"#).unwrap();
        assert_eq!(notification.kind(), "notification");
        assert_eq!(notification.method(), Some("notify"));
    }

    #[test]
    fn test_classifies_response_and_error() {
        let response = decode_single(r#"{"jsonrpc": "2.0", "id": "a", "result": null}"#).unwrap();
        assert!(matches!(response, Payload::Response(ref r) if r.result.is_null()));

        let error = decode_single(
            r#"{"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}}"#,
        )
        .unwrap();
        assert!(matches!(error, Payload::Error(ref e) if e.id.is_none()));

        let error = decode_single(
            r#"{"jsonrpc": "2.0", "id": 4, "error": {"code": 1, "message": "x", "data": [1]}}"#,
        )
        .unwrap();
        assert_eq!(error.id(), Some(&RequestId::Number(4)));
    }

    #[test]
    fn test_parse_error() {
        let error = JsonCodec.decode(r#"{"jsonrpc": "2.0", "method": "test""#).unwrap_err();
        assert_eq!(error.code, PARSE_ERROR);
    }

    #[test]
    fn test_invalid_shapes() {
        for raw in [
            r#"{"jsonrpc": "1.0", "method": "test", "id": 1}"#,
            r#"{"method": "test", "id": 1}"#,
            r#"{"jsonrpc": "2.0", "method": "test", "id": null}"#,
            r#"{"jsonrpc": "2.0", "method": "test", "id": 1, "params": 3}"#,
            r#"{"jsonrpc": "2.0", "result": 1}"#,
            r#"{"jsonrpc": "2.0", "id": 1}"#,
            r#"42"#,
        ] {
            let error = decode_single(raw).unwrap_err();
            assert_eq!(error.code, INVALID_REQUEST, "input: {}", raw);
        }
    }

    #[test]
    fn test_batch_members_decode_independently() {
        let decoded = JsonCodec
            .decode(r#"[{"jsonrpc": "2.0", "method": "a", "id": 1}, 5, {"jsonrpc": "2.0", "method": "b"}]"#)
            .unwrap();

        let Decoded::Batch(members) = decoded else {
            panic!("expected a batch");
        };
        assert_eq!(members.len(), 3);
        assert!(members[0].is_ok());
        assert_eq!(members[1].as_ref().unwrap_err().code, INVALID_REQUEST);
        assert!(members[2].is_ok());
    }

    #[test]
    fn test_encoders_produce_wire_format() {
        let codec = JsonCodec;
        let params = RequestParams::from(vec![json!(42)]);

        let request = codec
            .encode_request(&RequestId::Number(3), "identity", Some(&params))
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&request).unwrap(),
            json!({"jsonrpc": "2.0", "id": 3, "method": "identity", "params": [42]})
        );

        let response = codec
            .encode_response(&RequestId::Number(3), &ResponseResult::Null)
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&response).unwrap(),
            json!({"jsonrpc": "2.0", "id": 3, "result": null})
        );

        let error = codec
            .encode_error(None, &JsonRpcErrorObject::invalid_request(None))
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&error).unwrap()["id"],
            Value::Null
        );
    }
}
