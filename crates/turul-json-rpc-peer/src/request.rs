use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{JsonRpcVersion, RequestId};

/// By-position or by-name call parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    /// Positional parameters
    Array(Vec<Value>),
    /// Named parameters
    Object(Map<String, Value>),
}

impl RequestParams {
    /// Get a named parameter (object params only)
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            RequestParams::Object(map) => map.get(key),
            RequestParams::Array(_) => None,
        }
    }

    /// Get a positional parameter (array params only)
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            RequestParams::Array(vec) => vec.get(index),
            RequestParams::Object(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestParams::Object(map) => map.is_empty(),
            RequestParams::Array(vec) => vec.is_empty(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestParams::Object(map) => Value::Object(map.clone()),
            RequestParams::Array(arr) => Value::Array(arr.clone()),
        }
    }

    /// Build params from an arbitrary JSON value. Only arrays and objects are
    /// valid JSON-RPC params.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(arr) => Some(RequestParams::Array(arr)),
            Value::Object(map) => Some(RequestParams::Object(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        RequestParams::Object(map)
    }
}

impl From<Vec<Value>> for RequestParams {
    fn from(vec: Vec<Value>) -> Self {
        RequestParams::Array(vec)
    }
}

/// A call that expects exactly one response or error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn new_no_params(id: RequestId, method: impl Into<String>) -> Self {
        Self::new(id, method, None)
    }
}
