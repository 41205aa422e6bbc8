use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier correlating a request with its response.
/// Can be a string or a number, but never null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    /// Interpret a raw JSON value as an id. Floats, booleans, null and
    /// structured values are not valid ids.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(RequestId::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(RequestId::Number),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(s) => Some(s),
            RequestId::Number(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RequestId::Number(n) => Some(*n),
            RequestId::String(_) => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// JSON-RPC version tag carried in every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonRpcVersion {
    #[default]
    V2_0,
}

impl JsonRpcVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonRpcVersion::V2_0 => crate::JSONRPC_VERSION,
        }
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            crate::JSONRPC_VERSION => Ok(JsonRpcVersion::V2_0),
            _ => Err(serde::de::Error::custom(format!(
                "Invalid JSON-RPC version: {}",
                s
            ))),
        }
    }
}
