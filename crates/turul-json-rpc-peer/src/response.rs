use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{JsonRpcVersion, RequestId};

/// Value carried by a successful response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseResult {
    /// Non-null result
    Success(Value),
    /// Succeeded without a value; encoded as an explicit `null`
    Null,
}

impl ResponseResult {
    pub fn success(value: Value) -> Self {
        ResponseResult::from(value)
    }

    pub fn null() -> Self {
        ResponseResult::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResponseResult::Null)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResponseResult::Success(value) => Some(value),
            ResponseResult::Null => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ResponseResult::Success(value) => value,
            ResponseResult::Null => Value::Null,
        }
    }
}

impl From<Value> for ResponseResult {
    fn from(value: Value) -> Self {
        if value.is_null() {
            ResponseResult::Null
        } else {
            ResponseResult::Success(value)
        }
    }
}

impl From<()> for ResponseResult {
    fn from(_: ()) -> Self {
        ResponseResult::Null
    }
}

impl Serialize for ResponseResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResponseResult::Success(value) => value.serialize(serializer),
            ResponseResult::Null => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(ResponseResult::from)
    }
}

/// Reply to a request that succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub result: ResponseResult,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: impl Into<ResponseResult>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result: result.into(),
        }
    }
}
