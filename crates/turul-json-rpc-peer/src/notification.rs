use serde::{Deserialize, Serialize};

use crate::{request::RequestParams, types::JsonRpcVersion};

/// A call that expects no reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params,
        }
    }

    pub fn new_no_params(method: impl Into<String>) -> Self {
        Self::new(method, None)
    }
}
