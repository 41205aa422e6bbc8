//! Decoded message shapes moving between the codec, the dispatcher and handlers.

use crate::{
    error::{JsonRpcError, JsonRpcErrorObject},
    notification::JsonRpcNotification,
    request::{JsonRpcRequest, RequestParams},
    response::JsonRpcResponse,
    types::RequestId,
};

/// A single decoded JSON-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl Payload {
    /// Short name of the payload kind, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Request(_) => "request",
            Payload::Notification(_) => "notification",
            Payload::Response(_) => "response",
            Payload::Error(_) => "error",
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Payload::Request(req) => Some(&req.id),
            Payload::Response(resp) => Some(&resp.id),
            Payload::Error(err) => err.id.as_ref(),
            Payload::Notification(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Payload::Request(req) => Some(&req.method),
            Payload::Notification(notif) => Some(&notif.method),
            Payload::Response(_) | Payload::Error(_) => None,
        }
    }
}

/// Output of [`Codec::decode`](crate::codec::Codec::decode)
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Single(Payload),
    /// Batch members are decoded independently; an invalid member does not
    /// invalidate its siblings.
    Batch(Vec<Result<Payload, JsonRpcErrorObject>>),
}

impl Decoded {
    pub fn is_batch(&self) -> bool {
        matches!(self, Decoded::Batch(_))
    }
}

/// An inbound call handed to a [`Handler`](crate::handler::Handler)
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcCall {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

impl JsonRpcCall {
    pub fn method(&self) -> &str {
        match self {
            JsonRpcCall::Request(req) => &req.method,
            JsonRpcCall::Notification(notif) => &notif.method,
        }
    }

    pub fn params(&self) -> Option<&RequestParams> {
        match self {
            JsonRpcCall::Request(req) => req.params.as_ref(),
            JsonRpcCall::Notification(notif) => notif.params.as_ref(),
        }
    }

    pub fn into_params(self) -> Option<RequestParams> {
        match self {
            JsonRpcCall::Request(req) => req.params,
            JsonRpcCall::Notification(notif) => notif.params,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcCall::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcCall::Notification(_))
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcCall::Request(req) => Some(&req.id),
            JsonRpcCall::Notification(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcCall {
    fn from(request: JsonRpcRequest) -> Self {
        JsonRpcCall::Request(request)
    }
}

impl From<JsonRpcNotification> for JsonRpcCall {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcCall::Notification(notification)
    }
}
