//! Message dispatcher: routes one decoded inbound message (or batch) to the
//! handler or the correlation table and produces the encoded reply, if any.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use crate::{
    codec::Codec,
    error::{JsonRpcErrorObject, PeerError, PeerResult},
    handler::{self, Handler},
    message::{Decoded, JsonRpcCall, Payload},
    pending::PendingRequests,
    response::ResponseResult,
};

/// What a dispatch produced for the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to send back (notification, response, error input)
    NoReply,
    /// One encoded response or error
    Reply(String),
    /// Encoded replies of a batch, in input order; may be empty
    Batch(Vec<String>),
}

impl DispatchOutcome {
    pub fn is_no_reply(&self) -> bool {
        matches!(self, DispatchOutcome::NoReply)
    }

    /// Join the outcome into a single wire message. An empty batch sends
    /// nothing.
    pub fn into_wire(self) -> Option<String> {
        match self {
            DispatchOutcome::NoReply => None,
            DispatchOutcome::Reply(reply) => Some(reply),
            DispatchOutcome::Batch(replies) if replies.is_empty() => None,
            DispatchOutcome::Batch(replies) => Some(format!("[{}]", replies.join(","))),
        }
    }
}

/// Result of one dispatch as seen by the peer
#[derive(Debug, PartialEq)]
pub(crate) enum Dispatched {
    /// An outcome, plus faults raised by batch members
    Outcome(DispatchOutcome, Vec<PeerError>),
    /// A single message faulted
    Fault(PeerError),
}

impl Dispatched {
    fn outcome(outcome: DispatchOutcome) -> Self {
        Dispatched::Outcome(outcome, vec![])
    }
}

pub(crate) struct Dispatcher {
    codec: Arc<dyn Codec>,
    handler: Arc<dyn Handler>,
    pending: Arc<PendingRequests>,
}

impl Dispatcher {
    pub fn new(
        codec: Arc<dyn Codec>,
        handler: Arc<dyn Handler>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            codec,
            handler,
            pending,
        }
    }

    /// Decode `raw` and route it.
    ///
    /// For a single message a fault replaces the outcome. Inside a batch the
    /// faulting member contributes nothing and its siblings still reply.
    pub async fn dispatch(&self, raw: &str, context: Option<Value>) -> Dispatched {
        let decoded = match self.codec.decode(raw) {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!(code = error.code, message = %error.message, "Rejecting undecodable message");
                return match self.codec.encode_error(None, &error) {
                    Ok(reply) => Dispatched::outcome(DispatchOutcome::Reply(reply)),
                    Err(fault) => Dispatched::Fault(fault),
                };
            }
        };

        match decoded {
            Decoded::Single(payload) => match self.dispatch_payload(payload, context).await {
                Ok(Some(reply)) => Dispatched::outcome(DispatchOutcome::Reply(reply)),
                Ok(None) => Dispatched::outcome(DispatchOutcome::NoReply),
                Err(fault) => Dispatched::Fault(fault),
            },
            Decoded::Batch(members) => {
                debug!(size = members.len(), "Dispatching batch");
                let results = join_all(members.into_iter().map(|member| {
                    let context = context.clone();
                    async move {
                        match member {
                            Ok(payload) => self.dispatch_payload(payload, context).await,
                            Err(error) => self.codec.encode_error(None, &error).map(Some),
                        }
                    }
                }))
                .await;

                let mut replies = Vec::new();
                let mut faults = Vec::new();
                for result in results {
                    match result {
                        Ok(Some(reply)) => replies.push(reply),
                        Ok(None) => {}
                        Err(fault) => faults.push(fault),
                    }
                }
                Dispatched::Outcome(DispatchOutcome::Batch(replies), faults)
            }
        }
    }

    async fn dispatch_payload(
        &self,
        payload: Payload,
        context: Option<Value>,
    ) -> PeerResult<Option<String>> {
        match payload {
            Payload::Error(error) => {
                let Some(id) = error.id else {
                    debug!(
                        code = error.error.code,
                        message = %error.error.message,
                        "Discarding error payload without id"
                    );
                    return Ok(None);
                };
                debug!(id = %id, code = error.error.code, "Rejecting pending request");
                self.pending.reject(&id, PeerError::from(error.error))?;
                Ok(None)
            }
            Payload::Response(response) => {
                debug!(id = %response.id, "Resolving pending request");
                self.pending
                    .resolve(&response.id, response.result.into_value())?;
                Ok(None)
            }
            Payload::Notification(notification) => {
                let method = notification.method.clone();
                let call = JsonRpcCall::Notification(notification);
                if let Err(error) = handler::invoke(&*self.handler, call, context).await {
                    debug!(method = %method, error = %error, "Notification handler failed");
                }
                Ok(None)
            }
            Payload::Request(request) => {
                let id = request.id.clone();
                let method = request.method.clone();
                let call = JsonRpcCall::Request(request);

                match handler::invoke(&*self.handler, call, context).await {
                    Ok(result) => {
                        let result = ResponseResult::from(result);
                        self.codec.encode_response(&id, &result).map(Some)
                    }
                    Err(error) => {
                        let error = name_missing_method(error, &method);
                        debug!(id = %id, method = %method, error = %error, "Request handler failed");
                        self.codec.encode_error(Some(&id), &error).map(Some)
                    }
                }
            }
        }
    }
}

/// A method-not-found failure without detail reports the requested method
fn name_missing_method(mut error: JsonRpcErrorObject, method: &str) -> JsonRpcErrorObject {
    if error.is_method_not_found() && error.data.is_none() {
        error.data = Some(Value::String(method.to_string()));
    }
    error
}
