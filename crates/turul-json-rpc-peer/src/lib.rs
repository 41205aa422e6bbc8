//! # Bidirectional JSON-RPC 2.0 Peer
//!
//! A transport-agnostic JSON-RPC 2.0 endpoint that acts as requester and
//! responder at the same time over a single duplex channel.
//!
//! ## Features
//! - Outbound requests with id allocation and response correlation
//! - Inbound requests and notifications routed to a pluggable [`Handler`]
//! - Batch messages, answered with one combined reply
//! - Duplex adapter: feed inbound text with [`Peer::write`], observe outbound
//!   text through subscribers, channels or [`Peer::pipe`]
//! - Pluggable wire [`Codec`], JSON by default
//!
//! ```rust,no_run
//! use serde_json::json;
//! use turul_json_rpc_peer::prelude::*;
//!
//! # async fn demo() -> Result<(), PeerError> {
//! let server = Peer::with_handler(handler_fn(|call: JsonRpcCall, _ctx| {
//!     call.into_params().map(|p| p.to_value()).unwrap_or(json!(null))
//! }));
//! let client = Peer::new();
//!
//! client.pipe(server.clone()).pipe(client.clone());
//! let echoed = client.send("echo", Some(vec![json!(42)].into())).await?;
//! assert_eq!(echoed, json!([42]));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod duplex;
pub mod error;
pub mod handler;
pub mod message;
pub mod notification;
pub mod peer;
pub mod pending;
pub mod request;
pub mod response;
pub mod types;

pub mod prelude;

// Re-export main types
pub use codec::{Codec, JsonCodec};
pub use config::{IdStrategy, LoggingConfig, PeerConfig};
pub use dispatch::DispatchOutcome;
pub use duplex::{PeerEvent, SubscriptionId, Writable};
pub use error::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, PeerError, PeerResult, ToJsonRpcError,
};
pub use handler::{
    DefaultHandler, Handler, HandlerOutput, HandlerResult, JsonRpcHandler, MethodRouter,
    async_handler_fn, handler_fn,
};
pub use message::{Decoded, JsonRpcCall, Payload};
pub use notification::JsonRpcNotification;
pub use peer::{Peer, PeerBuilder, WeakPeer};
pub use pending::{PendingRequests, PendingResponse};
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcResponse, ResponseResult};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
