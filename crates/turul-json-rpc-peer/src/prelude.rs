//! # JSON-RPC Peer Prelude
//!
//! Re-exports the types needed to build, connect and serve a peer.
//!
//! ```rust
//! use turul_json_rpc_peer::prelude::*;
//! ```

// Peer and duplex plumbing
pub use crate::config::{IdStrategy, PeerConfig};
pub use crate::dispatch::DispatchOutcome;
pub use crate::duplex::{PeerEvent, SubscriptionId, Writable};
pub use crate::peer::{Peer, PeerBuilder, WeakPeer};

// Handlers
pub use crate::handler::{
    Handler, HandlerOutput, HandlerResult, JsonRpcHandler, MethodRouter, async_handler_fn,
    handler_fn,
};
pub use crate::message::JsonRpcCall;

// Core JSON-RPC types
pub use crate::error::{JsonRpcErrorCode, JsonRpcErrorObject, PeerError, PeerResult, ToJsonRpcError};
pub use crate::request::RequestParams;
pub use crate::types::RequestId;

// Standard error codes
pub use crate::error_codes::*;
