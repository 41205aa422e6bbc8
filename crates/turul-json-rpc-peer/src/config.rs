//! Configuration types for a peer

use serde::{Deserialize, Serialize};

/// Main peer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// How outgoing request ids are generated
    pub request_ids: IdStrategy,

    /// Fail outstanding requests with [`PeerError::Closed`](crate::PeerError::Closed)
    /// when the peer ends
    pub fail_pending_on_end: bool,

    /// Message logging configuration
    pub logging: LoggingConfig,
}

/// Request id generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Monotonic integer counter scoped to the peer, starting at 1
    #[default]
    Counter,
    /// Random v4 UUID strings
    Uuid,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Trace every raw inbound message
    pub log_inbound: bool,

    /// Trace every raw outbound message
    pub log_outbound: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            request_ids: IdStrategy::Counter,
            fail_pending_on_end: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl PeerConfig {
    pub fn with_request_ids(mut self, strategy: IdStrategy) -> Self {
        self.request_ids = strategy;
        self
    }

    pub fn with_fail_pending_on_end(mut self, enabled: bool) -> Self {
        self.fail_pending_on_end = enabled;
        self
    }

    pub fn with_message_logging(mut self, inbound: bool, outbound: bool) -> Self {
        self.logging = LoggingConfig {
            log_inbound: inbound,
            log_outbound: outbound,
        };
        self
    }
}
