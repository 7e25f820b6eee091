//! Messages handed to the network layer

use serde::{Deserialize, Serialize};

use crate::composer::{Joint, PrivateChain};
use crate::definition::Address;

/// Protocol version of outbox entries
pub const OUTBOX_VERSION: u32 = 1;

/// One outbound delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A signed joint for gossip
    Joint { joint: Joint },

    /// Private transfer records for one recipient
    PrivatePayment {
        to: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        chains: Vec<PrivateChain>,
    },
}

/// Outbox line: a message plus when it was queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub version: u32,
    pub queued_at: i64,
    #[serde(flatten)]
    pub message: OutboundMessage,
}

impl OutboxEntry {
    pub fn new(message: OutboundMessage) -> Self {
        Self {
            version: OUTBOX_VERSION,
            queued_at: chrono::Utc::now().timestamp(),
            message,
        }
    }
}
