//! The cross-frame message channel, seen from inside the frame.

use mapframe_core::OutboundMessage;
use serde_json::Value;
use thiserror::Error;

/// Who may receive an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Only a hosting page on exactly this origin.  Used for every reply.
    Exact(String),
    /// Any hosting page.  Used for unsolicited notifications.
    Broadcast,
}

/// One inbound channel event: the sender's origin plus its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub origin: String,
    pub data: Value,
}

impl ChannelEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Errors that can occur while posting to the hosting page.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No hosting page is listening for this target.
    #[error("no hosting page available for delivery")]
    NoRecipient,

    /// The message could not be turned into JSON text.
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound half of the channel.
///
/// Implementations must not block: posting only hands the message over.
#[cfg_attr(test, mockall::automock)]
pub trait Channel: Send + Sync {
    fn post(&self, message: OutboundMessage, target: TargetOrigin) -> Result<(), ChannelError>;
}
