//! Error types shared by the application layer.

use thiserror::Error;

use super::host::HostError;

/// Failures a command or the startup sequence can report.
///
/// Command failures are turned into a `success: false` response whose
/// `error` is this type's `Display` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The message had a valid shape but an unrecognized `type`.
    #[error("unknown message type: {0}")]
    UnknownCommand(String),

    /// A command payload lacks a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A command payload field has the wrong JSON type.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// The command needs the mapping application and none has been found.
    #[error("mapping application not available")]
    HostUnavailable,

    /// Every visibility strategy was unavailable or failed.
    #[error("no visibility strategy succeeded for layer {layer_id}")]
    NoStrategySucceeded { layer_id: String },

    /// Discovery exhausted its retry bound.  The only fatal condition.
    #[error("failed to find the mapping application after {attempts} attempts")]
    DiscoveryFailed { attempts: u32 },

    /// Success data could not be encoded as JSON.
    #[error("failed to encode response data: {0}")]
    Encode(String),
}

/// Outcome of one strategy in a strategy chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The host does not expose what this strategy needs; try the next one.
    #[error("strategy not available on this host")]
    Unavailable,

    /// The host exposed the API but the call failed; try the next one.
    #[error(transparent)]
    Failed(#[from] HostError),
}
