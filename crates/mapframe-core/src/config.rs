//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the object the installer injects into the bridge's
//! execution context before the bridge starts.  The bridge never mutates it.
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads inside this crate) makes the bridge easy to construct in tests.  The
//! binary is responsible for populating the struct from a file or from an
//! injected JSON object.
//!
//! # Defaults
//!
//! Every field may be absent from the injected object:
//!
//! | Field            | Default                          |
//! |------------------|----------------------------------|
//! | `allowedOrigins` | `[]` (permissive, warned about)  |
//! | `debug`          | `false`                          |
//! | `timeoutMs`      | `10000`                          |
//! | `version`        | this crate's package version     |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::ConfigSummary;

/// Default value of [`BridgeConfig::timeout_ms`].
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Error returned when an injected configuration object cannot be parsed.
#[derive(Debug, Error)]
#[error("invalid bridge configuration: {0}")]
pub struct ConfigParseError(#[from] serde_json::Error);

/// Immutable settings for one bridge instance.
///
/// # Example
///
/// ```rust
/// use mapframe_core::BridgeConfig;
///
/// let cfg = BridgeConfig::from_json(r#"{"allowedOrigins":["https://portal.example"]}"#).unwrap();
/// assert_eq!(cfg.allowed_origins.len(), 1);
/// assert_eq!(cfg.timeout_ms, 10_000);
/// assert!(!cfg.debug);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Origins allowed to talk to the bridge.  May contain `"*"`.
    ///
    /// An empty list lets every origin through (with a warning on each
    /// message).
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Enables verbose logging and the debug surface.
    #[serde(default)]
    pub debug: bool,

    /// Upper bound, in milliseconds, for channel setup (e.g. the hosting
    /// page's connection handshake).
    ///
    /// `0` leaves the handshake unbounded.  `timeout` is the key older
    /// installers wrote.
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,

    /// Version string reported in `PING` and `BRIDGE_READY`.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            debug: false,
            timeout_ms: default_timeout_ms(),
            version: default_version(),
        }
    }
}

impl BridgeConfig {
    /// Parses an injected JSON configuration object.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigParseError`] if `json` is not an object or a field has
    /// the wrong type.  Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigParseError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the non-sensitive summary announced in `BRIDGE_READY`.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            allowed_origins: self.allowed_origins.len(),
            debug: self.debug,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
