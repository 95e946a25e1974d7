//! Bridge configuration loaded from disk.
//!
//! Two formats are accepted:
//!
//! - **JSON** (`*.json`): the exact object an installer injects into the
//!   frame, parsed with [`BridgeConfig::from_json`].
//! - **TOML** (anything else): the server-side plugin settings the installer
//!   derives that object from.
//!
//! # TOML layout
//!
//! ```toml
//! [global]
//! timeout = 10000
//!
//! [cors]
//! # Either a comma-separated string or a list.
//! allowed_origins = "https://portal.example, https://intranet.example"
//!
//! [debug]
//! enabled = false
//! ```
//!
//! # Origin assembly
//!
//! The allow-list handed to the bridge is built in this order, duplicates
//! removed with the first occurrence kept:
//!
//! 1. The bridge's own origin, when known.
//! 2. Every configured origin, trimmed, empty entries dropped.
//! 3. With debug on, the local development origins in [`DEV_ORIGINS`].

use std::path::{Path, PathBuf};

use mapframe_core::{config::DEFAULT_TIMEOUT_MS, BridgeConfig, ConfigParseError};
use serde::Deserialize;
use thiserror::Error;

/// Origins added to the allow-list when debug is enabled.
pub const DEV_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "http://127.0.0.1:3000",
];

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The JSON content could not be parsed.
    #[error(transparent)]
    Json(#[from] ConfigParseError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Plugin settings as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default)]
    pub cors: CorsSection,
    #[serde(default)]
    pub debug: DebugSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlobalSection {
    /// Channel setup timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorsSection {
    #[serde(default)]
    pub allowed_origins: Option<OriginList>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DebugSection {
    #[serde(default)]
    pub enabled: bool,
}

/// `allowed_origins` written either way.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OriginList {
    Csv(String),
    List(Vec<String>),
}

impl OriginList {
    fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            OriginList::Csv(s) => s.split(',').collect(),
            OriginList::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

// ── Assembly ──────────────────────────────────────────────────────────────────

impl ConfigFile {
    /// Parses TOML plugin settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the injected configuration object from these settings.
    pub fn into_bridge_config(self, self_origin: Option<&str>) -> BridgeConfig {
        let mut origins: Vec<String> = Vec::new();
        let mut push = |origin: String| {
            if !origins.contains(&origin) {
                origins.push(origin);
            }
        };

        if let Some(own) = self_origin.map(str::trim).filter(|s| !s.is_empty()) {
            push(own.to_string());
        }
        if let Some(list) = &self.cors.allowed_origins {
            list.entries().into_iter().for_each(&mut push);
        }
        if self.debug.enabled {
            DEV_ORIGINS.iter().map(|s| s.to_string()).for_each(&mut push);
        }

        BridgeConfig {
            allowed_origins: origins,
            debug: self.debug.enabled,
            timeout_ms: self.global.timeout,
            ..BridgeConfig::default()
        }
    }
}

/// Loads a bridge configuration from `path`.
///
/// `.json` files are read as an injected configuration object and used as-is;
/// `self_origin` only applies to TOML plugin settings.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load(path: &Path, self_origin: Option<&str>) -> Result<BridgeConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(BridgeConfig::from_json(&text)?)
    } else {
        Ok(ConfigFile::from_toml_str(&text)?.into_bridge_config(self_origin))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
