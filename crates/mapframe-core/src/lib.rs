//! # mapframe-core
//!
//! Shared library for the MapFrame bridge containing the cross-frame message
//! protocol and the configuration object injected into the bridge before it
//! starts.
//!
//! This crate has zero dependencies on host runtimes, timers, or sockets.
//!
//! # Architecture overview (for beginners)
//!
//! A mapping application runs inside an embedded frame.  The page that embeds
//! the frame (the *hosting page*) usually lives on a different origin, so it
//! cannot reach into the frame and call the application directly.  Instead the
//! two sides exchange JSON messages over a message channel, and a small piece
//! of code inside the frame (the *bridge*) answers them.
//!
//! This crate defines the vocabulary both sides agree on:
//!
//! - **`protocol`** – Requests (`Message`), paired replies (`Response`),
//!   unsolicited notifications (`Notification`), and the payload records they
//!   carry (`LayerDescriptor`, `MapInfo`, ...).
//!
//! - **`config`** – `BridgeConfig`, the immutable settings object (allowed
//!   origins, debug flag, timeout, version) supplied by whoever installs the
//!   bridge.

pub mod config;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mapframe_core::Message` instead of `mapframe_core::protocol::messages::Message`.
pub use config::{BridgeConfig, ConfigParseError};
pub use protocol::messages::{
    LayerDescriptor, MapInfo, Message, MessageParseError, Notification, OutboundMessage, Response,
};
pub use protocol::types;
