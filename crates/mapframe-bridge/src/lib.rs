//! mapframe-bridge library crate.
//!
//! This crate lets a hosting page talk to a mapping application embedded in
//! a frame on another origin.  The page sends small JSON commands (list the
//! layers, toggle one, describe the map view), the bridge answers each one
//! exactly once, and it pushes unsolicited notifications when the map
//! becomes usable or a layer changes.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Hosting page (JSON over postMessage or WebSocket)
//!         ↕
//! [mapframe-bridge]
//!   ├── domain/           Capability traits for the host, Channel, Clock, errors
//!   ├── application/      Origin gate, discovery, readiness, queue, router
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── hub/        Session registry implementing Channel
//!         ├── runtime/    Tokio task that owns and pumps the Bridge
//!         └── fixture/    Simulated mapping application loaded from TOML
//!         ↕
//! Mapping application (four API shapes across releases)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, and no clock of its own.
//! - `application` depends on `domain` and `mapframe-core` only.  It never
//!   sleeps: timers are deadlines that the caller pumps.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.
//!
//! # For beginners: why a sans-IO bridge?
//!
//! The readiness state machine waits up to thirty seconds for the mapping
//! application to appear.  Because the bridge reads time from an injected
//! [`domain::Clock`] and never sleeps itself, tests can drive all thirty
//! attempts in microseconds with a manual clock, and the same code runs
//! unchanged behind the WebSocket server.

/// Domain layer: host capabilities and seams (no I/O).
pub mod domain;

/// Application layer: the bridge state machine and message handling.
pub mod application;

/// Infrastructure layer: WebSocket server, runtime task, config and fixtures.
pub mod infrastructure;
