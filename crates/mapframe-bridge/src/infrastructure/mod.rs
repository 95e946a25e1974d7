//! Infrastructure layer for mapframe-bridge.
//!
//! The infrastructure layer handles all I/O and everything that stands in
//! for the hosting environment.
//!
//! # Responsibilities
//!
//! - Real and virtual clocks
//! - Binding a TCP listener for hosting-page WebSocket connections and
//!   performing the upgrade handshake
//! - Routing outbound messages to the right sessions
//! - Driving the bridge from a Tokio task
//! - Reading configuration files and host fixtures
//!
//! # What does NOT belong here?
//!
//! - Protocol or readiness logic (that is the application layer)
//! - Host capability definitions (that is the domain layer)

pub mod clock;
pub mod config_file;
pub mod fixture;
pub mod hub;
pub mod recording;
pub mod runtime;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use runtime::run_bridge;
pub use ws_server::run_server;
