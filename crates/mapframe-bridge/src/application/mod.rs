//! Application layer for mapframe-bridge.
//!
//! The application layer is the bridge itself: it knows *what* to do with
//! each inbound message and each timer, but delegates *how* a message reaches
//! the hosting page to a [`crate::domain::Channel`] and *what time it is* to
//! a [`crate::domain::Clock`].
//!
//! # Responsibilities
//!
//! - Gating inbound messages on their origin (`origin`)
//! - Finding the mapping application (`host_locator`)
//! - Listing and toggling layers across application releases (`layer_registry`)
//! - The readiness state machine and its timers (`readiness`, `scheduler`)
//! - Buffering commands until readiness (`queue`)
//! - Dispatching commands and posting responses (`router`)
//! - Forwarding the host's layer changes (`forwarder`)
//! - Wiring, teardown and the debug surface (`bridge`, `debug`)
//!
//! # What does NOT belong here?
//!
//! - Sockets, tasks, or sleeping (that is infrastructure)
//! - Reading configuration files (also infrastructure)

pub mod bridge;
pub mod debug;
pub mod forwarder;
pub mod host_locator;
pub mod layer_registry;
pub mod origin;
pub mod queue;
pub mod readiness;
pub mod router;
pub mod scheduler;

pub use bridge::Bridge;
pub use debug::DebugSurface;
pub use forwarder::EventForwarder;
pub use host_locator::HostLocator;
pub use layer_registry::{LayerRegistry, ToggleStrategy};
pub use origin::OriginValidator;
pub use queue::{MessageQueue, QueuedMessage};
pub use readiness::{InitProgress, ReadinessController, ReadinessState};
pub use router::Command;
pub use scheduler::{Scheduler, TimerKind};
