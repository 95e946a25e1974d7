//! Domain layer for mapframe-bridge.
//!
//! The domain layer contains the types the bridge reasons about, with no
//! dependency on sockets, async runtimes, or a real clock.
//!
//! # What belongs in the domain layer?
//!
//! - Capability traits for the hosting runtime and the mapping application
//! - The `HostHandle` produced by discovery
//! - The outbound `Channel` and `Clock` seams
//! - Error types that describe business-logic failures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block

pub mod channel;
pub mod clock;
pub mod error;
pub mod handle;
pub mod host;

pub use channel::{Channel, ChannelError, ChannelEvent, TargetOrigin};
pub use clock::Clock;
pub use error::{BridgeError, StrategyError};
pub use handle::{HostHandle, HostShape, Probe};
pub use host::{
    ActionDispatcher, AppState, EventSurface, GlobalScope, HostError, HostEvent, HostEventHandler,
    LayerConfigEntry, LayerTreeInstance, LayerTreeNode, LegacyEventBus, MapApplication,
    MapSurface, RenderLayer, TreeConfigEntry,
};
