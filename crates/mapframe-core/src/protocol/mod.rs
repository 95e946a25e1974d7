//! Protocol module containing the cross-frame message types.

pub mod messages;
pub mod types;

pub use messages::*;
