//! Developer-facing inspection and control surface.
//!
//! Obtained through [`Bridge::debug_surface`], which returns `None` unless
//! the bridge was configured with `debug: true`.  Everything here bypasses
//! the origin gate and the queue, so it must never be reachable from the
//! channel.

use mapframe_core::protocol::messages::TestMessage;
use mapframe_core::{BridgeConfig, LayerDescriptor, OutboundMessage};
use serde_json::Value;
use uuid::Uuid;

use super::bridge::Bridge;
use super::queue::QueuedMessage;
use super::readiness::{InitProgress, ReadinessState};
use crate::domain::{BridgeError, Probe, TargetOrigin};

pub struct DebugSurface<'a> {
    bridge: &'a mut Bridge,
}

impl<'a> DebugSurface<'a> {
    pub(super) fn new(bridge: &'a mut Bridge) -> Self {
        Self { bridge }
    }

    /// Lists layers exactly as `GET_LAYERS` would, refreshing the cache.
    pub fn list_layers(&mut self) -> Vec<LayerDescriptor> {
        let host = self.bridge.locator.cached().cloned();
        self.bridge.registry.list_layers(host.as_ref())
    }

    /// Toggles a layer without sending anything to the hosting page.
    pub fn set_visibility(&mut self, layer_id: &str, visible: bool) -> Result<(), BridgeError> {
        let host = self
            .bridge
            .locator
            .cached()
            .cloned()
            .ok_or(BridgeError::HostUnavailable)?;
        self.bridge
            .registry
            .set_visibility(&host, layer_id, visible)
            .map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.bridge.is_ready()
    }

    pub fn state(&self) -> ReadinessState {
        self.bridge.state()
    }

    /// Which probe found the mapping application.
    pub fn host_probe(&self) -> Option<Probe> {
        self.bridge.host().map(|h| h.probe())
    }

    pub fn layer_cache(&self) -> Vec<LayerDescriptor> {
        self.bridge.layer_cache()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.bridge.config()
    }

    pub fn queued_messages(&self) -> Vec<QueuedMessage> {
        self.bridge.queue.snapshot()
    }

    pub fn reinitialize(&mut self) -> InitProgress {
        self.bridge.reinitialize()
    }

    /// Broadcasts a hand-made message and returns its generated `messageId`.
    pub fn send_test_message(&mut self, kind: &str, data: Option<Value>) -> String {
        let message_id = format!("debug-{}", Uuid::new_v4());
        let message = TestMessage {
            kind: kind.to_string(),
            data,
            message_id: message_id.clone(),
        };
        self.bridge
            .post(OutboundMessage::Test(message), TargetOrigin::Broadcast);
        message_id
    }
}
