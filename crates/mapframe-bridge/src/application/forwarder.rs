//! Forwards the host's layer visibility changes to the hosting page.
//!
//! Once attached, every `changelayer` event whose property is `visibility`
//! and that names a layer becomes a broadcast `LAYER_STATE_CHANGED`
//! notification.  Other property changes (opacity, ordering, ...) are
//! ignored.

use std::sync::Arc;

use mapframe_core::{Notification, OutboundMessage};
use tracing::{debug, warn};

use crate::domain::{Channel, Clock, HostEvent, HostEventHandler, HostHandle, TargetOrigin};

const CHANGE_EVENT: &str = "changelayer";
const VISIBILITY_PROPERTY: &str = "visibility";

/// Subscription to the host's layer change events.
#[derive(Default)]
pub struct EventForwarder {
    handler: Option<HostEventHandler>,
}

impl EventForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.handler.is_some()
    }

    /// Subscribes to the host's change events.
    ///
    /// Returns `false` when already attached or when the host has no map
    /// event registry.
    pub fn attach(
        &mut self,
        host: &HostHandle,
        channel: Arc<dyn Channel>,
        clock: Arc<dyn Clock>,
    ) -> bool {
        if self.handler.is_some() {
            return false;
        }
        let Some(events) = host.app().map().and_then(|m| m.events()) else {
            debug!("host has no map event registry; layer changes will not be forwarded");
            return false;
        };

        let handler: HostEventHandler = Arc::new(move |event: &HostEvent| {
            if event.property.as_deref() != Some(VISIBILITY_PROPERTY) {
                return;
            }
            let Some(layer) = event.layer_name.as_deref().filter(|n| !n.is_empty()) else {
                return;
            };
            let notification = Notification::layer_state_changed(
                layer,
                event.layer_visible.unwrap_or(false),
                clock.now_ms(),
            );
            if let Err(e) = channel.post(
                OutboundMessage::LayerStateChanged(notification),
                TargetOrigin::Broadcast,
            ) {
                warn!("failed to forward change of layer {layer}: {e}");
            }
        });

        match events.register(CHANGE_EVENT, Arc::clone(&handler)) {
            Ok(()) => {
                debug!("registered layer change forwarding");
                self.handler = Some(handler);
                true
            }
            Err(e) => {
                warn!("error setting up layer change forwarding: {e}");
                false
            }
        }
    }

    /// Removes the exact handler registered by [`EventForwarder::attach`].
    pub fn detach(&mut self, host: Option<&HostHandle>) {
        let Some(handler) = self.handler.take() else {
            return;
        };
        let Some(events) = host.and_then(|h| h.app().map()).and_then(|m| m.events()) else {
            return;
        };
        if let Err(e) = events.unregister(CHANGE_EVENT, &handler) {
            debug!("error removing {CHANGE_EVENT} handler: {e}");
        }
    }
}
