//! Inbound message entry point and command dispatch.
//!
//! # Processing order for one channel event
//!
//! 1. Origin gate.  A rejected origin is dropped without a reply.
//! 2. Envelope check.  A payload that is not an object with a non-empty
//!    string `type` is dropped without a reply.
//! 3. `PING` is answered at once, whatever the readiness state.
//! 4. Before Ready (or while older commands still wait for their replay),
//!    the command is queued.
//! 5. Otherwise it is dispatched and exactly one response is posted to the
//!    sender's origin.  Replies are never broadcast.
//!
//! # Command table
//!
//! | Type                      | Success data                             |
//! |---------------------------|------------------------------------------|
//! | `GET_LAYERS`              | `{layers: [...]}`                        |
//! | `TOGGLE_LAYER_VISIBILITY` | `{layerId, visible}`                     |
//! | `GET_MAP_INFO`            | `{extent, projection, center, zoom, scales}`, each nullable |
//! | `INIT_CONFIG`             | none                                     |
//! | `PING`                    | `{pong: true, version, ready}`           |
//!
//! Anything else is answered with `success: false` and
//! `"unknown message type: <type>"`.

use mapframe_core::protocol::messages::{LayerStateChangedData, LayersData, PingData};
use mapframe_core::{types, MapInfo, Message, Notification, OutboundMessage, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::bridge::Bridge;
use crate::domain::{BridgeError, ChannelEvent, HostHandle, TargetOrigin};

/// A recognized command with its validated payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetLayers,
    ToggleLayerVisibility { layer_id: String, visible: bool },
    GetMapInfo,
    InitConfig(Option<Value>),
    Ping,
}

impl Command {
    /// Maps a message to a command, validating required payload fields.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownCommand`] for an unrecognized `type`.
    /// - [`BridgeError::MissingField`] / [`BridgeError::InvalidField`] for a
    ///   toggle without a usable `layerId`, or with a non-boolean `visible`.
    ///
    /// A missing or `null` `visible` means hidden.
    pub fn parse(message: &Message) -> Result<Self, BridgeError> {
        match message.kind.as_str() {
            types::GET_LAYERS => Ok(Command::GetLayers),
            types::TOGGLE_LAYER_VISIBILITY => {
                let layer_id = match message.data_field("layerId") {
                    None | Some(Value::Null) => return Err(BridgeError::MissingField("layerId")),
                    Some(Value::String(id)) if id.is_empty() => {
                        return Err(BridgeError::MissingField("layerId"))
                    }
                    Some(Value::String(id)) => id.clone(),
                    Some(other) => {
                        return Err(BridgeError::InvalidField {
                            field: "layerId",
                            reason: format!("expected a string, got {other}"),
                        })
                    }
                };
                let visible = match message.data_field("visible") {
                    Some(Value::Bool(v)) => *v,
                    None | Some(Value::Null) => false,
                    Some(other) => {
                        return Err(BridgeError::InvalidField {
                            field: "visible",
                            reason: format!("expected a boolean, got {other}"),
                        })
                    }
                };
                Ok(Command::ToggleLayerVisibility { layer_id, visible })
            }
            types::GET_MAP_INFO => Ok(Command::GetMapInfo),
            types::INIT_CONFIG => Ok(Command::InitConfig(message.data.clone())),
            types::PING => Ok(Command::Ping),
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }
}

fn encode<T: Serialize>(data: &T) -> Result<Option<Value>, BridgeError> {
    serde_json::to_value(data)
        .map(Some)
        .map_err(|e| BridgeError::Encode(e.to_string()))
}

/// Reads the map view, with every field `None` when there is no map.
pub fn map_info(host: Option<&HostHandle>) -> MapInfo {
    let Some(map) = host.and_then(|h| h.app().map()) else {
        return MapInfo::default();
    };
    MapInfo {
        extent: map.extent(),
        projection: map.projection(),
        center: map.center(),
        zoom: map.zoom(),
        scales: map.scales(),
    }
}

impl Bridge {
    /// Channel receive event handler.
    pub fn on_message(&mut self, event: ChannelEvent) {
        let ChannelEvent { origin, data } = event;

        if !self.validator.is_valid(&origin) {
            warn!("blocked message from invalid origin: {origin}");
            return;
        }

        let message = match Message::from_value(data) {
            Ok(m) => m,
            Err(e) => {
                debug!("ignored invalid message from {origin}: {e}");
                return;
            }
        };
        debug!("received {} from {origin}", message.kind);

        if message.is_ping() {
            self.dispatch(&origin, &message);
            return;
        }

        if !self.is_ready() || !self.queue.is_empty() {
            self.queue.enqueue(&origin, message);
            return;
        }

        self.dispatch(&origin, &message);
    }

    /// Runs one command and posts its single response to `origin`.
    pub(super) fn dispatch(&mut self, origin: &str, message: &Message) {
        let result = Command::parse(message).and_then(|cmd| self.execute(origin, cmd));
        let now = self.now();
        let response = match result {
            Ok(data) => Response::success(message, data, now),
            Err(e) => {
                error!("error handling {}: {e}", message.kind);
                Response::failure(message, e.to_string(), now)
            }
        };
        self.post(
            OutboundMessage::Response(response),
            TargetOrigin::Exact(origin.to_string()),
        );
    }

    fn execute(&mut self, origin: &str, command: Command) -> Result<Option<Value>, BridgeError> {
        match command {
            Command::GetLayers => {
                let host = self.locator.cached().cloned();
                let layers = self.registry.list_layers(host.as_ref());
                encode(&LayersData { layers })
            }
            Command::ToggleLayerVisibility { layer_id, visible } => {
                let host = self
                    .locator
                    .cached()
                    .cloned()
                    .ok_or(BridgeError::HostUnavailable)?;
                self.registry.set_visibility(&host, &layer_id, visible)?;

                let changed = Notification::layer_state_changed(&layer_id, visible, self.now());
                self.post(
                    OutboundMessage::LayerStateChanged(changed),
                    TargetOrigin::Exact(origin.to_string()),
                );
                encode(&LayerStateChangedData { layer_id, visible })
            }
            Command::GetMapInfo => encode(&map_info(self.locator.cached())),
            Command::InitConfig(data) => {
                info!("received init config: {}", data.unwrap_or(serde_json::Value::Null));
                Ok(None)
            }
            Command::Ping => encode(&PingData {
                pong: true,
                version: self.config.version.clone(),
                ready: self.is_ready(),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
