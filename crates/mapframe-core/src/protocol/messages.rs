//! JSON message types for the cross-frame protocol.
//!
//! The hosting page and the bridge exchange plain JSON objects.  Three shapes
//! travel over the channel:
//!
//! ```text
//! Hosting page → Bridge:  Message       {type, messageId, data?, timestamp}
//! Bridge → Hosting page:  Response      {messageId, type: "<TYPE>_RESPONSE", success, data?, error?, timestamp}
//! Bridge → Hosting page:  Notification  {type, data, timestamp}   (unsolicited)
//! ```
//!
//! # Correlation
//!
//! `messageId` is chosen by the caller and is opaque to the bridge.  It is
//! stored as a raw [`serde_json::Value`] so that it can be echoed back
//! byte-for-byte, whatever the caller put there.
//!
//! # Why is `Message` not a tagged enum?
//!
//! Unknown message types must still produce a reply (`success: false`,
//! `"unknown message type: ..."`), so the bridge has to parse the envelope
//! before it knows whether the tag is one it understands.  Command decoding
//! happens one layer up, in the bridge's router.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::protocol::types;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons an inbound payload is not a well-formed [`Message`].
///
/// These never produce a reply: a payload that does not look like a message
/// is dropped by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The payload is a JSON array, string, number, boolean, or null.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The object has no `type` field, or the field is not a non-empty string.
    #[error("payload has no non-empty string `type` field")]
    MissingType,
}

// ── Hosting page → Bridge ─────────────────────────────────────────────────────

/// A request sent by the hosting page.
///
/// # Serde representation
///
/// ```json
/// {"type":"GET_LAYERS","messageId":"1","timestamp":1700000000000}
/// {"type":"TOGGLE_LAYER_VISIBILITY","messageId":"2","data":{"layerId":"roads","visible":false}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Command tag, e.g. `"GET_LAYERS"`.  See [`crate::types`].
    #[serde(rename = "type")]
    pub kind: String,

    /// Caller-chosen correlation id, echoed unchanged on the paired response.
    ///
    /// `null` when the caller omitted it.
    #[serde(rename = "messageId", default)]
    pub message_id: Value,

    /// Command-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Sender timestamp, usually milliseconds.  Informational only, so any
    /// JSON value is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl Message {
    /// Creates a message with the given type tag and a string correlation id.
    pub fn new(kind: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message_id: Value::String(message_id.into()),
            data: None,
            timestamp: None,
        }
    }

    /// Attaches a command payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parses an inbound channel payload.
    ///
    /// # Errors
    ///
    /// - [`MessageParseError::NotAnObject`] if `value` is not a JSON object.
    /// - [`MessageParseError::MissingType`] if `type` is absent, empty, or not
    ///   a string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mapframe_core::Message;
    /// use serde_json::json;
    ///
    /// let msg = Message::from_value(json!({"type": "PING", "messageId": "7"})).unwrap();
    /// assert_eq!(msg.kind, "PING");
    /// assert!(Message::from_value(json!(["PING"])).is_err());
    /// ```
    pub fn from_value(value: Value) -> Result<Self, MessageParseError> {
        let Value::Object(mut object) = value else {
            return Err(MessageParseError::NotAnObject);
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => return Err(MessageParseError::MissingType),
        };

        // Only `type` is validated; the other envelope fields are carried as-is.
        Ok(Self {
            kind,
            message_id: object.remove("messageId").unwrap_or(Value::Null),
            data: object.remove("data").filter(|d| !d.is_null()),
            timestamp: object.remove("timestamp").filter(|t| !t.is_null()),
        })
    }

    /// Returns `data[key]`, or `None` when there is no payload or no such key.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Returns `true` for the liveness probe, the only command that bypasses
    /// the pre-readiness queue.
    pub fn is_ping(&self) -> bool {
        self.kind == types::PING
    }
}

// ── Bridge → Hosting page: paired responses ───────────────────────────────────

/// The single reply paired with an accepted [`Message`].
///
/// # Serde representation
///
/// ```json
/// {"messageId":"1","type":"GET_LAYERS_RESPONSE","success":true,"data":{"layers":[]},"timestamp":1700000000000}
/// {"messageId":"9","type":"FOO_RESPONSE","success":false,"error":"unknown message type: FOO","timestamp":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Copied from the originating message.
    #[serde(rename = "messageId")]
    pub message_id: Value,

    /// Originating type plus `_RESPONSE`.
    #[serde(rename = "type")]
    pub kind: String,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Human-readable failure description.  Present only when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Bridge clock in milliseconds when the reply was built.
    pub timestamp: u64,
}

impl Response {
    /// Builds a successful reply to `request`.
    pub fn success(request: &Message, data: Option<Value>, timestamp: u64) -> Self {
        Self {
            message_id: request.message_id.clone(),
            kind: types::response_type(&request.kind),
            success: true,
            data,
            error: None,
            timestamp,
        }
    }

    /// Builds a failed reply to `request`.
    pub fn failure(request: &Message, error: impl Into<String>, timestamp: u64) -> Self {
        Self {
            message_id: request.message_id.clone(),
            kind: types::response_type(&request.kind),
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

// ── Bridge → Hosting page: unsolicited notifications ──────────────────────────

/// An unsolicited message.  Carries no `messageId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
    pub timestamp: u64,
}

/// Payload of `BRIDGE_READY`.
///
/// Summarises the configuration: the hosting page learns how many
/// origins are allowed, never which ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReadyData {
    pub timestamp: u64,
    pub version: String,
    pub config: ConfigSummary,
}

/// Non-sensitive view of the active configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    /// Number of entries in the allow-list.
    #[serde(rename = "allowedOrigins")]
    pub allowed_origins: usize,
    pub debug: bool,
}

/// Payload of `LAYER_STATE_CHANGED`, also the success data of a toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStateChangedData {
    #[serde(rename = "layerId")]
    pub layer_id: String,
    pub visible: bool,
}

impl Notification<BridgeReadyData> {
    /// Builds a `BRIDGE_READY` notification.
    pub fn bridge_ready(version: &str, summary: ConfigSummary, timestamp: u64) -> Self {
        Self {
            kind: types::BRIDGE_READY.to_string(),
            data: BridgeReadyData {
                timestamp,
                version: version.to_string(),
                config: summary,
            },
            timestamp,
        }
    }
}

impl Notification<LayerStateChangedData> {
    /// Builds a `LAYER_STATE_CHANGED` notification.
    pub fn layer_state_changed(layer_id: &str, visible: bool, timestamp: u64) -> Self {
        Self {
            kind: types::LAYER_STATE_CHANGED.to_string(),
            data: LayerStateChangedData {
                layer_id: layer_id.to_string(),
                visible,
            },
            timestamp,
        }
    }
}

/// A hand-crafted message emitted from the debug surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// Everything the bridge can put on the channel.
///
/// `untagged` because every variant already carries its own `type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Response(Response),
    BridgeReady(Notification<BridgeReadyData>),
    LayerStateChanged(Notification<LayerStateChangedData>),
    Test(TestMessage),
}

impl OutboundMessage {
    /// Returns the wire `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            OutboundMessage::Response(r) => &r.kind,
            OutboundMessage::BridgeReady(n) => &n.kind,
            OutboundMessage::LayerStateChanged(n) => &n.kind,
            OutboundMessage::Test(t) => &t.kind,
        }
    }

    /// Returns the paired response, if this is one.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            OutboundMessage::Response(r) => Some(r),
            _ => None,
        }
    }
}

// ── Payload records ───────────────────────────────────────────────────────────

/// A normalised layer, whichever application API shape it came from.
///
/// `id` is the stable identifier accepted by `TOGGLE_LAYER_VISIBILITY`.
/// `visible` is the last observed state and may lag the live application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    pub id: String,
    pub name: String,
    pub title: String,
    pub visible: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wms_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// Success data of `GET_LAYERS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayersData {
    pub layers: Vec<LayerDescriptor>,
}

/// Success data of `GET_MAP_INFO`.  Every field is `null` when unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// `[left, bottom, right, top]` in map units.
    pub extent: Option<[f64; 4]>,
    /// Projection code, e.g. `"EPSG:3857"`.
    pub projection: Option<String>,
    /// `[x, y]` in map units.
    pub center: Option<[f64; 2]>,
    pub zoom: Option<f64>,
    pub scales: Option<Vec<f64>>,
}

/// Success data of `PING`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingData {
    pub pong: bool,
    pub version: String,
    pub ready: bool,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
