//! Message type tags used on the wire.
//!
//! Every request carries one of these strings in its `type` field.  The paired
//! reply uses the same tag with [`RESPONSE_SUFFIX`] appended, e.g.
//! `GET_LAYERS` → `GET_LAYERS_RESPONSE`.

/// Lists the layers of the mapping application.
pub const GET_LAYERS: &str = "GET_LAYERS";

/// Shows or hides one layer.  Requires `data.layerId` and `data.visible`.
pub const TOGGLE_LAYER_VISIBILITY: &str = "TOGGLE_LAYER_VISIBILITY";

/// Reads the current extent, projection, center, zoom and scales.
pub const GET_MAP_INFO: &str = "GET_MAP_INFO";

/// Hands the bridge an informational configuration payload.  Acknowledged only.
pub const INIT_CONFIG: &str = "INIT_CONFIG";

/// Liveness probe.  Answered immediately, even before the bridge is ready.
pub const PING: &str = "PING";

/// Unsolicited: the bridge finished starting up.
pub const BRIDGE_READY: &str = "BRIDGE_READY";

/// Unsolicited: a layer's visibility changed.
pub const LAYER_STATE_CHANGED: &str = "LAYER_STATE_CHANGED";

/// Suffix appended to a request's type to form its response type.
pub const RESPONSE_SUFFIX: &str = "_RESPONSE";

/// Returns the response type tag for a request type tag.
///
/// ```rust
/// use mapframe_core::types::response_type;
///
/// assert_eq!(response_type("PING"), "PING_RESPONSE");
/// ```
pub fn response_type(request_type: &str) -> String {
    format!("{request_type}{RESPONSE_SUFFIX}")
}
