//! Integration tests for the mapframe-core wire protocol.
//!
//! These tests start from the exact JSON text a hosting page would post and
//! check the JSON text the bridge would send back, exercising parsing,
//! response construction and serialization together through the public API.

use mapframe_core::{
    types, BridgeConfig, LayerDescriptor, Message, OutboundMessage, Response,
};
use mapframe_core::protocol::messages::{LayersData, PingData};
use serde_json::{json, Value};

fn parse(text: &str) -> Message {
    let value: Value = serde_json::from_str(text).expect("test payload must be valid JSON");
    Message::from_value(value).expect("test payload must be a well-formed message")
}

#[test]
fn test_get_layers_request_to_response_text() {
    // Arrange
    let request = parse(r#"{"type":"GET_LAYERS","messageId":"1","timestamp":1700000000000}"#);
    let layers = LayersData {
        layers: vec![LayerDescriptor {
            id: "roads".into(),
            name: "roads".into(),
            title: "Roads".into(),
            visible: true,
            kind: "layer".into(),
            geometry_type: Some("line".into()),
            wms_name: None,
            opacity: None,
        }],
    };

    // Act
    let response = Response::success(&request, Some(serde_json::to_value(&layers).unwrap()), 42);
    let text = serde_json::to_string(&OutboundMessage::Response(response)).unwrap();
    let echoed: Value = serde_json::from_str(&text).unwrap();

    // Assert
    assert_eq!(echoed["messageId"], json!("1"));
    assert_eq!(echoed["type"], json!("GET_LAYERS_RESPONSE"));
    assert_eq!(echoed["success"], json!(true));
    assert_eq!(echoed["data"]["layers"][0]["geometryType"], json!("line"));
}

#[test]
fn test_ping_reply_carries_version_and_readiness() {
    let request = parse(r#"{"type":"PING","messageId":"p-1"}"#);
    assert!(request.is_ping());

    let data = PingData {
        pong: true,
        version: "1.0.0".into(),
        ready: false,
    };
    let response = Response::success(&request, Some(serde_json::to_value(data).unwrap()), 0);

    assert_eq!(response.kind, format!("{}{}", types::PING, types::RESPONSE_SUFFIX));
    assert_eq!(
        response.data,
        Some(json!({"pong": true, "version": "1.0.0", "ready": false}))
    );
}

#[test]
fn test_toggle_payload_fields_are_reachable() {
    let request = parse(
        r#"{"type":"TOGGLE_LAYER_VISIBILITY","messageId":"t","data":{"layerId":"parcels","visible":true}}"#,
    );
    assert_eq!(request.data_field("layerId"), Some(&json!("parcels")));
    assert_eq!(request.data_field("visible"), Some(&json!(true)));
}

#[test]
fn test_injected_config_as_written_by_an_installer() {
    // The server-side installer historically wrote `timeout`, not `timeoutMs`.
    let cfg = BridgeConfig::from_json(
        r#"{"allowedOrigins":["https://maps.example","http://localhost:3000"],"debug":false,"timeout":10000,"version":"1.0.0"}"#,
    )
    .unwrap();

    assert_eq!(cfg.allowed_origins.len(), 2);
    assert_eq!(cfg.timeout_ms, 10_000);
    assert_eq!(cfg.version, "1.0.0");
}
