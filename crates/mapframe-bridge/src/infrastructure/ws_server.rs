//! WebSocket server: accept loop and per-session task management.
//!
//! A hosting page that cannot share a browsing context with the bridge
//! connects here instead.  This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each connection to a WebSocket session and recording the
//!    `Origin` header the page presented during the handshake.
//! 3. Registering the session with the [`SessionHub`] so the bridge can post
//!    replies and notifications to it.
//! 4. Turning each inbound JSON text frame into a [`ChannelEvent`] tagged
//!    with the session's origin and handing it to the bridge task.
//! 5. Gracefully shutting down when the `running` flag is cleared.
//!
//! The origin gate itself lives in the bridge: this server accepts every
//! handshake and lets the allow-list decide what is acted on, exactly as a
//! browser delivers every `postMessage` and leaves filtering to the listener.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::domain::ChannelEvent;
use crate::infrastructure::hub::SessionHub;

/// Origin recorded for a handshake that carried no `Origin` header.
///
/// Browsers use the same literal for opaque origins (sandboxed frames,
/// `file:` pages), so the allow-list treats both cases identically.
pub const OPAQUE_ORIGIN: &str = "null";

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Converts the configured `timeoutMs` into a handshake limit.
///
/// `0` means the handshake is not bounded.
pub fn handshake_limit(timeout_ms: u64) -> Option<Duration> {
    (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms))
}

/// Binds `bind_addr` and runs the accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    bind_addr: SocketAddr,
    handshake_timeout: Option<Duration>,
    hub: Arc<SessionHub>,
    inbound: UnboundedSender<ChannelEvent>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {bind_addr}"))?;

    info!("mapframe bridge listening on {bind_addr}");
    serve(listener, handshake_timeout, hub, inbound, running).await;
    Ok(())
}

/// Runs the accept loop on an already bound listener.
///
/// Split out of [`run_server`] so tests can bind port 0 and read back the
/// address the OS picked.
pub async fn serve(
    listener: TcpListener,
    handshake_timeout: Option<Duration>,
    hub: Arc<SessionHub>,
    inbound: UnboundedSender<ChannelEvent>,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Without the timeout the loop would block forever on `accept()` and
        // never see the flag change.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new hosting-page connection from {peer_addr}");
                let hub = Arc::clone(&hub);
                let inbound = inbound.clone();
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, handshake_timeout, hub, inbound).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll window.
            }
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handshake_timeout: Option<Duration>,
    hub: Arc<SessionHub>,
    inbound: UnboundedSender<ChannelEvent>,
) {
    match run_session(stream, peer_addr, handshake_timeout, hub, inbound).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one hosting-page session.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or does not finish
/// within `handshake_timeout` (when one is set).
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handshake_timeout: Option<Duration>,
    hub: Arc<SessionHub>,
    inbound: UnboundedSender<ChannelEvent>,
) -> anyhow::Result<()> {
    // ── Step 1: Handshake, capturing the Origin header ────────────────────────
    let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&captured);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut slot) = capture.lock() {
            *slot = origin;
        }
        Ok(resp)
    };

    let handshake = accept_hdr_async(stream, callback);
    let ws_stream = match handshake_timeout {
        Some(limit) => timeout(limit, handshake)
            .await
            .with_context(|| format!("WebSocket handshake with {peer_addr} timed out"))?,
        None => handshake.await,
    }
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let origin = captured
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .unwrap_or_else(|| OPAQUE_ORIGIN.to_string());

    // ── Step 2: Register with the hub ─────────────────────────────────────────
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let session_id = hub.register(origin.clone(), out_tx);
    info!("session {session_id} established from {peer_addr} (origin {origin})");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Task A: Bridge → hosting page ─────────────────────────────────────────
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {session_id}: send failed (hosting page disconnected)");
                break;
            }
        }
    });

    // ── Task B (inline): Hosting page → bridge ────────────────────────────────
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("session {session_id}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("session {session_id}: WebSocket error: {e}");
                break;
            }
            None => {
                debug!("session {session_id}: stream ended");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                let data: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        // A browser listener would simply see a non-object
                        // payload; drop it and keep the session open.
                        debug!("session {session_id}: ignoring non-JSON frame: {e}");
                        continue;
                    }
                };
                if inbound.send(ChannelEvent::new(origin.clone(), data)).is_err() {
                    debug!("session {session_id}: bridge task has stopped");
                    break;
                }
            }
            WsMessage::Binary(_) => {
                debug!("session {session_id}: unexpected binary frame (ignored)");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            WsMessage::Close(_) => {
                debug!("session {session_id}: Close frame received");
                break;
            }
        }
    }

    hub.unregister(session_id);
    writer.abort();
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mapframe_core::{Notification, OutboundMessage};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use crate::domain::{Channel, TargetOrigin};

    async fn start() -> (
        SocketAddr,
        Arc<SessionHub>,
        mpsc::UnboundedReceiver<ChannelEvent>,
        Arc<AtomicBool>,
    ) {
        start_with(Some(Duration::from_secs(5))).await
    }

    async fn start_with(
        handshake_timeout: Option<Duration>,
    ) -> (
        SocketAddr,
        Arc<SessionHub>,
        mpsc::UnboundedReceiver<ChannelEvent>,
        Arc<AtomicBool>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(SessionHub::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(serve(
            listener,
            handshake_timeout,
            Arc::clone(&hub),
            tx,
            Arc::clone(&running),
        ));
        (addr, hub, rx, running)
    }

    #[test]
    fn test_zero_timeout_means_unbounded_handshake() {
        assert_eq!(handshake_limit(0), None);
        assert_eq!(handshake_limit(2_500), Some(Duration::from_millis(2_500)));
    }

    #[tokio::test]
    async fn test_unbounded_handshake_still_accepts_sessions() {
        // Arrange
        let (addr, _hub, mut rx, running) = start_with(handshake_limit(0)).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Act
        ws.send(WsMessage::Text(
            json!({"type": "PING", "messageId": "z"}).to_string(),
        ))
        .await
        .unwrap();
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(event.data["messageId"], json!("z"));
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_frames_are_tagged_with_handshake_origin() {
        // Arrange
        let (addr, _hub, mut rx, running) = start().await;
        let mut request = format!("ws://{addr}").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static("https://portal.example.com"));
        let (mut ws, _) = connect_async(request).await.unwrap();

        // Act
        ws.send(WsMessage::Text(
            json!({"type": "PING", "messageId": "p1"}).to_string(),
        ))
        .await
        .unwrap();
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(event.origin, "https://portal.example.com");
        assert_eq!(event.data["messageId"], "p1");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_missing_origin_header_is_opaque() {
        let (addr, _hub, mut rx, running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(WsMessage::Text("{}".to_string())).await.unwrap();
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.origin, OPAQUE_ORIGIN);
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_non_json_frames_are_skipped() {
        let (addr, _hub, mut rx, running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
        ws.send(WsMessage::Text("[1,2]".to_string())).await.unwrap();
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.data, json!([1, 2]));
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_hub_broadcast_reaches_connected_page() {
        // Arrange: a first inbound frame proves the session is registered.
        let (addr, hub, mut rx, running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(WsMessage::Text("{}".to_string())).await.unwrap();
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Act
        hub.post(
            OutboundMessage::LayerStateChanged(Notification::layer_state_changed(
                "roads", true, 1,
            )),
            TargetOrigin::Broadcast,
        )
        .unwrap();
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Assert
        let WsMessage::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "LAYER_STATE_CHANGED");
        assert_eq!(value["data"]["layerId"], "roads");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_closed_session_is_unregistered() {
        let (addr, hub, mut rx, running) = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(WsMessage::Text("{}".to_string())).await.unwrap();
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.len(), 1);

        ws.close(None).await.unwrap();
        for _ in 0..50 {
            if hub.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(hub.is_empty());
        running.store(false, Ordering::Relaxed);
    }
}
