//! Drives a [`Bridge`] from a single Tokio task.
//!
//! The bridge itself never sleeps or spawns; it only says when it next needs
//! attention ([`Bridge::until_next_timer`]).  This task owns the bridge,
//! feeds it inbound channel events, sleeps until the next timer, and pumps it
//! after every wake-up.  Owning the bridge in one task means no lock is ever
//! held around its state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::application::{Bridge, InitProgress};
use crate::domain::ChannelEvent;

/// Longest the task sleeps before re-checking the `running` flag.
const IDLE_POLL_MS: u64 = 200;

/// Runs the bridge until `running` is cleared or every inbound sender is
/// dropped, then tears it down and hands it back.
pub async fn run_bridge(
    mut bridge: Bridge,
    mut inbound: UnboundedReceiver<ChannelEvent>,
    running: Arc<AtomicBool>,
) -> Bridge {
    match bridge.initialize() {
        InitProgress::Started | InitProgress::InProgress | InitProgress::AlreadyReady => {}
        InitProgress::Failed(e) => error!("bridge initialization failed: {e}"),
    }
    report(bridge.outcome().cloned());

    while running.load(Ordering::Relaxed) {
        let wait = bridge
            .until_next_timer()
            .map_or(IDLE_POLL_MS, |ms| ms.min(IDLE_POLL_MS));

        tokio::select! {
            event = inbound.recv() => match event {
                Some(event) => bridge.on_message(event),
                None => {
                    debug!("inbound channel closed; stopping bridge task");
                    break;
                }
            },
            _ = sleep(Duration::from_millis(wait)) => {}
        }

        report(bridge.pump());
    }

    info!("stopping bridge");
    bridge.teardown();
    bridge
}

fn report(settled: Option<Result<(), crate::domain::BridgeError>>) {
    match settled {
        Some(Ok(())) => debug!("initialization settled: ready"),
        Some(Err(e)) => error!("bridge initialization failed: {e}"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapframe_core::{types, BridgeConfig};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::application::ReadinessState;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::fixture::{FixtureHost, FixtureLayer, FixtureSpec};
    use crate::infrastructure::recording::RecordingChannel;

    fn bridge(channel: Arc<RecordingChannel>) -> Bridge {
        let clock = Arc::new(SystemClock);
        let host = Arc::new(FixtureHost::new(
            FixtureSpec {
                layers: vec![FixtureLayer::new("roads", true)],
                ..FixtureSpec::default()
            },
            clock.clone(),
        ));
        let config = BridgeConfig {
            allowed_origins: vec!["https://portal.example.com".into()],
            ..BridgeConfig::default()
        };
        Bridge::new(config, host, channel, clock)
    }

    async fn wait_for_responses(channel: &RecordingChannel, count: usize) {
        for _ in 0..100 {
            if channel.responses().len() >= count {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_inbound_events_are_answered() {
        // Arrange
        let channel = Arc::new(RecordingChannel::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_bridge(
            bridge(Arc::clone(&channel)),
            rx,
            Arc::clone(&running),
        ));

        // Act
        tx.send(ChannelEvent::new(
            "https://portal.example.com",
            json!({"type": types::GET_LAYERS, "messageId": "m1"}),
        ))
        .unwrap();
        wait_for_responses(&channel, 1).await;
        running.store(false, Ordering::Relaxed);
        let bridge = timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        // Assert
        let responses = channel.responses();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].success);
        assert_eq!(channel.of_kind(types::BRIDGE_READY).len(), 1);
        assert_eq!(bridge.state(), ReadinessState::Idle);
    }

    #[tokio::test]
    async fn test_task_stops_when_senders_are_dropped() {
        let channel = Arc::new(RecordingChannel::new());
        let (tx, rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_bridge(bridge(channel), rx, running));

        drop(tx);

        let bridge = timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bridge.queued_len(), 0);
    }
}
