//! The bridge instance: wiring and lifecycle.
//!
//! A [`Bridge`] owns every component of one bridge: the origin gate, the host
//! locator, the layer registry, the readiness controller, the message queue,
//! the event forwarder and the timer scheduler.  There is no module-level
//! state, so any number of independent bridges can exist side by side (tests
//! create one per case).
//!
//! # Driving a bridge
//!
//! The bridge is sans-IO.  Its owner feeds it three kinds of input:
//!
//! ```text
//! channel receive event  ──► Bridge::on_message(event)
//! time passing           ──► Bridge::pump()          (after checking until_next_timer)
//! page unload            ──► Bridge::teardown()
//! ```
//!
//! `pump()` drains host signals and due timers until nothing is left to do.
//! It returns `Some(..)` when the initialization run settles (Ready or
//! Failed) during that pump.
//!
//! # What happens on Ready
//!
//! 1. The load-signal handlers are removed and pending fallbacks cancelled.
//! 2. The event forwarder attaches to the host's change events.
//! 3. `BRIDGE_READY` is broadcast with the version and a config summary.
//! 4. A queue flush is scheduled as a zero-delay timer, so it runs as a
//!    deferred step at the end of the same pump.  Until it runs, new
//!    commands keep queueing behind the old ones.

use std::sync::Arc;

use mapframe_core::{BridgeConfig, LayerDescriptor, Notification, OutboundMessage};
use tracing::{debug, info, warn};

use super::debug::DebugSurface;
use super::forwarder::EventForwarder;
use super::host_locator::HostLocator;
use super::layer_registry::LayerRegistry;
use super::origin::OriginValidator;
use super::queue::MessageQueue;
use super::readiness::{
    HostSignal, InitProgress, ReadinessController, ReadinessState, SignalInbox, Transition,
};
use super::scheduler::{Scheduler, TimerKind};
use crate::domain::{BridgeError, Channel, Clock, GlobalScope, HostHandle, TargetOrigin};

/// Delay between reaching Ready and replaying the queue.
pub const FLUSH_DELAY_MS: u64 = 0;

/// One bridge instance.
pub struct Bridge {
    pub(super) config: BridgeConfig,
    pub(super) validator: OriginValidator,
    pub(super) locator: HostLocator,
    pub(super) registry: LayerRegistry,
    pub(super) readiness: ReadinessController,
    pub(super) queue: MessageQueue,
    pub(super) forwarder: EventForwarder,
    pub(super) scheduler: Scheduler,
    pub(super) signals: SignalInbox,
    pub(super) channel: Arc<dyn Channel>,
    pub(super) clock: Arc<dyn Clock>,
    outcome: Option<Result<(), BridgeError>>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        scope: Arc<dyn GlobalScope>,
        channel: Arc<dyn Channel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if config.allowed_origins.is_empty() {
            warn!("no allowed origins configured; messages from any origin will be accepted");
        }
        Self {
            validator: OriginValidator::new(&config.allowed_origins),
            config,
            locator: HostLocator::new(scope),
            registry: LayerRegistry::new(),
            readiness: ReadinessController::new(),
            queue: MessageQueue::new(),
            forwarder: EventForwarder::new(),
            scheduler: Scheduler::new(),
            signals: SignalInbox::new(),
            channel,
            clock,
            outcome: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts discovery.  Idempotent: while a run is in progress (or after
    /// it settled) this reports that run instead of starting another.
    ///
    /// The first discovery attempt runs before this returns.
    pub fn initialize(&mut self) -> InitProgress {
        let now = self.now();
        let progress = self.readiness.initialize(&mut self.scheduler, now);
        if progress == InitProgress::Started {
            info!("initializing bridge v{}", self.config.version);
            self.outcome = None;
            self.pump();
        }
        progress
    }

    /// Processes host signals and due timers until none are left.
    pub fn pump(&mut self) -> Option<Result<(), BridgeError>> {
        let mut settled = None;
        loop {
            let now = self.now();
            let transition = if let Some(signal) = self.signals.pop() {
                match signal {
                    HostSignal::MapReady => {
                        info!("map reported ready");
                        self.readiness.on_map_signal()
                    }
                }
            } else if let Some(kind) = self.scheduler.pop_due(now) {
                match kind {
                    TimerKind::SearchTick => self.readiness.on_search_tick(
                        &mut self.locator,
                        &mut self.scheduler,
                        &self.signals,
                        now,
                    ),
                    TimerKind::MapWaitFallback | TimerKind::UnknownShapeFallback => {
                        self.readiness.on_fallback(kind)
                    }
                    TimerKind::FlushQueue => {
                        self.flush_queue();
                        Transition::Stay
                    }
                }
            } else {
                break;
            };

            match transition {
                Transition::Stay => {}
                Transition::Ready => {
                    if self.complete_readiness() {
                        settled = Some(Ok(()));
                    }
                }
                Transition::Failed(err) => {
                    warn!(
                        "{} queued message(s) will not be answered until the bridge is reinitialized",
                        self.queue.len()
                    );
                    settled = Some(Err(err));
                }
            }
        }

        if let Some(result) = &settled {
            self.outcome = Some(result.clone());
        }
        settled
    }

    /// Milliseconds until the bridge next needs a [`Bridge::pump`], or
    /// `None` when it is idle until the next inbound message.
    pub fn until_next_timer(&self) -> Option<u64> {
        if !self.signals.is_empty() {
            return Some(0);
        }
        let now = self.now();
        self.scheduler
            .next_deadline()
            .map(|due| due.saturating_sub(now))
    }

    /// Page unload: unsubscribes from the host, clears every cache and the
    /// queue, cancels timers and returns to `Idle`.
    pub fn teardown(&mut self) {
        debug!("tearing down bridge");
        let host = self.locator.cached().cloned();
        self.forwarder.detach(host.as_ref());
        self.readiness.reset(host.as_ref());
        self.scheduler.clear();
        self.signals.clear();
        self.queue.clear();
        self.registry.clear_cache();
        self.locator.reset();
        self.outcome = None;
    }

    /// Teardown followed by a fresh [`Bridge::initialize`].
    pub fn reinitialize(&mut self) -> InitProgress {
        self.teardown();
        self.initialize()
    }

    fn complete_readiness(&mut self) -> bool {
        let host = self.locator.cached().cloned();
        if !self.readiness.mark_ready(host.as_ref(), &mut self.scheduler) {
            return false;
        }

        if let Some(handle) = &host {
            self.forwarder
                .attach(handle, Arc::clone(&self.channel), Arc::clone(&self.clock));
        }

        info!("bridge ready (v{})", self.config.version);
        let ready = Notification::bridge_ready(
            &self.config.version,
            self.config.summary(),
            self.now(),
        );
        self.post(OutboundMessage::BridgeReady(ready), TargetOrigin::Broadcast);

        if !self.queue.is_empty() {
            self.scheduler
                .schedule(self.now(), FLUSH_DELAY_MS, TimerKind::FlushQueue);
        }
        true
    }

    /// Replays queued commands in arrival order.
    pub(super) fn flush_queue(&mut self) {
        let Some(entries) = self.queue.begin_flush() else {
            return;
        };
        debug!("processing {} queued messages", entries.len());
        for entry in entries {
            self.dispatch(&entry.origin, &entry.message);
        }
        self.queue.end_flush();
    }

    /// Hands a message to the channel; failures are logged and dropped.
    pub(super) fn post(&self, message: OutboundMessage, target: TargetOrigin) {
        let kind = message.kind().to_string();
        if let Err(e) = self.channel.post(message, target) {
            warn!("failed to send {kind}: {e}");
        }
    }

    pub(super) fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn state(&self) -> ReadinessState {
        self.readiness.state()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Discovery attempts made by the current run.
    pub fn attempts(&self) -> u32 {
        self.readiness.attempts()
    }

    /// How the last initialization run settled, if it has.
    pub fn outcome(&self) -> Option<&Result<(), BridgeError>> {
        self.outcome.as_ref()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn host(&self) -> Option<&HostHandle> {
        self.locator.cached()
    }

    /// Last-known layer state from the most recent listing.
    pub fn layer_cache(&self) -> Vec<LayerDescriptor> {
        self.registry.snapshot()
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarder.is_attached()
    }

    /// The debug surface, available only when `config.debug` is set.
    pub fn debug_surface(&mut self) -> Option<DebugSurface<'_>> {
        if self.config.debug {
            Some(DebugSurface::new(self))
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
