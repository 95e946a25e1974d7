//! Readiness state machine.
//!
//! ```text
//!            initialize()
//!   Idle ───────────────► Searching ──(30 misses)──► Failed
//!                            │
//!                            │ host found
//!                            ▼
//!                      WaitingForMap ──(load signal | fallback)──► Ready
//! ```
//!
//! The controller owns only the state, the attempt counter and the load
//! signal handlers it registered.  Everything time-related goes through the
//! [`Scheduler`]; everything the host signals asynchronously lands in a
//! [`SignalInbox`] that the bridge drains on its next pump.  Nothing here
//! blocks or sleeps.
//!
//! The side effects of reaching Ready (forwarder, notification, queue flush)
//! belong to the bridge; the controller only reports [`Transition::Ready`]
//! and records it in [`ReadinessController::mark_ready`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use super::host_locator::HostLocator;
use super::scheduler::{Scheduler, TimerKind};
use crate::domain::{BridgeError, HostEvent, HostEventHandler, HostHandle};

/// Spacing between discovery attempts.
pub const SEARCH_INTERVAL_MS: u64 = 1_000;
/// Discovery attempts before giving up.
pub const MAX_SEARCH_ATTEMPTS: u32 = 30;
/// Longest wait for the map's load signal.
pub const MAP_WAIT_FALLBACK_MS: u64 = 5_000;
/// Wait before declaring an unrecognized application ready.
pub const UNKNOWN_SHAPE_FALLBACK_MS: u64 = 2_000;

/// Host events that mean "the map has layers now".
const WAIT_EVENTS: [&str; 2] = ["addlayer", "loadend"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Idle,
    Searching,
    WaitingForMap,
    Ready,
    Failed,
}

/// What `initialize()` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitProgress {
    /// A new discovery run was started.
    Started,
    /// A run is already underway; nothing new was started.
    InProgress,
    AlreadyReady,
    /// The previous run failed; only teardown and reinitialize recover.
    Failed(BridgeError),
}

/// Result of feeding one input to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Ready,
    Failed(BridgeError),
}

/// Something the host told the bridge outside of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    MapReady,
}

/// Shared mailbox between host event handlers and the bridge.
#[derive(Debug, Clone, Default)]
pub struct SignalInbox(Arc<Mutex<VecDeque<HostSignal>>>);

impl SignalInbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HostSignal>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, signal: HostSignal) {
        self.lock().push_back(signal);
    }

    pub fn pop(&self) -> Option<HostSignal> {
        self.lock().pop_front()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ReadinessController {
    state: ReadinessState,
    attempts: u32,
    failure: Option<BridgeError>,
    wait_handlers: Vec<(&'static str, HostEventHandler)>,
}

impl Default for ReadinessController {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessController {
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Idle,
            attempts: 0,
            failure: None,
            wait_handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    /// Discovery attempts made in the current run.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failure(&self) -> Option<&BridgeError> {
        self.failure.as_ref()
    }

    /// Starts discovery from `Idle`; any other state reports the run that
    /// already exists.  The first attempt is scheduled immediately.
    pub fn initialize(&mut self, scheduler: &mut Scheduler, now_ms: u64) -> InitProgress {
        match self.state {
            ReadinessState::Idle => {
                self.state = ReadinessState::Searching;
                scheduler.schedule(now_ms, 0, TimerKind::SearchTick);
                InitProgress::Started
            }
            ReadinessState::Searching | ReadinessState::WaitingForMap => InitProgress::InProgress,
            ReadinessState::Ready => InitProgress::AlreadyReady,
            ReadinessState::Failed => InitProgress::Failed(self.failure.clone().unwrap_or(
                BridgeError::DiscoveryFailed {
                    attempts: self.attempts,
                },
            )),
        }
    }

    /// One discovery attempt.
    pub fn on_search_tick(
        &mut self,
        locator: &mut HostLocator,
        scheduler: &mut Scheduler,
        signals: &SignalInbox,
        now_ms: u64,
    ) -> Transition {
        if self.state != ReadinessState::Searching {
            return Transition::Stay;
        }

        self.attempts += 1;
        debug!(
            "discovery attempt {}/{}",
            self.attempts, MAX_SEARCH_ATTEMPTS
        );

        match locator.locate() {
            Some(handle) => {
                self.state = ReadinessState::WaitingForMap;
                self.begin_wait(&handle, scheduler, signals, now_ms)
            }
            None if self.attempts >= MAX_SEARCH_ATTEMPTS => {
                let err = BridgeError::DiscoveryFailed {
                    attempts: self.attempts,
                };
                error!("{err}");
                self.state = ReadinessState::Failed;
                self.failure = Some(err.clone());
                Transition::Failed(err)
            }
            None => {
                scheduler.schedule(now_ms, SEARCH_INTERVAL_MS, TimerKind::SearchTick);
                Transition::Stay
            }
        }
    }

    /// Chooses how to wait for the map, based on what the application exposes.
    fn begin_wait(
        &mut self,
        handle: &HostHandle,
        scheduler: &mut Scheduler,
        signals: &SignalInbox,
        now_ms: u64,
    ) -> Transition {
        let app = handle.app();
        let map = app.map();

        if let Some(events) = map.and_then(|m| m.events()) {
            if map.and_then(|m| m.layer_count()).unwrap_or(0) > 0 {
                info!("map already has layers");
                return Transition::Ready;
            }
            for event in WAIT_EVENTS {
                let inbox = signals.clone();
                let handler: HostEventHandler =
                    Arc::new(move |_: &HostEvent| inbox.push(HostSignal::MapReady));
                match events.register(event, Arc::clone(&handler)) {
                    Ok(()) => self.wait_handlers.push((event, handler)),
                    Err(e) => debug!("could not register {event} handler: {e}"),
                }
            }
            scheduler.schedule(now_ms, MAP_WAIT_FALLBACK_MS, TimerKind::MapWaitFallback);
            debug!("waiting for map load signal");
            return Transition::Stay;
        }

        if app.app_state().is_some_and(|s| s.has_map()) {
            info!("application state reports the map present");
            return Transition::Ready;
        }

        warn!("unrecognized application version; attempting fallback initialization");
        scheduler.schedule(
            now_ms,
            UNKNOWN_SHAPE_FALLBACK_MS,
            TimerKind::UnknownShapeFallback,
        );
        Transition::Stay
    }

    /// The map signalled it has loaded.
    pub fn on_map_signal(&self) -> Transition {
        match self.state {
            ReadinessState::WaitingForMap => Transition::Ready,
            _ => Transition::Stay,
        }
    }

    /// A wait fallback timer fired.
    pub fn on_fallback(&self, kind: TimerKind) -> Transition {
        match (self.state, kind) {
            (
                ReadinessState::WaitingForMap,
                TimerKind::MapWaitFallback | TimerKind::UnknownShapeFallback,
            ) => {
                debug!("{kind:?} fired");
                Transition::Ready
            }
            _ => Transition::Stay,
        }
    }

    /// Records readiness.  Returns `false` if already Ready, so completion
    /// side effects run exactly once.
    pub fn mark_ready(&mut self, host: Option<&HostHandle>, scheduler: &mut Scheduler) -> bool {
        if self.state == ReadinessState::Ready {
            return false;
        }
        self.state = ReadinessState::Ready;
        scheduler.cancel(TimerKind::MapWaitFallback);
        scheduler.cancel(TimerKind::UnknownShapeFallback);
        self.release_wait_handlers(host);
        true
    }

    /// Back to `Idle` with a zero attempt counter.
    pub fn reset(&mut self, host: Option<&HostHandle>) {
        self.release_wait_handlers(host);
        self.state = ReadinessState::Idle;
        self.attempts = 0;
        self.failure = None;
    }

    /// Number of load-signal handlers still registered with the host.
    pub fn pending_handlers(&self) -> usize {
        self.wait_handlers.len()
    }

    fn release_wait_handlers(&mut self, host: Option<&HostHandle>) {
        let handlers = std::mem::take(&mut self.wait_handlers);
        let Some(events) = host.and_then(|h| h.app().map()).and_then(|m| m.events()) else {
            return;
        };
        for (event, handler) in handlers {
            if let Err(e) = events.unregister(event, &handler) {
                debug!("error removing {event} handler: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Clock;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::fixture::{
        FixtureApp, FixtureHost, FixtureLayer, FixtureShape, FixtureSpec,
    };

    struct Rig {
        ctl: ReadinessController,
        locator: HostLocator,
        scheduler: Scheduler,
        signals: SignalInbox,
        clock: Arc<ManualClock>,
        app: Arc<FixtureApp>,
    }

    impl Rig {
        fn new(spec: FixtureSpec) -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let host = Arc::new(FixtureHost::new(spec, clock.clone()));
            Self {
                ctl: ReadinessController::new(),
                locator: HostLocator::new(host.clone()),
                scheduler: Scheduler::new(),
                signals: SignalInbox::new(),
                clock,
                app: host.app(),
            }
        }

        /// Runs every timer due now; returns the last non-Stay transition.
        fn run_due(&mut self) -> Transition {
            let now = self.clock.now_ms();
            let mut last = Transition::Stay;
            while let Some(kind) = self.scheduler.pop_due(now) {
                let t = match kind {
                    TimerKind::SearchTick => self.ctl.on_search_tick(
                        &mut self.locator,
                        &mut self.scheduler,
                        &self.signals,
                        now,
                    ),
                    other => self.ctl.on_fallback(other),
                };
                if t != Transition::Stay {
                    last = t;
                }
            }
            last
        }
    }

    #[test]
    fn test_initialize_is_idempotent_while_searching() {
        let mut rig = Rig::new(FixtureSpec {
            appears_after_ms: 10_000,
            ..FixtureSpec::default()
        });
        assert_eq!(rig.ctl.initialize(&mut rig.scheduler, 0), InitProgress::Started);
        assert_eq!(rig.ctl.initialize(&mut rig.scheduler, 0), InitProgress::InProgress);
        assert_eq!(rig.scheduler.len(), 1, "second call schedules nothing");
    }

    #[test]
    fn test_fails_after_exactly_thirty_attempts() {
        // Arrange
        let mut rig = Rig::new(FixtureSpec {
            appears_after_ms: u64::MAX,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);

        // Act: attempt 1 at t=0, attempt 30 at t=29s
        let mut outcome = rig.run_due();
        for _ in 1..MAX_SEARCH_ATTEMPTS {
            assert_eq!(outcome, Transition::Stay);
            rig.clock.advance(SEARCH_INTERVAL_MS);
            outcome = rig.run_due();
        }

        // Assert
        assert_eq!(
            outcome,
            Transition::Failed(BridgeError::DiscoveryFailed { attempts: 30 })
        );
        assert_eq!(rig.ctl.state(), ReadinessState::Failed);
        assert_eq!(rig.clock.now_ms(), 29_000);
        assert!(rig.scheduler.is_empty(), "no 31st attempt is scheduled");

        rig.clock.advance(60_000);
        rig.run_due();
        assert_eq!(rig.ctl.attempts(), 30);
    }

    #[test]
    fn test_failed_initialize_reports_failure_until_reset() {
        let mut rig = Rig::new(FixtureSpec {
            appears_after_ms: u64::MAX,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        for _ in 0..MAX_SEARCH_ATTEMPTS {
            rig.run_due();
            rig.clock.advance(SEARCH_INTERVAL_MS);
        }

        assert!(matches!(
            rig.ctl.initialize(&mut rig.scheduler, rig.clock.now_ms()),
            InitProgress::Failed(BridgeError::DiscoveryFailed { attempts: 30 })
        ));

        rig.ctl.reset(None);
        assert_eq!(rig.ctl.state(), ReadinessState::Idle);
        assert_eq!(rig.ctl.attempts(), 0);
    }

    #[test]
    fn test_loaded_map_is_ready_on_first_attempt() {
        let mut rig = Rig::new(FixtureSpec {
            layers: vec![FixtureLayer::new("roads", true)],
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        assert_eq!(rig.run_due(), Transition::Ready);
        assert_eq!(rig.ctl.attempts(), 1);
    }

    #[test]
    fn test_map_without_layers_waits_even_when_loaded() {
        // Arrange: the map reports zero layers
        let mut rig = Rig::new(FixtureSpec::default());

        // Act
        rig.ctl.initialize(&mut rig.scheduler, 0);

        // Assert
        assert_eq!(rig.run_due(), Transition::Stay);
        assert_eq!(rig.ctl.state(), ReadinessState::WaitingForMap);
        assert!(rig.scheduler.is_scheduled(TimerKind::MapWaitFallback));
    }

    #[test]
    fn test_unloaded_map_waits_for_load_signal() {
        // Arrange
        let mut rig = Rig::new(FixtureSpec {
            loaded: false,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        assert_eq!(rig.run_due(), Transition::Stay);
        assert_eq!(rig.ctl.state(), ReadinessState::WaitingForMap);
        assert_eq!(rig.app.handler_count("addlayer"), 1);
        assert_eq!(rig.app.handler_count("loadend"), 1);

        // Act
        rig.app.finish_loading();

        // Assert
        assert_eq!(rig.signals.pop(), Some(HostSignal::MapReady));
        assert_eq!(rig.ctl.on_map_signal(), Transition::Ready);
        let host = rig.locator.cached().cloned();
        assert!(rig.ctl.mark_ready(host.as_ref(), &mut rig.scheduler));
        assert_eq!(rig.app.handler_count("loadend"), 0);
        assert!(!rig.scheduler.is_scheduled(TimerKind::MapWaitFallback));
    }

    #[test]
    fn test_map_wait_fallback_forces_readiness() {
        let mut rig = Rig::new(FixtureSpec {
            loaded: false,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        rig.run_due();

        rig.clock.advance(MAP_WAIT_FALLBACK_MS - 1);
        assert_eq!(rig.run_due(), Transition::Stay);
        rig.clock.advance(1);
        assert_eq!(rig.run_due(), Transition::Ready);
    }

    #[test]
    fn test_state_flag_without_map_events_is_ready_immediately() {
        let mut rig = Rig::new(FixtureSpec {
            shape: FixtureShape::LayerTree,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        assert_eq!(rig.run_due(), Transition::Ready);
    }

    #[test]
    fn test_unrecognized_application_uses_short_fallback() {
        // A map without an event registry and no state surface.
        let mut rig = Rig::new(FixtureSpec {
            map_events: false,
            ..FixtureSpec::default()
        });
        rig.ctl.initialize(&mut rig.scheduler, 0);
        assert_eq!(rig.run_due(), Transition::Stay);

        rig.clock.advance(UNKNOWN_SHAPE_FALLBACK_MS);
        assert_eq!(rig.run_due(), Transition::Ready);
    }

    #[test]
    fn test_mark_ready_is_reentrant() {
        let mut ctl = ReadinessController::new();
        let mut scheduler = Scheduler::new();
        assert!(ctl.mark_ready(None, &mut scheduler));
        assert!(!ctl.mark_ready(None, &mut scheduler));
        assert_eq!(ctl.on_map_signal(), Transition::Stay);
    }
}
