//! Discovery of the mapping application among the runtime's global bindings.
//!
//! [`HostLocator::locate`] runs [`Probe::CHAIN`] in order and keeps the first
//! application that exposes a map or application-state surface.  A probe
//! that errors or finds nothing is logged at debug level and skipped.
//!
//! The result is cached: once found, the same [`HostHandle`] is returned
//! until [`HostLocator::reset`] is called during teardown.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::handle::exposes_host_surface;
use crate::domain::{GlobalScope, HostError, HostHandle, MapApplication, Probe};

/// Substring the heuristic scan looks for in binding names.
pub const PRODUCT_NAME: &str = "lizmap";

pub struct HostLocator {
    scope: Arc<dyn GlobalScope>,
    cached: Option<HostHandle>,
}

impl HostLocator {
    pub fn new(scope: Arc<dyn GlobalScope>) -> Self {
        Self {
            scope,
            cached: None,
        }
    }

    /// Returns the cached handle, or runs the probe chain once.
    pub fn locate(&mut self) -> Option<HostHandle> {
        if let Some(handle) = &self.cached {
            return Some(handle.clone());
        }

        for probe in Probe::CHAIN {
            match self.run_probe(probe) {
                Ok(Some(app)) if exposes_host_surface(app.as_ref()) => {
                    let handle = HostHandle::new(app, probe);
                    info!(
                        "found mapping application via {probe} (shape {:?})",
                        handle.shape()
                    );
                    self.cached = Some(handle.clone());
                    return Some(handle);
                }
                Ok(Some(_)) => debug!("probe {probe}: binding has no map or state surface"),
                Ok(None) => debug!("probe {probe}: nothing bound"),
                Err(e) => debug!("probe {probe} failed: {e}"),
            }
        }
        None
    }

    /// The cached handle, without probing.
    pub fn cached(&self) -> Option<&HostHandle> {
        self.cached.as_ref()
    }

    /// Forgets the cached handle.  Only teardown calls this.
    pub fn reset(&mut self) {
        self.cached = None;
    }

    fn run_probe(&self, probe: Probe) -> Result<Option<Arc<dyn MapApplication>>, HostError> {
        match probe.binding_path() {
            Some(path) => self.scope.binding(path),
            None => Ok(self.scan()),
        }
    }

    /// Best-effort scan of every top-level binding.
    fn scan(&self) -> Option<Arc<dyn MapApplication>> {
        self.scope
            .binding_names()
            .into_iter()
            .filter(|name| name.to_lowercase().contains(PRODUCT_NAME))
            .find_map(|name| match self.scope.binding(&name) {
                Ok(Some(app)) if app.map().is_some() => Some(app),
                Ok(_) => None,
                Err(e) => {
                    debug!("scan: binding {name} failed: {e}");
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HostShape;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::fixture::{FixtureHost, FixtureShape, FixtureSpec};

    fn locator(spec: FixtureSpec) -> (HostLocator, Arc<FixtureHost>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let host = Arc::new(FixtureHost::new(spec, clock.clone()));
        (HostLocator::new(host.clone()), host, clock)
    }

    #[test]
    fn test_first_probe_wins() {
        let (mut loc, _, _) = locator(FixtureSpec::default());
        let handle = loc.locate().unwrap();
        assert_eq!(handle.probe(), Probe::LizMap);
        assert_eq!(handle.shape(), HostShape::RenderLayers);
    }

    #[test]
    fn test_failing_and_decoy_probes_are_skipped() {
        // Arrange: `lizMap` throws, `lizmap` has no surface, app lives under `lizMap3`
        let (mut loc, _, _) = locator(FixtureSpec {
            binding: "lizMap3".into(),
            failing_bindings: vec!["lizMap".into()],
            decoys: vec!["lizmap".into()],
            ..FixtureSpec::default()
        });

        // Act
        let handle = loc.locate();

        // Assert
        assert_eq!(handle.map(|h| h.probe()), Some(Probe::LizMap3));
    }

    #[test]
    fn test_scan_finds_product_named_binding_with_map() {
        let (mut loc, host, _) = locator(FixtureSpec {
            binding: "myLizmapApp".into(),
            ..FixtureSpec::default()
        });

        let handle = loc.locate().unwrap();

        assert_eq!(handle.probe(), Probe::GlobalScan);
        assert_eq!(host.scans(), 1);
    }

    #[test]
    fn test_scan_ignores_binding_without_map() {
        // Layer-tree releases have no rendering map, so the scan skips them.
        let (mut loc, _, _) = locator(FixtureSpec {
            binding: "customLizmap".into(),
            shape: FixtureShape::LayerTree,
            ..FixtureSpec::default()
        });
        assert!(loc.locate().is_none());
    }

    #[test]
    fn test_handle_is_cached_until_reset() {
        // Arrange
        let (mut loc, host, _) = locator(FixtureSpec {
            binding: "myLizmapApp".into(),
            ..FixtureSpec::default()
        });
        loc.locate().unwrap();

        // Act
        loc.locate().unwrap();
        loc.locate().unwrap();

        // Assert: the chain ran once
        assert_eq!(host.scans(), 1);
        assert!(loc.cached().is_some());

        loc.reset();
        assert!(loc.cached().is_none());
        loc.locate().unwrap();
        assert_eq!(host.scans(), 2);
    }

    #[test]
    fn test_nothing_found_returns_none() {
        let (mut loc, _, clock) = locator(FixtureSpec {
            appears_after_ms: 5_000,
            ..FixtureSpec::default()
        });
        assert!(loc.locate().is_none());
        clock.advance(5_000);
        assert!(loc.locate().is_some());
    }
}
