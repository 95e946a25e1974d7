//! The discovered host application, tagged with how it was found and which
//! API shape it exposes.

use std::fmt;
use std::sync::Arc;

use super::host::MapApplication;

/// Detection probes, in the order they are tried.
///
/// Binding probes come first.  [`Probe::GlobalScan`] is a heuristic of last
/// resort: it walks every top-level binding looking for one whose name
/// contains the product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    LizMap,
    Lizmap,
    ApplicationLizmap,
    LizMap3,
    DocumentLizMap,
    GlobalScan,
}

impl Probe {
    /// The full probe chain in priority order.
    pub const CHAIN: [Probe; 6] = [
        Probe::LizMap,
        Probe::Lizmap,
        Probe::ApplicationLizmap,
        Probe::LizMap3,
        Probe::DocumentLizMap,
        Probe::GlobalScan,
    ];

    /// Binding path looked up by this probe, or `None` for the scan.
    pub fn binding_path(self) -> Option<&'static str> {
        match self {
            Probe::LizMap => Some("lizMap"),
            Probe::Lizmap => Some("lizmap"),
            Probe::ApplicationLizmap => Some("application.lizmap"),
            Probe::LizMap3 => Some("lizMap3"),
            Probe::DocumentLizMap => Some("document.lizMap"),
            Probe::GlobalScan => None,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding_path() {
            Some(path) => f.write_str(path),
            None => f.write_str("<global scan>"),
        }
    }
}

/// Which layer-listing API the application exposes.
///
/// Selected once, when the handle is created, so listing never re-probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostShape {
    /// Declarative layer-config map.
    LayerConfig,
    /// Application-state hierarchical layer tree.
    LayerTree,
    /// Flat rendering-engine layer list.
    RenderLayers,
    /// Legacy tree-instance configuration.
    TreeInstance,
    /// None of the above; layer listing yields nothing.
    Unrecognized,
}

impl HostShape {
    /// Inspects `app` and picks the first shape it supports.
    pub fn detect(app: &dyn MapApplication) -> Self {
        if app.layer_config().is_some() {
            HostShape::LayerConfig
        } else if app.app_state().and_then(|s| s.layer_tree()).is_some() {
            HostShape::LayerTree
        } else if app.map().and_then(|m| m.layers()).is_some() {
            HostShape::RenderLayers
        } else if app
            .layer_tree_instance()
            .and_then(|t| t.config())
            .is_some()
        {
            HostShape::TreeInstance
        } else {
            HostShape::Unrecognized
        }
    }
}

/// Returns `true` if `app` exposes a map surface or an application-state
/// surface, the minimum for it to count as the mapping application.
pub fn exposes_host_surface(app: &dyn MapApplication) -> bool {
    app.map().is_some() || app.app_state().is_some()
}

/// Reference to the discovered mapping application.
///
/// Cloning is cheap (one `Arc` bump).
#[derive(Clone)]
pub struct HostHandle {
    app: Arc<dyn MapApplication>,
    probe: Probe,
    shape: HostShape,
}

impl HostHandle {
    pub fn new(app: Arc<dyn MapApplication>, probe: Probe) -> Self {
        let shape = HostShape::detect(app.as_ref());
        Self { app, probe, shape }
    }

    pub fn app(&self) -> &dyn MapApplication {
        self.app.as_ref()
    }

    /// The probe that found this application.
    pub fn probe(&self) -> Probe {
        self.probe
    }

    pub fn shape(&self) -> HostShape {
        self.shape
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("probe", &self.probe)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_chain_puts_scan_last() {
        assert_eq!(Probe::CHAIN.last(), Some(&Probe::GlobalScan));
        assert_eq!(Probe::CHAIN[0], Probe::LizMap);
    }

    #[test]
    fn test_only_scan_has_no_binding_path() {
        let without_path: Vec<_> = Probe::CHAIN
            .iter()
            .filter(|p| p.binding_path().is_none())
            .collect();
        assert_eq!(without_path, vec![&Probe::GlobalScan]);
    }

    #[test]
    fn test_probe_display_uses_binding_path() {
        assert_eq!(Probe::ApplicationLizmap.to_string(), "application.lizmap");
        assert_eq!(Probe::GlobalScan.to_string(), "<global scan>");
    }

    struct Empty;
    impl MapApplication for Empty {}

    #[test]
    fn test_application_without_surfaces_is_unrecognized() {
        assert_eq!(HostShape::detect(&Empty), HostShape::Unrecognized);
        assert!(!exposes_host_surface(&Empty));
    }
}
