//! Layer listing and visibility toggling across application releases.
//!
//! # Listing
//!
//! The [`HostShape`] chosen at discovery decides how native records are
//! normalized into [`LayerDescriptor`]s:
//!
//! | Shape           | Source                          | Notes |
//! |-----------------|---------------------------------|-------|
//! | `LayerConfig`   | declarative layer-config map    | live visibility from the rendering layer when one exists |
//! | `LayerTree`     | application-state layer tree    | depth-first, layer nodes only |
//! | `RenderLayers`  | rendering-engine layer list     | base, internal and root-container layers skipped |
//! | `TreeInstance`  | legacy tree configuration       | group entries skipped |
//!
//! Every listing replaces the local cache wholesale.  The cache mirrors the
//! last listing; it is never consulted to answer `GET_LAYERS`.
//!
//! # Toggling
//!
//! [`ToggleStrategy::CHAIN`] is tried in order and the first strategy that
//! completes wins.  Success means a plausible API accepted the command, not
//! that the rendering engine confirmed it.

use mapframe_core::LayerDescriptor;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::domain::{
    BridgeError, HostHandle, HostShape, LayerConfigEntry, LayerTreeNode, MapApplication,
    RenderLayer, StrategyError, TreeConfigEntry,
};

/// Action fired through the high-level dispatcher to change visibility.
pub const VISIBILITY_ACTION: &str = "layertree.layer.visibility";

const DEFAULT_KIND: &str = "layer";
const ROOT_CONTAINER_CLASS: &str = "OpenLayers.Layer.Vector.RootContainer";

// ── Toggle strategies ─────────────────────────────────────────────────────────

/// Ways of changing a layer's visibility, newest API first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleStrategy {
    /// Application-state action dispatcher.
    ActionDispatch,
    /// Direct mutation of the rendering-engine layer.
    RenderLayer,
    /// Legacy layer tree `setLayerVisibility`.
    TreeInstanceSetter,
    /// `lizmaplayershow` / `lizmaplayerhide` on the legacy event bus.
    LegacyEvent,
}

impl ToggleStrategy {
    pub const CHAIN: [ToggleStrategy; 4] = [
        ToggleStrategy::ActionDispatch,
        ToggleStrategy::RenderLayer,
        ToggleStrategy::TreeInstanceSetter,
        ToggleStrategy::LegacyEvent,
    ];

    /// Runs this strategy once against `app`.
    pub fn apply(
        self,
        app: &dyn MapApplication,
        layer_id: &str,
        visible: bool,
    ) -> Result<(), StrategyError> {
        match self {
            ToggleStrategy::ActionDispatch => {
                let actions = app
                    .app_state()
                    .and_then(|s| s.actions())
                    .ok_or(StrategyError::Unavailable)?;
                actions.trigger(
                    VISIBILITY_ACTION,
                    &json!({ "layerId": layer_id, "visibility": visible }),
                )?;
            }
            ToggleStrategy::RenderLayer => {
                let map = app.map().ok_or(StrategyError::Unavailable)?;
                if map.find_layer(layer_id)?.is_none() {
                    return Err(StrategyError::Unavailable);
                }
                map.set_layer_visibility(layer_id, visible)?;
            }
            ToggleStrategy::TreeInstanceSetter => {
                let tree = app
                    .layer_tree_instance()
                    .filter(|t| t.supports_visibility_setter())
                    .ok_or(StrategyError::Unavailable)?;
                tree.set_layer_visibility(layer_id, visible)?;
            }
            ToggleStrategy::LegacyEvent => {
                let bus = app.legacy_events().ok_or(StrategyError::Unavailable)?;
                let event = if visible {
                    "lizmaplayershow"
                } else {
                    "lizmaplayerhide"
                };
                bus.trigger_event(event, &json!({ "layerId": layer_id }))?;
            }
        }
        Ok(())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Normalized layer listing plus the last-known-state cache.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    cache: Vec<LayerDescriptor>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists the host's layers and refreshes the cache.
    ///
    /// Never fails: without a host, or with an unrecognized shape, the list
    /// is empty.
    pub fn list_layers(&mut self, host: Option<&HostHandle>) -> Vec<LayerDescriptor> {
        let layers = match host {
            Some(handle) => normalize(handle),
            None => {
                warn!("mapping application not available for layer listing");
                Vec::new()
            }
        };
        debug!(
            "listed {} layers: {:?}",
            layers.len(),
            layers.iter().map(|l| l.name.as_str()).collect::<Vec<_>>()
        );

        self.cache.clear();
        for layer in &layers {
            match self.cache.iter_mut().find(|c| c.id == layer.id) {
                Some(existing) => *existing = layer.clone(),
                None => self.cache.push(layer.clone()),
            }
        }
        layers
    }

    /// Sets a layer's visibility through the first strategy that succeeds.
    ///
    /// The cache entry for `layer_id` is updated if one exists; no entry is
    /// created for a layer that was never listed.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NoStrategySucceeded`] when every strategy was
    /// unavailable or failed.
    pub fn set_visibility(
        &mut self,
        host: &HostHandle,
        layer_id: &str,
        visible: bool,
    ) -> Result<ToggleStrategy, BridgeError> {
        debug!("toggling layer {layer_id} visibility to {visible}");
        for strategy in ToggleStrategy::CHAIN {
            match strategy.apply(host.app(), layer_id, visible) {
                Ok(()) => {
                    debug!("layer {layer_id}: {strategy:?} succeeded");
                    if let Some(cached) = self.cache.iter_mut().find(|c| c.id == layer_id) {
                        cached.visible = visible;
                    }
                    return Ok(strategy);
                }
                Err(StrategyError::Unavailable) => {
                    debug!("layer {layer_id}: {strategy:?} not available");
                }
                Err(StrategyError::Failed(e)) => {
                    debug!("layer {layer_id}: {strategy:?} failed: {e}");
                }
            }
        }
        error!("all toggle strategies failed for layer {layer_id}");
        Err(BridgeError::NoStrategySucceeded {
            layer_id: layer_id.to_string(),
        })
    }

    /// Last-known layer state, in listing order.
    pub fn snapshot(&self) -> Vec<LayerDescriptor> {
        self.cache.clone()
    }

    pub fn cached(&self, layer_id: &str) -> Option<&LayerDescriptor> {
        self.cache.iter().find(|c| c.id == layer_id)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

// ── Normalization ─────────────────────────────────────────────────────────────

fn normalize(handle: &HostHandle) -> Vec<LayerDescriptor> {
    let app = handle.app();
    match handle.shape() {
        HostShape::LayerConfig => app
            .layer_config()
            .map(|entries| from_layer_config(app, entries))
            .unwrap_or_default(),
        HostShape::LayerTree => app
            .app_state()
            .and_then(|s| s.layer_tree())
            .map(|root| from_layer_tree(&root))
            .unwrap_or_default(),
        HostShape::RenderLayers => app
            .map()
            .and_then(|m| m.layers())
            .map(from_render_layers)
            .unwrap_or_default(),
        HostShape::TreeInstance => app
            .layer_tree_instance()
            .and_then(|t| t.config())
            .map(from_tree_instance)
            .unwrap_or_default(),
        HostShape::Unrecognized => Vec::new(),
    }
}

fn descriptor(id: &str, title: String, visible: bool, kind: String) -> LayerDescriptor {
    LayerDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        title,
        visible,
        kind,
        geometry_type: None,
        wms_name: None,
        opacity: None,
    }
}

fn from_layer_config(
    app: &dyn MapApplication,
    entries: Vec<(String, LayerConfigEntry)>,
) -> Vec<LayerDescriptor> {
    entries
        .into_iter()
        .map(|(id, entry)| {
            let live = app.map().and_then(|m| match m.find_layer(&id) {
                Ok(found) => found,
                Err(e) => {
                    debug!("layer {id}: rendering lookup failed: {e}");
                    None
                }
            });
            let visible = match live {
                Some(layer) => layer.visible,
                None => entry.visible != Some(false),
            };
            let title = entry
                .title
                .or(entry.name)
                .unwrap_or_else(|| id.clone());
            LayerDescriptor {
                geometry_type: entry.geometry_type,
                wms_name: entry.wms_name,
                ..descriptor(
                    &id,
                    title,
                    visible,
                    entry.layer_type.unwrap_or_else(|| DEFAULT_KIND.to_string()),
                )
            }
        })
        .collect()
}

fn from_layer_tree(root: &LayerTreeNode) -> Vec<LayerDescriptor> {
    fn walk(node: &LayerTreeNode, out: &mut Vec<LayerDescriptor>) {
        if node.node_type == "layer" {
            if let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) {
                out.push(LayerDescriptor {
                    wms_name: node.wms_name.clone(),
                    ..descriptor(
                        name,
                        node.title.clone().unwrap_or_else(|| name.to_string()),
                        node.checked || node.visibility,
                        node.layer_type
                            .clone()
                            .unwrap_or_else(|| DEFAULT_KIND.to_string()),
                    )
                });
            }
        }
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for child in &root.children {
        walk(child, &mut out);
    }
    out
}

fn is_listed_render_layer(layer: &RenderLayer) -> bool {
    !layer.name.is_empty()
        && !layer.name.starts_with("base")
        && !layer.name.starts_with("__")
        && layer.class_name.as_deref() != Some(ROOT_CONTAINER_CLASS)
}

fn from_render_layers(layers: Vec<RenderLayer>) -> Vec<LayerDescriptor> {
    layers
        .into_iter()
        .filter(is_listed_render_layer)
        .map(|layer| {
            let title = layer
                .display_name
                .or(layer.title)
                .unwrap_or_else(|| layer.name.clone());
            LayerDescriptor {
                opacity: layer.opacity,
                ..descriptor(
                    &layer.name,
                    title,
                    layer.visible,
                    layer.class_name.unwrap_or_else(|| DEFAULT_KIND.to_string()),
                )
            }
        })
        .collect()
}

fn from_tree_instance(entries: Vec<(String, TreeConfigEntry)>) -> Vec<LayerDescriptor> {
    entries
        .into_iter()
        .filter(|(_, e)| e.entry_type.as_deref() == Some("layer"))
        .map(|(id, e)| {
            descriptor(
                &id,
                e.title.unwrap_or_else(|| id.clone()),
                e.visible != Some(false),
                DEFAULT_KIND.to_string(),
            )
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{MapSurface, Probe};
    use crate::infrastructure::fixture::{FixtureApp, FixtureLayer, FixtureShape, FixtureSpec};

    fn handle(spec: FixtureSpec) -> (HostHandle, Arc<FixtureApp>) {
        let app = Arc::new(FixtureApp::new(spec));
        (HostHandle::new(app.clone(), Probe::LizMap), app)
    }

    fn layers() -> Vec<FixtureLayer> {
        vec![
            FixtureLayer {
                title: Some("Roads".into()),
                geometry_type: Some("line".into()),
                ..FixtureLayer::new("roads", true)
            },
            FixtureLayer::new("parcels", false),
        ]
    }

    #[test]
    fn test_layer_config_shape_is_normalized() {
        // Arrange
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::LayerConfig,
            layers: layers(),
            ..FixtureSpec::default()
        });
        let mut registry = LayerRegistry::new();

        // Act
        let listed = registry.list_layers(Some(&h));

        // Assert
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "roads");
        assert_eq!(listed[0].title, "Roads");
        assert_eq!(listed[0].geometry_type.as_deref(), Some("line"));
        assert_eq!(listed[0].kind, "layer");
        assert!(!listed[1].visible);
        assert_eq!(listed[1].title, "parcels");
    }

    #[test]
    fn test_layer_tree_shape_walks_groups_depth_first() {
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::LayerTree,
            layers: vec![
                FixtureLayer {
                    group: Some("cadastre".into()),
                    ..FixtureLayer::new("parcels", true)
                },
                FixtureLayer::new("roads", false),
            ],
            ..FixtureSpec::default()
        });
        let listed = LayerRegistry::new().list_layers(Some(&h));

        let ids: Vec<_> = listed.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["roads", "parcels"]);
        assert!(listed[1].visible);
    }

    #[test]
    fn test_render_layers_skip_base_and_internal_layers() {
        // Arrange
        let mut all = layers();
        all.push(FixtureLayer::new("baselayer-osm", true));
        all.push(FixtureLayer::new("__selection", true));
        all.push(FixtureLayer {
            kind: Some(ROOT_CONTAINER_CLASS.into()),
            ..FixtureLayer::new("root", true)
        });
        let (h, _) = handle(FixtureSpec {
            layers: all,
            ..FixtureSpec::default()
        });

        // Act
        let listed = LayerRegistry::new().list_layers(Some(&h));

        // Assert
        let ids: Vec<_> = listed.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["roads", "parcels"]);
        assert_eq!(listed[0].kind, "OpenLayers.Layer.WMS");
    }

    #[test]
    fn test_tree_instance_skips_groups() {
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::TreeInstance,
            layers: vec![FixtureLayer {
                group: Some("g".into()),
                ..FixtureLayer::new("roads", false)
            }],
            ..FixtureSpec::default()
        });
        let listed = LayerRegistry::new().list_layers(Some(&h));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "roads");
        assert!(!listed[0].visible);
    }

    #[test]
    fn test_unrecognized_shape_or_missing_host_lists_nothing() {
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::Bare,
            layers: layers(),
            ..FixtureSpec::default()
        });
        let mut registry = LayerRegistry::new();
        assert!(registry.list_layers(Some(&h)).is_empty());
        assert!(registry.list_layers(None).is_empty());
    }

    #[test]
    fn test_listing_replaces_cache_wholesale() {
        let (h, app) = handle(FixtureSpec {
            layers: layers(),
            ..FixtureSpec::default()
        });
        let mut registry = LayerRegistry::new();
        registry.list_layers(Some(&h));
        app.set_layer_visibility("roads", false).unwrap();

        registry.list_layers(Some(&h));

        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(registry.cached("roads").map(|l| l.visible), Some(false));
    }

    #[test]
    fn test_action_dispatch_is_preferred() {
        // Arrange
        let (h, app) = handle(FixtureSpec {
            shape: FixtureShape::LayerTree,
            actions: true,
            layers: layers(),
            ..FixtureSpec::default()
        });

        // Act
        let used = LayerRegistry::new().set_visibility(&h, "parcels", true);

        // Assert
        assert_eq!(used, Ok(ToggleStrategy::ActionDispatch));
        let log = app.action_log();
        assert_eq!(log[0].0, VISIBILITY_ACTION);
        assert_eq!(log[0].1, json!({"layerId": "parcels", "visibility": true}));
        assert_eq!(app.visible("parcels"), Some(true));
    }

    #[test]
    fn test_failing_action_falls_through_to_render_layer() {
        let (h, app) = handle(FixtureSpec {
            layers: layers(),
            ..FixtureSpec::default()
        });
        let used = LayerRegistry::new().set_visibility(&h, "roads", false);
        assert_eq!(used, Ok(ToggleStrategy::RenderLayer));
        assert_eq!(app.visible("roads"), Some(false));
    }

    #[test]
    fn test_tree_setter_then_legacy_event() {
        // Arrange: tree instance without the setter, legacy bus present
        let (h, app) = handle(FixtureSpec {
            shape: FixtureShape::TreeInstance,
            legacy_events: true,
            layers: layers(),
            ..FixtureSpec::default()
        });

        // Act
        let used = LayerRegistry::new().set_visibility(&h, "parcels", true);

        // Assert
        assert_eq!(used, Ok(ToggleStrategy::LegacyEvent));
        assert_eq!(app.legacy_log()[0].0, "lizmaplayershow");
    }

    #[test]
    fn test_tree_setter_is_used_when_shipped() {
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::TreeInstance,
            tree_setter: true,
            legacy_events: true,
            layers: layers(),
            ..FixtureSpec::default()
        });
        let used = LayerRegistry::new().set_visibility(&h, "roads", false);
        assert_eq!(used, Ok(ToggleStrategy::TreeInstanceSetter));
    }

    #[test]
    fn test_all_strategies_failing_names_the_layer() {
        let (h, _) = handle(FixtureSpec {
            shape: FixtureShape::Bare,
            legacy_events: true,
            legacy_fails: true,
            ..FixtureSpec::default()
        });
        let err = LayerRegistry::new()
            .set_visibility(&h, "ghost", true)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::NoStrategySucceeded {
                layer_id: "ghost".into()
            }
        );
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_toggle_updates_existing_cache_entry_only() {
        // Arrange
        let (h, _) = handle(FixtureSpec {
            legacy_events: true,
            layers: layers(),
            ..FixtureSpec::default()
        });
        let mut registry = LayerRegistry::new();
        registry.list_layers(Some(&h));

        // Act
        registry.set_visibility(&h, "parcels", true).unwrap();
        registry.set_visibility(&h, "unlisted", true).unwrap();

        // Assert
        assert_eq!(registry.cached("parcels").map(|l| l.visible), Some(true));
        assert!(registry.cached("unlisted").is_none());
    }
}
