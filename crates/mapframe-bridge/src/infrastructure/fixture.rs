//! Scripted host runtime for local integration and tests.
//!
//! A [`FixtureHost`] plays the part of the page the bridge is embedded in: it
//! exposes global bindings, and behind one of them a [`FixtureApp`] that
//! mimics one release of the mapping application.  Which surfaces the app
//! exposes is chosen by [`FixtureShape`] plus a handful of switches, so the
//! same fixture can stand in for any of the application versions the bridge
//! supports.
//!
//! Fixtures are normally written in TOML:
//!
//! ```toml
//! binding = "lizMap"
//! shape = "render_layers"
//! appears_after_ms = 1500
//!
//! [[layers]]
//! name = "roads"
//! title = "Road network"
//! visible = true
//!
//! [map_view]
//! extent = [0.0, 0.0, 1000.0, 1000.0]
//! projection = "EPSG:3857"
//! center = [500.0, 500.0]
//! zoom = 4.0
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::application::layer_registry::VISIBILITY_ACTION;
use crate::domain::{
    ActionDispatcher, AppState, Clock, EventSurface, GlobalScope, HostError, HostEvent,
    HostEventHandler, LayerConfigEntry, LayerTreeInstance, LayerTreeNode, LegacyEventBus,
    MapApplication, MapSurface, RenderLayer, TreeConfigEntry,
};

/// Error type for fixture loading.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("I/O error reading fixture at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Fixture schema ────────────────────────────────────────────────────────────

/// Which application release the fixture imitates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureShape {
    /// Declarative layer-config map plus a rendering map.
    LayerConfig,
    /// Application state with a hierarchical layer tree; no rendering map.
    LayerTree,
    /// Rendering map with a flat layer list.
    #[default]
    RenderLayers,
    /// Rendering map without a layer list, plus a legacy tree instance.
    TreeInstance,
    /// Rendering map without a layer list and nothing else.
    Bare,
}

/// One layer of the fixture application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixtureLayer {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visible: bool,
    /// Layer type tag (layer config / tree) or engine class (render layers).
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub wms_name: Option<String>,
    #[serde(default)]
    pub opacity: Option<f64>,
    /// Parent group in the layer tree.
    #[serde(default)]
    pub group: Option<String>,
}

impl FixtureLayer {
    pub fn new(name: &str, visible: bool) -> Self {
        Self {
            name: name.to_string(),
            visible,
            ..Self::default()
        }
    }
}

/// Map view reported by `GET_MAP_INFO`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapView {
    pub extent: [f64; 4],
    pub projection: String,
    pub center: [f64; 2],
    pub zoom: f64,
    #[serde(default)]
    pub scales: Vec<f64>,
}

/// Full fixture description.  Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FixtureSpec {
    /// Global binding the application is published under.
    pub binding: String,
    /// The binding stays empty until this much time has passed.
    pub appears_after_ms: u64,
    pub shape: FixtureShape,
    pub layers: Vec<FixtureLayer>,
    /// Whether the rendering map has an event registry.
    pub map_events: bool,
    /// Whether the map reports its layers as already added.
    pub loaded: bool,
    /// Whether the application state has an action dispatcher.
    pub actions: bool,
    pub actions_fail: bool,
    /// Whether the legacy tree instance ships `setLayerVisibility`.
    pub tree_setter: bool,
    pub legacy_events: bool,
    pub legacy_fails: bool,
    /// Bindings resolving to an object with no map or state surface.
    pub decoys: Vec<String>,
    /// Bindings whose lookup throws.
    pub failing_bindings: Vec<String>,
    pub map_view: Option<MapView>,
}

impl Default for FixtureSpec {
    fn default() -> Self {
        Self {
            binding: "lizMap".to_string(),
            appears_after_ms: 0,
            shape: FixtureShape::default(),
            layers: Vec::new(),
            map_events: true,
            loaded: true,
            actions: false,
            actions_fail: false,
            tree_setter: false,
            legacy_events: false,
            legacy_fails: false,
            decoys: Vec::new(),
            failing_bindings: Vec::new(),
            map_view: None,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Fixture application ───────────────────────────────────────────────────────

/// The scripted mapping application.
pub struct FixtureApp {
    spec: FixtureSpec,
    loaded: AtomicBool,
    visibility: Mutex<HashMap<String, bool>>,
    handlers: Mutex<Vec<(String, HostEventHandler)>>,
    action_log: Mutex<Vec<(String, Value)>>,
    legacy_log: Mutex<Vec<(String, Value)>>,
}

impl FixtureApp {
    pub fn new(spec: FixtureSpec) -> Self {
        let visibility = spec
            .layers
            .iter()
            .map(|l| (l.name.clone(), l.visible))
            .collect();
        Self {
            loaded: AtomicBool::new(spec.loaded),
            spec,
            visibility: Mutex::new(visibility),
            handlers: Mutex::new(Vec::new()),
            action_log: Mutex::new(Vec::new()),
            legacy_log: Mutex::new(Vec::new()),
        }
    }

    pub fn spec(&self) -> &FixtureSpec {
        &self.spec
    }

    /// Current visibility of a layer, `None` for unknown layers.
    pub fn visible(&self, name: &str) -> Option<bool> {
        lock(&self.visibility).get(name).copied()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.handlers)
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Actions dispatched through the action API, oldest first.
    pub fn action_log(&self) -> Vec<(String, Value)> {
        lock(&self.action_log).clone()
    }

    /// Events fired on the legacy bus, oldest first.
    pub fn legacy_log(&self) -> Vec<(String, Value)> {
        lock(&self.legacy_log).clone()
    }

    /// Invokes every handler registered for `event.name`.
    pub fn emit(&self, event: HostEvent) {
        // Clone the matching handlers first so a handler may (un)register
        // without deadlocking.
        let targets: Vec<HostEventHandler> = lock(&self.handlers)
            .iter()
            .filter(|(name, _)| *name == event.name)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in targets {
            handler(&event);
        }
    }

    /// Marks the map as loaded and fires `loadend`.
    pub fn finish_loading(&self) {
        self.loaded.store(true, Ordering::Relaxed);
        self.emit(HostEvent {
            name: "loadend".to_string(),
            ..HostEvent::default()
        });
    }

    fn has_render_list(&self) -> bool {
        matches!(
            self.spec.shape,
            FixtureShape::LayerConfig | FixtureShape::RenderLayers
        )
    }

    fn render_layer(&self, layer: &FixtureLayer) -> RenderLayer {
        RenderLayer {
            name: layer.name.clone(),
            display_name: None,
            title: layer.title.clone(),
            visible: self.visible(&layer.name).unwrap_or(layer.visible),
            class_name: Some(
                layer
                    .kind
                    .clone()
                    .unwrap_or_else(|| "OpenLayers.Layer.WMS".to_string()),
            ),
            opacity: layer.opacity,
        }
    }

    fn set_known(&self, name: &str, visible: bool) -> Result<(), HostError> {
        match lock(&self.visibility).get_mut(name) {
            Some(v) => {
                *v = visible;
                Ok(())
            }
            None => Err(HostError::new(format!("unknown layer {name}"))),
        }
    }

    fn tree_node(&self, layer: &FixtureLayer) -> LayerTreeNode {
        LayerTreeNode {
            node_type: "layer".to_string(),
            name: Some(layer.name.clone()),
            title: layer.title.clone(),
            checked: self.visible(&layer.name).unwrap_or(layer.visible),
            visibility: false,
            layer_type: layer.kind.clone(),
            wms_name: layer.wms_name.clone(),
            children: Vec::new(),
        }
    }
}

impl MapApplication for FixtureApp {
    fn map(&self) -> Option<&dyn MapSurface> {
        match self.spec.shape {
            FixtureShape::LayerTree => None,
            _ => Some(self),
        }
    }

    fn app_state(&self) -> Option<&dyn AppState> {
        match self.spec.shape {
            FixtureShape::LayerTree => Some(self),
            _ => None,
        }
    }

    fn layer_config(&self) -> Option<Vec<(String, LayerConfigEntry)>> {
        if self.spec.shape != FixtureShape::LayerConfig {
            return None;
        }
        Some(
            self.spec
                .layers
                .iter()
                .map(|l| {
                    (
                        l.name.clone(),
                        LayerConfigEntry {
                            title: l.title.clone(),
                            name: Some(l.name.clone()),
                            visible: Some(l.visible),
                            layer_type: l.kind.clone(),
                            geometry_type: l.geometry_type.clone(),
                            wms_name: l.wms_name.clone(),
                        },
                    )
                })
                .collect(),
        )
    }

    fn layer_tree_instance(&self) -> Option<&dyn LayerTreeInstance> {
        match self.spec.shape {
            FixtureShape::TreeInstance => Some(self),
            _ => None,
        }
    }

    fn legacy_events(&self) -> Option<&dyn LegacyEventBus> {
        self.spec.legacy_events.then_some(self as &dyn LegacyEventBus)
    }
}

impl MapSurface for FixtureApp {
    fn layers(&self) -> Option<Vec<RenderLayer>> {
        if !self.has_render_list() {
            return None;
        }
        Some(self.spec.layers.iter().map(|l| self.render_layer(l)).collect())
    }

    fn find_layer(&self, name: &str) -> Result<Option<RenderLayer>, HostError> {
        if !self.has_render_list() {
            return Ok(None);
        }
        Ok(self
            .spec
            .layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| self.render_layer(l)))
    }

    fn set_layer_visibility(&self, name: &str, visible: bool) -> Result<(), HostError> {
        if !self.has_render_list() {
            return Err(HostError::new("map has no layers"));
        }
        self.set_known(name, visible)?;
        self.emit(HostEvent {
            name: "changelayer".to_string(),
            property: Some("visibility".to_string()),
            layer_name: Some(name.to_string()),
            layer_visible: Some(visible),
        });
        Ok(())
    }

    fn layer_count(&self) -> Option<usize> {
        if self.loaded.load(Ordering::Relaxed) {
            Some(self.spec.layers.len())
        } else {
            Some(0)
        }
    }

    fn extent(&self) -> Option<[f64; 4]> {
        self.spec.map_view.as_ref().map(|v| v.extent)
    }

    fn projection(&self) -> Option<String> {
        self.spec.map_view.as_ref().map(|v| v.projection.clone())
    }

    fn center(&self) -> Option<[f64; 2]> {
        self.spec.map_view.as_ref().map(|v| v.center)
    }

    fn zoom(&self) -> Option<f64> {
        self.spec.map_view.as_ref().map(|v| v.zoom)
    }

    fn scales(&self) -> Option<Vec<f64>> {
        self.spec
            .map_view
            .as_ref()
            .filter(|v| !v.scales.is_empty())
            .map(|v| v.scales.clone())
    }

    fn events(&self) -> Option<&dyn EventSurface> {
        self.spec.map_events.then_some(self as &dyn EventSurface)
    }
}

impl EventSurface for FixtureApp {
    fn register(&self, event: &str, handler: HostEventHandler) -> Result<(), HostError> {
        lock(&self.handlers).push((event.to_string(), handler));
        Ok(())
    }

    fn unregister(&self, event: &str, handler: &HostEventHandler) -> Result<(), HostError> {
        lock(&self.handlers).retain(|(name, h)| !(name == event && Arc::ptr_eq(h, handler)));
        Ok(())
    }
}

impl AppState for FixtureApp {
    fn layer_tree(&self) -> Option<LayerTreeNode> {
        let mut root = LayerTreeNode {
            node_type: "group".to_string(),
            name: Some("root".to_string()),
            ..LayerTreeNode::default()
        };
        let mut groups: Vec<LayerTreeNode> = Vec::new();
        for layer in &self.spec.layers {
            let node = self.tree_node(layer);
            match &layer.group {
                None => root.children.push(node),
                Some(group) => match groups.iter_mut().find(|g| g.name.as_ref() == Some(group)) {
                    Some(g) => g.children.push(node),
                    None => groups.push(LayerTreeNode {
                        node_type: "group".to_string(),
                        name: Some(group.clone()),
                        children: vec![node],
                        ..LayerTreeNode::default()
                    }),
                },
            }
        }
        root.children.extend(groups);
        Some(root)
    }

    fn has_map(&self) -> bool {
        true
    }

    fn actions(&self) -> Option<&dyn ActionDispatcher> {
        self.spec.actions.then_some(self as &dyn ActionDispatcher)
    }
}

impl ActionDispatcher for FixtureApp {
    fn trigger(&self, action: &str, payload: &Value) -> Result<(), HostError> {
        if self.spec.actions_fail {
            return Err(HostError::new("action dispatcher rejected the action"));
        }
        lock(&self.action_log).push((action.to_string(), payload.clone()));
        if action == VISIBILITY_ACTION {
            let layer = payload
                .get("layerId")
                .and_then(Value::as_str)
                .ok_or_else(|| HostError::new("layerId missing"))?;
            let visible = payload
                .get("visibility")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.set_known(layer, visible)?;
        }
        Ok(())
    }
}

impl LayerTreeInstance for FixtureApp {
    fn config(&self) -> Option<Vec<(String, TreeConfigEntry)>> {
        let mut entries = Vec::new();
        for layer in &self.spec.layers {
            if let Some(group) = &layer.group {
                if !entries.iter().any(|(id, _): &(String, TreeConfigEntry)| id == group) {
                    entries.push((
                        group.clone(),
                        TreeConfigEntry {
                            entry_type: Some("group".to_string()),
                            title: None,
                            visible: None,
                        },
                    ));
                }
            }
            entries.push((
                layer.name.clone(),
                TreeConfigEntry {
                    entry_type: Some("layer".to_string()),
                    title: layer.title.clone(),
                    visible: Some(self.visible(&layer.name).unwrap_or(layer.visible)),
                },
            ));
        }
        Some(entries)
    }

    fn supports_visibility_setter(&self) -> bool {
        self.spec.tree_setter
    }

    fn set_layer_visibility(&self, layer_id: &str, visible: bool) -> Result<(), HostError> {
        if !self.spec.tree_setter {
            return Err(HostError::new("setLayerVisibility is not a function"));
        }
        self.set_known(layer_id, visible)
    }
}

impl LegacyEventBus for FixtureApp {
    fn trigger_event(&self, name: &str, payload: &Value) -> Result<(), HostError> {
        if self.spec.legacy_fails {
            return Err(HostError::new("legacy event bus failed"));
        }
        lock(&self.legacy_log).push((name.to_string(), payload.clone()));
        let visible = match name {
            "lizmaplayershow" => true,
            "lizmaplayerhide" => false,
            _ => return Ok(()),
        };
        if let Some(layer) = payload.get("layerId").and_then(Value::as_str) {
            // Fire-and-forget: unknown layers are ignored by the legacy bus.
            let _ = self.set_known(layer, visible);
        }
        Ok(())
    }
}

/// An object bound under a product-like name that is not the application.
struct DecoyApp;

impl MapApplication for DecoyApp {}

// ── Fixture host runtime ──────────────────────────────────────────────────────

/// Global bindings of the scripted page.
pub struct FixtureHost {
    app: Arc<FixtureApp>,
    decoy: Arc<DecoyApp>,
    clock: Arc<dyn Clock>,
    started_at: u64,
    scans: AtomicUsize,
}

impl FixtureHost {
    /// Creates a host whose application appears `spec.appears_after_ms` after
    /// now, as read from `clock`.
    pub fn new(spec: FixtureSpec, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now_ms();
        Self {
            app: Arc::new(FixtureApp::new(spec)),
            decoy: Arc::new(DecoyApp),
            clock,
            started_at,
            scans: AtomicUsize::new(0),
        }
    }

    /// Parses a TOML fixture.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(text: &str, clock: Arc<dyn Clock>) -> Result<Self, FixtureError> {
        let spec: FixtureSpec = toml::from_str(text)?;
        Ok(Self::new(spec, clock))
    }

    /// Reads and parses a TOML fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Io`] if the file cannot be read and
    /// [`FixtureError::Parse`] if it is malformed.
    pub fn load(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, clock)
    }

    pub fn app(&self) -> Arc<FixtureApp> {
        Arc::clone(&self.app)
    }

    /// Number of full-scope scans performed (one per discovery sweep that
    /// reached the last probe).
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    fn appeared(&self) -> bool {
        self.clock.now_ms().saturating_sub(self.started_at) >= self.app.spec.appears_after_ms
    }
}

impl GlobalScope for FixtureHost {
    fn binding(&self, path: &str) -> Result<Option<Arc<dyn MapApplication>>, HostError> {
        let spec = &self.app.spec;
        if spec.failing_bindings.iter().any(|b| b == path) {
            return Err(HostError::new(format!("cannot read property of {path}")));
        }
        if spec.decoys.iter().any(|b| b == path) {
            return Ok(Some(Arc::clone(&self.decoy) as Arc<dyn MapApplication>));
        }
        if path == spec.binding && self.appeared() {
            return Ok(Some(Arc::clone(&self.app) as Arc<dyn MapApplication>));
        }
        Ok(None)
    }

    fn binding_names(&self) -> Vec<String> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let spec = &self.app.spec;
        let mut names: Vec<String> = ["window", "document", "navigator"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend(spec.decoys.iter().cloned());
        names.extend(spec.failing_bindings.iter().cloned());
        if self.appeared() {
            names.push(spec.binding.clone());
        }
        names
    }
}
