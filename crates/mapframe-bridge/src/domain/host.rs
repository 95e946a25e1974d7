//! Capability traits describing the hosting runtime and the mapping
//! application found inside it.
//!
//! The bridge never owns the mapping application.  It discovers it among the
//! runtime's global bindings and then talks to whatever API surfaces that
//! particular application version happens to expose.  Different releases of
//! the application expose different surfaces:
//!
//! ```text
//! MapApplication
//!   ├── map()                  rendering-engine map: layer list, visibility, extent, events
//!   ├── app_state()            newer releases: hierarchical layer tree + action dispatcher
//!   ├── layer_config()         declarative layer-config map
//!   ├── layer_tree_instance()  older releases: tree config + optional visibility setter
//!   └── legacy_events()        oldest releases: string-keyed event trigger
//! ```
//!
//! Every surface is optional.  The default method bodies return `None`, so an
//! implementation only overrides what it really has.
//!
//! # Errors as "the host threw"
//!
//! A host API call that fails returns [`HostError`].  The bridge never lets a
//! `HostError` escape to the channel: it is caught at the probe or strategy
//! boundary and turned into "try the next one".

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A host API call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host error: {0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ── Hosting runtime ───────────────────────────────────────────────────────────

/// The hosting runtime's top-level global bindings.
pub trait GlobalScope: Send + Sync {
    /// Resolves a dotted binding path such as `"lizMap"` or
    /// `"application.lizmap"`.
    ///
    /// Returns `Ok(None)` when nothing is bound there (yet).
    fn binding(&self, path: &str) -> Result<Option<Arc<dyn MapApplication>>, HostError>;

    /// Lists the names of all top-level bindings.  Used by the heuristic scan.
    fn binding_names(&self) -> Vec<String>;
}

/// A discovered mapping-application instance.
pub trait MapApplication: Send + Sync {
    fn map(&self) -> Option<&dyn MapSurface> {
        None
    }

    fn app_state(&self) -> Option<&dyn AppState> {
        None
    }

    /// Declarative layer configuration, in declaration order.
    fn layer_config(&self) -> Option<Vec<(String, LayerConfigEntry)>> {
        None
    }

    fn layer_tree_instance(&self) -> Option<&dyn LayerTreeInstance> {
        None
    }

    fn legacy_events(&self) -> Option<&dyn LegacyEventBus> {
        None
    }
}

// ── Surfaces ──────────────────────────────────────────────────────────────────

/// The rendering engine's map object.
pub trait MapSurface: Send + Sync {
    /// All rendering layers, or `None` when this map exposes no layer list.
    fn layers(&self) -> Option<Vec<RenderLayer>>;

    /// Looks up a rendering layer by name.
    fn find_layer(&self, name: &str) -> Result<Option<RenderLayer>, HostError>;

    /// Sets the visibility of the named rendering layer.
    fn set_layer_visibility(&self, name: &str, visible: bool) -> Result<(), HostError>;

    /// Number of layers currently added to the map, when the engine reports it.
    fn layer_count(&self) -> Option<usize> {
        None
    }

    fn extent(&self) -> Option<[f64; 4]> {
        None
    }

    fn projection(&self) -> Option<String> {
        None
    }

    fn center(&self) -> Option<[f64; 2]> {
        None
    }

    fn zoom(&self) -> Option<f64> {
        None
    }

    fn scales(&self) -> Option<Vec<f64>> {
        None
    }

    /// The map's event registry, if it has one.
    fn events(&self) -> Option<&dyn EventSurface> {
        None
    }
}

/// Handler invoked by the host for a named event.
///
/// Handlers are compared by pointer identity ([`Arc::ptr_eq`]) on
/// unregistration, so the caller must keep the exact `Arc` it registered.
pub type HostEventHandler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// An event raised by the host application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostEvent {
    /// Event name, e.g. `"changelayer"` or `"loadend"`.
    pub name: String,
    /// Which layer property changed (`"visibility"`, `"opacity"`, ...).
    pub property: Option<String>,
    /// Name of the layer concerned, if any.
    pub layer_name: Option<String>,
    /// The layer's visibility after the change, if known.
    pub layer_visible: Option<bool>,
}

/// Subscribe/unsubscribe surface of the rendering engine.
pub trait EventSurface: Send + Sync {
    fn register(&self, event: &str, handler: HostEventHandler) -> Result<(), HostError>;

    /// Removes `handler`, matched by pointer identity.
    fn unregister(&self, event: &str, handler: &HostEventHandler) -> Result<(), HostError>;
}

/// Application-level state exposed by newer releases.
pub trait AppState: Send + Sync {
    /// Root of the hierarchical layer tree.
    fn layer_tree(&self) -> Option<LayerTreeNode> {
        None
    }

    /// Declarative "the map already exists" flag.
    fn has_map(&self) -> bool {
        false
    }

    fn actions(&self) -> Option<&dyn ActionDispatcher> {
        None
    }
}

/// High-level action dispatch API.
pub trait ActionDispatcher: Send + Sync {
    fn trigger(&self, action: &str, payload: &Value) -> Result<(), HostError>;
}

/// Layer tree widget of older releases.
pub trait LayerTreeInstance: Send + Sync {
    /// Tree configuration keyed by layer id, in declaration order.
    fn config(&self) -> Option<Vec<(String, TreeConfigEntry)>>;

    /// Whether this release ships the visibility setter method.
    fn supports_visibility_setter(&self) -> bool {
        false
    }

    fn set_layer_visibility(&self, _layer_id: &str, _visible: bool) -> Result<(), HostError> {
        Err(HostError::new("setLayerVisibility is not a function"))
    }
}

/// String-keyed event bus of the oldest releases.
pub trait LegacyEventBus: Send + Sync {
    fn trigger_event(&self, name: &str, payload: &Value) -> Result<(), HostError>;
}

// ── Native records ────────────────────────────────────────────────────────────

/// A rendering-engine layer as the engine reports it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RenderLayer {
    /// Empty for anonymous layers.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visible: bool,
    /// Engine class, e.g. `"OpenLayers.Layer.WMS"`.
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub opacity: Option<f64>,
}

/// One entry of the declarative layer-config map.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerConfigEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// `None` means "not specified", which counts as visible.
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub layer_type: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub wms_name: Option<String>,
}

/// A node of the hierarchical layer tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerTreeNode {
    /// `"group"` or `"layer"`.
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub visibility: bool,
    #[serde(default)]
    pub layer_type: Option<String>,
    #[serde(default)]
    pub wms_name: Option<String>,
    #[serde(default)]
    pub children: Vec<LayerTreeNode>,
}

/// One entry of a legacy layer tree configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TreeConfigEntry {
    /// Only entries of type `"layer"` are layers; groups are skipped.
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
}
