//! The engine object store.
//!
//! [`Engine`] is the single owner of every engine object: spatials, geometry
//! features and (with the `render` feature) render stages and MIP layers.
//! Views in [`crate::spatial`], [`crate::feature`] and [`crate::render`]
//! address those objects by key and decide when they are deleted; the engine
//! itself only deletes subtrees, stages with their layers, and
//! reference-counted features on request.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::BindingError;
use crate::feature::FeatureEntry;
use crate::registry::{Key, Registry};
use crate::scene::{SceneGraph, Spatial, SpatialId, SpatialKind};

#[cfg(feature = "render")]
use crate::render::mip::MipLayer;
#[cfg(feature = "render")]
use crate::render::stage::RenderStage;

/// Shared handle to an engine instance, held by every view.
pub type EngineRef = Rc<RefCell<Engine>>;

/// Class of an engine object, as reported in lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Node,
    Camera,
    Geometry,
    Feature,
    Stage,
    Layer,
}

impl ObjectClass {
    pub fn name(self) -> &'static str {
        match self {
            ObjectClass::Node => "node",
            ObjectClass::Camera => "camera",
            ObjectClass::Geometry => "geometry",
            ObjectClass::Feature => "geometry feature",
            ObjectClass::Stage => "render stage",
            ObjectClass::Layer => "mip layer",
        }
    }
}

/// Identity of one engine object, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub class: ObjectClass,
    pub index: u32,
    pub generation: u32,
}

impl ObjectRef {
    pub fn new<T>(class: ObjectClass, key: Key<T>) -> Self {
        Self {
            class,
            index: key.index(),
            generation: key.generation(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", self.class.name(), self.index, self.generation)
    }
}

/// Lifecycle event recorded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Created(ObjectRef),
    Deleted(ObjectRef),
}

impl EngineEvent {
    pub fn object(&self) -> ObjectRef {
        match *self {
            EngineEvent::Created(obj) | EngineEvent::Deleted(obj) => obj,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Created(obj) => write!(f, "{obj}: created"),
            EngineEvent::Deleted(obj) => write!(f, "{obj}: deleted"),
        }
    }
}

/// Owner of all engine objects of one binding instance.
#[derive(Default)]
pub struct Engine {
    pub(crate) scene: SceneGraph,
    pub(crate) features: Registry<FeatureEntry>,
    #[cfg(feature = "render")]
    pub(crate) stages: Registry<Box<dyn RenderStage>>,
    #[cfg(feature = "render")]
    pub(crate) layers: Registry<MipLayer>,
    events: Vec<EngineEvent>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine behind a shared handle.
    pub fn new_ref() -> EngineRef {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    /// Events recorded since the last [`Engine::take_events`].
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: EngineEvent) {
        debug!("{event}");
        self.events.push(event);
    }

    /// Stores a new spatial object. It starts without a parent.
    pub fn create_spatial(&mut self, spatial: Spatial) -> SpatialId {
        let class = spatial.class();
        let id = self.scene.insert(spatial);
        self.record(EngineEvent::Created(ObjectRef::new(class, id)));
        id
    }

    pub fn attach_child(&mut self, parent: SpatialId, child: SpatialId) -> Result<(), BindingError> {
        self.scene.attach_child(parent, child)
    }

    pub fn detach_from_parent(&mut self, id: SpatialId) -> Result<(), BindingError> {
        self.scene.detach_from_parent(id)
    }

    /// Deletes `id` and its whole subtree, releasing the features that
    /// geometries in the subtree referenced.
    pub fn delete_spatial(&mut self, id: SpatialId) -> Result<(), BindingError> {
        let removed = self.scene.remove_subtree(id)?;
        for (key, spatial) in removed {
            let class = spatial.class();
            if let SpatialKind::Geometry(geometry) = spatial.kind() {
                for &feature in geometry.features.values() {
                    if let Err(err) = self.release_feature(feature) {
                        warn!("releasing feature of deleted geometry failed: {err}");
                    }
                }
            }
            self.record(EngineEvent::Deleted(ObjectRef::new(class, key)));
        }
        Ok(())
    }

    /// Number of live engine objects of all classes.
    pub fn live_objects(&self) -> usize {
        let count = self.scene.len() + self.features.len();
        #[cfg(feature = "render")]
        let count = count + self.stages.len() + self.layers.len();
        count
    }
}
