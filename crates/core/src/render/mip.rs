//! Maximum intensity projection: the stage and the layers it owns.
//!
//! A [`MipLayer`] is created standalone, owned by its [`LayerView`], and then
//! appended to a stage that supports layers. From then on the stage deletes
//! it: when the layer is removed again the view takes deletion duty back,
//! and when the stage is deleted its layers go with it.

use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use super::stage::{RenderPass, RenderStage, StageId, StageView};
use crate::color::Color;
use crate::engine::{Engine, EngineEvent, EngineRef, ObjectClass, ObjectRef};
use crate::error::BindingError;
use crate::ownership::{Managed, View};
use crate::registry::Key;
use crate::scene::{SceneGraph, SpatialId, SpatialKind};

/// Handle of a MIP layer inside the engine.
pub type LayerId = Key<MipLayer>;

/// Intensity range that a MIP layer maps to a color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MipLayer {
    pub min_intensity: f32,
    pub max_intensity: f32,
    pub color: Color,
}

impl MipLayer {
    pub fn new(min_intensity: f32, max_intensity: f32, color: Color) -> Self {
        Self {
            min_intensity,
            max_intensity,
            color,
        }
    }

    /// Whether `intensity` falls into the layer's range, bounds included.
    pub fn covers(&self, intensity: f32) -> bool {
        (self.min_intensity..=self.max_intensity).contains(&intensity)
    }
}

/// Renders maximum intensity projections of volume geometries.
///
/// The projection itself runs in the engine; this stage selects the
/// geometries of its type below the rendered root and owns the layers.
#[derive(Debug)]
pub struct MipStage {
    geometry_type: u32,
    layers: Vec<LayerId>,
    enabled: bool,
    last_batch: usize,
}

impl MipStage {
    /// Role under which volume geometries carry their intensity textures.
    pub const ROLE_INTENSITIES: u32 = 0;

    pub fn new(geometry_type: u32) -> Self {
        Self {
            geometry_type,
            layers: Vec::new(),
            enabled: true,
            last_batch: 0,
        }
    }

    pub fn geometry_type(&self) -> u32 {
        self.geometry_type
    }

    /// Number of geometries selected by the most recent frame.
    pub fn last_batch(&self) -> usize {
        self.last_batch
    }
}

/// Geometries of `geometry_type` below `root` that carry a feature under
/// [`MipStage::ROLE_INTENSITIES`], in depth-first order.
fn volume_batch(scene: &SceneGraph, root: SpatialId, geometry_type: u32) -> Result<Vec<SpatialId>, BindingError> {
    let mut batch = Vec::new();
    let mut select = |id: SpatialId| {
        if let Ok(spatial) = scene.get(id) {
            if let SpatialKind::Geometry(geometry) = spatial.kind() {
                if geometry.geometry_type == geometry_type
                    && geometry.features().contains_key(&MipStage::ROLE_INTENSITIES)
                {
                    batch.push(id);
                }
            }
        }
    };
    select(root);
    scene.visit_children(root, true, &mut select)?;
    Ok(batch)
}

impl RenderStage for MipStage {
    fn name(&self) -> &'static str {
        "mip"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn render(&mut self, pass: &RenderPass<'_>) -> Result<(), BindingError> {
        let batch = volume_batch(pass.scene, pass.root, self.geometry_type)?;
        debug!(
            "mip: {} volume geometries, {} layer(s)",
            batch.len(),
            self.layers.len()
        );
        self.last_batch = batch.len();
        Ok(())
    }

    fn layers(&self) -> Option<&[LayerId]> {
        Some(&self.layers)
    }

    fn layers_mut(&mut self) -> Option<&mut Vec<LayerId>> {
        Some(&mut self.layers)
    }
}

impl Engine {
    pub fn create_layer(&mut self, layer: MipLayer) -> LayerId {
        let id = self.layers.insert(layer);
        self.record(EngineEvent::Created(ObjectRef::new(ObjectClass::Layer, id)));
        id
    }

    pub fn layer(&self, id: LayerId) -> Result<&MipLayer, BindingError> {
        self.layers.get(id).ok_or(BindingError::StaleObject("mip layer"))
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut MipLayer, BindingError> {
        self.layers.get_mut(id).ok_or(BindingError::StaleObject("mip layer"))
    }

    pub fn delete_layer(&mut self, id: LayerId) -> Result<(), BindingError> {
        self.layers
            .remove(id)
            .ok_or(BindingError::StaleObject("mip layer"))?;
        self.record(EngineEvent::Deleted(ObjectRef::new(ObjectClass::Layer, id)));
        Ok(())
    }

    fn stage_layers_mut(&mut self, stage: StageId) -> Result<&mut Vec<LayerId>, BindingError> {
        let stage = self.stage_mut(stage)?;
        let found = stage.name();
        stage.layers_mut().ok_or(BindingError::KindMismatch {
            expected: "MIP stage",
            found,
        })
    }

    /// Appends `layer` to the layers of `stage`, which then deletes it.
    pub fn append_layer(&mut self, stage: StageId, layer: LayerId) -> Result<(), BindingError> {
        self.layer(layer)?;
        self.stage_layers_mut(stage)?.push(layer);
        Ok(())
    }

    /// Removes `layer` from `stage` without deleting it. Returns whether the
    /// stage held the layer.
    pub fn remove_layer(&mut self, stage: StageId, layer: LayerId) -> Result<bool, BindingError> {
        let layers = self.stage_layers_mut(stage)?;
        let before = layers.len();
        layers.retain(|&held| held != layer);
        Ok(layers.len() != before)
    }
}

/// Engine-side handle of a MIP layer.
pub struct Layer {
    engine: EngineRef,
    id: LayerId,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer").field("id", &self.id).finish()
    }
}

impl Managed for Layer {
    type Owner = StageView;
    const KIND: &'static str = "mip layer";
    const OWNER_KIND: &'static str = "render stage";

    fn delete(&self) {
        if let Err(err) = self.engine.borrow_mut().delete_layer(self.id) {
            warn!("deleting mip layer failed: {err}");
        }
    }
}

pub type LayerView = View<Layer>;

impl View<Layer> {
    pub fn create(engine: &EngineRef, layer: MipLayer) -> Rc<Self> {
        let id = engine.borrow_mut().create_layer(layer);
        View::new(Layer {
            engine: Rc::clone(engine),
            id,
        })
    }

    pub fn id(&self) -> LayerId {
        self.object().id
    }

    pub fn engine(&self) -> &EngineRef {
        &self.object().engine
    }

    /// Current settings of the layer.
    pub fn settings(&self) -> Result<MipLayer, BindingError> {
        Ok(*self.engine().borrow().layer(self.id())?)
    }

    pub fn set_color(&self, color: Color) -> Result<(), BindingError> {
        self.engine().borrow_mut().layer_mut(self.id())?.color = color;
        Ok(())
    }
}

impl View<super::stage::Stage> {
    /// Appends `layer` and takes over its deletion.
    ///
    /// Fails with `AlreadyOwned` if the layer already belongs to a stage, and
    /// with `KindMismatch` if this stage has no layers.
    pub fn append_layer(self: &Rc<Self>, layer: &LayerView) -> Result<(), BindingError> {
        if !Rc::ptr_eq(self.engine(), layer.engine()) {
            return Err(BindingError::EngineMismatch);
        }
        let (stage, id) = (self.id(), layer.id());
        layer.adopt(self, || self.engine().borrow_mut().append_layer(stage, id))
    }

    /// Hands `layer` back to its view. A layer that this stage does not own
    /// is left alone.
    pub fn remove_layer(self: &Rc<Self>, layer: &LayerView) -> Result<(), BindingError> {
        match layer.owner() {
            Some(owner) if Rc::ptr_eq(&owner, self) => {
                let (stage, id) = (self.id(), layer.id());
                layer.release(|| self.engine().borrow_mut().remove_layer(stage, id).map(drop))
            }
            _ => Ok(()),
        }
    }

    /// Number of layers, or `None` for stages without layers.
    pub fn layers_count(&self) -> Result<Option<usize>, BindingError> {
        Ok(self.engine().borrow().stage(self.id())?.layers().map(<[LayerId]>::len))
    }
}
