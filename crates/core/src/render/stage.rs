//! Render stages and their views.
//!
//! A stage is created standalone (owned by its view) and then appended to a
//! [`FrameRenderer`], which takes over deletion duty.

use std::fmt;
use std::rc::Rc;

use glam::Mat4;
use log::warn;

use super::mip::LayerId;
use super::renderer::FrameRenderer;
use crate::engine::{Engine, EngineEvent, EngineRef, ObjectClass, ObjectRef};
use crate::error::BindingError;
use crate::ownership::{Managed, View};
use crate::registry::Key;
use crate::scene::{SceneGraph, SpatialId};

/// Handle of a render stage inside the engine.
pub type StageId = Key<Box<dyn RenderStage>>;

/// Region of the frame that a pass draws to, in window coordinates
/// (origin at the bottom-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// The whole frame, or its largest centered square if `fit_square` is set.
    pub fn fit(width: u32, height: u32, fit_square: bool) -> Self {
        if !fit_square {
            return Self {
                x: 0,
                y: 0,
                width,
                height,
            };
        }
        let side = width.min(height);
        Self {
            x: ((width - side) / 2) as i32,
            y: ((height - side) / 2) as i32,
            width: side,
            height: side,
        }
    }
}

/// Everything a stage sees while rendering one frame.
pub struct RenderPass<'a> {
    pub gl: &'a glow::Context,
    pub scene: &'a SceneGraph,
    pub camera: SpatialId,
    pub root: SpatialId,
    pub viewport: Viewport,
    /// Inverse world transform of the camera.
    pub view_transform: Mat4,
    pub projection: Mat4,
}

/// One step of a frame. Stages run in the order they were appended.
pub trait RenderStage {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    fn render(&mut self, pass: &RenderPass<'_>) -> Result<(), BindingError>;

    /// Layers owned by this stage. `None` for stages without layers.
    fn layers(&self) -> Option<&[LayerId]> {
        None
    }

    fn layers_mut(&mut self) -> Option<&mut Vec<LayerId>> {
        None
    }
}

impl Engine {
    pub fn create_stage(&mut self, stage: Box<dyn RenderStage>) -> StageId {
        let id = self.stages.insert(stage);
        self.record(EngineEvent::Created(ObjectRef::new(ObjectClass::Stage, id)));
        id
    }

    pub fn stage(&self, id: StageId) -> Result<&dyn RenderStage, BindingError> {
        self.stages
            .get(id)
            .map(|stage| stage.as_ref())
            .ok_or(BindingError::StaleObject("render stage"))
    }

    pub fn stage_mut(&mut self, id: StageId) -> Result<&mut (dyn RenderStage + 'static), BindingError> {
        self.stages
            .get_mut(id)
            .map(|stage| stage.as_mut())
            .ok_or(BindingError::StaleObject("render stage"))
    }

    /// Deletes the stage together with the layers it owns.
    pub fn delete_stage(&mut self, id: StageId) -> Result<(), BindingError> {
        let stage = self
            .stages
            .remove(id)
            .ok_or(BindingError::StaleObject("render stage"))?;
        for &layer in stage.layers().unwrap_or_default() {
            if let Err(err) = self.delete_layer(layer) {
                warn!("deleting layer of render stage failed: {err}");
            }
        }
        self.record(EngineEvent::Deleted(ObjectRef::new(ObjectClass::Stage, id)));
        Ok(())
    }
}

/// Engine-side handle of a render stage.
pub struct Stage {
    engine: EngineRef,
    id: StageId,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").field("id", &self.id).finish()
    }
}

impl Managed for Stage {
    type Owner = FrameRenderer;
    const KIND: &'static str = "render stage";
    const OWNER_KIND: &'static str = "frame renderer";

    fn delete(&self) {
        if let Err(err) = self.engine.borrow_mut().delete_stage(self.id) {
            warn!("deleting render stage failed: {err}");
        }
    }
}

pub type StageView = View<Stage>;

impl View<Stage> {
    pub fn create(engine: &EngineRef, stage: impl RenderStage + 'static) -> Rc<Self> {
        let id = engine.borrow_mut().create_stage(Box::new(stage));
        View::new(Stage {
            engine: Rc::clone(engine),
            id,
        })
    }

    pub fn id(&self) -> StageId {
        self.object().id
    }

    pub fn engine(&self) -> &EngineRef {
        &self.object().engine
    }

    pub fn name(&self) -> Result<&'static str, BindingError> {
        Ok(self.engine().borrow().stage(self.id())?.name())
    }

    pub fn is_enabled(&self) -> Result<bool, BindingError> {
        Ok(self.engine().borrow().stage(self.id())?.is_enabled())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), BindingError> {
        self.engine()
            .borrow_mut()
            .stage_mut(self.id())?
            .set_enabled(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::presets::FillStage;
    use crate::Color;

    #[test]
    fn viewport_fit_square_is_centered() {
        let viewport = Viewport::fit(640, 480, true);
        assert_eq!(
            viewport,
            Viewport {
                x: 80,
                y: 0,
                width: 480,
                height: 480
            }
        );
        assert_eq!(Viewport::fit(64, 48, false).width, 64);
    }

    #[test]
    fn stage_view_toggles_enabled() {
        let engine = Engine::new_ref();
        let stage = StageView::create(&engine, FillStage::new(Color::RED));
        assert!(stage.is_enabled().unwrap());
        stage.set_enabled(false).unwrap();
        assert!(!stage.is_enabled().unwrap());
        assert_eq!(stage.name().unwrap(), "fill");
    }

    #[test]
    fn dropping_unowned_stage_deletes_it() {
        let engine = Engine::new_ref();
        let stage = StageView::create(&engine, FillStage::new(Color::RED));
        let id = stage.id();
        drop(stage);
        assert!(engine.borrow().stage(id).is_err());
        assert!(engine.borrow_mut().delete_stage(id).is_err());
    }
}
