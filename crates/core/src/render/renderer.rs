//! Frame renderer: the aggregate owner of render stages.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use super::context::{check_gl, GlContext};
use super::stage::{RenderPass, StageId, StageView, Viewport};
use crate::color::Color;
use crate::engine::{Engine, EngineRef};
use crate::error::BindingError;
use crate::scene::SpatialKind;
use crate::spatial::{CameraView, NodeView};

#[derive(Debug)]
struct FrameState {
    width: u32,
    height: u32,
    fit_square: bool,
    background: Color,
    stages: Vec<StageId>,
}

/// Renders frames of a scene through an ordered list of stages.
///
/// Stages appended to the renderer are owned by it and deleted together with
/// it, with its context current.
pub struct FrameRenderer {
    context: Rc<dyn GlContext>,
    engine: EngineRef,
    state: RefCell<FrameState>,
}

fn check_dimensions(width: u32, height: u32) -> Result<(), BindingError> {
    if width == 0 || height == 0 {
        return Err(BindingError::InvalidDimensions { width, height });
    }
    Ok(())
}

impl FrameRenderer {
    pub fn new(
        context: Rc<dyn GlContext>,
        engine: &EngineRef,
        width: u32,
        height: u32,
        fit_square: bool,
    ) -> Result<Rc<Self>, BindingError> {
        check_dimensions(width, height)?;
        Ok(Rc::new(Self {
            context,
            engine: Rc::clone(engine),
            state: RefCell::new(FrameState {
                width,
                height,
                fit_square,
                background: Color::BLACK_NO_ALPHA,
                stages: Vec::new(),
            }),
        }))
    }

    pub fn context(&self) -> &Rc<dyn GlContext> {
        &self.context
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn width(&self) -> u32 {
        self.state.borrow().width
    }

    pub fn height(&self) -> u32 {
        self.state.borrow().height
    }

    pub fn stages_count(&self) -> usize {
        self.state.borrow().stages.len()
    }

    pub fn background_color(&self) -> Color {
        self.state.borrow().background
    }

    pub fn set_background_color(&self, color: Color) {
        self.state.borrow_mut().background = color;
    }

    pub fn fit_square(&self) -> bool {
        self.state.borrow().fit_square
    }

    pub fn set_fit_square(&self, fit_square: bool) {
        self.state.borrow_mut().fit_square = fit_square;
    }

    pub fn reshape(&self, width: u32, height: u32) -> Result<(), BindingError> {
        check_dimensions(width, height)?;
        let mut state = self.state.borrow_mut();
        state.width = width;
        state.height = height;
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        let state = self.state.borrow();
        Viewport::fit(state.width, state.height, state.fit_square)
    }

    /// Appends `stage` and takes over its deletion.
    ///
    /// Fails with `AlreadyOwned` if the stage already belongs to a renderer.
    pub fn append_stage(self: &Rc<Self>, stage: &StageView) -> Result<(), BindingError> {
        if !Rc::ptr_eq(&self.engine, stage.engine()) {
            return Err(BindingError::EngineMismatch);
        }
        let id = stage.id();
        stage.adopt(self, || {
            self.engine.borrow().stage(id)?;
            self.state.borrow_mut().stages.push(id);
            Ok(())
        })
    }

    /// Stage at `index` in render order.
    pub fn stage_at(&self, index: usize) -> Result<StageId, BindingError> {
        let state = self.state.borrow();
        state
            .stages
            .get(index)
            .copied()
            .ok_or(BindingError::IndexOutOfRange {
                kind: "render stage",
                index,
                len: state.stages.len(),
            })
    }

    /// Deletes every stage, with the context current.
    ///
    /// Views of the deleted stages stay owned by this renderer; engine access
    /// through them fails with `StaleObject`.
    pub fn clear_stages(&self) -> Result<(), BindingError> {
        let stages = std::mem::take(&mut self.state.borrow_mut().stages);
        if stages.is_empty() {
            return Ok(());
        }
        self.context.make_current()?;
        let mut engine = self.engine.borrow_mut();
        for id in stages {
            engine.delete_stage(id)?;
        }
        debug!("render stages cleared");
        Ok(())
    }

    /// Renders one frame of the subtree at `root` as seen by `camera`.
    ///
    /// Without `root`, the camera's topmost ancestor is rendered. The target
    /// framebuffer must already be bound.
    #[allow(unsafe_code)]
    pub fn render(&self, camera: &CameraView, root: Option<&NodeView>) -> Result<(), BindingError> {
        use glow::HasContext;

        let foreign_root = root.is_some_and(|root| !Rc::ptr_eq(&self.engine, root.engine()));
        if foreign_root || !Rc::ptr_eq(&self.engine, camera.engine()) {
            return Err(BindingError::EngineMismatch);
        }
        self.context.make_current()?;
        let gl = self.context.gl();
        let state = self.state.borrow();
        let mut engine = self.engine.borrow_mut();

        let camera_id = camera.id();
        let root_id = match root {
            Some(root) => root.id(),
            None => engine.scene().root_of(camera_id)?,
        };
        engine.scene_mut().update_world_transform(root_id)?;
        let camera_root = engine.scene().root_of(camera_id)?;
        if camera_root != root_id {
            engine.scene_mut().update_world_transform(camera_root)?;
        }

        let camera_spatial = engine.scene().get(camera_id)?;
        let projection = match camera_spatial.kind() {
            SpatialKind::Camera(camera) => camera.projection,
            _ => {
                return Err(BindingError::KindMismatch {
                    expected: "camera",
                    found: camera_spatial.class().name(),
                })
            }
        };
        let view_transform = camera_spatial.world_transform().inverse();

        let viewport = Viewport::fit(state.width, state.height, state.fit_square);
        let [r, g, b, a] = state.background.to_f32();
        // SAFETY: the context is current; the caller bound the target.
        unsafe {
            gl.disable(glow::SCISSOR_TEST);
            gl.viewport(0, 0, state.width as i32, state.height as i32);
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            gl.viewport(viewport.x, viewport.y, viewport.width as i32, viewport.height as i32);
        }
        check_gl(gl, "clear")?;

        let Engine { scene, stages, .. } = &mut *engine;
        let pass = RenderPass {
            gl,
            scene,
            camera: camera_id,
            root: root_id,
            viewport,
            view_transform,
            projection,
        };
        for &id in &state.stages {
            let stage = stages
                .get_mut(id)
                .ok_or(BindingError::StaleObject("render stage"))?;
            if stage.is_enabled() {
                stage.render(&pass)?;
            }
        }
        Ok(())
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        let stages = std::mem::take(&mut self.state.get_mut().stages);
        if stages.is_empty() {
            return;
        }
        if let Err(err) = self.context.make_current() {
            warn!("frame renderer dropped without a current context: {err}");
        }
        let mut engine = self.engine.borrow_mut();
        for id in stages {
            if let Err(err) = engine.delete_stage(id) {
                warn!("deleting render stage failed: {err}");
            }
        }
        debug!("frame renderer dropped");
    }
}

impl fmt::Debug for FrameRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRenderer")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Collects stages and appends them to a renderer in one step.
pub struct FrameRendererHelper {
    renderer: Rc<FrameRenderer>,
    stages: Vec<Rc<StageView>>,
}

impl FrameRendererHelper {
    pub fn new(renderer: Rc<FrameRenderer>) -> Self {
        Self {
            renderer,
            stages: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, stage: Rc<StageView>) {
        self.stages.push(stage);
    }

    /// Forgets the queued stages.
    pub fn reset(&mut self) {
        self.stages.clear();
    }

    pub fn queued(&self) -> usize {
        self.stages.len()
    }

    /// Appends every queued stage to the renderer.
    ///
    /// Nothing is appended if any queued stage is already owned or queued
    /// twice. The queue is kept, so committing again fails.
    pub fn commit(&self) -> Result<(), BindingError> {
        for (i, stage) in self.stages.iter().enumerate() {
            stage.ensure_unowned()?;
            if self.stages[..i].iter().any(|other| Rc::ptr_eq(other, stage)) {
                return Err(BindingError::AlreadyOwned {
                    object: "render stage",
                    owner: "frame renderer",
                });
            }
        }
        for stage in &self.stages {
            self.renderer.append_stage(stage)?;
        }
        Ok(())
    }
}
