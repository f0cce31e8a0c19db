//! Render stages that ship with the binding.

use serde::{Deserialize, Serialize};

use super::context::check_gl;
use super::stage::{RenderPass, RenderStage, Viewport};
use crate::color::Color;
use crate::error::BindingError;

/// Rectangle inside the viewport, measured from its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Converts to window coordinates, clipped to `viewport`.
    fn scissor(&self, viewport: &Viewport) -> (i32, i32, i32, i32) {
        let x = self.x.min(viewport.width);
        let y = self.y.min(viewport.height);
        let width = self.width.min(viewport.width - x);
        let height = self.height.min(viewport.height - y);
        let bottom = viewport.height - y - height;
        (
            viewport.x + x as i32,
            viewport.y + bottom as i32,
            width as i32,
            height as i32,
        )
    }
}

/// Fills the viewport, or a region of it, with a solid color.
#[derive(Debug, Clone, PartialEq)]
pub struct FillStage {
    color: Color,
    region: Option<Region>,
    enabled: bool,
}

impl FillStage {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            region: None,
            enabled: true,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }
}

impl RenderStage for FillStage {
    fn name(&self) -> &'static str {
        "fill"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[allow(unsafe_code)]
    fn render(&mut self, pass: &RenderPass<'_>) -> Result<(), BindingError> {
        use glow::HasContext;

        let viewport = pass.viewport;
        let (x, y, width, height) = match self.region {
            Some(region) => region.scissor(&viewport),
            None => (viewport.x, viewport.y, viewport.width as i32, viewport.height as i32),
        };
        let [r, g, b, a] = self.color.to_f32();
        let gl = pass.gl;

        // SAFETY: the renderer made the context current and bound the target.
        unsafe {
            gl.enable(glow::SCISSOR_TEST);
            gl.scissor(x, y, width, height);
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT);
            gl.disable(glow::SCISSOR_TEST);
        }
        check_gl(gl, "fill")
    }
}
