//! Off-screen render target with synchronous RGB readback.

use std::fmt;
use std::rc::Rc;

use libcarna_core::render::{Framebuffer, GlContext};
use libcarna_core::{BindingError, FrameView};
use log::{debug, warn};

use crate::context::OffscreenContext;
use crate::error::EglError;

/// A framebuffer of fixed size on an [`OffscreenContext`].
///
/// Rendering between [`begin`](Surface::begin) and [`end`](Surface::end)
/// lands in the framebuffer; `end` reads it back into a staging buffer of
/// exactly `width * height * 3` bytes.
pub struct Surface {
    context: Rc<OffscreenContext>,
    framebuffer: Framebuffer,
    staging: Vec<u8>,
}

impl Surface {
    pub fn new(context: Rc<OffscreenContext>, width: u32, height: u32) -> Result<Self, EglError> {
        if width == 0 || height == 0 {
            return Err(BindingError::InvalidDimensions { width, height }.into());
        }
        context.activate()?;
        let framebuffer = Framebuffer::new(context.gl(), width, height)?;
        debug!("surface {width}x{height} created");
        Ok(Self {
            context,
            framebuffer,
            staging: vec![0; width as usize * height as usize * 3],
        })
    }

    /// Makes the context current and directs rendering into this surface.
    pub fn begin(&self) -> Result<(), EglError> {
        self.context.activate()?;
        self.framebuffer.bind(self.context.gl())?;
        Ok(())
    }

    /// Reads the rendered frame back. Row 0 of the returned view is the top
    /// row of the image.
    pub fn end(&mut self) -> Result<FrameView<'_>, EglError> {
        self.context.activate()?;
        let gl = self.context.gl();
        let read = self.framebuffer.read_rgb(gl, &mut self.staging);
        self.framebuffer.unbind(gl);
        read?;
        let view = FrameView::from_bottom_up(
            &self.staging,
            self.framebuffer.width() as usize,
            self.framebuffer.height() as usize,
        )?;
        Ok(view)
    }

    pub fn width(&self) -> u32 {
        self.framebuffer.width()
    }

    pub fn height(&self) -> u32 {
        self.framebuffer.height()
    }

    /// Size of a frame in bytes.
    pub fn size(&self) -> usize {
        self.staging.len()
    }

    pub fn context(&self) -> &Rc<OffscreenContext> {
        &self.context
    }

    /// The color texture that frames are rendered into.
    pub fn texture(&self) -> glow::Texture {
        self.framebuffer.texture()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let Err(err) = GlContext::make_current(self.context.as_ref()) {
            warn!("surface leaked: {err}");
            return;
        }
        self.framebuffer.destroy(self.context.gl());
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("context", &self.context)
            .finish()
    }
}
