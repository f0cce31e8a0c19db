//! Framebuffer (FBO + render texture + depth buffer) for off-screen capture.

use super::check_gl;
use super::texture::{create_texture, TextureConfig};
use crate::error::BindingError;

/// An off-screen framebuffer with an RGB8 color texture at
/// `COLOR_ATTACHMENT0` and a 24-bit depth renderbuffer.
pub struct Framebuffer {
    fbo: glow::Framebuffer,
    texture: glow::Texture,
    depth: glow::Renderbuffer,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// Creates the render texture, the depth buffer and the framebuffer,
    /// and verifies completeness. The context must be current.
    #[allow(unsafe_code)]
    pub fn new(gl: &glow::Context, width: u32, height: u32) -> Result<Self, BindingError> {
        use glow::HasContext;

        let texture = create_texture(gl, &TextureConfig::rgb8(width, height))?;

        // SAFETY: glow wraps raw GL calls as unsafe. Every handle used below
        // was created in this function on the current context.
        unsafe {
            let depth = match gl.create_renderbuffer() {
                Ok(depth) => depth,
                Err(err) => {
                    gl.delete_texture(texture);
                    return Err(BindingError::GlResource(err));
                }
            };
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
            gl.renderbuffer_storage(glow::RENDERBUFFER, glow::DEPTH_COMPONENT24, width as i32, height as i32);
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);

            let fbo = match gl.create_framebuffer() {
                Ok(fbo) => fbo,
                Err(err) => {
                    gl.delete_renderbuffer(depth);
                    gl.delete_texture(texture);
                    return Err(BindingError::GlResource(err));
                }
            };

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth),
            );

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            let framebuffer = Self {
                fbo,
                texture,
                depth,
                width,
                height,
            };
            if status != glow::FRAMEBUFFER_COMPLETE {
                framebuffer.destroy(gl);
                return Err(BindingError::FramebufferIncomplete(status));
            }
            if let Err(err) = check_gl(gl, "create_framebuffer") {
                framebuffer.destroy(gl);
                return Err(err);
            }
            Ok(framebuffer)
        }
    }

    /// Binds the framebuffer for drawing and sets the viewport to its size.
    #[allow(unsafe_code)]
    pub fn bind(&self, gl: &glow::Context) -> Result<(), BindingError> {
        use glow::HasContext;

        // SAFETY: self.fbo is a valid framebuffer handle created in new().
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            gl.viewport(0, 0, self.width as i32, self.height as i32);
        }
        check_gl(gl, "bind_framebuffer")
    }

    /// Restores the default framebuffer.
    #[allow(unsafe_code)]
    pub fn unbind(&self, gl: &glow::Context) {
        use glow::HasContext;

        // SAFETY: binding `None` is always valid.
        unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
    }

    /// Reads the color attachment into `out`, bottom row first, as tightly
    /// packed RGB8. `out` must hold exactly `width * height * 3` bytes.
    #[allow(unsafe_code)]
    pub fn read_rgb(&self, gl: &glow::Context, out: &mut [u8]) -> Result<(), BindingError> {
        use glow::HasContext;

        let expected = self.width as usize * self.height as usize * 3;
        if out.len() != expected {
            return Err(BindingError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        // SAFETY: the framebuffer is valid and `out` is exactly the size
        // READ_PIXELS writes for RGB/UNSIGNED_BYTE with pack alignment 1.
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(self.fbo));
            gl.read_buffer(glow::COLOR_ATTACHMENT0);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            gl.read_pixels(
                0,
                0,
                self.width as i32,
                self.height as i32,
                glow::RGB,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(out)),
            );
        }
        check_gl(gl, "read_pixels")
    }

    /// Returns the color texture handle.
    pub fn texture(&self) -> glow::Texture {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Deletes the framebuffer, the depth buffer and the texture.
    ///
    /// The context the framebuffer was created on must be current.
    #[allow(unsafe_code)]
    pub fn destroy(&self, gl: &glow::Context) {
        use glow::HasContext;

        // SAFETY: all handles are valid handles from new().
        unsafe {
            gl.delete_framebuffer(self.fbo);
            gl.delete_renderbuffer(self.depth);
            gl.delete_texture(self.texture);
        }
    }
}
