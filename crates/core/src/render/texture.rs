//! Texture creation helpers for OpenGL.
//!
//! Provides `TextureConfig` for specifying texture parameters and
//! `create_texture` for allocating GPU textures. Frame capture uses RGB8
//! render textures so the readback matches the 3-byte pixel layout.

use crate::error::BindingError;

/// Configuration for creating a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureConfig {
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
    /// GL internal format (e.g. `glow::RGB8`).
    pub internal_format: u32,
    /// GL texture filter mode (e.g. `glow::NEAREST`).
    pub filter: u32,
}

impl TextureConfig {
    /// Config for an RGB8 render texture with NEAREST filtering.
    pub fn rgb8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            internal_format: glow::RGB8,
            filter: glow::NEAREST,
        }
    }
}

/// Returns the `(format, type)` pair used to allocate storage for an
/// internal format.
pub fn upload_format(internal_format: u32) -> (u32, u32) {
    match internal_format {
        glow::RGB8 => (glow::RGB, glow::UNSIGNED_BYTE),
        glow::DEPTH_COMPONENT24 => (glow::DEPTH_COMPONENT, glow::UNSIGNED_INT),
        _ => (glow::RGBA, glow::UNSIGNED_BYTE),
    }
}

/// Creates a GPU texture from the given configuration.
///
/// Sets wrap mode to `CLAMP_TO_EDGE` on both axes, applies the specified
/// filter for both min and mag, and allocates storage at the given size.
#[allow(unsafe_code)]
pub fn create_texture(gl: &glow::Context, config: &TextureConfig) -> Result<glow::Texture, BindingError> {
    use glow::HasContext;

    if config.width == 0 || config.height == 0 {
        return Err(BindingError::InvalidDimensions {
            width: config.width,
            height: config.height,
        });
    }

    // SAFETY: glow wraps raw GL calls as unsafe. The caller guarantees the
    // context is current; all parameters come from TextureConfig.
    let texture = unsafe { gl.create_texture() }.map_err(BindingError::GlResource)?;

    unsafe {
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));

        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, config.filter as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, config.filter as i32);

        let (format, pixel_type) = upload_format(config.internal_format);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            config.internal_format as i32,
            config.width as i32,
            config.height as i32,
            0,
            format,
            pixel_type,
            glow::PixelUnpackData::Slice(None),
        );

        gl.bind_texture(glow::TEXTURE_2D, None);
    }

    if let Err(err) = super::check_gl(gl, "create_texture") {
        // SAFETY: texture was created above and is not attached anywhere.
        unsafe { gl.delete_texture(texture) };
        return Err(err);
    }
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb8_sets_dimensions_and_format() {
        let config = TextureConfig::rgb8(64, 48);
        assert_eq!((config.width, config.height), (64, 48));
        assert_eq!(config.internal_format, glow::RGB8);
        assert_eq!(config.filter, glow::NEAREST);
    }

    #[test]
    fn rgb8_uploads_as_unsigned_byte_rgb() {
        assert_eq!(upload_format(glow::RGB8), (glow::RGB, glow::UNSIGNED_BYTE));
    }

    #[test]
    fn depth_format_uploads_as_depth_component() {
        assert_eq!(
            upload_format(glow::DEPTH_COMPONENT24),
            (glow::DEPTH_COMPONENT, glow::UNSIGNED_INT)
        );
    }

    #[test]
    fn unknown_format_falls_back_to_rgba8_upload() {
        assert_eq!(upload_format(glow::RGBA8), (glow::RGBA, glow::UNSIGNED_BYTE));
    }

    #[test]
    fn texture_config_debug_format_is_readable() {
        let debug = format!("{:?}", TextureConfig::rgb8(100, 200));
        assert!(debug.contains("100"), "missing width in debug: {debug}");
        assert!(debug.contains("200"), "missing height in debug: {debug}");
    }
}
