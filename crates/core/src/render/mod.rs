//! OpenGL rendering infrastructure.
//!
//! This module is only available when the `render` feature is enabled.
//!
//! # Module overview
//!
//! - [`context`] -- The `GlContext` seam and GL error checks.
//! - [`texture`] -- Texture configuration and creation helpers.
//! - [`framebuffer`] -- FBO + render texture + depth buffer, with readback.
//! - [`stage`] -- The `RenderStage` trait and stage views.
//! - [`presets`] -- Stages that ship with the binding.
//! - [`mip`] -- The MIP stage and the layers it owns.
//! - [`renderer`] -- `FrameRenderer` and `FrameRendererHelper`.

pub mod context;
pub mod framebuffer;
pub mod mip;
pub mod presets;
pub mod renderer;
pub mod stage;
pub mod texture;

pub use context::{check_gl, GlContext};
pub use framebuffer::Framebuffer;
pub use mip::{LayerId, LayerView, MipLayer, MipStage};
pub use presets::{FillStage, Region};
pub use renderer::{FrameRenderer, FrameRendererHelper};
pub use stage::{RenderPass, RenderStage, StageId, StageView, Viewport};
pub use texture::{create_texture, upload_format, TextureConfig};
