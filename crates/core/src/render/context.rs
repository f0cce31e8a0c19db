//! The GL context seam between the core and a platform backend.

use crate::error::BindingError;

/// Upper bound on errors drained after a failed check; a lost context keeps
/// reporting errors forever.
const MAX_QUEUED_ERRORS: usize = 16;

/// A GL context that can be made current on the calling thread.
///
/// Implemented by the EGL off-screen context. Everything that creates or
/// deletes GL objects makes the context current first.
pub trait GlContext {
    /// Function table of this context.
    fn gl(&self) -> &glow::Context;

    /// Makes this context current on the calling thread.
    fn make_current(&self) -> Result<(), BindingError>;
}

/// Checks the GL error state after `operation`.
///
/// The first pending error is reported together with the caller's location;
/// any further queued errors are drained so the next check starts clean.
#[allow(unsafe_code)]
#[track_caller]
pub fn check_gl(gl: &glow::Context, operation: &'static str) -> Result<(), BindingError> {
    use glow::HasContext;

    // SAFETY: glGetError has no preconditions beyond a current context.
    let code = unsafe { gl.get_error() };
    if code == glow::NO_ERROR {
        return Ok(());
    }
    let err = BindingError::gl(operation, code);
    for _ in 0..MAX_QUEUED_ERRORS {
        // SAFETY: as above.
        if unsafe { gl.get_error() } == glow::NO_ERROR {
            break;
        }
    }
    Err(err)
}
