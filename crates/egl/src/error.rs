//! Error types for EGL context creation and surfaces.

use std::panic::Location;

use libcarna_core::BindingError;
use thiserror::Error;

/// Errors from EGL calls and from the surfaces built on top of them.
#[derive(Debug, Error)]
pub enum EglError {
    /// An EGL call failed and left the error state set.
    #[error("EGL error in {operation} [0x{code:04X}] ({location})")]
    Call {
        operation: &'static str,
        code: i32,
        location: &'static Location<'static>,
    },

    /// Neither the default display nor any enumerated device could be
    /// initialized.
    #[error("no usable EGL display: the default display and {devices} enumerated device(s) failed")]
    NoDisplay { devices: usize },

    /// No framebuffer configuration matches the requested attributes.
    #[error("no EGL config matches the requested attributes")]
    NoConfig,

    /// `libEGL` could not be loaded.
    #[error("failed to load the EGL library: {0}")]
    Library(String),

    /// A GL or ownership error from the core.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

impl EglError {
    /// Builds an [`EglError::Call`] that records the caller's location.
    #[track_caller]
    pub fn call(operation: &'static str, code: i32) -> Self {
        EglError::Call {
            operation,
            code,
            location: Location::caller(),
        }
    }
}
