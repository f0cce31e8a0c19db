//! Error types for the LibCarna binding core.

use std::panic::Location;
use thiserror::Error;

/// Errors produced by the ownership protocol and by engine calls.
///
/// Ownership violations are programmer errors: they are never retried and the
/// host layer surfaces them as exceptions.
#[derive(Debug, Error)]
pub enum BindingError {
    /// The object already has an owner (a parent node or a frame renderer).
    #[error("{object} is already owned by a {owner}")]
    AlreadyOwned {
        object: &'static str,
        owner: &'static str,
    },

    /// Attaching would make a node its own ancestor.
    #[error("circular relations are forbidden")]
    CircularRelation,

    /// The engine object behind a handle was already deleted.
    #[error("{0} was already deleted by the engine")]
    StaleObject(&'static str),

    /// Two objects that belong to different engine instances were combined.
    #[error("objects belong to different engine instances")]
    EngineMismatch,

    /// An operation was applied to the wrong kind of engine object.
    #[error("expected a {expected}, found a {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The GL context could not be made current.
    #[error("context activation failed: {0}")]
    Context(String),

    /// A positional lookup went past the end of a sequence.
    #[error("index {index} is out of range for {len} {kind}(s)")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// Width or height was zero, or the pixel count overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// A color string could not be parsed.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// Volume data did not match the prepared grid.
    #[error("invalid volume: {0}")]
    InvalidVolume(String),

    /// The GL error state was set after an operation.
    #[error("GL error state in {operation} [0x{code:04X}] ({location})")]
    Gl {
        operation: &'static str,
        code: u32,
        location: &'static Location<'static>,
    },

    /// A GL object could not be allocated.
    #[error("GL resource allocation failed: {0}")]
    GlResource(String),

    /// The framebuffer attachments do not form a complete framebuffer.
    #[error("framebuffer incomplete: status 0x{0:04X}")]
    FramebufferIncomplete(u32),
}

impl BindingError {
    /// Builds a [`BindingError::Gl`] that records the caller's location.
    #[track_caller]
    pub fn gl(operation: &'static str, code: u32) -> Self {
        BindingError::Gl {
            operation,
            code,
            location: Location::caller(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_owned_names_object_and_owner() {
        let err = BindingError::AlreadyOwned {
            object: "render stage",
            owner: "frame renderer",
        };
        let msg = format!("{err}");
        assert!(msg.contains("render stage"), "missing object in: {msg}");
        assert!(msg.contains("frame renderer"), "missing owner in: {msg}");
    }

    #[test]
    fn circular_relation_displays_readable_message() {
        let msg = format!("{}", BindingError::CircularRelation);
        assert!(msg.contains("circular"), "got: {msg}");
    }

    #[test]
    fn stale_object_includes_kind() {
        let msg = format!("{}", BindingError::StaleObject("spatial"));
        assert!(msg.contains("spatial"), "got: {msg}");
    }

    #[test]
    fn kind_mismatch_names_both_kinds() {
        let err = BindingError::KindMismatch {
            expected: "material",
            found: "mesh",
        };
        assert_eq!(format!("{err}"), "expected a material, found a mesh");
    }

    #[test]
    fn index_out_of_range_names_index_and_length() {
        let err = BindingError::IndexOutOfRange {
            kind: "render stage",
            index: 3,
            len: 2,
        };
        assert_eq!(format!("{err}"), "index 3 is out of range for 2 render stage(s)");
    }

    #[test]
    fn invalid_dimensions_includes_size() {
        let err = BindingError::InvalidDimensions {
            width: 0,
            height: 48,
        };
        let msg = format!("{err}");
        assert!(msg.contains("0x48"), "got: {msg}");
    }

    #[test]
    fn gl_error_records_operation_code_and_call_site() {
        let err = BindingError::gl("read_pixels", 0x0502);
        let msg = format!("{err}");
        assert!(msg.contains("read_pixels"), "missing operation in: {msg}");
        assert!(msg.contains("0x0502"), "missing code in: {msg}");
        assert!(msg.contains("error.rs"), "missing call site in: {msg}");
    }

    #[test]
    fn framebuffer_incomplete_includes_status() {
        let msg = format!("{}", BindingError::FramebufferIncomplete(0x8CD6));
        assert!(msg.contains("0x8CD6"), "got: {msg}");
    }

    #[test]
    fn binding_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BindingError>();
    }

    #[test]
    fn binding_error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<BindingError>();
    }
}
