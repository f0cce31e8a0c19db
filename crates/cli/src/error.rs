//! Structured CLI errors with meaningful exit codes.
//!
//! Exit code scheme:
//! - 0:  success
//! - 2:  clap arg parse error (automatic, before our code runs)
//! - 10: engine error (ownership, GL, bad dimensions)
//! - 11: I/O error (PNG write)
//! - 12: input error (bad color, bad JSON config)
//! - 13: serialization error
//! - 14: EGL error (no library, no display, no config)

use libcarna_core::BindingError;
use libcarna_egl::EglError;
use std::fmt;

/// Errors produced by CLI operations, each mapped to a distinct exit code.
#[derive(Debug)]
pub enum CliError {
    /// An engine-level error.
    Engine(BindingError),
    /// An I/O error (file write).
    Io(String),
    /// A user input error (bad color, bad JSON config).
    Input(String),
    /// A serialization error (JSON output failure).
    Serialization(String),
    /// Context creation or activation failed.
    Egl(EglError),
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(_) => 10,
            CliError::Io(_) => 11,
            CliError::Input(_) => 12,
            CliError::Serialization(_) => 13,
            CliError::Egl(_) => 14,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Engine(e) => write!(f, "{e}"),
            CliError::Io(msg) => write!(f, "{msg}"),
            CliError::Input(msg) => write!(f, "{msg}"),
            CliError::Serialization(msg) => write!(f, "{msg}"),
            CliError::Egl(e) => write!(f, "{e}"),
        }
    }
}

impl From<BindingError> for CliError {
    fn from(e: BindingError) -> Self {
        match e {
            BindingError::InvalidColor(msg) => CliError::Input(msg),
            other => CliError::Engine(other),
        }
    }
}

impl From<EglError> for CliError {
    fn from(e: EglError) -> Self {
        match e {
            EglError::Binding(inner) => CliError::from(inner),
            other => CliError::Egl(other),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_exit_code_is_10() {
        let err = CliError::Engine(BindingError::CircularRelation);
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn io_error_exit_code_is_11() {
        let err = CliError::Io("write failed".into());
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn input_error_exit_code_is_12() {
        let err = CliError::Input("bad color".into());
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn serialization_error_exit_code_is_13() {
        let err = CliError::Serialization("json fail".into());
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn egl_error_exit_code_is_14() {
        let err = CliError::from(EglError::NoConfig);
        assert_eq!(err.exit_code(), 14);
    }

    #[test]
    fn invalid_color_routes_to_input() {
        let cli_err = CliError::from(BindingError::InvalidColor("#zz".into()));
        assert_eq!(cli_err.exit_code(), 12);
        assert!(cli_err.to_string().contains("#zz"));
    }

    #[test]
    fn binding_error_inside_egl_error_routes_to_engine() {
        let egl_err = EglError::from(BindingError::InvalidDimensions { width: 0, height: 4 });
        let cli_err = CliError::from(egl_err);
        assert_eq!(cli_err.exit_code(), 10);
        assert!(cli_err.to_string().contains("0x4"));
    }

    #[test]
    fn from_serde_json_error_routes_to_serialization() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{invalid");
        let cli_err = CliError::from(bad_json.unwrap_err());
        assert_eq!(cli_err.exit_code(), 13);
    }
}
