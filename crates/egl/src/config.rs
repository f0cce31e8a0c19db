//! Context configuration.
//!
//! Defaults request an RGB888 pbuffer-capable OpenGL config with an 8-bit
//! depth buffer on a 0x0 pbuffer, and enumerate up to 8 devices when the
//! default display is unavailable.

use khronos_egl as egl;
use libcarna_core::params::{param_bool, param_i32, param_usize};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable that overrides [`ContextConfig::max_devices`].
pub const MAX_DEVICES_ENV: &str = "LIBCARNA_EGL_MAX_DEVICES";

/// Settings for creating an [`OffscreenContext`](crate::OffscreenContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of devices queried through `eglQueryDevicesEXT`.
    pub max_devices: usize,
    pub red_size: i32,
    pub green_size: i32,
    pub blue_size: i32,
    pub depth_size: i32,
    pub pbuffer_width: i32,
    pub pbuffer_height: i32,
    /// Clear `DISPLAY` before selecting a display, so EGL does not pick a
    /// windowing-system display.
    pub unset_display: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_devices: 8,
            red_size: 8,
            green_size: 8,
            blue_size: 8,
            depth_size: 8,
            pbuffer_width: 0,
            pbuffer_height: 0,
            unset_display: true,
        }
    }
}

impl ContextConfig {
    /// Reads a config from a JSON object. Missing or malformed keys keep
    /// their defaults.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            max_devices: param_usize(params, "max_devices", d.max_devices),
            red_size: param_i32(params, "red_size", d.red_size),
            green_size: param_i32(params, "green_size", d.green_size),
            blue_size: param_i32(params, "blue_size", d.blue_size),
            depth_size: param_i32(params, "depth_size", d.depth_size),
            pbuffer_width: param_i32(params, "pbuffer_width", d.pbuffer_width),
            pbuffer_height: param_i32(params, "pbuffer_height", d.pbuffer_height),
            unset_display: param_bool(params, "unset_display", d.unset_display),
        }
    }

    /// Defaults with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(MAX_DEVICES_ENV) {
            match raw.trim().parse() {
                Ok(max_devices) => self.max_devices = max_devices,
                Err(err) => warn!("ignoring {MAX_DEVICES_ENV}={raw:?}: {err}"),
            }
        }
        self
    }

    /// Attribute list for `eglChooseConfig`.
    pub fn config_attributes(&self) -> Vec<egl::Int> {
        vec![
            egl::SURFACE_TYPE,
            egl::PBUFFER_BIT,
            egl::RED_SIZE,
            self.red_size,
            egl::GREEN_SIZE,
            self.green_size,
            egl::BLUE_SIZE,
            self.blue_size,
            egl::DEPTH_SIZE,
            self.depth_size,
            egl::RENDERABLE_TYPE,
            egl::OPENGL_BIT,
            egl::NONE,
        ]
    }

    /// Attribute list for `eglCreatePbufferSurface`.
    pub fn pbuffer_attributes(&self) -> [egl::Int; 5] {
        [
            egl::WIDTH,
            self.pbuffer_width,
            egl::HEIGHT,
            self.pbuffer_height,
            egl::NONE,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_matches_headless_requirements() {
        let config = ContextConfig::default();
        assert_eq!(config.max_devices, 8);
        assert_eq!((config.pbuffer_width, config.pbuffer_height), (0, 0));
        assert!(config.unset_display);
    }

    #[test]
    fn config_attributes_are_none_terminated_pairs() {
        let attributes = ContextConfig::default().config_attributes();
        assert_eq!(attributes.len() % 2, 1);
        assert_eq!(attributes.last(), Some(&egl::NONE));
        let depth = attributes
            .chunks(2)
            .find(|pair| pair[0] == egl::DEPTH_SIZE)
            .map(|pair| pair[1]);
        assert_eq!(depth, Some(8));
    }

    #[test]
    fn from_json_overrides_known_keys_only() {
        let config = ContextConfig::from_json(&json!({
            "max_devices": 2,
            "depth_size": 24,
            "red_size": "lots",
        }));
        assert_eq!(config.max_devices, 2);
        assert_eq!(config.depth_size, 24);
        assert_eq!(config.red_size, 8);
    }

    #[test]
    fn serde_fills_missing_fields_with_defaults() {
        let config: ContextConfig = serde_json::from_str(r#"{"max_devices": 1}"#).unwrap();
        assert_eq!(config.max_devices, 1);
        assert_eq!(config.green_size, 8);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(ContextConfig::from_json(&json), config);
    }

    #[test]
    fn env_override_sets_max_devices() {
        let config = ContextConfig::default().with_env(|key| (key == MAX_DEVICES_ENV).then(|| " 3 ".to_string()));
        assert_eq!(config.max_devices, 3);
    }

    #[test]
    fn malformed_env_override_is_ignored() {
        let config = ContextConfig::default().with_env(|_| Some("many".to_string()));
        assert_eq!(config.max_devices, 8);
    }
}
