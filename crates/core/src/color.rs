//! 8-bit RGBA color used for background colors and fill stages.
//!
//! Serializes as a hex string `"#rrggbbaa"` for human-readable formats; parsing
//! also accepts `"#rrggbb"` with an implied opaque alpha.

use crate::error::BindingError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// RGBA color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK_NO_ALPHA: Color = Color::rgba(0, 0, 0, 0);
    pub const WHITE_NO_ALPHA: Color = Color::rgba(255, 255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Parses `"#rrggbb"` or `"#rrggbbaa"`; the `#` is optional and digits are
    /// case insensitive.
    pub fn from_hex(hex: &str) -> Result<Color, BindingError> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 && hex.len() != 8 {
            return Err(BindingError::InvalidColor(format!(
                "expected 6 or 8 hex digits, got {}",
                hex.len()
            )));
        }
        let component = |range: std::ops::Range<usize>, name: &str| {
            hex.get(range)
                .ok_or_else(|| BindingError::InvalidColor(format!("invalid {name} component")))
                .and_then(|digits| {
                    u8::from_str_radix(digits, 16)
                        .map_err(|e| BindingError::InvalidColor(format!("invalid {name} component: {e}")))
                })
        };
        let r = component(0..2, "red")?;
        let g = component(2..4, "green")?;
        let b = component(4..6, "blue")?;
        let a = if hex.len() == 8 {
            component(6..8, "alpha")?
        } else {
            255
        };
        Ok(Color { r, g, b, a })
    }

    /// Converts the color to a hex string like `"#rrggbbaa"`.
    pub fn to_hex(self) -> String {
        let Color { r, g, b, a } = self;
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }

    /// Components normalized to `[0, 1]`, as GL clear colors expect them.
    pub fn to_f32(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f32::from(c) / 255.0)
    }

    pub fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK_NO_ALPHA
    }
}

impl From<[u8; 4]> for Color {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Color { r, g, b, a }
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Color::rgb(r, g, b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
