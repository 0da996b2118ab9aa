//! RGBA color values used by style expressions and ramp tables.

use serde::{Deserialize, Serialize};

use crate::error::ExprError;

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// A linear RGBA color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Parse a `#rrggbb` or `rrggbb` hex triplet. Alpha is always opaque.
    pub fn from_hex(hex: &str) -> Result<Self, ExprError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ExprError::invalid(
                "Color::from_hex",
                format!("'{hex}' is not a 6-digit hex color"),
            ));
        }
        let channel =
            |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).expect("checked hex digits");
        Ok(Self::from_rgba8(channel(0), channel(2), channel(4), 255))
    }

    pub fn as_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Per-channel linear interpolation, `t` clamped to `[0, 1]`.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = clamp01(t);
        let mix = |a: f32, b: f32| a + (b - a) * t;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |x: f32| (clamp01(x) * 255.0).round() as u8;
        [
            quantize(self.r),
            quantize(self.g),
            quantize(self.b),
            quantize(self.a),
        ]
    }

    pub fn is_finite(self) -> bool {
        self.as_array().iter().all(|c| c.is_finite())
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self { r, g, b, a }
    }
}
