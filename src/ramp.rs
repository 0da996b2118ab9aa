//! Color-ramp lookup tables.
//!
//! A ramp expression maps a scalar key range onto a palette by sampling a
//! fixed-width 1-D texture. The table is built on the CPU once, at
//! expression construction; the binding pass uploads it to the program the
//! first time the owning node is bound.

use bytemuck::{Pod, Zeroable};

use crate::color::Color;
use crate::error::ExprError;

/// Sample count of every ramp texture. Wide enough that linear sampler
/// filtering hides the quantization for on-screen gradients.
pub const RAMP_WIDTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
struct Texel([u8; 4]);

/// A `RAMP_WIDTH x 1` RGBA8 lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct RampTable {
    texels: Vec<Texel>,
}

/// Continuous palette interpolation at position `t` in `[0, 1]`.
///
/// `t` selects a fractional position across the stop sequence; the floor and
/// ceiling stops are mixed per channel by the fractional remainder.
pub fn interpolate(stops: &[Color], t: f32) -> Color {
    debug_assert!(!stops.is_empty());
    let span = (stops.len() - 1) as f32;
    let pos = t.clamp(0.0, 1.0) * span;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    stops[lo].lerp(stops[hi], pos - pos.floor())
}

impl RampTable {
    /// Build the lookup table for an ordered palette.
    ///
    /// A single-stop palette yields a constant table. An empty palette has
    /// no color to sample and is rejected.
    pub fn from_palette(stops: &[Color]) -> Result<Self, ExprError> {
        if stops.is_empty() {
            return Err(ExprError::invalid("RampColor", "palette has no stops"));
        }
        if let Some(bad) = stops.iter().find(|c| !c.is_finite()) {
            return Err(ExprError::invalid(
                "RampColor",
                format!("palette stop has non-finite channel: {bad:?}"),
            ));
        }

        let texels = (0..RAMP_WIDTH)
            .map(|i| {
                let t = i as f32 / (RAMP_WIDTH - 1) as f32;
                Texel(interpolate(stops, t).to_rgba8())
            })
            .collect();
        Ok(Self { texels })
    }

    pub fn width(&self) -> usize {
        RAMP_WIDTH
    }

    pub fn texel(&self, i: usize) -> [u8; 4] {
        self.texels[i].0
    }

    /// Raw RGBA8 texel bytes, ready for texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Color {
        Color::new(1.0, 0.0, 0.0, 1.0)
    }

    fn green() -> Color {
        Color::new(0.0, 1.0, 0.0, 1.0)
    }

    #[test]
    fn endpoints_hit_first_and_last_stop() {
        let table = RampTable::from_palette(&[red(), green()]).unwrap();
        assert_eq!(table.texel(0), red().to_rgba8());
        assert_eq!(table.texel(RAMP_WIDTH - 1), green().to_rgba8());
    }

    #[test]
    fn midpoint_of_two_stop_palette_is_exact_mix() {
        let mid = interpolate(&[red(), green()], 0.5);
        assert_eq!(mid, red().lerp(green(), 0.5));
        assert_eq!(mid, Color::new(0.5, 0.5, 0.5, 1.0));
    }

    #[test]
    fn single_stop_palette_is_constant() {
        let table = RampTable::from_palette(&[red()]).unwrap();
        assert!((0..RAMP_WIDTH).all(|i| table.texel(i) == red().to_rgba8()));
    }

    #[test]
    fn interior_stops_land_on_their_position() {
        let stops = [red(), green(), Color::new(0.0, 0.0, 1.0, 1.0)];
        // t = 0.5 lands exactly on the middle stop of a 3-stop palette.
        assert_eq!(interpolate(&stops, 0.5), green());
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(RampTable::from_palette(&[]).is_err());
    }

    #[test]
    fn byte_view_is_width_times_rgba() {
        let table = RampTable::from_palette(&[red(), green()]).unwrap();
        assert_eq!(table.as_bytes().len(), RAMP_WIDTH * 4);
        assert_eq!(&table.as_bytes()[0..4], &red().to_rgba8());
    }
}
