//! Built-in color palettes for ramp expressions.
//!
//! Palettes are addressable by bare name (which resolves to the variant with
//! the most stops) or by `name_<n>` for an exact stop count, mirroring how
//! cartographic palette collections are published.

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// An ordered sequence of ramp stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub name: String,
    pub stops: Vec<Color>,
}

struct BuiltinPalette {
    name: &'static str,
    // One entry per published variant, ordered by stop count.
    variants: &'static [&'static [(u8, u8, u8)]],
}

// Sequential and qualitative ramps commonly used for thematic maps. The
// bare name resolves to the last (largest) variant.
static BUILTINS: &[BuiltinPalette] = &[
    BuiltinPalette {
        name: "burg",
        variants: &[
            &[(255, 198, 196), (228, 111, 122), (112, 40, 74)],
            &[(255, 198, 196), (240, 156, 150), (212, 92, 111), (112, 40, 74)],
            &[
                (255, 198, 196),
                (244, 163, 168),
                (228, 111, 122),
                (191, 64, 94),
                (112, 40, 74),
            ],
        ],
    },
    BuiltinPalette {
        name: "sunset",
        variants: &[
            &[(243, 231, 155), (235, 127, 134), (92, 83, 165)],
            &[(243, 231, 155), (250, 164, 118), (225, 104, 149), (92, 83, 165)],
            &[
                (243, 231, 155),
                (250, 164, 118),
                (240, 116, 110),
                (192, 90, 165),
                (92, 83, 165),
            ],
        ],
    },
    BuiltinPalette {
        name: "tealgrn",
        variants: &[
            &[(176, 242, 188), (57, 171, 126), (37, 116, 145)],
            &[(176, 242, 188), (98, 188, 144), (51, 155, 138), (37, 116, 145)],
        ],
    },
    BuiltinPalette {
        name: "prism",
        variants: &[&[
            (95, 70, 144),
            (29, 105, 150),
            (56, 166, 165),
            (15, 133, 84),
            (115, 175, 72),
            (237, 173, 8),
            (204, 80, 62),
        ]],
    },
];

fn stops_from(rgb: &[(u8, u8, u8)]) -> Vec<Color> {
    rgb.iter()
        .map(|&(r, g, b)| Color::from_rgba8(r, g, b, 255))
        .collect()
}

/// Look up a built-in palette by `name` or `name_<n>`.
///
/// Names are case-insensitive. Returns `None` for unknown names or stop
/// counts that were never published for that palette.
pub fn lookup(name: &str) -> Option<Palette> {
    let name = name.to_ascii_lowercase();
    let (base, wanted) = match name.rsplit_once('_') {
        Some((base, count)) => match count.parse::<usize>() {
            Ok(n) => (base, Some(n)),
            Err(_) => (name.as_str(), None),
        },
        None => (name.as_str(), None),
    };

    let builtin = BUILTINS.iter().find(|p| p.name == base)?;
    let variant = match wanted {
        Some(n) => builtin.variants.iter().find(|v| v.len() == n)?,
        None => builtin.variants.last()?,
    };
    Some(Palette {
        name: name.clone(),
        stops: stops_from(variant),
    })
}
