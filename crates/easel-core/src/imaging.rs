//! Reference imaging routines used by the scenarios and the CLI.
//!
//! 8-bit integer math throughout; `mul_div255` rounds to nearest.

use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::domain::{EaselError, EaselResult};

pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

/// Opaque gray.
pub fn gray(width: u32, height: u32, level: u8) -> RgbaImage {
    solid(width, height, [level, level, level, 255])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
}

impl BlendMode {
    pub const ALL: [BlendMode; 4] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
        }
    }

    fn channel(self, b: u8, f: u8) -> u8 {
        match self {
            BlendMode::Normal => f,
            BlendMode::Multiply => mul_div255(u16::from(b), u16::from(f)),
            BlendMode::Screen => 255 - mul_div255(255 - u16::from(b), 255 - u16::from(f)),
            BlendMode::Overlay => {
                if b < 128 {
                    mul_div255(2 * u16::from(b), u16::from(f))
                } else {
                    255 - mul_div255(2 * (255 - u16::from(b)), 255 - u16::from(f))
                }
            }
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = EaselError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlendMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| EaselError::validation(format!("unknown blend mode '{s}'")))
    }
}

/// Composite one straight-alpha pixel `fg` onto `bg`.
pub fn blend_pixel(bg: Rgba<u8>, fg: Rgba<u8>, mode: BlendMode) -> Rgba<u8> {
    let fa = u16::from(fg[3]);
    let inv = 255 - fa;
    let mut out = [0u8; 4];
    for i in 0..3 {
        let mixed = mode.channel(bg[i], fg[i]);
        out[i] = mul_div255(u16::from(mixed), fa).saturating_add(mul_div255(u16::from(bg[i]), inv));
    }
    out[3] = (fa as u8).saturating_add(mul_div255(u16::from(bg[3]), inv));
    Rgba(out)
}

/// Blend `fg` over `bg` into a new image of the same size.
pub fn blend(bg: &RgbaImage, fg: &RgbaImage, mode: BlendMode) -> EaselResult<RgbaImage> {
    if bg.dimensions() != fg.dimensions() {
        return Err(EaselError::validation(format!(
            "blend needs equal sizes, got {:?} and {:?}",
            bg.dimensions(),
            fg.dimensions()
        )));
    }
    let mut out = bg.clone();
    for (dst, src) in out.pixels_mut().zip(fg.pixels()) {
        *dst = blend_pixel(*dst, *src, mode);
    }
    Ok(out)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
