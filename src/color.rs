//! Colour resolution – turns the colour strings the editor emits into a
//! concrete RGBA value.
//!
//! Resolution never fails: anything unrecognised becomes opaque black so a
//! bad colour can't take down a render.

use serde::{Deserialize, Deserializer};

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    /// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1].repeat(2), 16).ok();
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let (r, g, b, a) = match hex.len() {
            3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
            4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
            6 => (byte(0)?, byte(2)?, byte(4)?, 255),
            8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
            _ => return None,
        };
        let mut c = Self::rgb8(r, g, b);
        c.a = a as f32 / 255.0;
        Some(c)
    }

    /// Parse `rgb(r, g, b)` or `rgba(r, g, b, a)`. Channels are 0–255 (or
    /// percentages), alpha is 0–1.
    pub fn from_rgb_function(s: &str) -> Option<Self> {
        let (name, rest) = s.split_once('(')?;
        let body = rest.strip_suffix(')')?;
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let expected = match name.trim() {
            "rgb" => 3,
            "rgba" => 4,
            _ => return None,
        };
        if parts.len() != expected {
            return None;
        }
        let channel = |p: &str| -> Option<f32> {
            let v = match p.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f32>().ok()? / 100.0,
                None => p.parse::<f32>().ok()? / 255.0,
            };
            v.is_finite().then(|| v.clamp(0.0, 1.0))
        };
        let a = match parts.get(3) {
            Some(p) => {
                let v = p.parse::<f32>().ok()?;
                if !v.is_finite() {
                    return None;
                }
                v.clamp(0.0, 1.0)
            }
            None => 1.0,
        };
        Some(Self {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a,
        })
    }

    /// Look up one of the fixed colour names the editor offers.
    pub fn from_name(name: &str) -> Option<Self> {
        let c = match name {
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "red" => Self::rgb8(255, 0, 0),
            "green" => Self::rgb8(0, 128, 0),
            "blue" => Self::rgb8(0, 0, 255),
            "yellow" => Self::rgb8(255, 255, 0),
            "orange" => Self::rgb8(255, 165, 0),
            "purple" => Self::rgb8(128, 0, 128),
            "pink" => Self::rgb8(255, 192, 203),
            "gray" | "grey" => Self::rgb8(128, 128, 128),
            "brown" => Self::rgb8(165, 42, 42),
            "transparent" => Self::TRANSPARENT,
            _ => return None,
        };
        Some(c)
    }

    /// Convert to 8-bit channels (straight alpha).
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn to_skia(&self) -> tiny_skia::Color {
        let [r, g, b, a] = self.to_rgba8();
        tiny_skia::Color::from_rgba8(r, g, b, a)
    }
}

/// Resolve any supported colour string. Unknown or malformed input yields
/// opaque black.
pub fn resolve(input: &str) -> Color {
    let s = input.trim().to_ascii_lowercase();
    let parsed = if s.starts_with('#') {
        Color::from_hex(&s)
    } else if s.starts_with("rgb") {
        Color::from_rgb_function(&s)
    } else {
        Color::from_name(&s)
    };
    parsed.unwrap_or_else(|| {
        log::debug!("unrecognised colour {input:?}, using black");
        Color::BLACK
    })
}

/// Serde helper: an optional colour attribute. Empty strings and `null`
/// mean "not set".
pub(crate) fn deserialize_opt_color<'de, D>(de: D) -> Result<Option<Color>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(|s| resolve(&s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(resolve("#f00"), Color::rgb8(255, 0, 0));
        assert!((resolve("#00000080").a - 0.5).abs() < 0.01);
    }

    #[test]
    fn rgb_functions() {
        assert_eq!(resolve("rgb(255, 0, 0)"), Color::rgb8(255, 0, 0));
        let c = resolve("RGBA(0,0,255, 0.25)");
        assert_eq!(c.to_rgba8(), [0, 0, 255, 64]);
        assert_eq!(resolve("rgb(100%, 0%, 0%)").to_rgba8(), [255, 0, 0, 255]);
    }

    #[test]
    fn named_colors_case_insensitive() {
        assert_eq!(resolve(" Orange "), Color::rgb8(255, 165, 0));
        assert_eq!(resolve("grey"), resolve("gray"));
        assert!(resolve("transparent").is_transparent());
    }

    #[test]
    fn garbage_resolves_to_black() {
        for input in ["", "#12", "#gggggg", "rgb(1,2)", "rgba(1,2,3)", "chartreuse-ish", "rgb(a,b,c)"] {
            assert_eq!(resolve(input), Color::BLACK, "input {input:?}");
        }
    }
}
