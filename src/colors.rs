// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Named colorscales and their sampled colormaps
//!
//! A colorscale is a list of evenly spaced anchor colors. Colormaps are
//! obtained by linear interpolation between anchors. Appending `_r` to a
//! name reverses the scale.

use std::fmt;
use std::str::FromStr;

/// Number of entries in the colormap served to the app
pub const COLORMAP_SIZE: usize = 256;

pub type Rgb = [u8; 3];

const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58", "#b5de2b", "#fde725",
];
const PLASMA: &[&str] = &[
    "#0d0887", "#46039f", "#7201a8", "#9c179e", "#bd3786", "#d8576b", "#ed7953", "#fb9f3a", "#fdca26", "#f0f921",
];
const INFERNO: &[&str] = &[
    "#000004", "#1b0c41", "#4a0c6b", "#781c6d", "#a52c60", "#cf4446", "#ed6925", "#fb9b06", "#f7d13d", "#fcffa4",
];
const MAGMA: &[&str] = &[
    "#000004", "#180f3d", "#440f76", "#721f81", "#9e2f7f", "#cd4071", "#f1605d", "#fd9668", "#feca8d", "#fcfdbf",
];
const CIVIDIS: &[&str] = &[
    "#00224e", "#123570", "#3b496c", "#575d6d", "#707173", "#8a8678", "#a59c74", "#c3b369", "#e1cc55", "#fee838",
];
const GREYS: &[&str] = &["#000000", "#ffffff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Greys,
}

impl Scale {
    fn anchors(&self) -> &'static [&'static str] {
        match self {
            Scale::Viridis => VIRIDIS,
            Scale::Plasma => PLASMA,
            Scale::Inferno => INFERNO,
            Scale::Magma => MAGMA,
            Scale::Cividis => CIVIDIS,
            Scale::Greys => GREYS,
        }
    }
}

/// A named colorscale, possibly reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colorscale {
    pub scale: Scale,
    pub reversed: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown colorscale '{0}'")]
pub struct UnknownColorscale(String);

impl FromStr for Colorscale {
    type Err = UnknownColorscale;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.trim().to_lowercase();
        let (base, reversed) = match lower.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let scale = match base {
            "viridis" => Scale::Viridis,
            "plasma" => Scale::Plasma,
            "inferno" => Scale::Inferno,
            "magma" => Scale::Magma,
            "cividis" => Scale::Cividis,
            "greys" | "grays" => Scale::Greys,
            _ => return Err(UnknownColorscale(name.to_string())),
        };
        Ok(Self { scale, reversed })
    }
}

impl Colorscale {
    fn anchors(&self) -> Vec<Rgb> {
        let mut anchors: Vec<Rgb> = self
            .scale
            .anchors()
            .iter()
            .filter_map(|hex| parse_hex(hex))
            .collect();
        if self.reversed {
            anchors.reverse();
        }
        anchors
    }

    /// Color at position `t` in `[0, 1]` (clamped)
    pub fn color_at(&self, t: f64) -> Rgb {
        interpolate(&self.anchors(), t)
    }

    /// Sample `n` evenly spaced colors from the scale
    pub fn colormap(&self, n: usize) -> Vec<Rgb> {
        let anchors = self.anchors();
        match n {
            0 => Vec::new(),
            1 => vec![interpolate(&anchors, 0.0)],
            _ => (0..n)
                .map(|i| interpolate(&anchors, i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

impl fmt::Display for Colorscale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self.scale).to_lowercase();
        if self.reversed {
            write!(f, "{}_r", name)
        } else {
            write!(f, "{}", name)
        }
    }
}

fn interpolate(anchors: &[Rgb], t: f64) -> Rgb {
    match anchors.len() {
        0 => [0, 0, 0],
        1 => anchors[0],
        n => {
            let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
            let pos = t * (n - 1) as f64;
            let lo = (pos.floor() as usize).min(n - 2);
            let frac = pos - lo as f64;
            let (a, b) = (anchors[lo], anchors[lo + 1]);
            let mut out = [0u8; 3];
            for c in 0..3 {
                out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8;
            }
            out
        }
    }
}

/// Parse `#rrggbb`
pub fn parse_hex(hex: &str) -> Option<Rgb> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

pub fn to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Relative luminance, used to pick readable text over a fill color
pub fn luminance(rgb: Rgb) -> f64 {
    (0.2126 * rgb[0] as f64 + 0.7152 * rgb[1] as f64 + 0.0722 * rgb[2] as f64) / 255.0
}
