use std::fmt::Display;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{CanvasError, Result};

lazy_static::lazy_static! {
    static ref HEX_REGEX: Regex = Regex::new(r"^#?([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})$").unwrap();
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{Color: r={:02X}, g={:02X}, b={:02X}}}", self.r, self.g, self.b)
    }
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidHexColor`] if the string is not six hex digits.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let invalid = || CanvasError::InvalidHexColor { value: hex.to_string() };
        let Some(cap) = HEX_REGEX.captures(hex.trim()) else {
            return Err(invalid());
        };
        let (_, [r, g, b]) = cap.extract();
        let r = u8::from_str_radix(r, 16).map_err(|_| invalid())?;
        let g = u8::from_str_radix(g, 16).map_err(|_| invalid())?;
        let b = u8::from_str_radix(b, 16).map_err(|_| invalid())?;
        Ok(Color::new(r, g, b))
    }

    /// `(r << 16) | (g << 8) | b`
    pub fn to_packed(&self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Inverse of [`Color::to_packed`]; `None` if bits above 24 are set.
    pub fn from_packed(packed: u32) -> Option<Self> {
        if packed > 0x00FF_FFFF {
            return None;
        }
        Some(Color::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8))
    }
}

/// How a cell color travels on the wire and sits in the grid.
/// Fixed per running system by the protocol choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRepresentation {
    Indexed,
    Direct,
}

/// A cell color: either an index into the active palette or a direct RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorValue {
    Index(u8),
    Rgb(Color),
}

impl ColorValue {
    pub fn representation(&self) -> ColorRepresentation {
        match self {
            ColorValue::Index(_) => ColorRepresentation::Indexed,
            ColorValue::Rgb(_) => ColorRepresentation::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub name: String,
    colors: Vec<Color>,
}

impl Palette {
    pub fn new(name: impl Into<String>, colors: &[Color]) -> Self {
        Self {
            name: name.into(),
            colors: colors.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn get(&self, index: i32) -> Option<Color> {
        usize::try_from(index).ok().and_then(|i| self.colors.get(i)).copied()
    }
}

/// Immutable set of named palettes. Built once at startup and shared.
#[derive(Debug, Clone)]
pub struct PaletteRegistry {
    palettes: Vec<Palette>,
}

impl Default for PaletteRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PaletteRegistry {
    pub fn builtin() -> Self {
        Self {
            palettes: vec![
                Palette::new("default", &DEFAULT_PALETTE),
                Palette::new("ega", &EGA_PALETTE),
                Palette::new("c64", &C64_PALETTE),
            ],
        }
    }

    /// The built-in palettes followed by `extra`, in order.
    ///
    /// # Errors
    ///
    /// Fails with [`CanvasError::Config`] on an empty palette or a duplicate name.
    pub fn with_palettes(extra: Vec<Palette>) -> Result<Self> {
        let mut registry = Self::builtin();
        for palette in extra {
            if palette.is_empty() {
                return Err(CanvasError::config(format!("palette '{}' has no colors", palette.name)));
            }
            if registry.get(&palette.name).is_some() {
                return Err(CanvasError::config(format!("palette '{}' is defined twice", palette.name)));
            }
            registry.palettes.push(palette);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Palette> {
        self.palettes.iter().find(|p| p.name == name)
    }

    /// # Errors
    ///
    /// [`CanvasError::UnknownPalette`] for unregistered names.
    pub fn palette(&self, name: &str) -> Result<&Palette> {
        self.get(name).ok_or_else(|| CanvasError::UnknownPalette { name: name.to_string() })
    }

    /// Look up `index` in the palette called `name`.
    ///
    /// # Errors
    ///
    /// [`CanvasError::UnknownPalette`] or [`CanvasError::IndexOutOfRange`].
    pub fn resolve(&self, name: &str, index: i32) -> Result<Color> {
        let palette = self.palette(name)?;
        palette.get(index).ok_or_else(|| CanvasError::IndexOutOfRange {
            palette: name.to_string(),
            index,
            len: palette.len(),
        })
    }

    /// Resolve a cell value for display. Indices the palette cannot resolve
    /// (e.g. after switching to a smaller palette) render black.
    pub fn resolve_or_default(&self, name: &str, value: ColorValue) -> Color {
        match value {
            ColorValue::Rgb(color) => color,
            ColorValue::Index(index) => self.resolve(name, index as i32).unwrap_or_default(),
        }
    }

    pub fn list_palettes(&self) -> Vec<&str> {
        self.palettes.iter().map(|p| p.name.as_str()).collect()
    }
}

pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::new(0xFF, 0x00, 0x00), // red
    Color::new(0xFF, 0xA5, 0x00), // orange
    Color::new(0xFF, 0xFF, 0x00), // yellow
    Color::new(0x00, 0x80, 0x00), // green
    Color::new(0x00, 0x00, 0xFF), // blue
    Color::new(0x80, 0x00, 0x80), // purple
    Color::new(0xFF, 0xC0, 0xCB), // pink
    Color::new(0xA5, 0x2A, 0x2A), // brown
    Color::new(0x00, 0x00, 0x00), // black
    Color::new(0xFF, 0xFF, 0xFF), // white
];

pub const EGA_PALETTE: [Color; 16] = [
    Color::new(0x00, 0x00, 0x00), // black
    Color::new(0x00, 0x00, 0xAA), // blue
    Color::new(0x00, 0xAA, 0x00), // green
    Color::new(0x00, 0xAA, 0xAA), // cyan
    Color::new(0xAA, 0x00, 0x00), // red
    Color::new(0xAA, 0x00, 0xAA), // magenta
    Color::new(0xAA, 0x55, 0x00), // brown
    Color::new(0xAA, 0xAA, 0xAA), // lightgray
    Color::new(0x55, 0x55, 0x55), // darkgray
    Color::new(0x55, 0x55, 0xFF), // lightblue
    Color::new(0x55, 0xFF, 0x55), // lightgreen
    Color::new(0x55, 0xFF, 0xFF), // lightcyan
    Color::new(0xFF, 0x55, 0x55), // lightred
    Color::new(0xFF, 0x55, 0xFF), // lightmagenta
    Color::new(0xFF, 0xFF, 0x55), // yellow
    Color::new(0xFF, 0xFF, 0xFF), // white
];

pub const C64_PALETTE: [Color; 16] = [
    Color::new(0x00, 0x00, 0x00), // black
    Color::new(0xFF, 0xFF, 0xFF), // white
    Color::new(0xAF, 0x2A, 0x29), // red
    Color::new(0x62, 0xD8, 0xCC), // cyan
    Color::new(0xB0, 0x3F, 0xB6), // violet
    Color::new(0x4A, 0xC6, 0x4A), // green
    Color::new(0x37, 0x39, 0xC4), // blue
    Color::new(0xE4, 0xED, 0x4E), // yellow
    Color::new(0xB6, 0x59, 0x1C), // orange
    Color::new(0x68, 0x38, 0x08), // brown
    Color::new(0xEA, 0x74, 0x6C), // light red
    Color::new(0x4D, 0x4D, 0x4D), // grey 1
    Color::new(0x84, 0x84, 0x84), // grey 2
    Color::new(0xA6, 0xFA, 0x9E), // light green
    Color::new(0x70, 0x7C, 0xE6), // light blue
    Color::new(0xB6, 0xB6, 0xB5), // grey 3
];
