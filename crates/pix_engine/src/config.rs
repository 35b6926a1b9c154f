use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{CanvasError, CanvasGrid, Color, ColorValue, Palette, PaletteRegistry, Protocol, Result, UpdateValidator};

const CONFIG_FILE: &str = "canvas.toml";

/// Extra palette defined in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteConfig {
    pub name: String,
    /// `#rrggbb` strings
    pub colors: Vec<String>,
}

impl PaletteConfig {
    pub fn to_palette(&self) -> Result<Palette> {
        let colors = self
            .colors
            .iter()
            .map(|c| Color::from_hex(c))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| CanvasError::config(format!("palette '{}': {e}", self.name)))?;
        Ok(Palette::new(self.name.clone(), &colors))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_pixel_size")]
    pub pixel_size: u32,
    #[serde(default = "default_palette")]
    pub palette: String,
    /// Palette index every cell starts with.
    #[serde(default = "default_background")]
    pub background: u8,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub palettes: Vec<PaletteConfig>,
}

fn default_dimension() -> u32 {
    1000
}

fn default_pixel_size() -> u32 {
    10
}

fn default_palette() -> String {
    "default".to_string()
}

fn default_background() -> u8 {
    9
}

fn default_relay_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_dimension(),
            height: default_dimension(),
            pixel_size: default_pixel_size(),
            palette: default_palette(),
            background: default_background(),
            protocol: Protocol::default(),
            relay_url: default_relay_url(),
            bind_addr: default_bind_addr(),
            debug_logging: false,
            palettes: Vec::new(),
        }
    }
}

impl CanvasConfig {
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "GitHub", "pix_term").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CanvasError::config(format!("{}: {e}", path.display())))
    }

    /// Loads from the platform config directory, or returns defaults if no file exists there.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml_string = toml::to_string_pretty(self).map_err(|e| CanvasError::config(e.to_string()))?;

        let mut write_name = path.to_path_buf();
        write_name.set_extension("new");
        fs::write(&write_name, toml_string)?;
        fs::rename(&write_name, path)?;
        Ok(())
    }

    /// Built-in palettes plus the ones defined in this configuration.
    pub fn registry(&self) -> Result<PaletteRegistry> {
        let extra = self.palettes.iter().map(PaletteConfig::to_palette).collect::<Result<Vec<_>>>()?;
        PaletteRegistry::with_palettes(extra)
    }

    pub fn validate(&self, registry: &PaletteRegistry) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CanvasError::config(format!("canvas size {}x{} is empty", self.width, self.height)));
        }
        if self.pixel_size == 0 {
            return Err(CanvasError::config("pixel_size must be at least 1"));
        }
        if self.protocol == Protocol::Binary && (self.width > 0x1_0000 || self.height > 0x1_0000) {
            return Err(CanvasError::config(format!(
                "canvas size {}x{} is not addressable by the binary protocol (max 65536)",
                self.width, self.height
            )));
        }
        let palette = registry.palette(&self.palette)?;
        registry.resolve(&self.palette, self.background as i32)?;
        if self.protocol == Protocol::Binary && palette.len() > 16 {
            log::warn!(
                "Palette '{}' has {} colors, the binary protocol only addresses the first 16",
                self.palette,
                palette.len()
            );
        }
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(CanvasError::config(format!("relay_url '{}' is not a ws:// or wss:// url", self.relay_url)));
        }
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| CanvasError::config(format!("bind_addr '{}': {e}", self.bind_addr)))?;
        Ok(())
    }

    /// Palette size usable on the wire: the binary protocol addresses 16 indices at most.
    pub fn addressable_palette_size(&self, registry: &PaletteRegistry) -> Result<usize> {
        let len = registry.palette(&self.palette)?.len();
        Ok(match self.protocol {
            Protocol::Binary => len.min(16),
            Protocol::Text => len,
        })
    }

    pub fn validator(&self, registry: &PaletteRegistry) -> Result<UpdateValidator> {
        Ok(UpdateValidator::new(
            self.width,
            self.height,
            self.addressable_palette_size(registry)?,
            self.protocol.representation(),
        ))
    }

    /// The background as stored in the grid: the index itself under the
    /// binary protocol, its resolved color under the text protocol.
    pub fn background_value(&self, registry: &PaletteRegistry) -> Result<ColorValue> {
        match self.protocol {
            Protocol::Binary => Ok(ColorValue::Index(self.background)),
            Protocol::Text => Ok(ColorValue::Rgb(registry.resolve(&self.palette, self.background as i32)?)),
        }
    }

    pub fn new_grid(&self, registry: &PaletteRegistry) -> Result<CanvasGrid> {
        Ok(CanvasGrid::new(self.width, self.height, self.background_value(registry)?))
    }
}
