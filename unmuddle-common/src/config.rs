//! Configuration loading and setting resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`UNMUDDLE_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error; the run continues on defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default maximum thumbnail dimension in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 300;

/// Default log filter when neither `RUST_LOG` nor config sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "UNMUDDLE_CONFIG";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Log filter directive (e.g. `debug`, `unmuddle=trace`)
    pub log_level: Option<String>,
    /// Maximum thumbnail dimension in pixels
    pub thumbnail_size: Option<u32>,
    /// Directory holding `left.png` / `right.png` page backgrounds
    pub backgrounds_dir: Option<PathBuf>,
    /// External program overrides
    pub tools: ToolOverrides,
}

/// External program overrides
///
/// Each value is a full command line prefix (e.g. `"gm convert"`). When set it
/// replaces the built-in candidate list for that tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolOverrides {
    /// Audio transcoder / duration probe (ffmpeg-compatible)
    pub encoder: Option<String>,
    /// Thumbnail renderer (ImageMagick-compatible)
    pub thumbnailer: Option<String>,
    /// Document merger (pdftk-compatible)
    pub merger: Option<String>,
    /// Page stroke renderer
    pub renderer: Option<String>,
}

impl TomlConfig {
    /// Parse config text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load config from an explicit path
    ///
    /// Unlike [`TomlConfig::load_or_default`], a missing file is an error here:
    /// the user asked for this file by name.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Load config from `explicit`, `$UNMUDDLE_CONFIG`, or the platform default
    ///
    /// Only the platform default may be absent; it then yields defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => {
                tracing::debug!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Platform config file location (`~/.config/unmuddle/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("unmuddle").join("config.toml"))
}

/// Resolve one setting: CLI, then environment variable, then TOML, then default
///
/// Environment values that fail to parse are ignored with a warning rather than
/// silently shadowing the TOML value.
pub fn resolve_setting<T>(cli: Option<T>, env_var_name: &str, toml: Option<T>, default: T) -> T
where
    T: std::str::FromStr,
{
    // Priority 1: Command-line argument
    if let Some(value) = cli {
        return value;
    }

    // Priority 2: Environment variable
    if let Ok(raw) = std::env::var(env_var_name) {
        match raw.parse::<T>() {
            Ok(value) => return value,
            Err(_) => tracing::warn!(
                variable = env_var_name,
                value = %raw,
                "Ignoring unparsable environment override"
            ),
        }
    }

    // Priority 3: TOML config file
    if let Some(value) = toml {
        return value;
    }

    // Priority 4: Compiled default
    default
}

/// Resolve an optional setting with no compiled default
pub fn resolve_optional<T>(cli: Option<T>, env_var_name: &str, toml: Option<T>) -> Option<T>
where
    T: std::str::FromStr,
{
    cli.or_else(|| std::env::var(env_var_name).ok().and_then(|raw| raw.parse().ok()))
        .or(toml)
}
