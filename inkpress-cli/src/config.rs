use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use inkpress_core::{Color, DEFAULT_FONT_SIZE, DEFAULT_STROKE_WIDTH};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use tracing::debug;

/// Settings shared by every subcommand. Read from `config.toml` under the
/// platform config directory; flags override individual values per run.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render scale applied to every opened document.
    pub preview_scale: f32,
    /// Point size for text steps that do not carry their own.
    pub font_size: f32,
    /// Width for stroke steps that do not carry their own.
    pub stroke_width: f32,
    /// Ink for text steps, `#rrggbb` or `#rrggbbaa`.
    #[serde_as(as = "DisplayFromStr")]
    pub text_color: Color,
    /// Ink for stroke steps.
    #[serde_as(as = "DisplayFromStr")]
    pub stroke_color: Color,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preview_scale: 1.0,
            font_size: DEFAULT_FONT_SIZE,
            stroke_width: DEFAULT_STROKE_WIDTH,
            text_color: Color::INK_BLUE,
            stroke_color: Color::INK_BLUE,
        }
    }
}

impl Config {
    /// A missing file yields the defaults; an unreadable or invalid file is
    /// an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path))
            }
        };
        toml::from_str(&raw).with_context(|| format!("invalid config {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.preview_scale, 1.0);
        assert_eq!(config.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(config.text_color, Color::INK_BLUE);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "preview_scale = 2.0\nstroke_color = \"#d62828\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.preview_scale, 2.0);
        assert_eq!(config.stroke_color, Color::CRIMSON);
        assert_eq!(config.stroke_width, DEFAULT_STROKE_WIDTH);
        assert_eq!(config.text_color, Color::INK_BLUE);
    }

    #[test]
    fn bad_color_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "text_color = \"blue\"\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
