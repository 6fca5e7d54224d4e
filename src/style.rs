//! Overlay style configuration.
//!
//! A JSON sidecar selects the overlay strategy and text styling. Lookup
//! order: explicit `--style` path, then the platform data directory, then
//! `./style.json`. Missing or unreadable configuration silently falls back
//! to built-in defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::filtergraph::ShadowStyle;

/// How body text is laid onto the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// One clause per body line, each visible for an equal slice of the
    /// post-title duration. Supports an optional corner watermark.
    Timesliced,
    /// The whole text block at once, rendered from a temporary text file.
    Block,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub mode: OverlayMode,
    /// Font file handed to drawtext; ffmpeg falls back to fontconfig when
    /// absent.
    pub font: Option<PathBuf>,
    pub title_font_size: u32,
    pub body_font_size: u32,
    pub color: String,
    pub line_spacing: i32,
    pub body_x: String,
    pub body_y: String,
    pub title_y: String,
    pub shadow: Option<ShadowConfig>,
    pub boxed_title: bool,
    pub box_color: String,
    /// Corner watermark text (timesliced mode only).
    pub watermark: Option<String>,
    /// Seconds reserved for the title before body lines start.
    pub title_lead: f64,
    /// Prepend the title to the text block (block mode only).
    pub prepend_title: bool,
    pub music_volume: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub dx: i32,
    pub dy: i32,
    pub color: String,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            dx: 2,
            dy: 2,
            color: "black@0.6".to_string(),
        }
    }
}

impl From<&ShadowConfig> for ShadowStyle {
    fn from(cfg: &ShadowConfig) -> Self {
        Self {
            dx: cfg.dx,
            dy: cfg.dy,
            color: cfg.color.clone(),
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            mode: OverlayMode::Timesliced,
            font: None,
            title_font_size: 72,
            body_font_size: 54,
            color: "white".to_string(),
            line_spacing: 18,
            body_x: "(w-text_w)/2".to_string(),
            body_y: "(h-text_h)*0.45".to_string(),
            title_y: "h*0.1".to_string(),
            shadow: Some(ShadowConfig::default()),
            boxed_title: true,
            box_color: "black@0.5".to_string(),
            watermark: None,
            title_lead: 1.5,
            prepend_title: true,
            music_volume: 0.3,
        }
    }
}

impl StyleConfig {
    pub fn shadow_style(&self) -> Option<ShadowStyle> {
        self.shadow.as_ref().map(ShadowStyle::from)
    }
}

/// Load the style configuration, falling back to defaults on any failure.
pub fn load_style(explicit: Option<&Path>) -> StyleConfig {
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(p) = explicit {
        tried.push(p.to_path_buf());
    }
    if let Some(mut d) = dirs::data_dir() {
        d.push("notereel");
        d.push("style.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("style.json"));

    for path in &tried {
        if !path.exists() {
            continue;
        }
        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<StyleConfig>(&text).map_err(Into::into))
        {
            Ok(style) => return style,
            Err(err) => {
                debug!(path = %path.display(), %err, "ignoring unreadable style file");
            }
        }
    }
    StyleConfig::default()
}
