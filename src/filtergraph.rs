//! Typed construction of the ffmpeg filter-graph string.
//!
//! Overlays are modeled as [`DrawText`] descriptors and serialized in one
//! final step, so the escaping rules of the filter mini-language live in a
//! single tested function instead of scattered string concatenation.

use std::path::{Path, PathBuf};

/// Output frame rate for every render.
pub const FRAME_RATE: u32 = 30;

/// Canvas size: vertical 9:16.
pub const FRAME_WIDTH: u32 = 1080;
pub const FRAME_HEIGHT: u32 = 1920;

/// Audio fade-in/fade-out length in seconds.
pub const AUDIO_FADE_SECONDS: f64 = 0.8;

/// Escape a value for embedding in a drawtext option.
///
/// The filter mini-language reserves backslash, colon, single quote,
/// percent and square brackets. Backslash is substituted first; any other
/// order would double-escape the backslashes the later substitutions emit.
pub fn escape_text(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace('%', "\\%")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Where a drawtext clause takes its text from.
#[derive(Debug, Clone)]
pub enum TextSource {
    /// Escaped and embedded directly in the graph string.
    Inline(String),
    /// Read by ffmpeg from a file, bypassing command-line quoting limits.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BoxStyle {
    pub color: String,
    pub border_width: u32,
}

#[derive(Debug, Clone)]
pub struct ShadowStyle {
    pub dx: i32,
    pub dy: i32,
    pub color: String,
}

/// One drawtext overlay clause.
#[derive(Debug, Clone)]
pub struct DrawText {
    source: TextSource,
    font_file: Option<PathBuf>,
    font_size: u32,
    color: String,
    x: String,
    y: String,
    boxed: Option<BoxStyle>,
    shadow: Option<ShadowStyle>,
    line_spacing: Option<i32>,
    window: Option<(f64, f64)>,
}

impl DrawText {
    pub fn inline(text: impl Into<String>) -> Self {
        Self::new(TextSource::Inline(text.into()))
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(TextSource::File(path.into()))
    }

    fn new(source: TextSource) -> Self {
        Self {
            source,
            font_file: None,
            font_size: 48,
            color: "white".to_string(),
            x: "(w-text_w)/2".to_string(),
            y: "(h-text_h)/2".to_string(),
            boxed: None,
            shadow: None,
            line_spacing: None,
            window: None,
        }
    }

    pub fn with_font_file(mut self, path: Option<&Path>) -> Self {
        self.font_file = path.map(Path::to_path_buf);
        self
    }

    pub fn with_font_size(mut self, size: u32) -> Self {
        self.font_size = size;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_position(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x = x.into();
        self.y = y.into();
        self
    }

    pub fn with_box(mut self, style: BoxStyle) -> Self {
        self.boxed = Some(style);
        self
    }

    pub fn with_shadow(mut self, style: Option<ShadowStyle>) -> Self {
        self.shadow = style;
        self
    }

    pub fn with_line_spacing(mut self, spacing: i32) -> Self {
        self.line_spacing = Some(spacing);
        self
    }

    /// Restrict visibility to `[start, end)` seconds.
    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.window = Some((start, end));
        self
    }

    /// Serialize to a single `drawtext=...` clause.
    pub fn to_clause(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        match &self.source {
            TextSource::Inline(text) => parts.push(format!("text='{}'", escape_text(text))),
            TextSource::File(path) => {
                parts.push(format!("textfile='{}'", escape_text(&path.to_string_lossy())))
            }
        }
        if let Some(font) = &self.font_file {
            parts.push(format!("fontfile='{}'", escape_text(&font.to_string_lossy())));
        }
        parts.push(format!("fontsize={}", self.font_size));
        parts.push(format!("fontcolor={}", self.color));
        if let Some(spacing) = self.line_spacing {
            parts.push(format!("line_spacing={}", spacing));
        }
        parts.push(format!("x={}", self.x));
        parts.push(format!("y={}", self.y));
        if let Some(boxed) = &self.boxed {
            parts.push("box=1".to_string());
            parts.push(format!("boxcolor={}", boxed.color));
            parts.push(format!("boxborderw={}", boxed.border_width));
        }
        if let Some(shadow) = &self.shadow {
            parts.push(format!("shadowx={}", shadow.dx));
            parts.push(format!("shadowy={}", shadow.dy));
            parts.push(format!("shadowcolor={}", shadow.color));
        }
        if let Some((start, end)) = self.window {
            parts.push(format!(
                "enable='between(t,{},{})'",
                fmt_seconds(start),
                fmt_seconds(end)
            ));
        }
        format!("drawtext={}", parts.join(":"))
    }
}

/// Audio post-processing applied when a music track is present.
#[derive(Debug, Clone)]
pub struct AudioMix {
    pub volume: f64,
    pub duration: f64,
}

/// The complete filter-graph expression: a background chain with drawtext
/// overlays labeled `[vout]`, plus an optional audio chain labeled `[aout]`.
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    overlays: Vec<DrawText>,
    audio: Option<AudioMix>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_overlay(&mut self, overlay: DrawText) {
        self.overlays.push(overlay);
    }

    pub fn set_audio(&mut self, audio: AudioMix) {
        self.audio = Some(audio);
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Render the graph to ffmpeg's textual syntax.
    pub fn render(&self) -> String {
        let mut video = format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}",
            w = FRAME_WIDTH,
            h = FRAME_HEIGHT,
            fps = FRAME_RATE,
        );
        for overlay in &self.overlays {
            video.push(',');
            video.push_str(&overlay.to_clause());
        }
        video.push_str("[vout]");

        match &self.audio {
            None => video,
            Some(mix) => {
                let fade_out_start = (mix.duration - AUDIO_FADE_SECONDS).max(0.0);
                format!(
                    "{video};[1:a]volume={vol},afade=t=in:st=0:d={fade},afade=t=out:st={fos}:d={fade}[aout]",
                    vol = fmt_seconds(mix.volume),
                    fade = fmt_seconds(AUDIO_FADE_SECONDS),
                    fos = fmt_seconds(fade_out_start),
                )
            }
        }
    }
}

/// Compact second formatting: millisecond precision without trailing noise.
pub fn fmt_seconds(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{}", rounded)
}
