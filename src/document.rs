//! Markdown note parsing: frontmatter extraction, title/duration resolution
//! and body-to-lines extraction.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Fallback duration when neither the note nor the CLI supplies one.
pub const DEFAULT_DURATION_SECONDS: f64 = 12.0;

/// Frontmatter keys recognized in note documents. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub duration: Option<serde_yaml::Value>,
    pub bg: Option<String>,
    pub bgm: Option<String>,
}

impl Frontmatter {
    /// Duration in seconds, if the frontmatter carries a usable value.
    ///
    /// Accepts numbers and numeric strings; anything non-numeric or
    /// non-positive yields `None` so resolution falls through to the next
    /// source instead of failing.
    pub fn duration_seconds(&self) -> Option<f64> {
        let secs = match self.duration.as_ref()? {
            serde_yaml::Value::Number(n) => n.as_f64()?,
            serde_yaml::Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (secs.is_finite() && secs > 0.0).then_some(secs)
    }
}

/// How the body lines were extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Captured from bullet or numbered list items.
    List,
    /// Fallback: blank-line separated paragraphs.
    Paragraphs,
}

/// Ordered body lines together with their extraction kind.
#[derive(Debug, Clone)]
pub struct BodyLines {
    pub kind: BodyKind,
    pub lines: Vec<String>,
}

impl BodyLines {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_list(&self) -> bool {
        self.kind == BodyKind::List
    }
}

/// A Markdown note loaded from disk: optional frontmatter plus body text.
#[derive(Debug, Clone)]
pub struct NoteDocument {
    pub path: PathBuf,
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl NoteDocument {
    /// Read and parse a note from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading note {}", path.display()))?;
        Ok(Self::parse(path, &raw))
    }

    /// Parse raw note text. Never fails: a malformed frontmatter block
    /// degrades to an empty frontmatter.
    pub fn parse(path: &Path, raw: &str) -> Self {
        let (header, body) = split_frontmatter(raw);
        let frontmatter = header
            .and_then(|h| serde_yaml::from_str::<Frontmatter>(&h).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            frontmatter,
            body,
        }
    }

    /// Resolved title: frontmatter `title`, else the first level-1 heading
    /// in the body, else a cleaned-up form of the file stem.
    pub fn title(&self) -> String {
        if let Some(title) = self.frontmatter.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
        if let Some(heading) = first_heading(&self.body) {
            return heading;
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        stem.replace(['-', '_'], " ").trim().to_string()
    }

    /// Resolved duration in seconds: frontmatter wins over the global
    /// override, which wins over [`DEFAULT_DURATION_SECONDS`]. Invalid
    /// values fall through to the next source rather than erroring.
    pub fn resolve_duration(&self, override_secs: Option<f64>) -> f64 {
        self.frontmatter
            .duration_seconds()
            .or_else(|| override_secs.filter(|d| d.is_finite() && *d > 0.0))
            .unwrap_or(DEFAULT_DURATION_SECONDS)
    }

    /// Extract the ordered overlay line sequence from the body.
    ///
    /// If the body contains at least one bullet (`-`, `*`, `+`) or numbered
    /// (`N.`) list item, the result is exactly those item texts in source
    /// order, markers stripped. Otherwise the body is split on blank-line
    /// boundaries into paragraphs with internal whitespace collapsed.
    pub fn body_lines(&self) -> BodyLines {
        let items: Vec<String> = self
            .body
            .lines()
            .filter_map(|line| {
                list_item_regex()
                    .captures(line)
                    .map(|c| c[1].trim().to_string())
            })
            .filter(|item| !item.is_empty())
            .collect();
        if !items.is_empty() {
            return BodyLines {
                kind: BodyKind::List,
                lines: items,
            };
        }

        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in self.body.lines() {
            if line.trim().is_empty() {
                flush_paragraph(&mut current, &mut paragraphs);
            } else {
                current.push(line);
            }
        }
        flush_paragraph(&mut current, &mut paragraphs);
        BodyLines {
            kind: BodyKind::Paragraphs,
            lines: paragraphs,
        }
    }

    /// True when the note has no renderable content and should be skipped.
    pub fn is_empty_content(&self) -> bool {
        self.body_lines().is_empty() && self.body.trim().is_empty()
    }
}

fn flush_paragraph(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let collapsed = current
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if !collapsed.is_empty() {
        out.push(collapsed);
    }
    current.clear();
}

fn list_item_regex() -> &'static Regex {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    LIST_ITEM.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+(.+)$").unwrap())
}

fn first_heading(body: &str) -> Option<String> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let re = HEADING.get_or_init(|| Regex::new(r"^#\s+(.+)$").unwrap());
    body.lines()
        .find_map(|line| re.captures(line.trim_end()).map(|c| c[1].trim().to_string()))
        .filter(|h| !h.is_empty())
}

/// Split an optional `---`-fenced frontmatter header from the body text.
/// Returns the raw header (if a complete fence pair exists) and the body.
fn split_frontmatter(raw: &str) -> (Option<String>, String) {
    let text = raw.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return (None, text.to_string());
    }
    for (idx, line) in lines.iter().enumerate().skip(1) {
        let fence = line.trim_end();
        if fence == "---" || fence == "..." {
            let header = lines[1..idx].join("\n");
            let body = lines[idx + 1..].join("\n");
            return (Some(header), body);
        }
    }
    // Unterminated fence: treat the whole text as body.
    (None, text.to_string())
}
