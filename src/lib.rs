//! # notereel - Markdown notes to vertical videos
//!
//! `notereel` reads Markdown notes (with optional YAML frontmatter), picks a
//! background image or video and optional background music from local asset
//! directories, and invokes ffmpeg to produce a vertical 1080x1920 video
//! with the note's text overlaid.
//!
//! The crate never composites pixels itself: it builds a fully-specified
//! render plan (argument list plus filter-graph string) and hands it to
//! ffmpeg unmodified.
//!
//! ## Example
//!
//! ```no_run
//! use notereel::{plan, Encoder, FfmpegEncoder, NoteDocument, RenderOptions};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let doc = NoteDocument::load(Path::new("data/morning/hydrate.md"))?;
//! let options = RenderOptions::default();
//! let mut rng = rand::thread_rng();
//! if let Some(plan) = plan(&doc, &options, &mut rng)? {
//!     FfmpegEncoder::default().encode(&plan)?;
//! }
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

pub mod assets;
pub mod document;
pub mod encoder;
pub mod filtergraph;
pub mod plan;
pub mod style;

pub use document::{BodyKind, BodyLines, Frontmatter, NoteDocument, DEFAULT_DURATION_SECONDS};
pub use encoder::{Encoder, FfmpegEncoder};
pub use plan::{plan, RenderOptions, RenderPlan};
pub use style::{load_style, OverlayMode, StyleConfig};

/// Failures that end one note's render without ending the run.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no background asset available in {}", dir.display())]
    MissingBackgroundAsset { dir: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Candidate notes for a slot: `data/<slot>/<weekday>`, `data/<slot>/_default`
/// and `data/<slot>` are all scanned (concatenated, not short-circuited),
/// then the combined list is sorted lexicographically by path.
pub fn discover_documents(data_dir: &Path, slot: &str, weekday: &str) -> Vec<PathBuf> {
    let slot_dir = data_dir.join(slot);
    let mut found = Vec::new();
    for dir in [slot_dir.join(weekday), slot_dir.join("_default"), slot_dir] {
        found.extend(markdown_files(&dir));
    }
    found.sort();
    found
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("md"))
                    .unwrap_or(false)
        })
        .collect()
}

/// Outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Process candidates strictly in order, stopping once `max` renders have
/// succeeded. Every per-note failure is logged with the offending path and
/// excluded from the success count; the run always continues to the next
/// candidate.
pub fn run_queue<R, E>(
    candidates: &[PathBuf],
    options: &RenderOptions,
    max: usize,
    rng: &mut R,
    encoder: &E,
) -> RunSummary
where
    R: Rng,
    E: Encoder + ?Sized,
{
    let mut summary = RunSummary::default();
    for path in candidates {
        if summary.rendered >= max {
            break;
        }
        let doc = match NoteDocument::load(path) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read note");
                summary.failed += 1;
                continue;
            }
        };
        let render_plan = match plan(&doc, options, rng) {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(path = %path.display(), "note has no renderable content, skipping");
                summary.skipped += 1;
                continue;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "planning failed");
                summary.failed += 1;
                continue;
            }
        };
        match encoder.encode(&render_plan) {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    output = %render_plan.output.display(),
                    duration = render_plan.duration,
                    "rendered"
                );
                summary.rendered += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "encoding failed");
                summary.failed += 1;
            }
        }
    }
    summary
}
