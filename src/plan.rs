//! Render plan assembly: one fully-specified ffmpeg invocation per note.
//!
//! The plan is completely determined before ffmpeg runs; nothing here
//! inspects encoder output beyond process success.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::assets;
use crate::document::NoteDocument;
use crate::filtergraph::{
    fmt_seconds, AudioMix, BoxStyle, DrawText, FilterGraph, FRAME_RATE,
};
use crate::style::{OverlayMode, StyleConfig};
use crate::PlanError;

const WATERMARK_FONT_SIZE: u32 = 30;
const TITLE_BOX_BORDER: u32 = 24;

/// Immutable per-run options, constructed once at startup and passed into
/// the planner. Never read as ambient global state.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub slot: String,
    pub duration_override: Option<f64>,
    pub background_dir: PathBuf,
    pub music_dir: PathBuf,
    pub out_root: PathBuf,
    pub timezone: Tz,
    pub style: StyleConfig,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            slot: "morning".to_string(),
            duration_override: None,
            background_dir: PathBuf::from("assets/bg"),
            music_dir: PathBuf::from("assets/bgm"),
            out_root: PathBuf::from("videos/queue"),
            timezone: chrono_tz::Asia::Seoul,
            style: StyleConfig::default(),
        }
    }
}

/// Deletes the overlay text file when the render cycle ends, even when
/// ffmpeg fails.
#[derive(Debug)]
pub struct TempTextGuard {
    path: PathBuf,
}

impl TempTextGuard {
    fn create(contents: &str) -> io::Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "notereel_overlay_{}_{}.txt",
            std::process::id(),
            stamp
        ));
        fs::write(&path, contents)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempTextGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A fully-specified ffmpeg invocation.
#[derive(Debug)]
pub struct RenderPlan {
    /// Complete argument list, destination path included as the final entry.
    pub args: Vec<String>,
    pub output: PathBuf,
    pub background: PathBuf,
    pub audio: Option<PathBuf>,
    pub duration: f64,
    temp_text: Option<TempTextGuard>,
}

impl RenderPlan {
    /// Overlay text file backing a block-mode render, if any.
    pub fn temp_text_path(&self) -> Option<&Path> {
        self.temp_text.as_ref().map(TempTextGuard::path)
    }

    /// The `-filter_complex` expression embedded in the argument list.
    pub fn filter_graph(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == "-filter_complex")
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

/// Build the render plan for one note.
///
/// Returns `Ok(None)` when the note has no renderable content (a skip,
/// not an error) and `Err(PlanError::MissingBackgroundAsset)` when no
/// background can be resolved.
pub fn plan<R: Rng>(
    doc: &NoteDocument,
    options: &RenderOptions,
    rng: &mut R,
) -> Result<Option<RenderPlan>, PlanError> {
    if doc.is_empty_content() {
        return Ok(None);
    }
    let body = doc.body_lines();

    let title = doc.title();
    let duration = doc.resolve_duration(options.duration_override);
    let background = assets::resolve_background(
        &options.background_dir,
        doc.frontmatter.bg.as_deref(),
        rng,
    )?;
    let audio = assets::resolve_music(&options.music_dir, doc.frontmatter.bgm.as_deref(), rng);

    let now = Utc::now().with_timezone(&options.timezone);
    let output = output_path(&options.out_root, &doc.path, &options.slot, &now);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut graph = FilterGraph::new();
    let temp_text = match options.style.mode {
        OverlayMode::Timesliced => {
            build_timesliced_overlays(&mut graph, &title, &body.lines, duration, &options.style);
            None
        }
        OverlayMode::Block => {
            let block = block_text(&title, &body.lines, body.is_list(), &options.style);
            let guard = TempTextGuard::create(&block)?;
            graph.push_overlay(block_overlay(guard.path(), &options.style));
            Some(guard)
        }
    };
    if audio.is_some() {
        graph.set_audio(AudioMix {
            volume: options.style.music_volume,
            duration,
        });
    }

    let args = assemble_args(&background, audio.as_deref(), &graph, duration, &output);
    Ok(Some(RenderPlan {
        args,
        output,
        background,
        audio,
        duration,
        temp_text,
    }))
}

fn build_timesliced_overlays(
    graph: &mut FilterGraph,
    title: &str,
    lines: &[String],
    duration: f64,
    style: &StyleConfig,
) {
    let lead = if title.is_empty() {
        0.0
    } else {
        style.title_lead.clamp(0.0, duration)
    };

    if !title.is_empty() {
        let mut clause = DrawText::inline(title)
            .with_font_file(style.font.as_deref())
            .with_font_size(style.title_font_size)
            .with_color(style.color.as_str())
            .with_position("(w-text_w)/2", style.title_y.as_str())
            .with_shadow(style.shadow_style());
        if style.boxed_title {
            clause = clause.with_box(BoxStyle {
                color: style.box_color.clone(),
                border_width: TITLE_BOX_BORDER,
            });
        }
        graph.push_overlay(clause);
    }

    // Each line gets an equal slice of the post-title duration.
    let span = duration - lead;
    let count = lines.len();
    for (idx, line) in lines.iter().enumerate() {
        let start = lead + span * idx as f64 / count as f64;
        let end = lead + span * (idx + 1) as f64 / count as f64;
        graph.push_overlay(
            DrawText::inline(line.as_str())
                .with_font_file(style.font.as_deref())
                .with_font_size(style.body_font_size)
                .with_color(style.color.as_str())
                .with_position(style.body_x.as_str(), style.body_y.as_str())
                .with_shadow(style.shadow_style())
                .with_window(start, end),
        );
    }

    if let Some(watermark) = style.watermark.as_deref() {
        graph.push_overlay(
            DrawText::inline(watermark)
                .with_font_file(style.font.as_deref())
                .with_font_size(WATERMARK_FONT_SIZE)
                .with_color(style.color.as_str())
                .with_position("w-text_w-40", "h-text_h-40"),
        );
    }
}

fn block_text(title: &str, lines: &[String], is_list: bool, style: &StyleConfig) -> String {
    let mut out = String::new();
    if style.prepend_title && !title.is_empty() {
        out.push_str(title);
        out.push_str("\n\n");
    }
    for line in lines {
        if is_list {
            out.push_str("\u{2022} ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn block_overlay(text_file: &Path, style: &StyleConfig) -> DrawText {
    let mut clause = DrawText::from_file(text_file)
        .with_font_file(style.font.as_deref())
        .with_font_size(style.body_font_size)
        .with_color(style.color.as_str())
        .with_line_spacing(style.line_spacing)
        .with_position(style.body_x.as_str(), style.body_y.as_str())
        .with_shadow(style.shadow_style());
    if style.boxed_title {
        clause = clause.with_box(BoxStyle {
            color: style.box_color.clone(),
            border_width: TITLE_BOX_BORDER,
        });
    }
    clause
}

fn assemble_args(
    background: &Path,
    audio: Option<&Path>,
    graph: &FilterGraph,
    duration: f64,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-loglevel".into(), "error".into(), "-y".into()];

    if assets::is_image(background) {
        args.push("-loop".into());
        args.push("1".into());
    } else {
        args.push("-stream_loop".into());
        args.push("-1".into());
    }
    args.push("-i".into());
    args.push(background.to_string_lossy().into_owned());

    if let Some(track) = audio {
        args.push("-i".into());
        args.push(track.to_string_lossy().into_owned());
    }

    args.push("-filter_complex".into());
    args.push(graph.render());
    args.push("-map".into());
    args.push("[vout]".into());
    if graph.has_audio() {
        args.push("-map".into());
        args.push("[aout]".into());
    }

    args.push("-r".into());
    args.push(FRAME_RATE.to_string());
    args.push("-t".into());
    args.push(fmt_seconds(duration));
    args.push("-shortest".into());

    args.push("-c:v".into());
    args.push("libx264".into());
    args.push("-preset".into());
    args.push("medium".into());
    args.push("-crf".into());
    args.push("23".into());
    args.push("-pix_fmt".into());
    args.push("yuv420p".into());
    if graph.has_audio() {
        args.push("-c:a".into());
        args.push("aac".into());
        args.push("-b:a".into());
        args.push("192k".into());
    }
    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Destination path: `<root>/<date>/<slug>_<slot>_<suffix>.mp4`, dated in
/// the configured timezone.
pub fn output_path(root: &Path, source: &Path, slot: &str, now: &DateTime<Tz>) -> PathBuf {
    root.join(now.format("%Y-%m-%d").to_string())
        .join(output_file_name(source, slot, now))
}

/// `<slug>_<slot>_<suffix>.mp4`. The suffix mixes the timestamp in
/// milliseconds with a per-process render sequence number; the sum is
/// strictly increasing, so two renders in the same run cannot collide
/// even within one millisecond.
pub fn output_file_name(source: &Path, slot: &str, now: &DateTime<Tz>) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "note".to_string());
    let sequence = RENDER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix = (now.timestamp_millis().rem_euclid(1_000_000) as u64 + sequence) % 1_000_000;
    format!("{}_{}_{:06}.mp4", slugify(&stem), slot, suffix)
}

static RENDER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Lowercase, alphanumerics kept, everything else collapsed to single
/// hyphens.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("note");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn fixture(bg: &[&str], bgm: &[&str]) -> (tempfile::TempDir, RenderOptions) {
        let dir = tempfile::tempdir().unwrap();
        let bg_dir = dir.path().join("bg");
        let bgm_dir = dir.path().join("bgm");
        fs::create_dir_all(&bg_dir).unwrap();
        fs::create_dir_all(&bgm_dir).unwrap();
        for name in bg {
            fs::write(bg_dir.join(name), b"x").unwrap();
        }
        for name in bgm {
            fs::write(bgm_dir.join(name), b"x").unwrap();
        }
        let options = RenderOptions {
            background_dir: bg_dir,
            music_dir: bgm_dir,
            out_root: dir.path().join("queue"),
            ..RenderOptions::default()
        };
        (dir, options)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    fn parse_doc(raw: &str) -> NoteDocument {
        NoteDocument::parse(Path::new("data/morning/foo.md"), raw)
    }

    #[test]
    fn bullet_note_produces_timesliced_plan() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc(
            "---\ntitle: Good Morning\nduration: 10\nbg: a.png\n---\n- Drink water\n- Stretch\n",
        );
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();

        assert_eq!(plan.duration, 10.0);
        assert!(plan.background.ends_with("a.png"));
        assert!(plan.audio.is_none());

        let t_idx = plan.args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(plan.args[t_idx + 1], "10");

        // Two body windows partitioning the post-title duration.
        let graph = plan.filter_graph().unwrap().to_string();
        assert!(graph.contains("enable='between(t,1.5,5.75)'"));
        assert!(graph.contains("enable='between(t,5.75,10)'"));
        assert_eq!(graph.matches("drawtext=").count(), 3); // title + 2 lines
        assert!(graph.contains("text='Good Morning'"));
    }

    #[test]
    fn output_name_carries_slug_slot_and_suffix() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc("---\nbg: a.png\n---\n- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();

        let name = plan.output.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("foo_morning_"));
        assert!(name.ends_with(".mp4"));
        let date_dir = plan.output.parent().unwrap();
        assert!(date_dir.exists(), "date-namespaced directory is created");
    }

    #[test]
    fn same_stem_notes_get_distinct_outputs_within_a_run() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let mut rng = rng();
        // Same stem, planned back-to-back (well within one millisecond).
        let first = NoteDocument::parse(Path::new("data/morning/mon/foo.md"), "- one\n");
        let second = NoteDocument::parse(Path::new("data/morning/_default/foo.md"), "- two\n");
        let a = plan(&first, &options, &mut rng).unwrap().unwrap();
        let b = plan(&second, &options, &mut rng).unwrap().unwrap();
        assert_ne!(a.output, b.output);
    }

    #[test]
    fn empty_note_is_a_skip() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc("---\ntitle: nothing here\n---\n\n");
        assert!(plan(&doc, &options, &mut rng()).unwrap().is_none());
    }

    #[test]
    fn missing_background_is_fatal_for_the_note() {
        let (_dir, options) = fixture(&[], &[]);
        let doc = parse_doc("- x\n");
        let err = plan(&doc, &options, &mut rng()).unwrap_err();
        assert!(matches!(err, PlanError::MissingBackgroundAsset { .. }));
    }

    #[test]
    fn audio_adds_second_input_and_codec() {
        let (_dir, options) = fixture(&["a.png"], &["calm.mp3"]);
        let doc = parse_doc("- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();

        assert!(plan.audio.is_some());
        assert_eq!(plan.args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(plan.args.iter().any(|a| a == "[aout]"));
        assert!(plan.args.iter().any(|a| a == "aac"));
        assert!(plan.args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn silent_note_omits_audio_mapping() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc("- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        assert!(!plan.args.iter().any(|a| a == "[aout]"));
        assert!(!plan.args.iter().any(|a| a == "aac"));
    }

    #[test]
    fn video_background_uses_stream_loop() {
        let (_dir, options) = fixture(&["clip.mp4"], &[]);
        let doc = parse_doc("- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        assert!(plan.args.contains(&"-stream_loop".to_string()));
        assert!(!plan.args.contains(&"-loop".to_string()));
    }

    #[test]
    fn image_background_uses_static_loop() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc("- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        assert!(plan.args.contains(&"-loop".to_string()));
        assert!(!plan.args.contains(&"-stream_loop".to_string()));
    }

    #[test]
    fn block_mode_writes_bulleted_temp_file() {
        let (_dir, mut options) = fixture(&["a.png"], &[]);
        options.style.mode = crate::style::OverlayMode::Block;
        let doc = parse_doc("---\ntitle: Plan\n---\n- Drink water\n- Stretch\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();

        let text_path = plan.temp_text_path().unwrap().to_path_buf();
        let contents = fs::read_to_string(&text_path).unwrap();
        assert_eq!(contents, "Plan\n\n\u{2022} Drink water\n\u{2022} Stretch\n");
        assert!(plan.filter_graph().unwrap().contains("textfile="));

        drop(plan);
        assert!(!text_path.exists(), "guard removes the temp file");
    }

    #[test]
    fn block_mode_paragraphs_have_no_bullet_glyph() {
        let (_dir, mut options) = fixture(&["a.png"], &[]);
        options.style.mode = crate::style::OverlayMode::Block;
        options.style.prepend_title = false;
        let doc = parse_doc("Just one paragraph of text.\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        let contents = fs::read_to_string(plan.temp_text_path().unwrap()).unwrap();
        assert_eq!(contents, "Just one paragraph of text.\n");
    }

    #[test]
    fn watermark_clause_present_when_configured() {
        let (_dir, mut options) = fixture(&["a.png"], &[]);
        options.style.watermark = Some("@notereel".to_string());
        let doc = parse_doc("- x\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        assert!(plan.filter_graph().unwrap().contains("text='@notereel'"));
    }

    #[test]
    fn lead_is_clamped_to_short_durations() {
        let (_dir, options) = fixture(&["a.png"], &[]);
        let doc = parse_doc("---\nduration: 1\n---\n- a\n- b\n");
        let plan = plan(&doc, &options, &mut rng()).unwrap().unwrap();
        let graph = plan.filter_graph().unwrap();
        assert!(graph.contains("between(t,1,1)"));
    }

    #[test]
    fn slugify_sanitizes() {
        assert_eq!(slugify("Good Morning!"), "good-morning");
        assert_eq!(slugify("foo"), "foo");
        assert_eq!(slugify("a__b--c"), "a-b-c");
        assert_eq!(slugify("??"), "note");
    }

    #[test]
    fn output_path_is_date_namespaced() {
        let tz: Tz = "Asia/Seoul".parse().unwrap();
        let now = tz.with_ymd_and_hms(2026, 8, 25, 7, 30, 0).unwrap();
        let path = output_path(Path::new("videos/queue"), Path::new("data/foo.md"), "morning", &now);
        assert!(path.starts_with("videos/queue/2026-08-25"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("foo_morning_"));
        assert!(name.ends_with(".mp4"));
    }
}
