//! Background and music asset resolution.
//!
//! An explicit frontmatter reference wins when it names an existing file;
//! otherwise a candidate is drawn uniformly at random from the directory.
//! The random source is injected so callers (and tests) control selection.

use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::PlanError;

/// Extensions accepted as background material (images and videos).
pub const BACKGROUND_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "mp4", "mov", "webm"];

/// Extensions accepted as background music.
pub const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// True when the path points at a still image rather than a video.
pub fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

/// Resolve the background for a render. Absence of any candidate is fatal
/// for the document.
pub fn resolve_background<R: Rng>(
    dir: &Path,
    explicit: Option<&str>,
    rng: &mut R,
) -> Result<PathBuf, PlanError> {
    if let Some(path) = explicit_asset(dir, explicit) {
        return Ok(path);
    }
    pick_random(dir, BACKGROUND_EXTENSIONS, rng).ok_or_else(|| PlanError::MissingBackgroundAsset {
        dir: dir.to_path_buf(),
    })
}

/// Resolve background music. Absence at any stage degrades to silence.
pub fn resolve_music<R: Rng>(dir: &Path, explicit: Option<&str>, rng: &mut R) -> Option<PathBuf> {
    explicit_asset(dir, explicit).or_else(|| pick_random(dir, MUSIC_EXTENSIONS, rng))
}

fn explicit_asset(dir: &Path, explicit: Option<&str>) -> Option<PathBuf> {
    let name = explicit?.trim();
    if name.is_empty() {
        return None;
    }
    let path = dir.join(name);
    path.is_file().then_some(path)
}

fn pick_random<R: Rng>(dir: &Path, extensions: &[&str], rng: &mut R) -> Option<PathBuf> {
    let candidates = matching_files(dir, extensions);
    candidates.choose(rng).cloned()
}

/// One-level directory scan, sorted so the candidate order is stable
/// before the random pick.
fn matching_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    files.sort();
    files
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn explicit_background_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("beach.png"), b"png").unwrap();
        fs::write(dir.path().join("other.jpg"), b"jpg").unwrap();
        let resolved = resolve_background(dir.path(), Some("beach.png"), &mut rng()).unwrap();
        assert_eq!(resolved, dir.path().join("beach.png"));
    }

    #[test]
    fn missing_explicit_background_falls_back_to_random() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("only.jpg"), b"jpg").unwrap();
        let resolved = resolve_background(dir.path(), Some("gone.png"), &mut rng()).unwrap();
        assert_eq!(resolved, dir.path().join("only.jpg"));
    }

    #[test]
    fn empty_background_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"not media").unwrap();
        let err = resolve_background(dir.path(), None, &mut rng()).unwrap_err();
        assert!(matches!(err, PlanError::MissingBackgroundAsset { .. }));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.MP4"), b"mp4").unwrap();
        let resolved = resolve_background(dir.path(), None, &mut rng()).unwrap();
        assert_eq!(resolved, dir.path().join("clip.MP4"));
    }

    #[test]
    fn seeded_rng_selects_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            fs::write(dir.path().join(name), b"png").unwrap();
        }
        let first = resolve_background(dir.path(), None, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = resolve_background(dir.path(), None, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn music_absence_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_music(dir.path(), None, &mut rng()).is_none());
        assert!(resolve_music(dir.path(), Some("gone.mp3"), &mut rng()).is_none());
    }

    #[test]
    fn music_restricted_to_audio_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("video.mp4"), b"mp4").unwrap();
        fs::write(dir.path().join("calm.mp3"), b"mp3").unwrap();
        let resolved = resolve_music(dir.path(), None, &mut rng()).unwrap();
        assert_eq!(resolved, dir.path().join("calm.mp3"));
    }

    #[test]
    fn image_detection() {
        assert!(is_image(Path::new("bg/beach.PNG")));
        assert!(!is_image(Path::new("bg/clip.mov")));
    }
}
