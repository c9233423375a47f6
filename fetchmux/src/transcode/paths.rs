//! Output and temp path allocation.
//!
//! Allocation only reads the filesystem. Two requests racing on the same base
//! name can both be handed the same "next free" path, because neither file
//! exists until the transcoder creates it. Task base names default to a
//! millisecond timestamp, so this mostly bites when clients reuse a `name`.

use std::path::{Path, PathBuf};

/// Extension assumed when nothing can be read from the URL.
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Container used for the transient file when the source is a playlist.
pub const PLAYLIST_TEMP_EXTENSION: &str = "ts";

/// Suffix appended to the base name of transient files.
pub const TEMP_SUFFIX: &str = "_tmp";

/// Characters that are invalid in Windows filenames (also covers `/`).
const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Return the first path of the form `dir/base.ext`, `dir/base_1.ext`,
/// `dir/base_2.ext`, ... that does not exist yet.
pub fn allocate(dir: &Path, base_name: &str, extension: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{base_name}.{extension}"));
    let mut suffix = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{base_name}_{suffix}.{extension}"));
        suffix += 1;
    }
    candidate
}

/// Guess the source container from a URL.
///
/// Playlist markers win anywhere in the URL (`.m3u8` before `.m3u`, since the
/// latter is a prefix of the former). Otherwise the text after the last `.`
/// of the URL with its query string removed is used.
pub fn source_extension(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.contains(".m3u8") {
        return "m3u8".to_string();
    }
    if lower.contains(".m3u") {
        return "m3u".to_string();
    }

    let without_query = lower.split(['?', '#']).next().unwrap_or_default();
    match without_query.rsplit_once('.') {
        Some((_, ext)) if is_plain_extension(ext) => ext.to_string(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// `ext` came from the text after a dot, which may be a host label or a
/// path fragment (`https://x.com/watch`), not an extension at all.
fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Whether `ext` names an HLS/M3U playlist.
pub fn is_playlist(ext: &str) -> bool {
    matches!(ext, "m3u8" | "m3u")
}

/// Extension of the transient file the primary transcoder writes.
pub fn temp_extension(source_ext: &str) -> &str {
    if is_playlist(source_ext) {
        PLAYLIST_TEMP_EXTENSION
    } else {
        source_ext
    }
}

/// Output format for a task: the requested one if given, `mp4` for HLS
/// sources, the source extension otherwise.
pub fn output_format(requested: Option<&str>, source_ext: &str) -> String {
    match requested.map(str::trim).filter(|f| !f.is_empty()) {
        Some(format) => format.trim_start_matches('.').to_ascii_lowercase(),
        None if source_ext == "m3u8" => DEFAULT_EXTENSION.to_string(),
        None => source_ext.to_string(),
    }
}

/// Lower-cased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Turn a client-supplied name into a safe file stem.
///
/// Separators and characters that are invalid on common filesystems become
/// `_`, leading/trailing dots and spaces are dropped so the stem cannot walk
/// out of the download directory. `None` or an empty result yields
/// `video_<unix millis>`.
pub fn sanitize_base_name(name: Option<&str>) -> String {
    let cleaned = name.map(clean_name).unwrap_or_default();
    if cleaned.is_empty() {
        format!("video_{}", chrono::Utc::now().timestamp_millis())
    } else {
        cleaned
    }
}

fn clean_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_replacement = false;
    for c in raw.trim().chars() {
        if c.is_control() || INVALID_NAME_CHARS.contains(&c) {
            if !last_was_replacement {
                out.push('_');
                last_was_replacement = true;
            }
        } else {
            out.push(c);
            last_was_replacement = false;
        }
    }
    out.trim_matches(|c| c == ' ' || c == '.').to_string()
}

/// The pair of paths a task writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    pub temp_file: PathBuf,
    pub out_file: PathBuf,
    pub output_format: String,
}

/// Resolve the temp and final paths for a start request.
pub fn plan(dir: &Path, url: &str, name: Option<&str>, format: Option<&str>) -> TaskPaths {
    let source_ext = source_extension(url);
    let base_name = sanitize_base_name(name);
    let output_format = output_format(format, &source_ext);

    let temp_file = allocate(
        dir,
        &format!("{base_name}{TEMP_SUFFIX}"),
        temp_extension(&source_ext),
    );
    let out_file = allocate(dir, &base_name, &output_format);

    TaskPaths {
        temp_file,
        out_file,
        output_format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_returns_plain_name_when_free() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            allocate(temp.path(), "clip", "mp4"),
            temp.path().join("clip.mp4")
        );
    }

    #[test]
    fn test_allocate_appends_increasing_suffixes() {
        let temp = TempDir::new().unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let path = allocate(temp.path(), "clip", "mp4");
            assert!(!path.exists());
            std::fs::write(&path, b"").unwrap();
            seen.push(path.file_name().unwrap().to_string_lossy().to_string());
        }
        assert_eq!(seen, ["clip.mp4", "clip_1.mp4", "clip_2.mp4", "clip_3.mp4"]);
    }

    #[test]
    fn test_allocate_skips_taken_gap() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("clip.mp4"), b"").unwrap();
        std::fs::write(temp.path().join("clip_1.mp4"), b"").unwrap();
        assert_eq!(
            allocate(temp.path(), "clip", "mp4"),
            temp.path().join("clip_2.mp4")
        );
    }

    #[test]
    fn test_allocate_other_extension_is_independent() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("clip.ts"), b"").unwrap();
        assert_eq!(
            allocate(temp.path(), "clip", "mp4"),
            temp.path().join("clip.mp4")
        );
    }

    #[test]
    fn test_source_extension() {
        assert_eq!(source_extension("https://x/a.m3u8"), "m3u8");
        assert_eq!(source_extension("https://x/live.M3U8?token=1"), "m3u8");
        assert_eq!(source_extension("https://x/list.m3u"), "m3u");
        assert_eq!(source_extension("https://x/a.mp4"), "mp4");
        assert_eq!(source_extension("https://x/a.webm?x=y.z"), "webm");
        assert_eq!(source_extension("https://cdn.example.com/a.MKV"), "mkv");
        assert_eq!(source_extension("https://example.com/watch"), "mp4");
        assert_eq!(source_extension("no-dots-here"), "mp4");
    }

    #[test]
    fn test_temp_extension_forces_ts_for_playlists() {
        assert_eq!(temp_extension("m3u8"), "ts");
        assert_eq!(temp_extension("m3u"), "ts");
        assert_eq!(temp_extension("mkv"), "mkv");
    }

    #[test]
    fn test_output_format_resolution() {
        assert_eq!(output_format(Some("mkv"), "mp4"), "mkv");
        assert_eq!(output_format(Some(" .MP3 "), "mp4"), "mp3");
        assert_eq!(output_format(Some(""), "m3u8"), "mp4");
        assert_eq!(output_format(None, "m3u8"), "mp4");
        assert_eq!(output_format(None, "webm"), "webm");
    }

    #[test]
    fn test_sanitize_base_name() {
        assert_eq!(sanitize_base_name(Some("clip")), "clip");
        assert_eq!(sanitize_base_name(Some("  my clip  ")), "my clip");
        assert_eq!(sanitize_base_name(Some("../../etc/passwd")), "_.._etc_passwd");
        assert_eq!(sanitize_base_name(Some("a<>:b")), "a_b");
        assert!(sanitize_base_name(Some("   ")).starts_with("video_"));
        assert!(sanitize_base_name(None).starts_with("video_"));
    }

    #[test]
    fn test_plan_playlist_to_mp4() {
        let temp = TempDir::new().unwrap();
        let paths = plan(temp.path(), "https://x/a.m3u8", Some("clip"), Some("mp4"));

        assert_eq!(paths.temp_file, temp.path().join("clip_tmp.ts"));
        assert_eq!(paths.out_file, temp.path().join("clip.mp4"));
        assert_eq!(paths.output_format, "mp4");
    }

    #[test]
    fn test_plan_plain_mp4_without_name() {
        let temp = TempDir::new().unwrap();
        let paths = plan(temp.path(), "https://x/a.mp4", None, None);

        let out_name = paths.out_file.file_name().unwrap().to_string_lossy();
        assert!(out_name.starts_with("video_"));
        assert!(out_name.ends_with(".mp4"));
        assert_eq!(extension_of(&paths.temp_file).as_deref(), Some("mp4"));
        assert_eq!(paths.output_format, "mp4");
    }
}
