//! Environment-driven application configuration.
//!
//! Values are read once at startup (after `dotenvy` has loaded `.env`) and
//! handed to the components that consume them. Nothing here is reloaded at
//! runtime.

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::{Error, Result};

/// Formats offered when `FORMATS` is unset.
pub const DEFAULT_FORMATS: &[&str] = &["mp4", "mkv", "webm", "mp3", "m3u8"];

/// Transcoder binary used when `FFMPEG_PATH` is unset.
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// The subset of configuration the transcode core consumes.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Directory holding final outputs and `_tmp` transients.
    pub download_dir: PathBuf,
    /// External transcoder binary.
    pub ffmpeg_binary_path: String,
    /// Output formats a client may request.
    pub allowed_formats: Vec<String>,
    /// Format suggested to clients when nothing better is known.
    pub default_format: String,
}

impl TranscodeConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ffmpeg_binary_path: DEFAULT_FFMPEG_PATH.to_string(),
            allowed_formats: DEFAULT_FORMATS.iter().map(|s| s.to_string()).collect(),
            default_format: "mp4".to_string(),
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_binary_path = path.into();
        self
    }

    pub fn with_allowed_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `format` may be requested. Comparison ignores ASCII case.
    pub fn is_allowed_format(&self, format: &str) -> bool {
        self.allowed_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }
}

/// Button labels echoed to the web UI.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiText {
    pub download_button_text: String,
    pub manual_download_text: String,
    pub another_download_text: String,
    pub cancel_text: String,
}

impl Default for UiText {
    fn default() -> Self {
        Self {
            download_button_text: "Download".to_string(),
            manual_download_text: "Save file".to_string(),
            another_download_text: "Start another download".to_string(),
            cancel_text: "Cancel".to_string(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub transcode: TranscodeConfig,
    pub log_dir: PathBuf,
    pub ui: UiText,
    /// Let the UI fetch the file on its own once a task is done.
    pub auto_download: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transcode: TranscodeConfig::new("downloads"),
            log_dir: PathBuf::from("logs"),
            ui: UiText::default(),
            auto_download: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `DOWNLOAD_DIR`, `LOG_DIR`
    /// - `FFMPEG_PATH`
    /// - `FORMATS` (comma separated, e.g. "mp4,mkv,mp3")
    /// - `DEFAULT_FORMAT`
    /// - `UI_DOWNLOAD_TEXT`, `UI_MANUAL_DOWNLOAD_TEXT`, `UI_ANOTHER_DOWNLOAD_TEXT`, `UI_CANCEL_TEXT`
    /// - `AUTO_DOWNLOAD` ("true" enables)
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env_or_default`] but reads from an arbitrary
    /// lookup, which keeps tests away from process-global env state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = non_empty("DOWNLOAD_DIR") {
            config.transcode.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty("FFMPEG_PATH") {
            config.transcode.ffmpeg_binary_path = path;
        }

        if let Some(formats) = non_empty("FORMATS") {
            let parsed = parse_format_list(&formats);
            if parsed.is_empty() {
                return Err(Error::config(format!(
                    "FORMATS='{formats}' does not name any format"
                )));
            }
            config.transcode.allowed_formats = parsed;
        }

        if let Some(default_format) = non_empty("DEFAULT_FORMAT") {
            config.transcode.default_format = default_format.trim().to_ascii_lowercase();
        }
        if !config
            .transcode
            .is_allowed_format(&config.transcode.default_format)
        {
            warn!(
                default_format = %config.transcode.default_format,
                "DEFAULT_FORMAT is not one of FORMATS; clients may be offered a format they cannot request"
            );
        }

        if let Some(text) = non_empty("UI_DOWNLOAD_TEXT") {
            config.ui.download_button_text = text;
        }
        if let Some(text) = non_empty("UI_MANUAL_DOWNLOAD_TEXT") {
            config.ui.manual_download_text = text;
        }
        if let Some(text) = non_empty("UI_ANOTHER_DOWNLOAD_TEXT") {
            config.ui.another_download_text = text;
        }
        if let Some(text) = non_empty("UI_CANCEL_TEXT") {
            config.ui.cancel_text = text;
        }

        config.auto_download = non_empty("AUTO_DOWNLOAD")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(config)
    }
}

fn parse_format_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.transcode.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.transcode.ffmpeg_binary_path, "ffmpeg");
        assert_eq!(config.transcode.default_format, "mp4");
        assert!(config.transcode.is_allowed_format("mkv"));
        assert!(!config.auto_download);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DOWNLOAD_DIR", "/srv/media"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("FORMATS", "mp4, MKV ,.mp3,"),
            ("DEFAULT_FORMAT", "mkv"),
            ("AUTO_DOWNLOAD", "true"),
            ("UI_CANCEL_TEXT", "Stop"),
        ]))
        .unwrap();

        assert_eq!(config.transcode.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.transcode.ffmpeg_binary_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.transcode.allowed_formats, vec!["mp4", "mkv", "mp3"]);
        assert_eq!(config.transcode.default_format, "mkv");
        assert!(config.auto_download);
        assert_eq!(config.ui.cancel_text, "Stop");
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = AppConfig::from_lookup(lookup(&[("LOG_DIR", "  ")])).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_format_list_without_entries_is_rejected() {
        let result = AppConfig::from_lookup(lookup(&[("FORMATS", " , ,")]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_allowed_format_ignores_case() {
        let config = TranscodeConfig::new("d").with_allowed_formats(["mp4"]);
        assert!(config.is_allowed_format("MP4"));
        assert!(!config.is_allowed_format("exe"));
    }
}
