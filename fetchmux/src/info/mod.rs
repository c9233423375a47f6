//! Metadata lookup for a URL before a task is started.
//!
//! A `HEAD` request yields the content type; pages that look like HTML are
//! fetched (bounded) and scanned for OpenGraph title and image tags. The
//! suggested output format comes from the URL extension first, then from
//! the MIME family.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::debug;

use crate::config::TranscodeConfig;
use crate::Result;
use crate::transcode::supervisor::validate_url;

/// Upper bound on the HTML read while looking for meta tags.
const MAX_PAGE_BYTES: usize = 1024 * 1024;

/// URL extensions whose natural output differs from the extension itself.
const FORMAT_MAP: &[(&str, &str)] = &[
    ("m3u8", "mp4"),
    ("m3u", "mp4"),
    ("ts", "mp4"),
    ("mp3", "mp3"),
    ("wav", "mp3"),
];

const VIDEO_FORMATS: &[&str] = &["mp4", "mkv", "webm"];
const AUDIO_FORMATS: &[&str] = &["mp3", "aac", "wav", "m4a"];

static OG_TITLE: LazyLock<Regex> = LazyLock::new(|| meta_regex("property", "og:title"));
static OG_IMAGE: LazyLock<Regex> = LazyLock::new(|| meta_regex("property", "og:image"));
static TWITTER_IMAGE: LazyLock<Regex> = LazyLock::new(|| meta_regex("name", "twitter:image"));
static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>\s*([^<]+?)\s*</title>").unwrap());

/// Matches `<meta {attr}="{value}" content="...">` with the attributes in
/// either order.
fn meta_regex(attr: &str, value: &str) -> Regex {
    let value = regex::escape(value);
    Regex::new(&format!(
        r#"(?i)<meta\s+[^>]*?{attr}\s*=\s*["']{value}["'][^>]*?content\s*=\s*["']([^"']+)["']|<meta\s+[^>]*?content\s*=\s*["']([^"']+)["'][^>]*?{attr}\s*=\s*["']{value}["']"#
    ))
    .unwrap()
}

/// Whether the URL points at a playlist or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Playlist,
    File,
}

impl SourceKind {
    pub fn of(url: &str) -> Self {
        if url.to_ascii_lowercase().contains("m3u8") {
            Self::Playlist
        } else {
            Self::File
        }
    }
}

/// What we could learn about a URL.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub title: Option<String>,
    /// Suggested output format.
    pub format: String,
    pub mime_type: Option<String>,
    pub thumbnail_url: Option<String>,
    pub valid_formats: Vec<String>,
    #[serde(rename = "type")]
    pub kind: SourceKind,
}

/// OpenGraph-ish page metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub image: Option<String>,
}

/// Extract title and preview image from an HTML document.
pub fn parse_page_meta(html: &str) -> PageMeta {
    let first = |re: &Regex| {
        re.captures(html).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| decode_entities(m.as_str().trim()))
        })
    };

    PageMeta {
        title: first(&OG_TITLE).or_else(|| first(&TITLE_TAG)),
        image: first(&OG_IMAGE).or_else(|| first(&TWITTER_IMAGE)),
    }
    .non_empty()
}

impl PageMeta {
    fn non_empty(self) -> Self {
        Self {
            title: self.title.filter(|t| !t.is_empty()),
            image: self.image.filter(|i| !i.is_empty()),
        }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Extension of the URL path, without query or fragment.
fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = last_segment.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Pick the output format to suggest for `url`.
///
/// Order: mapped URL extension, the URL extension itself, the MIME family,
/// then the configured default. Only allowed formats are ever suggested.
pub fn determine_best_format(url: &str, mime_type: Option<&str>, config: &TranscodeConfig) -> String {
    if let Some(ext) = url_extension(url) {
        let mapped = FORMAT_MAP
            .iter()
            .find(|(from, _)| *from == ext)
            .map(|(_, to)| *to);
        if let Some(mapped) = mapped.filter(|f| config.is_allowed_format(f)) {
            return mapped.to_string();
        }
        if config.is_allowed_format(&ext) {
            return ext;
        }
    }

    if let Some(mime) = mime_type.map(str::to_ascii_lowercase) {
        let family = if mime.starts_with("video/") {
            Some(VIDEO_FORMATS)
        } else if mime.starts_with("audio/") {
            Some(AUDIO_FORMATS)
        } else {
            None
        };
        if let Some(family) = family {
            let found = config
                .allowed_formats
                .iter()
                .find(|f| family.contains(&f.to_ascii_lowercase().as_str()));
            return found
                .cloned()
                .unwrap_or_else(|| config.default_format.clone());
        }
    }

    config.default_format.clone()
}

/// Probes URLs for [`MediaInfo`].
#[derive(Debug, Clone)]
pub struct InfoService {
    client: reqwest::Client,
}

impl InfoService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Look up a URL. Network failures only leave fields empty; a malformed
    /// URL is a validation error.
    pub async fn lookup(&self, url: &str, config: &TranscodeConfig) -> Result<MediaInfo> {
        let url = validate_url(url)?;

        let mime_type = self.detect_mime_type(url).await;
        let page = match mime_type.as_deref() {
            Some(mime) if !looks_like_html(mime) => PageMeta::default(),
            _ => self.fetch_page_meta(url).await.unwrap_or_default(),
        };

        Ok(MediaInfo {
            title: page.title,
            format: determine_best_format(url, mime_type.as_deref(), config),
            mime_type,
            thumbnail_url: page.image,
            valid_formats: config.allowed_formats.clone(),
            kind: SourceKind::of(url),
        })
    }

    async fn detect_mime_type(&self, url: &str) -> Option<String> {
        match self.client.head(url).send().await {
            Ok(response) => response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            Err(e) => {
                debug!(url, error = %e, "HEAD request failed");
                None
            }
        }
    }

    async fn fetch_page_meta(&self, url: &str) -> Option<PageMeta> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.ok()?;
            let room = MAX_PAGE_BYTES.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_PAGE_BYTES {
                break;
            }
        }

        Some(parse_page_meta(&String::from_utf8_lossy(&body)))
    }
}

fn looks_like_html(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/html") || mime.starts_with("application/xhtml")
}
