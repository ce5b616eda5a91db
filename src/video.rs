use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
        .expect("youtube pattern")
});
static VIMEO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"vimeo\.com/(?:video/)?(\d+)").expect("vimeo pattern"));
// Greedy `.*` makes the captured id the last path segment.
static KHAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"khanacademy\.org/.*/([a-zA-Z0-9_-]+)").expect("khan pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoProvider {
    #[serde(rename = "youtube")]
    YouTube,
    #[serde(rename = "vimeo")]
    Vimeo,
    #[serde(rename = "khan_academy")]
    KhanAcademy,
}

impl VideoProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Vimeo => "vimeo",
            Self::KhanAcademy => "khan_academy",
        }
    }

    /// Hosts that identify the provider even when no id can be parsed.
    pub fn hosts(self) -> &'static [&'static str] {
        match self {
            Self::YouTube => &["youtube.com", "youtu.be"],
            Self::Vimeo => &["vimeo.com"],
            Self::KhanAcademy => &["khanacademy.org"],
        }
    }

    pub const ALL: [VideoProvider; 3] = [Self::YouTube, Self::Vimeo, Self::KhanAcademy];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    #[serde(rename = "type")]
    pub provider: VideoProvider,
    pub id: String,
    pub thumbnail: Option<String>,
}

/// Classifies a video url by provider pattern. Patterns are tried in order
/// (YouTube, Vimeo, Khan Academy) and the first match wins. Thumbnails are
/// built from the id, never fetched.
pub fn parse_video_url(url: &str) -> Option<VideoInfo> {
    if let Some(c) = YOUTUBE_RE.captures(url) {
        let id = c[1].to_string();
        return Some(VideoInfo {
            provider: VideoProvider::YouTube,
            thumbnail: Some(format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", id)),
            id,
        });
    }
    if let Some(c) = VIMEO_RE.captures(url) {
        return Some(VideoInfo {
            provider: VideoProvider::Vimeo,
            id: c[1].to_string(),
            thumbnail: None,
        });
    }
    if let Some(c) = KHAN_RE.captures(url) {
        return Some(VideoInfo {
            provider: VideoProvider::KhanAcademy,
            id: c[1].to_string(),
            thumbnail: None,
        });
    }
    None
}

/// Host part of an absolute url, lowercased, without userinfo or port.
fn url_host(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split_once(':').map_or(host, |(h, _)| h);
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Provider serving `url`, regardless of whether an id parses. Only the url
/// host counts; the host must be the provider domain or a subdomain of it.
pub fn provider_for_host(url: &str) -> Option<VideoProvider> {
    let host = url_host(url)?;
    VideoProvider::ALL.into_iter().find(|p| {
        p.hosts()
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    })
}
