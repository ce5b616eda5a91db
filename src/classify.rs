use crate::video::{self, VideoInfo, VideoProvider};

pub const DEFAULT_FILE_EXTENSIONS: [&str; 7] = ["pdf", "doc", "docx", "xls", "xlsx", "zip", "rar"];

/// What a markdown link target points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Video {
        provider: VideoProvider,
        id: Option<String>,
    },
    File,
    Link,
}

/// One heuristic in the classifier chain. Returning `None` defers to the
/// next rule.
pub trait LinkRule {
    fn classify(&self, url: &str) -> Option<LinkKind>;
}

/// Matches provider url patterns that carry a video id.
pub struct VideoPatternRule;

impl LinkRule for VideoPatternRule {
    fn classify(&self, url: &str) -> Option<LinkKind> {
        video::parse_video_url(url).map(|VideoInfo { provider, id, .. }| LinkKind::Video {
            provider,
            id: Some(id),
        })
    }
}

/// Falls back to the provider host when the id pattern does not match.
pub struct VideoHostRule;

impl LinkRule for VideoHostRule {
    fn classify(&self, url: &str) -> Option<LinkKind> {
        video::provider_for_host(url).map(|provider| LinkKind::Video { provider, id: None })
    }
}

pub struct FileExtensionRule {
    extensions: Vec<String>,
}

impl FileExtensionRule {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

impl LinkRule for FileExtensionRule {
    fn classify(&self, url: &str) -> Option<LinkKind> {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        let path = url[..end].to_ascii_lowercase();
        let (_, ext) = path.rsplit_once('.')?;
        if ext.contains('/') {
            return None;
        }
        self.extensions
            .iter()
            .any(|e| e == ext)
            .then_some(LinkKind::File)
    }
}

/// Ordered rule chain; the first rule with an answer wins, otherwise the
/// target is a plain link.
pub struct Classifier {
    rules: Vec<Box<dyn LinkRule>>,
}

impl Classifier {
    pub fn new(rules: Vec<Box<dyn LinkRule>>) -> Self {
        Self { rules }
    }

    pub fn with_file_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(vec![
            Box::new(VideoPatternRule),
            Box::new(VideoHostRule),
            Box::new(FileExtensionRule::new(extensions)),
        ])
    }

    pub fn classify(&self, url: &str) -> LinkKind {
        self.rules
            .iter()
            .find_map(|r| r.classify(url))
            .unwrap_or(LinkKind::Link)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_file_extensions(DEFAULT_FILE_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_orders_video_before_file() {
        let c = Classifier::default();
        assert_eq!(
            c.classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            LinkKind::Video {
                provider: VideoProvider::YouTube,
                id: Some("dQw4w9WgXcQ".into())
            }
        );
        assert_eq!(c.classify("report.pdf"), LinkKind::File);
        assert_eq!(c.classify("/uploads/Sheet.XLSX?v=2"), LinkKind::File);
        assert_eq!(c.classify("https://example.com"), LinkKind::Link);
        assert_eq!(c.classify("https://example.com/notes.txt"), LinkKind::Link);
    }

    #[test]
    fn host_rule_catches_unparseable_provider_urls() {
        let c = Classifier::default();
        assert_eq!(
            c.classify("https://youtube.com/watch?v=test123"),
            LinkKind::Video {
                provider: VideoProvider::YouTube,
                id: None
            }
        );
    }

    #[test]
    fn host_rule_ignores_provider_names_outside_the_host() {
        let c = Classifier::default();
        assert_eq!(
            c.classify("https://example.com/youtube.com-transcript.pdf"),
            LinkKind::File
        );
        assert_eq!(
            c.classify("https://example.com/share?src=youtube.com"),
            LinkKind::Link
        );
        assert_eq!(c.classify("https://notvimeo.com/page"), LinkKind::Link);
        assert_eq!(
            c.classify("https://player.vimeo.com/channels/staff"),
            LinkKind::Video {
                provider: VideoProvider::Vimeo,
                id: None
            }
        );
    }

    #[test]
    fn dotted_directory_is_not_an_extension() {
        let rule = FileExtensionRule::new(["pdf"]);
        assert_eq!(rule.classify("https://cdn.pdf/readme"), None);
    }

    #[test]
    fn custom_extensions_replace_defaults() {
        let c = Classifier::with_file_extensions([".PPTX"]);
        assert_eq!(c.classify("slides.pptx"), LinkKind::File);
        assert_eq!(c.classify("report.pdf"), LinkKind::Link);
    }
}
