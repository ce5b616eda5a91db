use crate::classify::{Classifier, LinkKind};
use crate::materials::{
    basename, AssetRecord, ContentAssets, EmbeddedImage, FileMaterial, LegacyMaterials,
    LinkMaterial, VideoMaterial,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const VIDEO_SECTION: &str = "## Video Resources";
pub const LINK_SECTION: &str = "## Additional Resources";
pub const FILE_SECTION: &str = "## Downloads";

// Also matches image syntax `![alt](src)`: the leading `!` is outside the match.
static MD_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("markdown link pattern"));

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// Renders legacy description and materials as one markdown document.
///
/// Sections appear in fixed order (description, videos, links, files) and are
/// separated by a blank line. Entries without a url/path are dropped and a
/// section whose entries were all dropped is omitted.
pub fn convert_to_markdown(description: Option<&str>, materials: Option<&LegacyMaterials>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(d) = non_empty(description) {
        sections.push(d.to_string());
    }

    if let Some(m) = materials {
        let videos: Vec<String> = m
            .videos
            .iter()
            .filter_map(|v| {
                let url = non_empty(v.url.as_deref())?;
                let title = non_empty(v.title.as_deref()).unwrap_or("Video");
                Some(format!("[{}]({})", title, url))
            })
            .collect();
        if !videos.is_empty() {
            sections.push(format!("{}\n\n{}", VIDEO_SECTION, videos.join("\n")));
        }

        let links: Vec<String> = m
            .links
            .iter()
            .filter_map(|l| {
                let url = non_empty(l.url.as_deref())?;
                let title = non_empty(l.title.as_deref()).unwrap_or("Resource");
                Some(match non_empty(l.description.as_deref()) {
                    Some(d) => format!("- [{}]({}) - {}", title, url, d),
                    None => format!("- [{}]({})", title, url),
                })
            })
            .collect();
        if !links.is_empty() {
            sections.push(format!("{}\n\n{}", LINK_SECTION, links.join("\n")));
        }

        let files: Vec<String> = m
            .files
            .iter()
            .filter_map(|f| {
                let path = non_empty(f.path.as_deref())?;
                let title = non_empty(f.title.as_deref())
                    .or_else(|| non_empty(f.name.as_deref()))
                    .unwrap_or("File");
                Some(match non_empty(f.description.as_deref()) {
                    Some(d) => format!("- [{}]({}) - {}", title, path, d),
                    None => format!("- [{}]({})", title, path),
                })
            })
            .collect();
        if !files.is_empty() {
            sections.push(format!("{}\n\n{}", FILE_SECTION, files.join("\n")));
        }
    }

    sections.join("\n\n")
}

/// Builds the asset manifest for a freshly converted topic. Every record is
/// marked as referenced; `reconcile` is what checks that against content.
pub fn extract_assets(
    materials: Option<&LegacyMaterials>,
    images: &[EmbeddedImage],
    uploaded_at: &str,
) -> ContentAssets {
    let files = materials
        .map(|m| m.files.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|f| {
            let path = non_empty(f.path.as_deref())?;
            let filename = basename(path);
            Some(AssetRecord {
                original_name: Some(
                    non_empty(f.name.as_deref())
                        .map(str::to_string)
                        .unwrap_or_else(|| filename.clone()),
                ),
                filename,
                path: path.to_string(),
                size: f.size,
                mime_type: f.mime_type.clone(),
                uploaded_at: Some(uploaded_at.to_string()),
                referenced_in_content: true,
                orphaned: None,
            })
        })
        .collect();

    let images = images
        .iter()
        .filter_map(|img| {
            let path = non_empty(img.path.as_deref())?;
            Some(AssetRecord {
                filename: basename(path),
                original_name: None,
                path: path.to_string(),
                size: img.size,
                mime_type: None,
                uploaded_at: Some(uploaded_at.to_string()),
                referenced_in_content: true,
                orphaned: None,
            })
        })
        .collect();

    ContentAssets { images, files }
}

/// Best-effort inverse of [`convert_to_markdown`]: every `[text](url)` in the
/// document becomes a video, file or link entry. Link descriptions and
/// section placement are not recovered.
pub fn extract_legacy(markdown: &str, classifier: &Classifier) -> LegacyMaterials {
    let mut out = LegacyMaterials::default();
    for c in MD_LINK_RE.captures_iter(markdown) {
        let title = c[1].to_string();
        let url = c[2].trim().to_string();
        match classifier.classify(&url) {
            LinkKind::Video { provider, id } => {
                let mut extra = Map::new();
                extra.insert("type".into(), Value::String(provider.as_str().to_string()));
                if let Some(id) = id {
                    extra.insert("id".into(), Value::String(id));
                }
                out.videos.push(VideoMaterial {
                    title: Some(title),
                    url: Some(url),
                    extra,
                });
            }
            LinkKind::File => out.files.push(FileMaterial {
                title: Some(title),
                name: Some(basename(&url)),
                path: Some(url),
                ..Default::default()
            }),
            LinkKind::Link => out.links.push(LinkMaterial {
                title: Some(title),
                url: Some(url),
                ..Default::default()
            }),
        }
    }
    out
}

/// All link and image targets currently present in `markdown`.
pub fn link_targets(markdown: &str) -> HashSet<String> {
    MD_LINK_RE
        .captures_iter(markdown)
        .map(|c| c[2].trim().to_string())
        .collect()
}

/// Number of absolute http(s) link targets; used as the video-preservation
/// check after conversion.
pub fn http_link_count(markdown: &str) -> usize {
    markdown.matches("](http").count()
}
