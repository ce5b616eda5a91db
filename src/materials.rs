use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Legacy material categories, in the order they render into markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Videos,
    Links,
    Files,
}

impl MaterialKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "videos" | "video" => Some(Self::Videos),
            "links" | "link" => Some(Self::Links),
            "files" | "file" => Some(Self::Files),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Videos => "videos",
            Self::Links => "links",
            Self::Files => "files",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider details stored alongside the video (type, id, thumbnail).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Categorized legacy resources. A category that is present when serialized
/// always holds at least one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyMaterials {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<VideoMaterial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkMaterial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileMaterial>,
}

impl LegacyMaterials {
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.links.is_empty() && self.files.is_empty()
    }

    pub fn count(&self) -> usize {
        self.videos.len() + self.links.len() + self.files.len()
    }

    pub fn len_of(&self, kind: MaterialKind) -> usize {
        match kind {
            MaterialKind::Videos => self.videos.len(),
            MaterialKind::Links => self.links.len(),
            MaterialKind::Files => self.files.len(),
        }
    }

    /// Appends one entry decoded from `entry` to the given category.
    pub fn push(&mut self, kind: MaterialKind, entry: Value) -> Result<(), serde_json::Error> {
        match kind {
            MaterialKind::Videos => self.videos.push(serde_json::from_value(entry)?),
            MaterialKind::Links => self.links.push(serde_json::from_value(entry)?),
            MaterialKind::Files => self.files.push(serde_json::from_value(entry)?),
        }
        Ok(())
    }

    /// Removes the entry at `index`; later entries shift down. Returns false
    /// when the category has no such entry.
    pub fn remove(&mut self, kind: MaterialKind, index: usize) -> bool {
        fn take<T>(v: &mut Vec<T>, index: usize) -> bool {
            if index >= v.len() {
                return false;
            }
            v.remove(index);
            true
        }
        match kind {
            MaterialKind::Videos => take(&mut self.videos, index),
            MaterialKind::Links => take(&mut self.links, index),
            MaterialKind::Files => take(&mut self.files, index),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// One tracked file or image referenced by unified content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(default)]
    pub referenced_in_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAssets {
    #[serde(default)]
    pub images: Vec<AssetRecord>,
    #[serde(default)]
    pub files: Vec<AssetRecord>,
}

impl ContentAssets {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.files.is_empty()
    }
}

/// Final path segment, ignoring any query string or fragment.
pub fn basename(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
