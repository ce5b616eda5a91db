use crate::classify::Classifier;
use crate::convert;
use crate::db;
use crate::error::{ContentError, Result};
use crate::materials::{ContentAssets, EmbeddedImage, LegacyMaterials, MaterialKind};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use tracing::{error, info};

pub const DEFAULT_ESTIMATED_MINUTES: i64 = 30;
pub const MAX_ESTIMATED_MINUTES: i64 = 480;

/// Pre-migration content. Kept on the record after migration as read-only
/// input for forced re-validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacySource {
    pub description: Option<String>,
    pub learning_materials: Option<LegacyMaterials>,
    pub embedded_images: Vec<EmbeddedImage>,
}

impl LegacySource {
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn has_materials(&self) -> bool {
        self.learning_materials
            .as_ref()
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentState {
    NotMigrated,
    Migrated {
        learning_content: String,
        content_assets: ContentAssets,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: String,
    pub unit_id: String,
    pub title: String,
    pub estimated_minutes: i64,
    pub required: bool,
    pub legacy: LegacySource,
    pub state: ContentState,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub referenced: usize,
    pub orphaned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub word_count: usize,
    pub character_count: usize,
    pub reading_time: u64,
}

impl ContentMetadata {
    pub fn reading_time_label(&self) -> String {
        match self.reading_time {
            0 => "Less than 1 minute".to_string(),
            1 => "1 minute".to_string(),
            n => format!("{} minutes", n),
        }
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn validate_estimated_minutes(minutes: i64) -> bool {
    minutes > 0 && minutes <= MAX_ESTIMATED_MINUTES
}

impl Topic {
    pub fn new(unit_id: impl Into<String>, title: impl Into<String>) -> Self {
        let ts = now_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            unit_id: unit_id.into(),
            title: title.into(),
            estimated_minutes: DEFAULT_ESTIMATED_MINUTES,
            required: true,
            legacy: LegacySource::default(),
            state: ContentState::NotMigrated,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    pub fn is_unified(&self) -> bool {
        matches!(self.state, ContentState::Migrated { .. })
    }

    /// Legacy source rendered as markdown, regardless of migration state.
    pub fn convert_legacy(&self) -> String {
        convert::convert_to_markdown(
            self.legacy.description.as_deref(),
            self.legacy.learning_materials.as_ref(),
        )
    }

    pub fn extract_assets(&self, uploaded_at: &str) -> ContentAssets {
        convert::extract_assets(
            self.legacy.learning_materials.as_ref(),
            &self.legacy.embedded_images,
            uploaded_at,
        )
    }

    /// Stored markdown once migrated; converted on the fly before that.
    pub fn unified_content(&self) -> Cow<'_, str> {
        match &self.state {
            ContentState::Migrated {
                learning_content, ..
            } => Cow::Borrowed(learning_content.as_str()),
            ContentState::NotMigrated => Cow::Owned(self.convert_legacy()),
        }
    }

    /// Legacy view of the topic. Before migration this is the stored value
    /// untouched; afterwards it is reconstructed from the markdown.
    pub fn legacy_materials(&self, classifier: &Classifier) -> LegacyMaterials {
        match &self.state {
            ContentState::Migrated {
                learning_content, ..
            } => convert::extract_legacy(learning_content, classifier),
            ContentState::NotMigrated => self.legacy.learning_materials.clone().unwrap_or_default(),
        }
    }

    pub fn content_assets(&self) -> Cow<'_, ContentAssets> {
        match &self.state {
            ContentState::Migrated { content_assets, .. } => Cow::Borrowed(content_assets),
            ContentState::NotMigrated => Cow::Owned(ContentAssets::default()),
        }
    }

    pub fn has_content_assets(&self) -> bool {
        !self.content_assets().is_empty()
    }

    pub fn has_learning_materials(&self) -> bool {
        self.legacy.has_materials()
    }

    pub fn learning_materials_count(&self) -> usize {
        self.legacy
            .learning_materials
            .as_ref()
            .map(LegacyMaterials::count)
            .unwrap_or(0)
    }

    /// Appends a legacy material. Returns the new category length.
    pub fn add_material(&mut self, kind: MaterialKind, entry: Value) -> Result<usize> {
        if self.is_unified() {
            return Err(ContentError::ReadOnly);
        }
        let materials = self.legacy.learning_materials.get_or_insert_with(Default::default);
        materials.push(kind, entry)?;
        let len = materials.len_of(kind);
        self.updated_at = now_rfc3339();
        Ok(len)
    }

    /// Removes a legacy material by index. Returns the remaining category length.
    pub fn remove_material(&mut self, kind: MaterialKind, index: usize) -> Result<usize> {
        if self.is_unified() {
            return Err(ContentError::ReadOnly);
        }
        let Some(materials) = self.legacy.learning_materials.as_mut() else {
            return Err(ContentError::MaterialIndex {
                kind: kind.as_str(),
                index,
            });
        };
        if !materials.remove(kind, index) {
            return Err(ContentError::MaterialIndex {
                kind: kind.as_str(),
                index,
            });
        }
        let len = materials.len_of(kind);
        if materials.is_empty() {
            self.legacy.learning_materials = None;
        }
        self.updated_at = now_rfc3339();
        Ok(len)
    }

    /// Moves the topic to the migrated state. Returns false when it already was.
    pub fn apply_migration(&mut self, now: &str) -> bool {
        if self.is_unified() {
            return false;
        }
        self.state = ContentState::Migrated {
            learning_content: self.convert_legacy(),
            content_assets: self.extract_assets(now),
        };
        self.updated_at = now.to_string();
        true
    }

    /// Replaces the unified markdown (manual edit). Keeps the manifest unless
    /// a replacement is given.
    pub fn set_learning_content(
        &mut self,
        content: String,
        assets: Option<ContentAssets>,
    ) -> Result<()> {
        let ContentState::Migrated {
            learning_content,
            content_assets,
        } = &mut self.state
        else {
            return Err(ContentError::NotMigrated);
        };
        *learning_content = content;
        if let Some(a) = assets {
            *content_assets = a;
        }
        self.updated_at = now_rfc3339();
        Ok(())
    }

    /// Recomputes `referenced_in_content` for every tracked asset. Unreferenced
    /// assets are flagged `orphaned`; the flag is never cleared here.
    pub fn reconcile_assets(&mut self) -> Result<ReconcileSummary> {
        let ContentState::Migrated {
            learning_content,
            content_assets,
        } = &mut self.state
        else {
            return Err(ContentError::NotMigrated);
        };
        let targets = convert::link_targets(learning_content);
        let mut summary = ReconcileSummary {
            referenced: 0,
            orphaned: 0,
        };
        for asset in content_assets
            .files
            .iter_mut()
            .chain(content_assets.images.iter_mut())
        {
            asset.referenced_in_content =
                targets.contains(&asset.path) || targets.contains(&asset.filename);
            if asset.referenced_in_content {
                summary.referenced += 1;
            } else {
                asset.orphaned = Some(true);
                summary.orphaned += 1;
            }
        }
        self.updated_at = now_rfc3339();
        Ok(summary)
    }

    pub fn estimated_duration(&self) -> String {
        let m = self.estimated_minutes;
        if m < 60 {
            return format!("{} min", m);
        }
        let (hours, minutes) = (m / 60, m % 60);
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }

    pub fn metadata(&self, words_per_minute: u64) -> ContentMetadata {
        let content = self.unified_content();
        let word_count = content.split_whitespace().count();
        let wpm = words_per_minute.max(1);
        ContentMetadata {
            word_count,
            character_count: content.chars().count(),
            reading_time: (word_count as u64).div_ceil(wpm),
        }
    }

    pub fn summary_json(&self) -> Value {
        json!({
            "id": self.id,
            "unitId": self.unit_id,
            "title": self.title,
            "estimatedMinutes": self.estimated_minutes,
            "estimatedDuration": self.estimated_duration(),
            "required": self.required,
            "migratedToUnified": self.is_unified(),
            "updatedAt": self.updated_at,
        })
    }

    pub fn to_json(&self, words_per_minute: u64) -> Value {
        let meta = self.metadata(words_per_minute);
        let (learning_content, content_assets) = match &self.state {
            ContentState::Migrated {
                learning_content,
                content_assets,
            } => (json!(learning_content), json!(content_assets)),
            ContentState::NotMigrated => (Value::Null, Value::Null),
        };
        json!({
            "id": self.id,
            "unitId": self.unit_id,
            "title": self.title,
            "description": self.legacy.description,
            "learningMaterials": self.legacy.learning_materials,
            "embeddedImages": self.legacy.embedded_images,
            "estimatedMinutes": self.estimated_minutes,
            "estimatedDuration": self.estimated_duration(),
            "required": self.required,
            "learningContent": learning_content,
            "contentAssets": content_assets,
            "migratedToUnified": self.is_unified(),
            "isUnified": self.is_unified(),
            "hasContentAssets": self.has_content_assets(),
            "hasLearningMaterials": self.has_learning_materials(),
            "learningMaterialsCount": self.learning_materials_count(),
            "wordCount": meta.word_count,
            "characterCount": meta.character_count,
            "readingTime": meta.reading_time_label(),
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

/// Converts and persists a topic in one transaction. Already-migrated
/// topics succeed without writing. On failure nothing is committed and the
/// in-memory topic is left as it was.
pub fn migrate(conn: &Connection, topic: &mut Topic) -> bool {
    match try_migrate(conn, topic) {
        Ok(changed) => {
            if changed {
                info!(topic_id = %topic.id, "topic migrated to unified content");
            }
            true
        }
        Err(e) => {
            error!(topic_id = %topic.id, error = %e, "topic migration failed");
            false
        }
    }
}

pub fn try_migrate(conn: &Connection, topic: &mut Topic) -> Result<bool> {
    let mut next = topic.clone();
    if !next.apply_migration(&now_rfc3339()) {
        return Ok(false);
    }
    save_content(conn, &next)?;
    *topic = next;
    Ok(true)
}

/// Reconciles the manifest against the stored markdown and persists it.
pub fn reconcile(conn: &Connection, topic: &mut Topic) -> Result<ReconcileSummary> {
    let mut next = topic.clone();
    let summary = next.reconcile_assets()?;
    save_content(conn, &next)?;
    *topic = next;
    Ok(summary)
}

/// Manual edit of the unified markdown, persisted.
pub fn update_content(
    conn: &Connection,
    topic: &mut Topic,
    content: String,
    assets: Option<ContentAssets>,
) -> Result<()> {
    let mut next = topic.clone();
    next.set_learning_content(content, assets)?;
    save_content(conn, &next)?;
    *topic = next;
    Ok(())
}

fn save_content(conn: &Connection, topic: &Topic) -> Result<()> {
    let persist = |source| ContentError::Persist {
        topic_id: topic.id.clone(),
        source,
    };
    let tx = conn.unchecked_transaction().map_err(persist)?;
    db::save_topic_content(&tx, topic).map_err(persist)?;
    tx.commit().map_err(persist)
}
