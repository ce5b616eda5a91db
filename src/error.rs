use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content conversion failed for topic {topic_id}: unified content is empty but source has content")]
    ContentLost { topic_id: String },
    #[error("failed to save topic {topic_id}: {source}")]
    Persist {
        topic_id: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("topic has not been migrated to unified content")]
    NotMigrated,
    #[error("legacy materials are read-only once a topic is migrated")]
    ReadOnly,
    #[error("no {kind} entry at index {index}")]
    MaterialIndex { kind: &'static str, index: usize },
    #[error("invalid material entry: {0}")]
    InvalidMaterials(#[from] serde_json::Error),
}

impl ContentError {
    /// IPC error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ContentLost { .. } => "migration_failed",
            Self::Persist { .. } => "db_update_failed",
            Self::NotMigrated => "not_migrated",
            Self::ReadOnly => "read_only",
            Self::MaterialIndex { .. } => "not_found",
            Self::InvalidMaterials(_) => "bad_params",
        }
    }
}

pub type Result<T> = std::result::Result<T, ContentError>;
