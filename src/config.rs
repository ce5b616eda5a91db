use crate::classify::{Classifier, DEFAULT_FILE_EXTENSIONS};
use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const CONTENT_SECTION_KEY: &str = "setup.content";

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_WORDS_PER_MINUTE: u64 = 200;

/// Workspace settings that drive conversion, classification and batching.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSettings {
    pub file_extensions: Vec<String>,
    pub batch_size: usize,
    pub words_per_minute: u64,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            file_extensions: DEFAULT_FILE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }
}

impl ContentSettings {
    pub fn classifier(&self) -> Classifier {
        Classifier::with_file_extensions(&self.file_extensions)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "fileExtensions": self.file_extensions,
            "batchSize": self.batch_size,
            "wordsPerMinute": self.words_per_minute,
        })
    }

    /// Applies `patch` field by field. Unknown fields and out-of-range values
    /// are rejected; fields before the failing one stay applied.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "fileExtensions" => {
                    self.file_extensions = parse_extensions(v)?;
                }
                "batchSize" => {
                    self.batch_size = parse_i64_range(v, k, 1, 1000)? as usize;
                }
                "wordsPerMinute" => {
                    self.words_per_minute = parse_i64_range(v, k, 50, 1000)? as u64;
                }
                _ => return Err(format!("unknown content field: {}", k)),
            }
        }
        Ok(())
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_extensions(v: &Value) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or("fileExtensions must be array of strings")?;
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let ext = item
            .as_str()
            .ok_or("fileExtensions must be array of strings")?
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("invalid file extension: {}", ext));
        }
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    if out.is_empty() || out.len() > 16 {
        return Err("fileExtensions must contain 1..=16 entries".into());
    }
    Ok(out)
}

/// Defaults overlaid with whatever stored values still validate.
pub fn load_content_settings(conn: &Connection) -> anyhow::Result<ContentSettings> {
    let mut settings = ContentSettings::default();
    if let Some(saved) = db::settings_get_json(conn, CONTENT_SECTION_KEY)? {
        if let Some(obj) = saved.as_object() {
            for (k, v) in obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                // Best-effort: a stale field must not hide the valid ones.
                let _ = settings.merge_patch(&one);
            }
        }
    }
    Ok(settings)
}

pub fn save_content_settings(conn: &Connection, settings: &ContentSettings) -> anyhow::Result<()> {
    db::settings_set_json(conn, CONTENT_SECTION_KEY, &settings.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_validates_ranges_and_fields() {
        let mut s = ContentSettings::default();
        let ok = json!({ "batchSize": 10, "fileExtensions": [".PDF", "pptx", "pdf"] });
        s.merge_patch(ok.as_object().expect("object")).expect("merge");
        assert_eq!(s.batch_size, 10);
        assert_eq!(s.file_extensions, vec!["pdf", "pptx"]);

        let bad = json!({ "batchSize": 0 });
        assert!(s.merge_patch(bad.as_object().expect("object")).is_err());
        let unknown = json!({ "colour": "red" });
        assert!(s.merge_patch(unknown.as_object().expect("object")).is_err());
    }

    #[test]
    fn stored_values_apply_over_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        db::settings_set_json(
            &conn,
            CONTENT_SECTION_KEY,
            &json!({ "wordsPerMinute": 5, "batchSize": 25 }),
        )
        .expect("set");
        let s = load_content_settings(&conn).expect("load");
        assert_eq!(s.batch_size, 25);
        assert_eq!(s.words_per_minute, DEFAULT_WORDS_PER_MINUTE);
    }
}
