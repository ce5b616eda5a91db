use crate::materials::{ContentAssets, EmbeddedImage, LegacyMaterials};
use crate::topic::{ContentState, LegacySource, Topic};
use anyhow::Context;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE: &str = "topics.sqlite3";

const TOPIC_COLUMNS: &str = "rowid, id, unit_id, title, description, learning_materials, embedded_images,
    estimated_minutes, required, learning_content, content_assets, migrated_to_unified,
    created_at, updated_at";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            learning_materials TEXT,
            embedded_images TEXT,
            estimated_minutes INTEGER NOT NULL DEFAULT 30,
            required INTEGER NOT NULL DEFAULT 1,
            learning_content TEXT,
            content_assets TEXT,
            migrated_to_unified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_unit ON topics(unit_id)",
        [],
    )?;

    // Workspaces created before unified content have only the legacy columns.
    ensure_topics_embedded_images(conn)?;
    ensure_topics_unified_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_migrated ON topics(migrated_to_unified)",
        [],
    )?;
    Ok(())
}

fn ensure_topics_embedded_images(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "topics", "embedded_images")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE topics ADD COLUMN embedded_images TEXT", [])?;
    Ok(())
}

fn ensure_topics_unified_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "topics", "learning_content")? {
        conn.execute("ALTER TABLE topics ADD COLUMN learning_content TEXT", [])?;
    }
    if !table_has_column(conn, "topics", "content_assets")? {
        conn.execute("ALTER TABLE topics ADD COLUMN content_assets TEXT", [])?;
    }
    if !table_has_column(conn, "topics", "migrated_to_unified")? {
        conn.execute(
            "ALTER TABLE topics ADD COLUMN migrated_to_unified INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

/// Undecoded topic row. JSON columns are decoded separately so a single
/// malformed row can be reported without failing the whole query.
#[derive(Debug, Clone)]
pub struct TopicRow {
    pub rowid: i64,
    pub id: String,
    pub unit_id: String,
    pub title: String,
    pub description: Option<String>,
    pub learning_materials: Option<String>,
    pub embedded_images: Option<String>,
    pub estimated_minutes: i64,
    pub required: bool,
    pub learning_content: Option<String>,
    pub content_assets: Option<String>,
    pub migrated_to_unified: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

fn topic_row(r: &Row<'_>) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        rowid: r.get(0)?,
        id: r.get(1)?,
        unit_id: r.get(2)?,
        title: r.get(3)?,
        description: r.get(4)?,
        learning_materials: r.get(5)?,
        embedded_images: r.get(6)?,
        estimated_minutes: r.get(7)?,
        required: r.get::<_, i64>(8)? != 0,
        learning_content: r.get(9)?,
        content_assets: r.get(10)?,
        migrated_to_unified: r.get::<_, i64>(11)? != 0,
        created_at: r.get(12)?,
        updated_at: r.get(13)?,
    })
}

// Older writers stored an empty category map as `[]`; treat it like NULL.
fn blank_json(raw: &str) -> bool {
    matches!(raw.trim(), "" | "null" | "[]" | "{}")
}

impl TopicRow {
    pub fn into_topic(self) -> anyhow::Result<Topic> {
        let learning_materials = match self.learning_materials.as_deref() {
            Some(raw) if !blank_json(raw) => {
                let m: LegacyMaterials = serde_json::from_str(raw)
                    .with_context(|| format!("topic {}: invalid learning_materials", self.id))?;
                (!m.is_empty()).then_some(m)
            }
            _ => None,
        };
        let embedded_images: Vec<EmbeddedImage> = match self.embedded_images.as_deref() {
            Some(raw) if !blank_json(raw) => serde_json::from_str(raw)
                .with_context(|| format!("topic {}: invalid embedded_images", self.id))?,
            _ => Vec::new(),
        };
        let state = if self.migrated_to_unified {
            let content_assets: ContentAssets = match self.content_assets.as_deref() {
                Some(raw) if !blank_json(raw) => serde_json::from_str(raw)
                    .with_context(|| format!("topic {}: invalid content_assets", self.id))?,
                _ => ContentAssets::default(),
            };
            ContentState::Migrated {
                learning_content: self.learning_content.unwrap_or_default(),
                content_assets,
            }
        } else {
            ContentState::NotMigrated
        };
        Ok(Topic {
            id: self.id,
            unit_id: self.unit_id,
            title: self.title,
            estimated_minutes: self.estimated_minutes,
            required: self.required,
            legacy: LegacySource {
                description: self.description,
                learning_materials,
                embedded_images,
            },
            state,
            created_at: self.created_at.unwrap_or_default(),
            updated_at: self.updated_at.unwrap_or_default(),
        })
    }
}

fn materials_json(topic: &Topic) -> Result<Option<String>, serde_json::Error> {
    topic
        .legacy
        .learning_materials
        .as_ref()
        .filter(|m| !m.is_empty())
        .map(serde_json::to_string)
        .transpose()
}

fn images_json(topic: &Topic) -> Result<Option<String>, serde_json::Error> {
    if topic.legacy.embedded_images.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(&topic.legacy.embedded_images).map(Some)
}

fn to_sql_err(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

pub fn insert_topic(conn: &Connection, topic: &Topic) -> rusqlite::Result<()> {
    let (learning_content, content_assets) = match &topic.state {
        ContentState::Migrated {
            learning_content,
            content_assets,
        } => (
            Some(learning_content.clone()),
            Some(serde_json::to_string(content_assets).map_err(to_sql_err)?),
        ),
        ContentState::NotMigrated => (None, None),
    };
    conn.execute(
        "INSERT INTO topics(
            id, unit_id, title, description, learning_materials, embedded_images,
            estimated_minutes, required, learning_content, content_assets, migrated_to_unified,
            created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            topic.id,
            topic.unit_id,
            topic.title,
            topic.legacy.description,
            materials_json(topic).map_err(to_sql_err)?,
            images_json(topic).map_err(to_sql_err)?,
            topic.estimated_minutes,
            if topic.required { 1 } else { 0 },
            learning_content,
            content_assets,
            if topic.is_unified() { 1 } else { 0 },
            topic.created_at,
            topic.updated_at,
        ],
    )?;
    Ok(())
}

/// Writes title, scheduling fields and the legacy source.
pub fn save_topic_legacy(conn: &Connection, topic: &Topic) -> rusqlite::Result<()> {
    let n = conn.execute(
        "UPDATE topics
         SET unit_id = ?, title = ?, description = ?, learning_materials = ?, embedded_images = ?,
             estimated_minutes = ?, required = ?, updated_at = ?
         WHERE id = ?",
        params![
            topic.unit_id,
            topic.title,
            topic.legacy.description,
            materials_json(topic).map_err(to_sql_err)?,
            images_json(topic).map_err(to_sql_err)?,
            topic.estimated_minutes,
            if topic.required { 1 } else { 0 },
            topic.updated_at,
            topic.id,
        ],
    )?;
    if n == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

/// Writes the unified fields and the migration flag together.
pub fn save_topic_content(conn: &Connection, topic: &Topic) -> rusqlite::Result<()> {
    let (learning_content, content_assets, migrated) = match &topic.state {
        ContentState::Migrated {
            learning_content,
            content_assets,
        } => (
            Some(learning_content.as_str()),
            Some(serde_json::to_string(content_assets).map_err(to_sql_err)?),
            1,
        ),
        ContentState::NotMigrated => (None, None, 0),
    };
    let n = conn.execute(
        "UPDATE topics
         SET learning_content = ?, content_assets = ?, migrated_to_unified = ?, updated_at = ?
         WHERE id = ?",
        params![learning_content, content_assets, migrated, topic.updated_at, topic.id],
    )?;
    if n == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

pub fn delete_topic(conn: &Connection, topic_id: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM topics WHERE id = ?", [topic_id])?;
    Ok(n > 0)
}

pub fn load_topic(conn: &Connection, topic_id: &str) -> anyhow::Result<Option<Topic>> {
    let sql = format!("SELECT {} FROM topics WHERE id = ?", TOPIC_COLUMNS);
    let row = conn.query_row(&sql, [topic_id], topic_row).optional()?;
    row.map(TopicRow::into_topic).transpose()
}

#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    pub unit_id: Option<String>,
    pub migrated: Option<bool>,
}

/// Topics ordered required-first, then by title.
pub fn list_topics(conn: &Connection, filter: &TopicFilter) -> anyhow::Result<Vec<Topic>> {
    let mut where_parts: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(unit_id) = &filter.unit_id {
        where_parts.push("unit_id = ?");
        binds.push(Value::Text(unit_id.clone()));
    }
    if let Some(migrated) = filter.migrated {
        where_parts.push("migrated_to_unified = ?");
        binds.push(Value::Integer(if migrated { 1 } else { 0 }));
    }
    let where_sql = if where_parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_parts.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM topics {} ORDER BY required DESC, title ASC",
        TOPIC_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), topic_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TopicRow::into_topic).collect()
}

pub fn count_topics(conn: &Connection, only_not_migrated: bool) -> rusqlite::Result<i64> {
    let sql = if only_not_migrated {
        "SELECT COUNT(*) FROM topics WHERE migrated_to_unified = 0"
    } else {
        "SELECT COUNT(*) FROM topics"
    };
    conn.query_row(sql, [], |r| r.get(0))
}

/// Next chunk of topics by `rowid`, strictly after `after_rowid`. Keyset
/// paging stays correct while earlier rows are being migrated.
pub fn topic_rows_after(
    conn: &Connection,
    after_rowid: i64,
    limit: usize,
    only_not_migrated: bool,
) -> rusqlite::Result<Vec<TopicRow>> {
    let filter = if only_not_migrated {
        "AND migrated_to_unified = 0"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {} FROM topics WHERE rowid > ? {} ORDER BY rowid LIMIT ?",
        TOPIC_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![after_rowid, limit as i64], topic_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_table_gains_unified_columns() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE topics(
                id TEXT PRIMARY KEY,
                unit_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                learning_materials TEXT,
                estimated_minutes INTEGER NOT NULL DEFAULT 30,
                required INTEGER NOT NULL DEFAULT 1,
                created_at TEXT,
                updated_at TEXT
            )",
            [],
        )
        .expect("legacy table");
        conn.execute(
            "INSERT INTO topics(id, unit_id, title, description, learning_materials)
             VALUES('t1', 'u1', 'Old', 'Old description', '[]')",
            [],
        )
        .expect("legacy row");

        init_schema(&conn).expect("upgrade");
        for col in ["embedded_images", "learning_content", "content_assets", "migrated_to_unified"] {
            assert!(table_has_column(&conn, "topics", col).expect("pragma"), "{}", col);
        }
        let t = load_topic(&conn, "t1").expect("load").expect("exists");
        assert!(!t.is_unified());
        assert_eq!(t.legacy.learning_materials, None);
        assert_eq!(t.legacy.description.as_deref(), Some("Old description"));
    }

    #[test]
    fn settings_round_trip() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert_eq!(settings_get_json(&conn, "setup.content").expect("get"), None);
        settings_set_json(&conn, "setup.content", &json!({ "batchSize": 10 })).expect("set");
        settings_set_json(&conn, "setup.content", &json!({ "batchSize": 20 })).expect("set");
        assert_eq!(
            settings_get_json(&conn, "setup.content").expect("get"),
            Some(json!({ "batchSize": 20 }))
        );
    }

    #[test]
    fn keyset_paging_visits_each_row_once() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        for i in 0..5 {
            insert_topic(&conn, &Topic::new("u", format!("T{}", i))).expect("insert");
        }
        let mut seen = Vec::new();
        let mut after = 0;
        loop {
            let chunk = topic_rows_after(&conn, after, 2, true).expect("chunk");
            let Some(last) = chunk.last() else { break };
            after = last.rowid;
            seen.extend(chunk.into_iter().map(|r| r.title));
        }
        assert_eq!(seen, vec!["T0", "T1", "T2", "T3", "T4"]);
    }

    #[test]
    fn list_orders_required_first_then_title() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        let mut optional = Topic::new("u", "Alpha");
        optional.required = false;
        insert_topic(&conn, &optional).expect("insert");
        insert_topic(&conn, &Topic::new("u", "Zeta")).expect("insert");
        insert_topic(&conn, &Topic::new("u", "Beta")).expect("insert");
        insert_topic(&conn, &Topic::new("other", "Gamma")).expect("insert");

        let titles: Vec<String> = list_topics(
            &conn,
            &TopicFilter {
                unit_id: Some("u".into()),
                migrated: None,
            },
        )
        .expect("list")
        .into_iter()
        .map(|t| t.title)
        .collect();
        assert_eq!(titles, vec!["Beta", "Zeta", "Alpha"]);
    }
}
