use crate::convert;
use crate::db;
use crate::error::ContentError;
use crate::materials::ContentAssets;
use crate::topic::{self, now_rfc3339, Topic};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub batch_size: usize,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    pub total: usize,
    pub processed: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub empty_content: usize,
    pub has_materials: usize,
    pub has_description: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationNote {
    pub topic_id: String,
    pub level: NoteLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub dry_run: bool,
    pub stats: MigrationStats,
    pub notes: Vec<MigrationNote>,
}

impl MigrationReport {
    fn note(&mut self, topic_id: &str, level: NoteLevel, message: String) {
        match level {
            NoteLevel::Warning => warn!(topic_id, "{}", message),
            NoteLevel::Error => error!(topic_id, "{}", message),
        }
        self.notes.push(MigrationNote {
            topic_id: topic_id.to_string(),
            level,
            message,
        });
    }
}

/// Checks a conversion result against its source. Content loss is fatal for
/// the topic; the returned strings are non-fatal warnings.
pub fn validate_migration(
    topic: &Topic,
    content: &str,
    assets: &ContentAssets,
) -> Result<Vec<String>, ContentError> {
    if content.is_empty() && (topic.legacy.has_description() || topic.legacy.has_materials()) {
        return Err(ContentError::ContentLost {
            topic_id: topic.id.clone(),
        });
    }

    let mut warnings = Vec::new();
    if let Some(m) = topic.legacy.learning_materials.as_ref() {
        if !m.videos.is_empty() && convert::http_link_count(content) < m.videos.len() {
            warnings.push(format!("Potential video link loss in topic {}", topic.id));
        }
        if !m.files.is_empty() && assets.files.len() != m.files.len() {
            warnings.push(format!(
                "File tracking mismatch in topic {}: {} original, {} tracked",
                topic.id,
                m.files.len(),
                assets.files.len()
            ));
        }
    }
    Ok(warnings)
}

/// Migrates every pending topic (every topic with `force`) in chunks of
/// `batch_size`. Per-topic failures are recorded in the report and never
/// abort the run.
pub fn run_batch(conn: &Connection, opts: &MigrationOptions) -> anyhow::Result<MigrationReport> {
    let mut report = MigrationReport {
        dry_run: opts.dry_run,
        ..Default::default()
    };
    let only_pending = !opts.force;
    report.stats.total = db::count_topics(conn, only_pending)? as usize;
    if report.stats.total == 0 {
        info!("no topics need migration");
        return Ok(report);
    }
    info!(
        total = report.stats.total,
        dry_run = opts.dry_run,
        batch_size = opts.batch_size,
        "starting unified content migration"
    );

    let batch_size = opts.batch_size.max(1);
    let mut after = 0_i64;
    loop {
        let rows = db::topic_rows_after(conn, after, batch_size, only_pending)?;
        let Some(last) = rows.last() else {
            break;
        };
        after = last.rowid;
        debug!(rows = rows.len(), after, "processing chunk");
        for row in rows {
            process_topic(conn, row, opts, &mut report);
        }
    }

    info!(
        processed = report.stats.processed,
        migrated = report.stats.migrated,
        errors = report.stats.errors,
        "migration run finished"
    );
    Ok(report)
}

fn process_topic(
    conn: &Connection,
    row: db::TopicRow,
    opts: &MigrationOptions,
    report: &mut MigrationReport,
) {
    report.stats.processed += 1;
    let topic_id = row.id.clone();
    let mut topic = match row.into_topic() {
        Ok(t) => t,
        Err(e) => {
            report.stats.errors += 1;
            report.note(
                &topic_id,
                NoteLevel::Error,
                format!("Error processing topic {}: {:#}", topic_id, e),
            );
            return;
        }
    };

    let has_description = topic.legacy.has_description();
    let has_materials = topic.legacy.has_materials();
    if has_description {
        report.stats.has_description += 1;
    }
    if has_materials {
        report.stats.has_materials += 1;
    }

    if topic.is_unified() && !opts.force {
        report.stats.skipped += 1;
        return;
    }
    if !has_description && !has_materials {
        report.stats.empty_content += 1;
        return;
    }

    let content = topic.convert_legacy();
    let assets = topic.extract_assets(&now_rfc3339());
    match validate_migration(&topic, &content, &assets) {
        Ok(warnings) => {
            for w in warnings {
                report.note(&topic.id, NoteLevel::Warning, w);
            }
        }
        Err(e) => {
            report.stats.errors += 1;
            report.note(&topic.id, NoteLevel::Error, e.to_string());
            return;
        }
    }

    if opts.dry_run {
        report.stats.migrated += 1;
        return;
    }

    match topic::try_migrate(conn, &mut topic) {
        Ok(_) => report.stats.migrated += 1,
        Err(e) => {
            report.stats.errors += 1;
            report.note(
                &topic.id,
                NoteLevel::Error,
                format!("Failed to migrate topic: {} (ID: {}): {}", topic.title, topic.id, e),
            );
        }
    }
}

/// Two-column summary table of the run.
pub fn render_table(report: &MigrationReport) -> String {
    let s = &report.stats;
    let rows: Vec<(&str, String)> = vec![
        ("Total Topics", s.total.to_string()),
        ("Processed", s.processed.to_string()),
        ("Successfully Migrated", s.migrated.to_string()),
        ("Skipped (Already Migrated)", s.skipped.to_string()),
        ("Empty Content (Skipped)", s.empty_content.to_string()),
        ("Errors", s.errors.to_string()),
        ("Had Description", s.has_description.to_string()),
        ("Had Learning Materials", s.has_materials.to_string()),
    ];
    let w0 = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0).max("Metric".len());
    let w1 = rows.iter().map(|(_, v)| v.len()).max().unwrap_or(0).max("Count".len());
    let rule = format!("+-{}-+-{}-+", "-".repeat(w0), "-".repeat(w1));

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(rule.clone());
    out.push(format!("| {:<w0$} | {:<w1$} |", "Metric", "Count"));
    out.push(rule.clone());
    for (k, v) in &rows {
        out.push(format!("| {:<w0$} | {:<w1$} |", k, v));
    }
    out.push(rule);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn insert(conn: &Connection, title: &str, description: Option<&str>, materials: serde_json::Value) -> Topic {
        let mut t = Topic::new("unit", title);
        t.legacy.description = description.map(str::to_string);
        t.legacy.learning_materials = serde_json::from_value(materials).expect("materials");
        db::insert_topic(conn, &t).expect("insert");
        t
    }

    fn opts(dry_run: bool, force: bool) -> MigrationOptions {
        MigrationOptions {
            dry_run,
            batch_size: 1,
            force,
        }
    }

    #[test]
    fn mixed_workspace_counts() {
        let conn = memory_db();
        insert(&conn, "Described", Some("Intro"), serde_json::Value::Null);
        insert(
            &conn,
            "Videos",
            None,
            json!({ "videos": [{ "title": "V", "url": "https://vimeo.com/123" }] }),
        );
        insert(&conn, "Empty", None, serde_json::Value::Null);

        let report = run_batch(&conn, &opts(false, false)).expect("run");
        assert_eq!(
            report.stats,
            MigrationStats {
                total: 3,
                processed: 3,
                migrated: 2,
                skipped: 0,
                errors: 0,
                empty_content: 1,
                has_materials: 1,
                has_description: 1,
            }
        );
        assert_eq!(db::count_topics(&conn, true).expect("count"), 1);

        let again = run_batch(&conn, &opts(false, false)).expect("rerun");
        assert_eq!(again.stats.total, 1);
        assert_eq!(again.stats.empty_content, 1);
    }

    #[test]
    fn dry_run_does_not_write() {
        let conn = memory_db();
        let t = insert(&conn, "Described", Some("Intro"), serde_json::Value::Null);
        let report = run_batch(&conn, &opts(true, false)).expect("run");
        assert!(report.dry_run);
        assert_eq!(report.stats.migrated, 1);
        let stored = db::load_topic(&conn, &t.id).expect("load").expect("exists");
        assert!(!stored.is_unified());
    }

    #[test]
    fn content_loss_is_an_error_for_that_topic_only() {
        let conn = memory_db();
        insert(&conn, "Broken", None, json!({ "videos": [{ "title": "no url" }] }));
        insert(&conn, "Fine", Some("ok"), serde_json::Value::Null);
        let report = run_batch(&conn, &opts(false, false)).expect("run");
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.migrated, 1);
        assert_eq!(report.notes.len(), 1);
        assert_eq!(report.notes[0].level, NoteLevel::Error);
    }

    #[test]
    fn malformed_row_is_isolated() {
        let conn = memory_db();
        let t = insert(&conn, "Bad JSON", Some("x"), serde_json::Value::Null);
        conn.execute(
            "UPDATE topics SET learning_materials = '{not json' WHERE id = ?",
            [&t.id],
        )
        .expect("corrupt");
        insert(&conn, "Good", Some("y"), serde_json::Value::Null);
        let report = run_batch(&conn, &opts(false, false)).expect("run");
        assert_eq!(report.stats.processed, 2);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.migrated, 1);
    }

    #[test]
    fn force_revisits_migrated_topics_without_rewriting() {
        let conn = memory_db();
        let mut t = insert(&conn, "Described", Some("Intro"), serde_json::Value::Null);
        assert!(topic::migrate(&conn, &mut t));
        let before = db::load_topic(&conn, &t.id).expect("load").expect("exists");

        let report = run_batch(&conn, &opts(false, true)).expect("run");
        assert_eq!(report.stats.total, 1);
        assert_eq!(report.stats.migrated, 1);
        let after = db::load_topic(&conn, &t.id).expect("load").expect("exists");
        assert_eq!(before, after);
    }

    #[test]
    fn warns_on_video_loss_and_file_mismatch() {
        let mut t = Topic::new("u", "t");
        t.legacy.learning_materials = serde_json::from_value(json!({
            "videos": [{ "title": "rel", "url": "/local/video.mp4" }],
            "files": [{ "title": "a", "path": "/a.pdf" }, { "title": "no path" }]
        }))
        .expect("materials");
        let content = t.convert_legacy();
        let assets = t.extract_assets("now");
        let warnings = validate_migration(&t, &content, &assets).expect("validate");
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Potential video link loss"));
        assert!(warnings[1].contains("2 original, 1 tracked"));
    }

    #[test]
    fn table_lists_every_metric() {
        let report = MigrationReport::default();
        let table = render_table(&report);
        assert!(table.contains("| Metric"));
        assert!(table.contains("Successfully Migrated"));
        assert!(table.contains("Had Learning Materials"));
        assert_eq!(table.lines().count(), 12);
    }
}
