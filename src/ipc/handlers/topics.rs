use crate::db::{self, TopicFilter};
use crate::ipc::error::{content_err, err, ok};
use crate::ipc::helpers::{
    content_settings, db_conn, decode, load_topic, parse_opt_bool, parse_opt_i64, required_str,
    required_text,
};
use crate::ipc::types::{AppState, Request};
use crate::materials::{ContentAssets, EmbeddedImage, LegacyMaterials, MaterialKind};
use crate::migrate::{self, MigrationOptions};
use crate::topic::{self, now_rfc3339, validate_estimated_minutes, Topic, MAX_ESTIMATED_MINUTES};
use serde_json::{json, Map, Value};

fn parse_estimated_minutes(req: &Request, v: &Value) -> Result<i64, Value> {
    v.as_i64()
        .filter(|m| validate_estimated_minutes(*m))
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("estimatedMinutes must be in 1..={}", MAX_ESTIMATED_MINUTES),
                None,
            )
        })
}

fn parse_materials(req: &Request, v: &Value) -> Result<Option<LegacyMaterials>, Value> {
    if v.is_null() {
        return Ok(None);
    }
    let m: LegacyMaterials = decode(req, "learningMaterials", v)?;
    Ok((!m.is_empty()).then_some(m))
}

fn parse_nullable_text(req: &Request, key: &str, v: &Value) -> Result<Option<String>, Value> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be string or null", key),
            None,
        )),
    }
}

fn handle_topics_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(input) = req.param("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "input must be an object", None);
    };
    let field_str = |key: &str| {
        input
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let Some(unit_id) = field_str("unitId") else {
        return err(&req.id, "bad_params", "missing input.unitId", None);
    };
    let Some(title) = field_str("title") else {
        return err(&req.id, "bad_params", "missing input.title", None);
    };

    let mut topic = Topic::new(unit_id, title);
    if let Some(v) = input.get("description") {
        topic.legacy.description = match parse_nullable_text(req, "description", v) {
            Ok(v) => v,
            Err(e) => return e,
        };
    }
    if let Some(v) = input.get("learningMaterials") {
        topic.legacy.learning_materials = match parse_materials(req, v) {
            Ok(v) => v,
            Err(e) => return e,
        };
    }
    if let Some(v) = input.get("embeddedImages").filter(|v| !v.is_null()) {
        topic.legacy.embedded_images = match decode::<Vec<EmbeddedImage>>(req, "embeddedImages", v) {
            Ok(v) => v,
            Err(e) => return e,
        };
    }
    if let Some(v) = input.get("estimatedMinutes").filter(|v| !v.is_null()) {
        topic.estimated_minutes = match parse_estimated_minutes(req, v) {
            Ok(v) => v,
            Err(e) => return e,
        };
    }
    if let Some(v) = input.get("required").filter(|v| !v.is_null()) {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "required must be boolean", None);
        };
        topic.required = b;
    }

    if let Err(e) = db::insert_topic(conn, &topic) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "topicId": topic.id }))
}

fn handle_topics_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let migrated = match parse_opt_bool(req, "migrated") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = TopicFilter {
        unit_id: req
            .param("unitId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        migrated,
    };
    match db::list_topics(conn, &filter) {
        Ok(topics) => {
            let rows: Vec<Value> = topics.iter().map(Topic::summary_json).collect();
            ok(&req.id, json!({ "topics": rows }))
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

fn handle_topics_open(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let settings = match content_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "topic": topic.to_json(settings.words_per_minute) }))
}

fn apply_topic_patch(req: &Request, topic: &mut Topic, patch: &Map<String, Value>) -> Result<(), Value> {
    for (k, v) in patch {
        match k.as_str() {
            "title" => {
                let title = v.as_str().map(str::trim).unwrap_or_default();
                if title.is_empty() {
                    return Err(err(&req.id, "bad_params", "title must be a non-empty string", None));
                }
                topic.title = title.to_string();
            }
            "estimatedMinutes" => topic.estimated_minutes = parse_estimated_minutes(req, v)?,
            "required" => {
                topic.required = v
                    .as_bool()
                    .ok_or_else(|| err(&req.id, "bad_params", "required must be boolean", None))?;
            }
            "description" | "learningMaterials" | "embeddedImages" if topic.is_unified() => {
                return Err(err(
                    &req.id,
                    "read_only",
                    format!("{} is read-only once a topic is migrated", k),
                    None,
                ));
            }
            "description" => topic.legacy.description = parse_nullable_text(req, k, v)?,
            "learningMaterials" => topic.legacy.learning_materials = parse_materials(req, v)?,
            "embeddedImages" => {
                topic.legacy.embedded_images = if v.is_null() {
                    Vec::new()
                } else {
                    decode(req, k, v)?
                };
            }
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("unknown topic field: {}", k),
                    None,
                ))
            }
        }
    }
    Ok(())
}

fn handle_topics_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.param("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if let Err(e) = apply_topic_patch(req, &mut topic, patch) {
        return e;
    }
    topic.updated_at = now_rfc3339();
    if let Err(e) = db::save_topic_legacy(conn, &topic) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_topics_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_topic(conn, &topic_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "topic not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn material_kind(req: &Request) -> Result<MaterialKind, Value> {
    let raw = required_str(req, "kind")?;
    MaterialKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "kind must be one of: videos, links, files",
            None,
        )
    })
}

fn handle_materials_add(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind = match material_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(material) = req.param("material").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "material must be an object", None);
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let count = match topic.add_material(kind, material.clone()) {
        Ok(n) => n,
        Err(e) => return content_err(&req.id, &e),
    };
    if let Err(e) = db::save_topic_legacy(conn, &topic) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "count": count }))
}

fn handle_materials_remove(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind = match material_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match parse_opt_i64(req, "index") {
        Ok(Some(i)) if i >= 0 => i as usize,
        Ok(_) => return err(&req.id, "bad_params", "index must be a non-negative integer", None),
        Err(e) => return e,
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let count = match topic.remove_material(kind, index) {
        Ok(n) => n,
        Err(e) => return content_err(&req.id, &e),
    };
    if let Err(e) = db::save_topic_legacy(conn, &topic) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "count": count }))
}

fn handle_unified_content(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "content": topic.unified_content(),
            "isUnified": topic.is_unified(),
        }),
    )
}

fn handle_legacy_materials(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let settings = match content_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let materials = topic.legacy_materials(&settings.classifier());
    ok(&req.id, json!({ "materials": materials }))
}

fn handle_update_content(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let content = match required_text(req, "learningContent") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assets = match req.param("contentAssets") {
        None => None,
        Some(v) => match decode::<ContentAssets>(req, "contentAssets", v) {
            Ok(a) => Some(a),
            Err(e) => return e,
        },
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if let Err(e) = topic::update_content(conn, &mut topic, content, assets) {
        return content_err(&req.id, &e);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_topics_migrate(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let already_migrated = topic.is_unified();
    if !topic::migrate(conn, &mut topic) {
        return err(
            &req.id,
            "db_update_failed",
            "failed to save migrated topic",
            Some(json!({ "topicId": topic_id })),
        );
    }
    ok(
        &req.id,
        json!({ "migrated": true, "alreadyMigrated": already_migrated }),
    )
}

fn handle_reconcile_assets(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut topic = match load_topic(conn, req, &topic_id) {
        Ok(t) => t,
        Err(e) => return e,
    };
    match topic::reconcile(conn, &mut topic) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "referenced": summary.referenced,
                "orphaned": summary.orphaned,
                "contentAssets": topic.content_assets(),
            }),
        ),
        Err(e) => content_err(&req.id, &e),
    }
}

fn handle_migrate_batch(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = match content_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dry_run = match parse_opt_bool(req, "dryRun") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return e,
    };
    let force = match parse_opt_bool(req, "force") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return e,
    };
    let batch_size = match parse_opt_i64(req, "batchSize") {
        Ok(None) => settings.batch_size,
        Ok(Some(n)) if (1..=1000).contains(&n) => n as usize,
        Ok(Some(_)) => return err(&req.id, "bad_params", "batchSize must be in 1..=1000", None),
        Err(e) => return e,
    };
    let opts = MigrationOptions {
        dry_run,
        batch_size,
        force,
    };
    match migrate::run_batch(conn, &opts) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "topics.create" => Some(handle_topics_create(state, req)),
        "topics.list" => Some(handle_topics_list(state, req)),
        "topics.open" => Some(handle_topics_open(state, req)),
        "topics.update" => Some(handle_topics_update(state, req)),
        "topics.delete" => Some(handle_topics_delete(state, req)),
        "topics.materials.add" => Some(handle_materials_add(state, req)),
        "topics.materials.remove" => Some(handle_materials_remove(state, req)),
        "topics.unifiedContent" => Some(handle_unified_content(state, req)),
        "topics.legacyMaterials" => Some(handle_legacy_materials(state, req)),
        "topics.updateContent" => Some(handle_update_content(state, req)),
        "topics.migrate" => Some(handle_topics_migrate(state, req)),
        "topics.reconcileAssets" => Some(handle_reconcile_assets(state, req)),
        "topics.migrateBatch" => Some(handle_migrate_batch(state, req)),
        _ => None,
    }
}
