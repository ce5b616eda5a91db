use crate::config::{self, ContentSettings};
use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::topic::Topic;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.param(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// String param that may legitimately be empty (markdown bodies).
pub fn required_text(req: &Request, key: &str) -> Result<String, Value> {
    req.param(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn parse_opt_bool(req: &Request, key: &str) -> Result<Option<bool>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None)),
    }
}

pub fn parse_opt_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer", key), None)),
    }
}

/// Decodes a JSON value into a typed shape, mapping failures to `bad_params`.
pub fn decode<T: DeserializeOwned>(req: &Request, key: &str, v: &Value) -> Result<T, Value> {
    serde_json::from_value(v.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid {}: {}", key, e), None))
}

pub fn load_topic(conn: &Connection, req: &Request, topic_id: &str) -> Result<Topic, Value> {
    match db::load_topic(conn, topic_id) {
        Ok(Some(t)) => Ok(t),
        Ok(None) => Err(err(&req.id, "not_found", "topic not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", format!("{:#}", e), None)),
    }
}

pub fn content_settings(conn: &Connection, req: &Request) -> Result<ContentSettings, Value> {
    config::load_content_settings(conn)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{:#}", e), None))
}
