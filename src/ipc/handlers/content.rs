use crate::classify::Classifier;
use crate::convert;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{content_settings, decode, required_str, required_text};
use crate::ipc::types::{AppState, Request};
use crate::materials::LegacyMaterials;
use crate::video;
use serde_json::{json, Value};

// Stateless conversions; no workspace is needed. When one is selected its
// file extension setting drives classification.

fn handle_convert(_state: &mut AppState, req: &Request) -> Value {
    let description = match req.param("description") {
        None => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return err(&req.id, "bad_params", "description must be string", None),
    };
    let materials = match req.param("learningMaterials") {
        None => None,
        Some(v) => match decode::<LegacyMaterials>(req, "learningMaterials", v) {
            Ok(m) => Some(m),
            Err(e) => return e,
        },
    };
    let markdown = convert::convert_to_markdown(description, materials.as_ref());
    ok(&req.id, json!({ "markdown": markdown }))
}

fn handle_extract_legacy(state: &mut AppState, req: &Request) -> Value {
    let markdown = match required_text(req, "markdown") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classifier = match state.db.as_ref() {
        Some(conn) => match content_settings(conn, req) {
            Ok(s) => s.classifier(),
            Err(e) => return e,
        },
        None => Classifier::default(),
    };
    let materials = convert::extract_legacy(&markdown, &classifier);
    ok(&req.id, json!({ "materials": materials }))
}

fn handle_parse_video_url(_state: &mut AppState, req: &Request) -> Value {
    let url = match required_str(req, "url") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "video": video::parse_video_url(&url) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "content.convert" => Some(handle_convert(state, req)),
        "content.extractLegacy" => Some(handle_extract_legacy(state, req)),
        "content.parseVideoUrl" => Some(handle_parse_video_url(state, req)),
        _ => None,
    }
}
