use crate::error::ContentError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn content_err(id: &str, e: &ContentError) -> serde_json::Value {
    let details = match e {
        ContentError::ContentLost { topic_id } | ContentError::Persist { topic_id, .. } => {
            Some(json!({ "topicId": topic_id }))
        }
        ContentError::MaterialIndex { kind, index } => Some(json!({ "kind": kind, "index": index })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
