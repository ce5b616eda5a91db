mod test_support;

use serde_json::json;
use test_support::{create_topic, request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("topicd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").expect("workspacePath").is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );

    let _ = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    let topic_id = create_topic(
        &mut stdin,
        &mut reader,
        "5",
        json!({ "unitId": "unit-1", "title": "Smoke Topic", "description": "Intro." }),
    );

    for (i, method) in [
        "topics.open",
        "topics.unifiedContent",
        "topics.legacyMaterials",
        "topics.migrate",
        "topics.reconcileAssets",
    ]
    .iter()
    .enumerate()
    {
        let id = format!("6.{}", i);
        let _ = request_ok(&mut stdin, &mut reader, &id, method, json!({ "topicId": topic_id }));
    }
    let _ = request_ok(&mut stdin, &mut reader, "7", "topics.list", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "8", "topics.migrateBatch", json!({ "dryRun": true }));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "content.convert",
        json!({ "description": "x" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "content.extractLegacy",
        json!({ "markdown": "[a](https://a.com)" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "content.parseVideoUrl",
        json!({ "url": "https://vimeo.com/1" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "topics.delete",
        json!({ "topicId": topic_id }),
    );

    let code = request_err(&mut stdin, &mut reader, "13", "grades.compute", json!({}));
    assert_eq!(code, "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_is_required_for_topic_methods() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let code = request_err(&mut stdin, &mut reader, "1", "topics.list", json!({}));
    assert_eq!(code, "no_workspace");
    let code = request_err(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(code, "no_workspace");

    // Pure conversions work without one.
    let res = request(
        &mut stdin,
        &mut reader,
        "3",
        "content.parseVideoUrl",
        json!({ "url": "https://example.com/video" }),
    );
    assert_eq!(res["ok"], json!(true));
    assert!(res["result"]["video"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    use std::io::{BufRead, Write};

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["ok"], json!(false));
    assert_eq!(v["error"]["code"], json!("bad_json"));

    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}
