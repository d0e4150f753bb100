use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let early = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("gradebook.sqlite3").is_file());

    let student = request_ok(&mut stdin, &mut reader, "4", "students.create", json!({ "name": "Ada" }));
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.create",
        json!({ "name": "Math", "total": 20 }),
    );

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("config.get", json!({})),
        ("config.update", json!({ "debounceMs": 100 })),
        ("students.list", json!({})),
        ("students.rename", json!({ "studentId": student_id, "name": "Ada L." })),
        ("subjects.list", json!({})),
        ("roster.summary", json!({})),
        ("sequence.select", json!({ "sequence": "firstSequence" })),
        ("marks.set", json!({ "studentId": student_id, "subject": "Math", "value": "12" })),
        ("marks.bulkSet", json!({ "edits": [{ "studentIndex": 0, "subject": "Math", "value": 13 }] })),
        ("marks.get", json!({})),
        ("marks.completion", json!({})),
        ("comments.set", json!({ "studentId": student_id, "sequence": "firstSequence", "text": "Good" })),
        ("comments.get", json!({ "studentId": student_id })),
        ("session.pending", json!({})),
        ("session.flush", json!({})),
        ("calc.sequence", json!({ "sequence": "firstSequence" })),
        ("calc.terms", json!({})),
        ("calc.annual", json!({})),
        ("results.get", json!({ "view": "sequence" })),
        ("results.quickStats", json!({})),
        ("reports.payload", json!({ "studentId": student_id, "view": "firstTerm" })),
        ("reports.templateFields", json!({ "templateId": "classic-a4" })),
        ("workspace.close", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("call-{}", i);
        let _ = request_ok(&mut stdin, &mut reader, &id, method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "99", "marks.explode", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unparseable_line_answers_bad_json_and_keeps_running() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{ not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(error_code(&value), Some("bad_json"));

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bad_params_are_reported() {
    let workspace = temp_dir("gradebook-bad-params");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let missing_path = request(&mut stdin, &mut reader, "1", "workspace.select", json!({}));
    assert_eq!(error_code(&missing_path), Some("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let bad_seq = request(
        &mut stdin,
        &mut reader,
        "3",
        "sequence.select",
        json!({ "sequence": "seventhSequence" }),
    );
    assert_eq!(error_code(&bad_seq), Some("bad_params"));

    let bad_view = request(&mut stdin, &mut reader, "4", "results.get", json!({ "view": "weekly" }));
    assert_eq!(error_code(&bad_view), Some("bad_params"));

    let bad_config = request(
        &mut stdin,
        &mut reader,
        "5",
        "config.update",
        json!({ "passingMark": 25 }),
    );
    assert_eq!(error_code(&bad_config), Some("bad_params"));

    let ghost = request(
        &mut stdin,
        &mut reader,
        "6",
        "marks.set",
        json!({ "studentId": "nobody", "subject": "Math", "value": "1" }),
    );
    assert_eq!(error_code(&ghost), Some("not_found"));

    let template = request(
        &mut stdin,
        &mut reader,
        "7",
        "reports.templateFields",
        json!({ "templateId": "modern-letter" }),
    );
    assert_eq!(error_code(&template), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
