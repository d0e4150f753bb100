use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{CommentRecord, SequenceMarks};
use serde_json::json;
use std::time::Instant;

use super::{
    required_str, sequence_param, session_error, session_mut, session_ref, student_position,
    student_position_or_err,
};

/// Grid input as the raw text the user typed. `null` clears the cell.
fn raw_value(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn handle_sequence_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if req.params.get("sequence").is_none() {
        return err(&req.id, "bad_params", "missing sequence", None);
    }
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    session.select_sequence(seq);
    ok(&req.id, json!({ "sequence": seq }))
}

fn handle_marks_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let empty = SequenceMarks::new();
    let rows: Vec<serde_json::Value> = session
        .students()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marks = session
                .mark_record(&s.id)
                .map(|r| r.slot(seq))
                .unwrap_or(&empty);
            json!({
                "index": i,
                "studentId": s.id,
                "name": s.name,
                "marks": marks,
            })
        })
        .collect();
    ok(&req.id, json!({ "sequence": seq, "rows": rows }))
}

fn handle_marks_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let idx = match student_position_or_err(session, req) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = raw_value(req.params.get("value")) else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let max_total = req.params.get("maxTotal").and_then(|v| v.as_f64());
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    session.select_sequence(seq);

    match session.set_mark(idx, &subject, &raw, max_total, Instant::now()) {
        Ok(accepted) => ok(&req.id, json!({ "accepted": accepted, "sequence": seq })),
        Err(e) => session_error(req, e),
    }
}

fn handle_marks_bulk_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing edits", None);
    };
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    session.select_sequence(seq);

    let now = Instant::now();
    let mut accepted = 0usize;
    let mut rejected = 0usize;
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (i, edit) in edits.iter().enumerate() {
        let idx = match student_position(session, edit) {
            Ok(idx) => idx,
            Err((code, message)) => {
                rejected += 1;
                errors.push(json!({ "index": i, "code": code, "message": message }));
                continue;
            }
        };
        let subject = edit.get("subject").and_then(|v| v.as_str());
        let raw = raw_value(edit.get("value"));
        let (Some(subject), Some(raw)) = (subject, raw) else {
            rejected += 1;
            errors.push(json!({ "index": i, "code": "bad_params", "message": "edit needs subject and value" }));
            continue;
        };
        let max_total = edit.get("maxTotal").and_then(|v| v.as_f64());
        match session.set_mark(idx, subject, &raw, max_total, now) {
            Ok(true) => accepted += 1,
            Ok(false) => {
                rejected += 1;
                errors.push(json!({ "index": i, "code": "rejected", "message": "value out of range or not numeric" }));
            }
            Err(e) => {
                rejected += 1;
                errors.push(json!({ "index": i, "code": "not_found", "message": e.to_string() }));
            }
        }
    }
    ok(
        &req.id,
        json!({
            "sequence": seq,
            "accepted": accepted,
            "rejected": rejected,
            "errors": errors,
        }),
    )
}

fn handle_marks_completion(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let c = session.completion(seq);
    ok(
        &req.id,
        json!({
            "sequence": seq,
            "completed": c.completed,
            "total": c.total,
            "percentage": c.percentage,
        }),
    )
}

fn handle_comments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let idx = match student_position_or_err(session, req) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let student = &session.students()[idx];
    let empty = CommentRecord::default();
    let comments = session.comment_record(&student.id).unwrap_or(&empty);
    ok(
        &req.id,
        json!({ "studentId": student.id, "comments": comments }),
    )
}

fn handle_comments_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let idx = match student_position_or_err(session, req) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match session.set_comment(idx, seq, &text, Instant::now()) {
        Ok(()) => ok(&req.id, json!({ "sequence": seq })),
        Err(e) => session_error(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sequence.select" => Some(handle_sequence_select(state, req)),
        "marks.get" => Some(handle_marks_get(state, req)),
        "marks.set" => Some(handle_marks_set(state, req)),
        "marks.bulkSet" => Some(handle_marks_bulk_set(state, req)),
        "marks.completion" => Some(handle_marks_completion(state, req)),
        "comments.get" => Some(handle_comments_get(state, req)),
        "comments.set" => Some(handle_comments_set(state, req)),
        _ => None,
    }
}
