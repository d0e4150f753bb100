use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

use super::{required_str, session_error, session_mut, session_ref};

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let students: Vec<serde_json::Value> = session
        .students()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "index": i,
                "id": s.id,
                "name": s.name,
                "sortOrder": s.sort_order,
            })
        })
        .collect();
    ok(&req.id, json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.create_student(&name) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => session_error(req, e),
    }
}

fn handle_students_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.rename_student(&student_id, &name) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => session_error(req, e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.delete_student(&student_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => session_error(req, e),
    }
}

fn total_param(req: &Request) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get("total") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", "total must be a number", None)),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "subjects": session.subjects() }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total = match total_param(req) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "bad_params", "missing total", None),
        Err(e) => return e,
    };
    match session.create_subject(&name, total) {
        Ok(subject) => ok(&req.id, json!({ "subject": subject })),
        Err(e) => session_error(req, e),
    }
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total = match total_param(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let name = req.params.get("name").and_then(|v| v.as_str());
    match session.update_subject(&subject_id, name, total) {
        Ok(subject) => ok(&req.id, json!({ "subject": subject })),
        Err(e) => session_error(req, e),
    }
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.delete_subject(&subject_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => session_error(req, e),
    }
}

fn handle_roster_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!(session.roster_summary()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.rename" => Some(handle_students_rename(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        "roster.summary" => Some(handle_roster_summary(state, req)),
        _ => None,
    }
}
