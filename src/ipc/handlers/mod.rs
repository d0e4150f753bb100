pub mod calc;
pub mod core;
pub mod marks;
pub mod reports;
pub mod roster;

use crate::db::SqliteStore;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::SequenceId;
use crate::session::{Session, SessionError};
use serde_json::json;

pub(crate) type Workspace = Session<SqliteStore>;

pub(crate) fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub(crate) fn session_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a Workspace, serde_json::Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub(crate) fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut Workspace, serde_json::Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub(crate) fn session_error(req: &Request, e: SessionError) -> serde_json::Value {
    let code = match &e {
        SessionError::NotFound(_) => "not_found",
        SessionError::Conflict(_) => "conflict",
        SessionError::InvalidInput(_) => "bad_params",
        SessionError::Store(_) => "db_write_failed",
    };
    err(&req.id, code, e.to_string(), None)
}

/// `params[key]` as a sequence id, or the session's active sequence when absent.
pub(crate) fn sequence_param(
    params: &serde_json::Value,
    key: &str,
    active: SequenceId,
) -> Result<SequenceId, String> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(active),
        Some(v) => v
            .as_str()
            .and_then(SequenceId::parse)
            .ok_or_else(|| format!("{} must be one of firstSequence..sixthSequence", key)),
    }
}

/// Resolves `studentId` (preferred) or `studentIndex` to a roster position.
pub(crate) fn student_position(
    session: &Workspace,
    params: &serde_json::Value,
) -> Result<usize, (&'static str, String)> {
    if let Some(id) = params.get("studentId").and_then(|v| v.as_str()) {
        return session
            .student_index(id)
            .ok_or(("not_found", format!("student {} not found", id)));
    }
    match params.get("studentIndex").and_then(|v| v.as_u64()) {
        Some(i) if (i as usize) < session.students().len() => Ok(i as usize),
        Some(i) => Err(("not_found", format!("student #{} not found", i))),
        None => Err(("bad_params", "missing studentId".to_string())),
    }
}

pub(crate) fn student_position_or_err(
    session: &Workspace,
    req: &Request,
) -> Result<usize, serde_json::Value> {
    student_position(session, &req.params).map_err(|(code, message)| {
        err(
            &req.id,
            code,
            message,
            Some(json!({ "studentId": req.params.get("studentId") })),
        )
    })
}
