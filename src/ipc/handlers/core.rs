use crate::config::ConfigPatch;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde_json::json;
use std::path::PathBuf;

use super::{session_error, session_mut, session_ref};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "pendingWrites": state.session.as_ref().map(|s| s.pending_write_count()).unwrap_or(0),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Pending edits belong to the previous workspace's store.
    state.close_workspace();

    let store = match db::open_db(&path) {
        Ok(store) => store,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let session = match Session::open(store) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_open_failed", e.to_string(), None),
    };
    tracing::info!(workspace = %path.display(), "workspace opened");

    let result = json!({
        "workspacePath": path.to_string_lossy(),
        "students": session.students().len(),
        "subjects": session.subjects().len(),
        "config": session.config(),
        "quickStats": session.quick_stats(),
    });
    state.workspace = Some(path);
    state.session = Some(session);
    ok(&req.id, result)
}

fn handle_workspace_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.close_workspace() {
        Some(report) => ok(&req.id, json!({ "closed": true, "teardown": report })),
        None => ok(&req.id, json!({ "closed": false })),
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "config": session.config() }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let patch: ConfigPatch = if req.params.is_null() {
        ConfigPatch::default()
    } else {
        match serde_json::from_value(req.params.clone()) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    };
    match session.update_config(&patch) {
        Ok(cfg) => ok(&req.id, json!({ "config": cfg })),
        Err(e) => session_error(req, e),
    }
}

fn handle_session_flush(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let report = session.flush_all();
    ok(&req.id, json!(report))
}

fn handle_session_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "pending": session.pending_writes() }))
}

fn handle_data_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match session.reset() {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => session_error(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.close" => Some(handle_workspace_close(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        "session.flush" => Some(handle_session_flush(state, req)),
        "session.pending" => Some(handle_session_pending(state, req)),
        "data.reset" => Some(handle_data_reset(state, req)),
        _ => None,
    }
}
