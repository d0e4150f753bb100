use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportExtras, ReportView};
use serde_json::json;

use super::{required_str, session_error, session_ref, student_position_or_err};

fn handle_reports_payload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let idx = match student_position_or_err(session, req) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let view_raw = match required_str(req, "view") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(view) = ReportView::parse(&view_raw) else {
        return err(
            &req.id,
            "bad_params",
            "view must be one of: firstTerm, secondTerm, thirdTerm, annual",
            Some(json!({ "view": view_raw })),
        );
    };
    let extras: ReportExtras = match req.params.get("extra") {
        None | Some(serde_json::Value::Null) => ReportExtras::default(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(x) => x,
            Err(e) => return err(&req.id, "bad_params", format!("invalid extra: {}", e), None),
        },
    };

    match session.build_report(idx, view, &extras) {
        Ok(payload) => ok(&req.id, json!(payload)),
        Err(e) => session_error(req, e),
    }
}

fn handle_reports_template_fields(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let template_id = match required_str(req, "templateId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let empty = serde_json::Map::new();
    let available = req
        .params
        .get("available")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);
    let (Some(fields), Some(missing)) = (
        report::template_fields(&template_id),
        report::missing_template_fields(&template_id, available),
    ) else {
        return err(
            &req.id,
            "not_found",
            format!("unknown template: {}", template_id),
            None,
        );
    };
    let required_missing: Vec<_> = missing.iter().filter(|f| !f.optional).collect();
    ok(
        &req.id,
        json!({
            "templateId": template_id,
            "fields": fields,
            "missing": missing,
            "complete": required_missing.is_empty(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.payload" => Some(handle_reports_payload(state, req)),
        "reports.templateFields" => Some(handle_reports_template_fields(state, req)),
        _ => None,
    }
}
