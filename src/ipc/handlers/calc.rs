use crate::calc::{ClassStatistics, ResultSet};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::TermId;
use crate::session::CalcOutcome;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use super::{sequence_param, session_mut, session_ref, Workspace};

fn result_set_json<R: Serialize>(set: &ResultSet<R>) -> serde_json::Value {
    json!({
        "rows": set.rows,
        "stats": stats_json(&set.stats),
    })
}

fn stats_json(stats: &ClassStatistics) -> serde_json::Value {
    json!({
        "classAverage": stats.class_average,
        "passPercentage": stats.pass_percentage,
        "classSize": stats.class_size,
        "passedCount": stats.passed_count,
        "topStudent": stats.top_student,
    })
}

/// Outcome of a calculation plus every view that currently has results.
fn calc_response(session: &Workspace, outcome: &CalcOutcome) -> serde_json::Value {
    let results = session.results();
    let mut available: Vec<&str> = Vec::new();
    if let Some((seq, _)) = &results.sequence {
        available.push(seq.as_str());
    }
    for term in TermId::ALL {
        if results.term(term).is_some() {
            available.push(term.as_str());
        }
    }
    if results.annual.is_some() {
        available.push("annual");
    }
    json!({
        "computed": outcome.computed,
        "skipped": outcome.skipped,
        "available": available,
        "quickStats": session.quick_stats(),
    })
}

fn handle_calc_sequence(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let seq = match sequence_param(&req.params, "sequence", session.active_sequence()) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let outcome = session.calculate_sequence(seq, Instant::now());
    ok(&req.id, calc_response(session, &outcome))
}

fn handle_calc_terms(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let outcome = session.calculate_terms(Instant::now());
    ok(&req.id, calc_response(session, &outcome))
}

fn handle_calc_annual(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let outcome = session.calculate_annual(Instant::now());
    ok(&req.id, calc_response(session, &outcome))
}

fn handle_results_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let view = req
        .params
        .get("view")
        .and_then(|v| v.as_str())
        .unwrap_or("sequence");
    let results = session.results();

    let body = match view {
        "sequence" => results.sequence.as_ref().map(|(seq, set)| {
            let mut v = result_set_json(set);
            v["sequence"] = json!(seq);
            v
        }),
        "annual" => results.annual.as_ref().map(result_set_json),
        other => match TermId::parse(other) {
            Some(term) => results.term(term).map(result_set_json),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "view must be one of: sequence, firstTerm, secondTerm, thirdTerm, annual",
                    Some(json!({ "view": other })),
                )
            }
        },
    };
    match body {
        Some(mut v) => {
            v["view"] = json!(view);
            v["available"] = json!(true);
            ok(&req.id, v)
        }
        None => ok(&req.id, json!({ "view": view, "available": false })),
    }
}

fn handle_results_quick_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "quickStats": session.quick_stats() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.sequence" => Some(handle_calc_sequence(state, req)),
        "calc.terms" => Some(handle_calc_terms(state, req)),
        "calc.annual" => Some(handle_calc_annual(state, req)),
        "results.get" => Some(handle_results_get(state, req)),
        "results.quickStats" => Some(handle_results_quick_stats(state, req)),
        _ => None,
    }
}
