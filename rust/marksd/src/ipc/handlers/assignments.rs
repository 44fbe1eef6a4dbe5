use crate::calc::{self, AssignmentInput};
use crate::db;
use crate::ipc::handlers::subjects::{assignment_json, require_subject};
use crate::ipc::helpers::{
    conn, db_err, optional_number, required_str, required_text, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn list_assignments(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    require_subject(conn, &subject_id)?;

    let stored = db::load_assignments(conn, &subject_id).map_err(db_err("db_query_failed"))?;
    let assignments: Vec<serde_json::Value> = stored
        .iter()
        .map(|s| assignment_json(s, &calc::derive_assignment(&s.input)))
        .collect();
    Ok(json!({ "assignments": assignments }))
}

fn create_assignment(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let input = AssignmentInput {
        assessment_name: required_text(&req.params, "assessment")?,
        grade_type: calc::parse_grade_type(req.params.get("gradeType"))?,
        weighted_mark: optional_number(&req.params, "weightedMark")?,
        mark_weight: optional_number(&req.params, "markWeight")?,
    };
    require_subject(conn, &subject_id)?;

    let record = calc::derive_assignment(&input);
    let assignment_id = db::insert_assignment(conn, &subject_id, &record).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "assignments" }))
    })?;

    tracing::debug!(assignment = %assignment_id, subject = %subject_id, "assignment created");
    Ok(json!({
        "assignmentId": assignment_id,
        "assignment": record.figures(),
    }))
}

fn update_assignment(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let assignment_id = required_str(&req.params, "assignmentId")?;
    let Some(patch) = req.params.get("patch").filter(|p| p.is_object()) else {
        return Err(HandlerErr::new("bad_params", "patch must be an object"));
    };

    let Some((_subject_id, mut input)) =
        db::load_assignment(conn, &assignment_id).map_err(db_err("db_query_failed"))?
    else {
        return Err(HandlerErr::new("not_found", "assignment not found"));
    };

    // Absent keys keep the stored value; null or "" clears a number.
    if patch.get("assessment").is_some() {
        input.assessment_name = required_text(patch, "assessment")?;
    }
    if patch.get("gradeType").is_some() {
        input.grade_type = calc::parse_grade_type(patch.get("gradeType"))?;
    }
    if patch.get("weightedMark").is_some() {
        input.weighted_mark = optional_number(patch, "weightedMark")?;
    }
    if patch.get("markWeight").is_some() {
        input.mark_weight = optional_number(patch, "markWeight")?;
    }

    let record = calc::derive_assignment(&input);
    db::update_assignment(conn, &assignment_id, &record).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "assignments" }))
    })?;

    Ok(json!({
        "assignmentId": assignment_id,
        "assignment": record.figures(),
    }))
}

fn delete_assignment(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let assignment_id = required_str(&req.params, "assignmentId")?;
    let changed = conn
        .execute("DELETE FROM assignments WHERE id = ?", [&assignment_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "assignments" }))
        })?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "assignment not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(respond(&req.id, list_assignments(state, req))),
        "assignments.create" => Some(respond(&req.id, create_assignment(state, req))),
        "assignments.update" => Some(respond(&req.id, update_assignment(state, req))),
        "assignments.delete" => Some(respond(&req.id, delete_assignment(state, req))),
        _ => None,
    }
}
