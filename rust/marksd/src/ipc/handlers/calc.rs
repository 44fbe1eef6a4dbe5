//! Direct engine access over raw values; nothing here touches the workspace.

use crate::calc::{self, AssignmentInput, AssignmentRecord};
use crate::ipc::helpers::{optional_bool, optional_number, required_number, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn assignment_input(v: &serde_json::Value) -> Result<AssignmentInput, HandlerErr> {
    let assessment_name = match v.get("assessment") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(HandlerErr::new("bad_params", "assessment must be a string")),
    };
    Ok(AssignmentInput {
        assessment_name,
        grade_type: calc::parse_grade_type(v.get("gradeType"))?,
        weighted_mark: optional_number(v, "weightedMark")?,
        mark_weight: optional_number(v, "markWeight")?,
    })
}

fn exam_params(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<(f64, bool, f64), HandlerErr> {
    let exam_weight = required_number(params, "examWeight")?;
    let ps_enabled = optional_bool(params, "psEnabled")?.unwrap_or(false);
    let ps_factor = optional_number(params, "psFactor")?.unwrap_or(state.defaults.ps_factor);
    Ok((exam_weight, ps_enabled, ps_factor))
}

fn derive(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let input = assignment_input(&req.params)?;
    Ok(json!(calc::derive_assignment(&input).figures()))
}

fn aggregate(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(list) = req.params.get("assignments").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "assignments must be an array"));
    };
    let mut records: Vec<AssignmentRecord> = Vec::with_capacity(list.len());
    for (i, item) in list.iter().enumerate() {
        let input = assignment_input(item)
            .map_err(|e| e.with_details(json!({ "index": i })))?;
        records.push(calc::derive_assignment(&input));
    }
    let agg = calc::aggregate(&records);
    let figures: Vec<_> = records.iter().map(|r| r.figures()).collect();
    Ok(json!({ "assignments": figures, "aggregate": agg }))
}

fn required_exam_mark(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let goal = required_number(&req.params, "goal")?;
    let sum = required_number(&req.params, "assignmentWeightedSum")?;
    let weight = required_number(&req.params, "assignmentWeightPercent")?;
    let (exam_weight, ps_enabled, ps_factor) = exam_params(state, &req.params)?;

    let r = calc::required_exam_mark(goal, sum, weight, exam_weight, ps_enabled, ps_factor);
    let mut out = json!(r);
    out["scoringWeight"] = json!(calc::scoring_weight(exam_weight, ps_enabled, ps_factor));
    Ok(out)
}

fn final_total(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sum = required_number(&req.params, "assignmentWeightedSum")?;
    let exam_mark = required_number(&req.params, "examMark")?;
    let (exam_weight, ps_enabled, ps_factor) = exam_params(state, &req.params)?;

    Ok(json!({
        "finalTotal": calc::final_total(sum, exam_mark, exam_weight, ps_enabled, ps_factor),
        "scoringWeight": calc::scoring_weight(exam_weight, ps_enabled, ps_factor),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.deriveAssignment" => Some(respond(&req.id, derive(req))),
        "calc.aggregate" => Some(respond(&req.id, aggregate(req))),
        "calc.requiredExamMark" => Some(respond(&req.id, required_exam_mark(state, req))),
        "calc.finalTotal" => Some(respond(&req.id, final_total(state, req))),
        _ => None,
    }
}
