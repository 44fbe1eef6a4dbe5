use crate::calc::{self, ExamRequirement};
use crate::db::{self, PsSettings, StoredExam};
use crate::ipc::handlers::subjects::{load_subject_inputs, require_subject, resolve_exam_weight};
use crate::ipc::helpers::{
    conn, db_err, optional_bool, optional_number, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn percent_param(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    let v = optional_number(params, key)?;
    if let Some(n) = v {
        if !(0.0..=100.0).contains(&n) {
            return Err(HandlerErr::new(
                "bad_params",
                format!("{} must be within 0..100", key),
            )
            .with_details(json!({ "value": n })));
        }
    }
    Ok(v)
}

fn ps_factor_param(params: &serde_json::Value) -> Result<Option<f64>, HandlerErr> {
    let v = optional_number(params, "psFactor")?;
    if let Some(n) = v {
        if n < 0.0 {
            return Err(HandlerErr::new("bad_params", "psFactor must not be negative"));
        }
    }
    Ok(v)
}

fn settings_json(ps: &PsSettings) -> serde_json::Value {
    json!({ "psEnabled": ps.ps_enabled, "psFactor": ps.ps_factor })
}

fn exam_json(exam: Option<&StoredExam>) -> serde_json::Value {
    match exam {
        Some(e) => json!({ "examMark": e.exam_mark, "examWeight": e.exam_weight }),
        None => serde_json::Value::Null,
    }
}

fn get_exam(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    require_subject(conn, &subject_id)?;

    let inputs = load_subject_inputs(conn, &subject_id, &state.defaults)?;
    let nominal = resolve_exam_weight(
        None,
        inputs.exam.as_ref(),
        inputs.aggregate.assignment_weight_percent,
    );
    Ok(json!({
        "exam": exam_json(inputs.exam.as_ref()),
        "settings": settings_json(&inputs.ps),
        "nominalExamWeight": nominal,
        "scoringWeight": calc::scoring_weight(nominal, inputs.ps.ps_enabled, inputs.ps.ps_factor),
    }))
}

fn save_exam(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let explicit_mark = percent_param(&req.params, "examMark")?;
    let explicit_weight = percent_param(&req.params, "examWeight")?;
    let goal = optional_number(&req.params, "goal")?;
    if let Some(g) = goal {
        if g <= 0.0 || g > 100.0 {
            return Err(HandlerErr::new("bad_params", "goal must be greater than 0 and at most 100")
                .with_details(json!({ "goal": g })));
        }
    }
    let ps_enabled = optional_bool(&req.params, "psEnabled")?;
    let ps_factor = ps_factor_param(&req.params)?;
    require_subject(conn, &subject_id)?;

    let inputs = load_subject_inputs(conn, &subject_id, &state.defaults)?;

    let mut ps = inputs.ps;
    let ps_changed = ps_enabled.is_some() || ps_factor.is_some();
    if let Some(e) = ps_enabled {
        ps.ps_enabled = e;
    }
    if let Some(f) = ps_factor {
        ps.ps_factor = f;
    }

    let exam_weight = resolve_exam_weight(
        explicit_weight,
        inputs.exam.as_ref(),
        inputs.aggregate.assignment_weight_percent,
    );

    let requirement: Option<ExamRequirement> = goal.map(|g| {
        calc::required_exam_mark(
            g,
            inputs.aggregate.assignment_weighted_sum,
            inputs.aggregate.assignment_weight_percent,
            exam_weight,
            ps.ps_enabled,
            ps.ps_factor,
        )
    });

    let previous_mark = inputs.exam.map(|e| e.exam_mark).unwrap_or(0.0);
    let exam_mark = match (explicit_mark, requirement.and_then(|r| r.value)) {
        (Some(m), _) => m,
        (None, Some(v)) => calc::round_to(v, 4),
        (None, None) => previous_mark,
    };
    let exam = StoredExam {
        exam_mark,
        exam_weight,
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    if ps_changed {
        db::upsert_exam_settings(&tx, &subject_id, &ps).map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "exam_settings" }))
        })?;
    }
    db::upsert_exam(&tx, &subject_id, &exam).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "examinations" }))
    })?;
    tx.commit().map_err(db_err("db_tx_failed"))?;

    Ok(json!({
        "exam": exam_json(Some(&exam)),
        "requirement": requirement,
        "settings": settings_json(&ps),
        "finalTotal": calc::final_total(
            inputs.aggregate.assignment_weighted_sum,
            exam.exam_mark,
            exam.exam_weight,
            ps.ps_enabled,
            ps.ps_factor,
        ),
    }))
}

fn delete_exam(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    require_subject(conn, &subject_id)?;
    let changed = conn
        .execute("DELETE FROM examinations WHERE subject_id = ?", [&subject_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "examinations" }))
        })?;
    Ok(json!({ "ok": true, "deleted": changed > 0 }))
}

fn get_exam_settings(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    require_subject(conn, &subject_id)?;
    let stored =
        db::load_exam_settings(conn, &subject_id).map_err(db_err("db_query_failed"))?;
    let ps = stored.unwrap_or(PsSettings {
        ps_enabled: false,
        ps_factor: state.defaults.ps_factor,
    });
    let mut out = settings_json(&ps);
    out["stored"] = json!(stored.is_some());
    Ok(out)
}

fn set_exam_settings(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let Some(ps_enabled) = optional_bool(&req.params, "psEnabled")? else {
        return Err(HandlerErr::new("bad_params", "missing psEnabled"));
    };
    let ps_factor = ps_factor_param(&req.params)?;
    require_subject(conn, &subject_id)?;

    let current = db::load_exam_settings(conn, &subject_id).map_err(db_err("db_query_failed"))?;
    let ps = PsSettings {
        ps_enabled,
        ps_factor: ps_factor
            .or(current.map(|c| c.ps_factor))
            .unwrap_or(state.defaults.ps_factor),
    };
    db::upsert_exam_settings(conn, &subject_id, &ps).map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "exam_settings" }))
    })?;
    Ok(settings_json(&ps))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.get" => Some(respond(&req.id, get_exam(state, req))),
        "exams.save" => Some(respond(&req.id, save_exam(state, req))),
        "exams.delete" => Some(respond(&req.id, delete_exam(state, req))),
        "examSettings.get" => Some(respond(&req.id, get_exam_settings(state, req))),
        "examSettings.set" => Some(respond(&req.id, set_exam_settings(state, req))),
        _ => None,
    }
}
