use crate::calc::{self, AssignmentRecord, ExamSettings, SubjectAggregate};
use crate::config::CalcDefaults;
use crate::db::{self, PsSettings, StoredAssignment, StoredExam};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    conn, db_err, optional_bool, optional_number, required_str, required_text, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Everything the engine needs for one subject, re-derived from stored
/// primitives on every call.
pub(super) struct SubjectInputs {
    pub assignments: Vec<(StoredAssignment, AssignmentRecord)>,
    pub aggregate: SubjectAggregate,
    pub exam: Option<StoredExam>,
    pub ps: PsSettings,
}

pub(super) fn load_subject_inputs(
    conn: &Connection,
    subject_id: &str,
    defaults: &CalcDefaults,
) -> Result<SubjectInputs, HandlerErr> {
    let stored = db::load_assignments(conn, subject_id).map_err(db_err("db_query_failed"))?;
    let assignments: Vec<(StoredAssignment, AssignmentRecord)> = stored
        .into_iter()
        .map(|s| {
            let record = calc::derive_assignment(&s.input);
            (s, record)
        })
        .collect();
    let aggregate = calc::aggregate(assignments.iter().map(|(_, r)| r));
    let exam = db::load_exam(conn, subject_id).map_err(db_err("db_query_failed"))?;
    let ps = db::load_exam_settings(conn, subject_id)
        .map_err(db_err("db_query_failed"))?
        .unwrap_or(PsSettings {
            ps_enabled: false,
            ps_factor: defaults.ps_factor,
        });
    Ok(SubjectInputs {
        assignments,
        aggregate,
        exam,
        ps,
    })
}

pub(super) fn require_subject(conn: &Connection, subject_id: &str) -> Result<(), HandlerErr> {
    match db::subject_exists(conn, subject_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(HandlerErr::new("not_found", "subject not found")),
        Err(e) => Err(HandlerErr::new("db_query_failed", e.to_string())),
    }
}

pub(super) fn assignment_json(
    stored: &StoredAssignment,
    record: &AssignmentRecord,
) -> serde_json::Value {
    let mut v = json!(record.figures());
    v["id"] = json!(stored.id);
    v["sortOrder"] = json!(stored.sort_order);
    v["updatedAt"] = json!(stored.updated_at);
    v
}

/// Explicit delete in dependency order; there is no ON DELETE CASCADE.
pub(super) fn delete_subject_rows(conn: &Connection, subject_id: &str) -> Result<(), HandlerErr> {
    for table in ["exam_settings", "examinations", "assignments"] {
        let sql = format!("DELETE FROM {} WHERE subject_id = ?", table);
        conn.execute(&sql, [subject_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table }))
        })?;
    }
    conn.execute("DELETE FROM subjects WHERE id = ?", [subject_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "subjects" }))
        })?;
    Ok(())
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let semester_id = match req.params.get("semesterId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing semesterId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.code,
           s.name,
           s.total_mark,
           s.sync_subject,
           (SELECT COUNT(*) FROM assignments a WHERE a.subject_id = s.id) AS assignment_count
         FROM subjects s
         WHERE s.semester_id = ?
         ORDER BY s.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&semester_id], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let total_mark: f64 = row.get(3)?;
            let sync_subject: i64 = row.get(4)?;
            let assignment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "totalMark": total_mark,
                "syncSubject": sync_subject != 0,
                "assignmentCount": assignment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_subject(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;
    let code = required_text(&req.params, "code")?;
    let name = required_text(&req.params, "name")?;

    let semester: Option<i64> = conn
        .query_row("SELECT 1 FROM semesters WHERE id = ?", [&semester_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if semester.is_none() {
        return Err(HandlerErr::new("not_found", "semester not found"));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE semester_id = ? AND code = ?",
            (&semester_id, &code),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if let Some(id) = existing {
        return Err(HandlerErr::new("conflict", "subject code already used in semester")
            .with_details(json!({ "subjectId": id })));
    }

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, semester_id, code, name) VALUES(?, ?, ?, ?)",
        (&subject_id, &semester_id, &code, &name),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;

    Ok(json!({ "subjectId": subject_id, "code": code, "name": name }))
}

fn update_subject(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let Some(patch) = req.params.get("patch").filter(|p| p.is_object()) else {
        return Err(HandlerErr::new("bad_params", "patch must be an object"));
    };
    require_subject(conn, &subject_id)?;

    let name = match patch.get("name") {
        None => None,
        Some(_) => Some(required_text(patch, "name")?),
    };
    let total_mark = optional_number(patch, "totalMark")?;
    if let Some(t) = total_mark {
        if !(0.0..=100.0).contains(&t) {
            return Err(HandlerErr::new("bad_params", "totalMark must be within 0..100"));
        }
    }
    let sync_subject = optional_bool(patch, "syncSubject")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    if let Some(name) = &name {
        tx.execute("UPDATE subjects SET name = ? WHERE id = ?", (name, &subject_id))
            .map_err(db_err("db_update_failed"))?;
    }
    if let Some(t) = total_mark {
        tx.execute(
            "UPDATE subjects SET total_mark = ? WHERE id = ?",
            (t, &subject_id),
        )
        .map_err(db_err("db_update_failed"))?;
    }
    if let Some(s) = sync_subject {
        tx.execute(
            "UPDATE subjects SET sync_subject = ? WHERE id = ?",
            (if s { 1_i64 } else { 0_i64 }, &subject_id),
        )
        .map_err(db_err("db_update_failed"))?;
    }
    tx.commit().map_err(db_err("db_tx_failed"))?;

    Ok(json!({ "ok": true }))
}

fn delete_subject(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    require_subject(conn, &subject_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    delete_subject_rows(&tx, &subject_id)?;
    tx.commit().map_err(db_err("db_tx_failed"))?;
    Ok(json!({ "ok": true }))
}

/// Nominal exam weight used by `exams.save`, `exams.get` and
/// `subjects.summary`: an explicit weight as given (zero included), else a
/// stored nonzero weight, else whatever the assignments leave.
pub(super) fn resolve_exam_weight(
    explicit: Option<f64>,
    stored: Option<&StoredExam>,
    assignment_weight_percent: f64,
) -> f64 {
    match (explicit, stored) {
        (Some(w), _) => w,
        (None, Some(e)) if e.exam_weight != 0.0 => e.exam_weight,
        _ => calc::inferred_exam_weight(assignment_weight_percent),
    }
}

struct SubjectRow {
    code: String,
    name: String,
    total_mark: f64,
    sync_subject: bool,
}

fn load_subject_row(conn: &Connection, subject_id: &str) -> Result<SubjectRow, HandlerErr> {
    conn.query_row(
        "SELECT code, name, total_mark, sync_subject FROM subjects WHERE id = ?",
        [subject_id],
        |r| {
            Ok(SubjectRow {
                code: r.get(0)?,
                name: r.get(1)?,
                total_mark: r.get(2)?,
                sync_subject: r.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()
    .map_err(db_err("db_query_failed"))?
    .ok_or_else(|| HandlerErr::new("not_found", "subject not found"))
}

fn subject_summary(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let goal = optional_number(&req.params, "goal")?;
    let explicit_weight = optional_number(&req.params, "examWeight")?;

    let SubjectRow {
        code,
        name,
        total_mark,
        sync_subject,
    } = load_subject_row(conn, &subject_id)?;

    let inputs = load_subject_inputs(conn, &subject_id, &state.defaults)?;
    let settings = ExamSettings {
        nominal_exam_weight: resolve_exam_weight(
            explicit_weight,
            inputs.exam.as_ref(),
            inputs.aggregate.assignment_weight_percent,
        ),
        ps_enabled: inputs.ps.ps_enabled,
        ps_factor: inputs.ps.ps_factor,
    };
    let standing = calc::subject_standing(
        &inputs.aggregate,
        inputs.exam.map(|e| e.exam_mark),
        &settings,
        goal,
    );

    let assignments: Vec<serde_json::Value> = inputs
        .assignments
        .iter()
        .map(|(s, r)| assignment_json(s, r))
        .collect();

    Ok(json!({
        "subject": {
            "id": subject_id,
            "code": code,
            "name": name,
            "totalMark": total_mark,
            "syncSubject": sync_subject,
        },
        "assignments": assignments,
        "aggregate": inputs.aggregate,
        "exam": inputs.exam.map(|e| json!({
            "examMark": e.exam_mark,
            "examWeight": e.exam_weight,
        })),
        "standing": standing,
        "gradeStatus": calc::grade_status(Some(total_mark), &inputs.aggregate),
    }))
}

fn subject_analytics(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let row = load_subject_row(conn, &subject_id)?;
    let inputs = load_subject_inputs(conn, &subject_id, &state.defaults)?;
    let records: Vec<AssignmentRecord> =
        inputs.assignments.into_iter().map(|(_, r)| r).collect();
    let analytics = calc::subject_analytics(&records, Some(row.total_mark));

    Ok(json!({
        "subjectId": subject_id,
        "code": row.code,
        "hasData": analytics.scored_count > 0,
        "analytics": analytics,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(respond(&req.id, create_subject(state, req))),
        "subjects.update" => Some(respond(&req.id, update_subject(state, req))),
        "subjects.delete" => Some(respond(&req.id, delete_subject(state, req))),
        "subjects.summary" => Some(respond(&req.id, subject_summary(state, req))),
        "subjects.analytics" => Some(respond(&req.id, subject_analytics(state, req))),
        _ => None,
    }
}
