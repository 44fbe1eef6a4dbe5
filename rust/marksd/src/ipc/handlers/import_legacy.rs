use crate::calc;
use crate::db::{self, StoredExam};
use crate::ipc::helpers::{conn, db_err, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::legacy::{self, LegacySubject};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn find_or_create_semester(
    conn: &Connection,
    name: &str,
    year: &str,
) -> Result<(String, bool), HandlerErr> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM semesters WHERE name = ? AND year = ?",
            (name, year),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if let Some(id) = existing {
        return Ok((id, false));
    }

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM semesters WHERE year = ?",
            [year],
            |r| r.get(0),
        )
        .map_err(db_err("db_query_failed"))?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semesters(id, name, year, sort_order) VALUES(?, ?, ?, ?)",
        (&id, name, year, sort_order),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "semesters" }))
    })?;
    Ok((id, true))
}

/// Returns the number of assignments written.
fn insert_subject(
    conn: &Connection,
    semester_id: &str,
    subject: &LegacySubject,
) -> Result<usize, HandlerErr> {
    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, semester_id, code, name, total_mark, sync_subject)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            semester_id,
            &subject.code,
            &subject.name,
            subject.total_mark,
            if subject.sync_subject { 1_i64 } else { 0_i64 },
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects", "code": subject.code }))
    })?;

    for input in &subject.assignments {
        let record = calc::derive_assignment(input);
        db::insert_assignment(conn, &subject_id, &record).map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "assignments", "code": subject.code }))
        })?;
    }

    if let Some(exam) = subject.exam {
        db::upsert_exam(
            conn,
            &subject_id,
            &StoredExam {
                exam_mark: exam.exam_mark,
                exam_weight: exam.exam_weight,
            },
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "examinations", "code": subject.code }))
        })?;
    }
    Ok(subject.assignments.len())
}

fn import_year_json(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| HandlerErr::new("bad_params", "missing path"))?;

    // data/2024.json -> "2024"
    let year = match req.params.get("year").and_then(|v| v.as_str()) {
        Some(y) if !y.trim().is_empty() => y.trim().to_string(),
        _ => path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::new("bad_params", "missing year"))?,
    };

    let parsed = legacy::parse_year_json(&path).map_err(|e| {
        HandlerErr::new("import_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;

    let mut semesters_created = 0usize;
    let mut subjects_imported = 0usize;
    let mut assignments_imported = 0usize;
    let mut skipped: Vec<serde_json::Value> = Vec::new();

    for sem in &parsed.semesters {
        let (semester_id, created) = find_or_create_semester(&tx, &sem.name, &year)?;
        if created {
            semesters_created += 1;
        }
        for subject in &sem.subjects {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM subjects WHERE semester_id = ? AND code = ?",
                    (&semester_id, &subject.code),
                    |r| r.get(0),
                )
                .optional()
                .map_err(db_err("db_query_failed"))?;
            if exists.is_some() {
                skipped.push(json!({
                    "semester": sem.name,
                    "code": subject.code,
                    "reason": "exists",
                }));
                continue;
            }
            assignments_imported += insert_subject(&tx, &semester_id, subject)?;
            subjects_imported += 1;
        }
    }

    tx.commit().map_err(db_err("db_tx_failed"))?;

    tracing::info!(
        path = %path.to_string_lossy(),
        year = %year,
        subjects = subjects_imported,
        skipped = skipped.len(),
        "legacy year imported"
    );

    Ok(json!({
        "year": year,
        "semestersCreated": semesters_created,
        "subjectsImported": subjects_imported,
        "assignmentsImported": assignments_imported,
        "skipped": skipped,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "legacy.importYearJson" => Some(respond(&req.id, import_year_json(state, req))),
        _ => None,
    }
}
