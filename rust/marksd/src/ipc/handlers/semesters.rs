use crate::ipc::handlers::subjects::delete_subject_rows;
use crate::ipc::helpers::{conn, db_err, required_str, required_text, respond, HandlerErr};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_semesters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "semesters": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.year,
           (SELECT COUNT(*) FROM subjects sub WHERE sub.semester_id = s.id) AS subject_count
         FROM semesters s
         ORDER BY s.year, s.sort_order, s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let year: String = row.get(2)?;
            let subject_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "year": year,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(semesters) => ok(&req.id, json!({ "semesters": semesters })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_semester(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let name = required_text(&req.params, "name")?;
    let year = required_text(&req.params, "year")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM semesters WHERE name = ? AND year = ?",
            (&name, &year),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if let Some(id) = existing {
        return Err(
            HandlerErr::new("conflict", "semester already exists")
                .with_details(json!({ "semesterId": id })),
        );
    }

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM semesters WHERE year = ?",
            [&year],
            |r| r.get(0),
        )
        .map_err(db_err("db_query_failed"))?;

    let semester_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semesters(id, name, year, sort_order) VALUES(?, ?, ?, ?)",
        (&semester_id, &name, &year, sort_order),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "semesters" }))
    })?;

    Ok(json!({ "semesterId": semester_id, "name": name, "year": year }))
}

fn delete_semester(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM semesters WHERE id = ?", [&semester_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_err("db_query_failed"))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "semester not found"));
    }

    let mut stmt = conn
        .prepare("SELECT id FROM subjects WHERE semester_id = ?")
        .map_err(db_err("db_query_failed"))?;
    let subject_ids: Vec<String> = stmt
        .query_map([&semester_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    drop(stmt);

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    for subject_id in &subject_ids {
        delete_subject_rows(&tx, subject_id)?;
    }
    tx.execute("DELETE FROM semesters WHERE id = ?", [&semester_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "semesters" }))
        })?;
    tx.commit().map_err(db_err("db_tx_failed"))?;

    Ok(json!({ "ok": true, "deletedSubjects": subject_ids.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "semesters.list" => Some(handle_semesters_list(state, req)),
        "semesters.create" => Some(respond(&req.id, create_semester(state, req))),
        "semesters.delete" => Some(respond(&req.id, delete_semester(state, req))),
        _ => None,
    }
}
