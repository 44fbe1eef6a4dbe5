use crate::calc::{AssignmentInput, AssignmentRecord, GradeType};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "marks.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(name, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            total_mark REAL NOT NULL DEFAULT 0,
            sync_subject INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            UNIQUE(semester_id, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_semester ON subjects(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            assessment TEXT NOT NULL,
            grade_type TEXT NOT NULL DEFAULT 'numeric',
            weighted_mark REAL,
            mark_weight REAL,
            unweighted_mark REAL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    ensure_assignments_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_subject ON assignments(subject_id)",
        [],
    )?;

    // One exam per subject.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS examinations(
            subject_id TEXT PRIMARY KEY,
            exam_mark REAL NOT NULL DEFAULT 0,
            exam_weight REAL NOT NULL DEFAULT 100,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    // Kept apart from examinations so PS can be toggled without an exam row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_settings(
            subject_id TEXT PRIMARY KEY,
            ps_enabled INTEGER NOT NULL DEFAULT 0,
            ps_factor REAL NOT NULL DEFAULT 40,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_assignments_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assignments", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE assignments ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn subject_exists(conn: &Connection, subject_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

/// A stored grade type that is not one of the known codes is a broken row,
/// not a numeric assignment.
fn grade_type_column(raw: &str, idx: usize) -> rusqlite::Result<GradeType> {
    GradeType::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown grade type {:?}", raw).into(),
        )
    })
}

#[derive(Debug, Clone)]
pub struct StoredAssignment {
    pub id: String,
    pub sort_order: i64,
    pub updated_at: Option<String>,
    pub input: AssignmentInput,
}

pub fn load_assignments(
    conn: &Connection,
    subject_id: &str,
) -> rusqlite::Result<Vec<StoredAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, assessment, grade_type, weighted_mark, mark_weight, sort_order, updated_at
         FROM assignments
         WHERE subject_id = ?
         ORDER BY sort_order, assessment",
    )?;
    let rows = stmt
        .query_map([subject_id], |r| {
            let grade_type: String = r.get(2)?;
            Ok(StoredAssignment {
                id: r.get(0)?,
                sort_order: r.get(5)?,
                updated_at: r.get(6)?,
                input: AssignmentInput {
                    assessment_name: r.get(1)?,
                    grade_type: grade_type_column(&grade_type, 2)?,
                    weighted_mark: r.get(3)?,
                    mark_weight: r.get(4)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> rusqlite::Result<Option<(String, AssignmentInput)>> {
    conn.query_row(
        "SELECT subject_id, assessment, grade_type, weighted_mark, mark_weight
         FROM assignments WHERE id = ?",
        [assignment_id],
        |r| {
            let grade_type: String = r.get(2)?;
            Ok((
                r.get(0)?,
                AssignmentInput {
                    assessment_name: r.get(1)?,
                    grade_type: grade_type_column(&grade_type, 2)?,
                    weighted_mark: r.get(3)?,
                    mark_weight: r.get(4)?,
                },
            ))
        },
    )
    .optional()
}

/// Inserts a derived record. The stored unweighted mark is a display cache at
/// 4 decimal places; summaries always re-derive from the inputs.
pub fn insert_assignment(
    conn: &Connection,
    subject_id: &str,
    record: &AssignmentRecord,
) -> rusqlite::Result<String> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM assignments WHERE subject_id = ?",
        [subject_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assignments(
            id, subject_id, assessment, grade_type, weighted_mark, mark_weight,
            unweighted_mark, sort_order, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            subject_id,
            &record.assessment_name,
            record.grade_type().code(),
            record.weighted_mark(),
            record.mark_weight(),
            record.unweighted_mark().map(|v| crate::calc::round_to(v, 4)),
            sort_order,
            now_rfc3339(),
        ),
    )?;
    Ok(id)
}

pub fn update_assignment(
    conn: &Connection,
    assignment_id: &str,
    record: &AssignmentRecord,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE assignments
         SET assessment = ?, grade_type = ?, weighted_mark = ?, mark_weight = ?,
             unweighted_mark = ?, updated_at = ?
         WHERE id = ?",
        (
            &record.assessment_name,
            record.grade_type().code(),
            record.weighted_mark(),
            record.mark_weight(),
            record.unweighted_mark().map(|v| crate::calc::round_to(v, 4)),
            now_rfc3339(),
            assignment_id,
        ),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredExam {
    pub exam_mark: f64,
    pub exam_weight: f64,
}

pub fn load_exam(conn: &Connection, subject_id: &str) -> rusqlite::Result<Option<StoredExam>> {
    conn.query_row(
        "SELECT exam_mark, exam_weight FROM examinations WHERE subject_id = ?",
        [subject_id],
        |r| {
            Ok(StoredExam {
                exam_mark: r.get(0)?,
                exam_weight: r.get(1)?,
            })
        },
    )
    .optional()
}

pub fn upsert_exam(conn: &Connection, subject_id: &str, exam: &StoredExam) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO examinations(subject_id, exam_mark, exam_weight) VALUES(?, ?, ?)
         ON CONFLICT(subject_id) DO UPDATE SET
           exam_mark = excluded.exam_mark,
           exam_weight = excluded.exam_weight",
        (subject_id, exam.exam_mark, exam.exam_weight),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsSettings {
    pub ps_enabled: bool,
    pub ps_factor: f64,
}

pub fn load_exam_settings(
    conn: &Connection,
    subject_id: &str,
) -> rusqlite::Result<Option<PsSettings>> {
    conn.query_row(
        "SELECT ps_enabled, ps_factor FROM exam_settings WHERE subject_id = ?",
        [subject_id],
        |r| {
            Ok(PsSettings {
                ps_enabled: r.get::<_, i64>(0)? != 0,
                ps_factor: r.get(1)?,
            })
        },
    )
    .optional()
}

pub fn upsert_exam_settings(
    conn: &Connection,
    subject_id: &str,
    settings: &PsSettings,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO exam_settings(subject_id, ps_enabled, ps_factor) VALUES(?, ?, ?)
         ON CONFLICT(subject_id) DO UPDATE SET
           ps_enabled = excluded.ps_enabled,
           ps_factor = excluded.ps_factor",
        (
            subject_id,
            if settings.ps_enabled { 1_i64 } else { 0_i64 },
            settings.ps_factor,
        ),
    )?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
