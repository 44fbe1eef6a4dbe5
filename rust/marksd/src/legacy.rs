//! Reader for the per-year JSON files kept by older releases
//! (`data/<year>.json`). Two key spellings exist in the wild: the current
//! snake_case keys and the title-case keys written before them.

use crate::calc::{AssignmentInput, GradeType};
use anyhow::{anyhow, Context};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct LegacyYear {
    pub semesters: Vec<LegacySemester>,
}

#[derive(Debug, Clone)]
pub struct LegacySemester {
    pub name: String,
    pub subjects: Vec<LegacySubject>,
}

#[derive(Debug, Clone)]
pub struct LegacySubject {
    pub code: String,
    pub name: String,
    pub total_mark: f64,
    pub sync_subject: bool,
    pub assignments: Vec<AssignmentInput>,
    pub exam: Option<LegacyExam>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyExam {
    pub exam_mark: f64,
    pub exam_weight: f64,
}

pub fn parse_year_json(path: &Path) -> anyhow::Result<LegacyYear> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    parse_year_json_str(&text)
}

pub fn parse_year_json_str(text: &str) -> anyhow::Result<LegacyYear> {
    let root: Value = serde_json::from_str(text).context("year file is not valid JSON")?;
    let Some(root) = root.as_object() else {
        return Err(anyhow!("year file must be an object keyed by semester"));
    };

    let mut semesters = Vec::new();
    for (sem_name, subjects) in root {
        // Older writers skipped non-dict semesters; do the same.
        let Some(subjects) = subjects.as_object() else {
            continue;
        };
        let mut out = Vec::new();
        for (code, raw) in subjects {
            let Some(obj) = raw.as_object() else {
                return Err(anyhow!("subject {} in {} is not an object", code, sem_name));
            };
            out.push(parse_subject(code, obj)?);
        }
        semesters.push(LegacySemester {
            name: sem_name.clone(),
            subjects: out,
        });
    }
    Ok(LegacyYear { semesters })
}

fn field<'a>(obj: &'a Map<String, Value>, current: &str, legacy: &str) -> Option<&'a Value> {
    obj.get(current).or_else(|| obj.get(legacy))
}

fn as_number(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn parse_subject(code: &str, obj: &Map<String, Value>) -> anyhow::Result<LegacySubject> {
    let name = field(obj, "subject_name", "Subject Name")
        .and_then(|v| v.as_str())
        .unwrap_or("N/A")
        .to_string();
    let total_mark = as_number(field(obj, "total_mark", "Total Mark")).unwrap_or(0.0);
    let sync_subject = field(obj, "sync_subject", "Sync Subject")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut assignments = Vec::new();
    if let Some(list) = field(obj, "assignments", "Assignments") {
        let Some(list) = list.as_array() else {
            return Err(anyhow!("assignments of {} must be a list", code));
        };
        for a in list {
            let Some(a) = a.as_object() else {
                return Err(anyhow!("assignment entry of {} is not an object", code));
            };
            assignments.push(parse_assignment(a));
        }
    }

    let exam = field(obj, "examinations", "Examinations")
        .and_then(|v| v.as_object())
        .map(|e| LegacyExam {
            exam_mark: as_number(field(e, "exam_mark", "Exam Mark")).unwrap_or(0.0),
            exam_weight: as_number(field(e, "exam_weight", "Exam Weight")).unwrap_or(100.0),
        });

    Ok(LegacySubject {
        code: code.to_string(),
        name,
        total_mark,
        sync_subject,
        assignments,
        exam,
    })
}

fn parse_assignment(obj: &Map<String, Value>) -> AssignmentInput {
    let assessment_name = field(obj, "subject_assessment", "Subject Assessment")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut grade_type = field(obj, "grade_type", "Grade Type")
        .and_then(|v| v.as_str())
        .and_then(GradeType::parse)
        .unwrap_or(GradeType::Numeric);

    // Pass/fail used to be stored in the weighted mark itself.
    let raw_weighted = field(obj, "weighted_mark", "Weighted Mark");
    if let Some(gt) = raw_weighted
        .and_then(|v| v.as_str())
        .and_then(GradeType::parse)
        .filter(|gt| *gt != GradeType::Numeric)
    {
        grade_type = gt;
    }

    AssignmentInput {
        assessment_name,
        grade_type,
        weighted_mark: as_number(raw_weighted),
        mark_weight: as_number(field(obj, "mark_weight", "Mark Weight")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_current_keys() {
        let text = r#"{
            "Autumn": {
                "CSCI251": {
                    "subject_name": "Advanced Programming",
                    "total_mark": 0,
                    "sync_subject": true,
                    "assignments": [
                        {"subject_assessment": "Quiz 1", "weighted_mark": 8.5, "mark_weight": 10, "grade_type": "numeric"},
                        {"subject_assessment": "Lab", "weighted_mark": "S", "mark_weight": null, "grade_type": "S"}
                    ],
                    "examinations": {"exam_mark": 0, "exam_weight": 60}
                }
            }
        }"#;
        let year = parse_year_json_str(text).expect("parse");
        assert_eq!(year.semesters.len(), 1);
        let sem = &year.semesters[0];
        assert_eq!(sem.name, "Autumn");
        let subj = &sem.subjects[0];
        assert_eq!(subj.code, "CSCI251");
        assert_eq!(subj.name, "Advanced Programming");
        assert!(subj.sync_subject);
        assert_eq!(subj.assignments.len(), 2);
        assert_eq!(subj.assignments[0].weighted_mark, Some(8.5));
        assert_eq!(subj.assignments[0].mark_weight, Some(10.0));
        assert_eq!(subj.assignments[1].grade_type, GradeType::Satisfactory);
        assert_eq!(subj.assignments[1].weighted_mark, None);
        assert_eq!(
            subj.exam,
            Some(LegacyExam {
                exam_mark: 0.0,
                exam_weight: 60.0
            })
        );
    }

    #[test]
    fn reads_title_case_keys() {
        let text = r#"{
            "Spring": {
                "MATH101": {
                    "Subject Name": "Calculus",
                    "Total Mark": 72.5,
                    "Assignments": [
                        {"Subject Assessment": "Midterm", "Weighted Mark": "22.5", "Mark Weight": 30},
                        {"Subject Assessment": "Attendance", "Weighted Mark": "U"}
                    ]
                }
            }
        }"#;
        let year = parse_year_json_str(text).expect("parse");
        let subj = &year.semesters[0].subjects[0];
        assert_eq!(subj.name, "Calculus");
        assert_eq!(subj.total_mark, 72.5);
        assert!(!subj.sync_subject);
        assert!(subj.exam.is_none());
        let midterm = &subj.assignments[0];
        assert_eq!(midterm.grade_type, GradeType::Numeric);
        assert_eq!(midterm.weighted_mark, Some(22.5));
        assert_eq!(midterm.mark_weight, Some(30.0));
        assert_eq!(subj.assignments[1].grade_type, GradeType::Unsatisfactory);
    }

    #[test]
    fn unknown_grade_type_falls_back_to_numeric() {
        let text = r#"{"S1": {"X": {"assignments": [
            {"subject_assessment": "Essay", "weighted_mark": 12, "mark_weight": 20, "grade_type": "letter"}
        ]}}}"#;
        let year = parse_year_json_str(text).expect("parse");
        let a = &year.semesters[0].subjects[0].assignments[0];
        assert_eq!(a.grade_type, GradeType::Numeric);
        assert_eq!(year.semesters[0].subjects[0].name, "N/A");
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(parse_year_json_str("[1, 2]").is_err());
        assert!(parse_year_json_str("not json").is_err());
    }
}
