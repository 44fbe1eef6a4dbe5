mod test_support;

use serde_json::json;
use test_support::{num, spawn_sidecar, str_field, temp_dir};

const YEAR_FILE: &str = r#"{
    "Autumn": {
        "CSCI251": {
            "subject_name": "Advanced Programming",
            "total_mark": 0,
            "sync_subject": true,
            "assignments": [
                {"subject_assessment": "Quiz 1", "weighted_mark": 15, "mark_weight": 20, "grade_type": "numeric"},
                {"subject_assessment": "Project", "weighted_mark": "25", "mark_weight": 30},
                {"subject_assessment": "Lab", "weighted_mark": "S", "grade_type": "S"}
            ],
            "examinations": {"exam_mark": 80, "exam_weight": 50}
        }
    },
    "Spring": {
        "MATH101": {
            "Subject Name": "Calculus",
            "Total Mark": 0,
            "Assignments": [
                {"Subject Assessment": "Midterm", "Weighted Mark": 30, "Mark Weight": 40}
            ]
        }
    }
}"#;

#[test]
fn imports_year_file_and_reports_existing_subjects() {
    let data_dir = temp_dir("marksd-legacy-data");
    let year_path = data_dir.join("2023.json");
    std::fs::write(&year_path, YEAR_FILE).expect("write year file");
    let workspace = temp_dir("marksd-legacy-ws");

    let mut sidecar = spawn_sidecar();
    sidecar.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let result = sidecar.request_ok(
        "legacy.importYearJson",
        json!({ "path": year_path.to_string_lossy() }),
    );
    assert_eq!(result["year"], json!("2023"));
    assert_eq!(result["semestersCreated"], json!(2));
    assert_eq!(result["subjectsImported"], json!(2));
    assert_eq!(result["assignmentsImported"], json!(4));

    let semesters = sidecar.request_ok("semesters.list", json!({}));
    let autumn = semesters["semesters"]
        .as_array()
        .and_then(|list| list.iter().find(|s| s["name"] == json!("Autumn")))
        .cloned()
        .expect("autumn semester");
    assert_eq!(autumn["year"], json!("2023"));

    let subjects = sidecar.request_ok(
        "subjects.list",
        json!({ "semesterId": str_field(&autumn, "id") }),
    );
    let subject = &subjects["subjects"][0];
    assert_eq!(subject["code"], json!("CSCI251"));
    assert_eq!(subject["syncSubject"], json!(true));
    assert_eq!(subject["assignmentCount"], json!(3));

    let summary = sidecar.request_ok(
        "subjects.summary",
        json!({ "subjectId": str_field(subject, "id") }),
    );
    assert_eq!(num(&summary, &["aggregate", "assignmentWeightedSum"]), Some(40.0));
    assert_eq!(num(&summary, &["aggregate", "assignmentWeightPercent"]), Some(50.0));
    assert_eq!(num(&summary, &["exam", "examMark"]), Some(80.0));
    assert_eq!(num(&summary, &["standing", "average"]), Some(80.0));
    assert_eq!(summary["assignments"][2]["gradeType"], json!("S"));

    // Second run finds every subject already present.
    let again = sidecar.request_ok(
        "legacy.importYearJson",
        json!({ "path": year_path.to_string_lossy(), "year": "2023" }),
    );
    assert_eq!(again["semestersCreated"], json!(0));
    assert_eq!(again["subjectsImported"], json!(0));
    assert_eq!(again["skipped"].as_array().map(|s| s.len()), Some(2));

    sidecar.shutdown();
    let _ = std::fs::remove_dir_all(data_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_year_file_changes_nothing() {
    let data_dir = temp_dir("marksd-legacy-bad");
    let year_path = data_dir.join("2022.json");
    std::fs::write(&year_path, r#"{"Autumn": {"X": {"assignments": 5}}}"#)
        .expect("write year file");
    let workspace = temp_dir("marksd-legacy-bad-ws");

    let mut sidecar = spawn_sidecar();
    sidecar.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        sidecar.request_err(
            "legacy.importYearJson",
            json!({ "path": year_path.to_string_lossy() }),
        ),
        "import_failed"
    );
    let semesters = sidecar.request_ok("semesters.list", json!({}));
    assert_eq!(semesters["semesters"], json!([]));

    sidecar.shutdown();
    let _ = std::fs::remove_dir_all(data_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
