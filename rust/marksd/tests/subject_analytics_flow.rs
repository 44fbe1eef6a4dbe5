mod test_support;

use serde_json::json;
use test_support::{num, seed_subject, spawn_sidecar};

fn approx(a: Option<f64>, b: f64) -> bool {
    a.map(|a| (a - b).abs() < 1e-6).unwrap_or(false)
}

#[test]
fn analytics_follow_entered_marks_then_the_recorded_total() {
    let mut sidecar = spawn_sidecar();
    let (workspace, subject_id) = seed_subject(&mut sidecar, "marksd-analytics");

    let empty = sidecar.request_ok("subjects.analytics", json!({ "subjectId": subject_id }));
    assert_eq!(empty["hasData"], json!(false));
    assert!(empty["analytics"]["metrics"].is_null());
    assert!(empty["analytics"]["trend"].is_null());
    assert_eq!(empty["analytics"]["gradeStatus"]["source"], json!("no_marks"));

    for (name, wm, w) in [("Quiz 1", 8.0, 10.0), ("Quiz 2", 14.0, 20.0), ("Project", 19.0, 20.0)] {
        sidecar.request_ok(
            "assignments.create",
            json!({ "subjectId": subject_id, "assessment": name, "weightedMark": wm, "markWeight": w }),
        );
    }
    sidecar.request_ok(
        "assignments.create",
        json!({ "subjectId": subject_id, "assessment": "Lab", "gradeType": "S" }),
    );
    sidecar.request_ok(
        "assignments.create",
        json!({ "subjectId": subject_id, "assessment": "Final report", "markWeight": 10 }),
    );

    let result = sidecar.request_ok("subjects.analytics", json!({ "subjectId": subject_id }));
    assert_eq!(result["hasData"], json!(true));
    assert_eq!(result["code"], json!("CSCI251"));
    let a = &result["analytics"];
    assert_eq!(a["marks"], json!([8.0, 14.0, 19.0]));
    assert_eq!(a["scoredCount"], json!(3));
    assert!(approx(num(a, &["weightTotal"]), 60.0));
    assert!(approx(num(a, &["remainingWeight"]), 40.0));

    // The blank report still counts its weight: 41 over 60.
    assert_eq!(a["gradeStatus"]["source"], json!("assignments"));
    assert!(approx(num(a, &["gradeStatus", "gradeValue"]), 41.0 / 60.0 * 100.0));
    assert_eq!(a["gradeStatus"]["hasTotalMark"], json!(false));

    assert_eq!(a["markingScale"]["isSmallScale"], json!(true));
    assert!(approx(num(a, &["markingScale", "maxMark"]), 19.0));
    assert_eq!(
        a["distribution"],
        json!({ "highDistinction": 1, "distinction": 1, "credit": 1, "pass": 0, "fail": 0 })
    );
    assert!(approx(num(a, &["metrics", "average"]), 41.0 / 3.0));
    assert!(approx(num(a, &["metrics", "highest"]), 19.0));
    assert_eq!(a["trend"]["direction"], json!("improving"));
    assert!(approx(num(a, &["trend", "change"]), 11.0));

    // No total recorded yet, so every target is still ahead.
    let targets = a["progressToTargets"].as_array().expect("targets");
    assert_eq!(targets.len(), 4);
    assert!(targets.iter().all(|t| t["status"] == json!("needs_work")));

    sidecar.request_ok(
        "subjects.update",
        json!({ "subjectId": subject_id, "patch": { "totalMark": 78 } }),
    );
    let result = sidecar.request_ok("subjects.analytics", json!({ "subjectId": subject_id }));
    let a = &result["analytics"];
    assert_eq!(a["gradeStatus"]["source"], json!("final_grade"));
    assert_eq!(a["gradeStatus"]["hasTotalMark"], json!(true));
    assert_eq!(a["gradeStatus"]["gradeBand"], json!("distinction"));
    assert!(approx(num(a, &["gradeStatus", "progress"]), 0.78));
    let targets = a["progressToTargets"].as_array().expect("targets");
    assert_eq!(targets[2]["band"], json!("distinction"));
    assert_eq!(targets[2]["achieved"], json!(true));
    assert_eq!(targets[3]["band"], json!("high_distinction"));
    assert_eq!(targets[3]["status"], json!("almost_there"));

    let summary = sidecar.request_ok("subjects.summary", json!({ "subjectId": subject_id }));
    assert_eq!(summary["gradeStatus"]["source"], json!("final_grade"));

    assert_eq!(
        sidecar.request_err("subjects.analytics", json!({ "subjectId": "missing" })),
        "not_found"
    );

    sidecar.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
}
