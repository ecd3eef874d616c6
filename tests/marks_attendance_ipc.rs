mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn marks_upsert_validates_range_and_updates_in_place() {
    let workspace = temp_dir("gradesheet-marks-ipc");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({ "registerNumber": "123456789012", "name": "JANE" }),
    );

    let base = json!({
        "studentRegNo": "123456789012",
        "subjectId": "CS3451",
        "semesterId": 4,
        "internalId": 1,
    });

    let mut over = base.clone();
    over["marks"] = json!(104.5);
    let _ = request_err(&mut stdin, &mut reader, "3", "marks.save", over, "out_of_range");

    let mut first = base.clone();
    first["marks"] = json!(88.0);
    let saved = request_ok(&mut stdin, &mut reader, "4", "marks.save", first);
    assert_eq!(saved["marks"].as_f64(), Some(88.0));

    // Same (student, subject, semester, internal) key: update, not duplicate.
    let mut second = base.clone();
    second["marks"] = json!(92.0);
    let saved = request_ok(&mut stdin, &mut reader, "5", "marks.save", second);
    assert_eq!(saved["marks"].as_f64(), Some(92.0));
}

#[test]
fn marks_for_unregistered_students_are_rejected() {
    let workspace = temp_dir("gradesheet-marks-unknown-ipc");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "marks.save",
        json!({
            "studentRegNo": "999999999999",
            "subjectId": "CS3451",
            "semesterId": 1,
            "internalId": 1,
            "marks": 50.0,
        }),
        "unknown_student",
    );
}

#[test]
fn attendance_variants_share_the_range_rule() {
    let workspace = temp_dir("gradesheet-attendance-ipc");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({ "registerNumber": "123456789012", "name": "JANE" }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.save",
        json!({
            "studentRegNo": "123456789012",
            "subjectId": "CS3451",
            "semesterId": 4,
            "internalId": 2,
            "percentage": 91.5,
        }),
    );
    assert_eq!(saved["percentage"].as_f64(), Some(91.5));

    // Master attendance has no subject dimension.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.masterSave",
        json!({
            "studentRegNo": "123456789012",
            "semesterId": 4,
            "internalId": 2,
            "percentage": 85.0,
        }),
    );
    assert_eq!(saved["percentage"].as_f64(), Some(85.0));

    let _ = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.masterSave",
        json!({
            "studentRegNo": "123456789012",
            "semesterId": 4,
            "internalId": 2,
            "percentage": -1.0,
        }),
        "out_of_range",
    );
}
