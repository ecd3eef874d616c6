use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

/// Marks and attendance percentages live on a 0..=100 scale; anything else
/// is rejected before it reaches the store.
fn value_in_range(v: f64) -> bool {
    (0.0..=100.0).contains(&v)
}

struct UpsertSpec {
    table: &'static str,
    value_column: &'static str,
    /// Attendance master records have no subject dimension.
    with_subject: bool,
}

const MARKS: UpsertSpec = UpsertSpec {
    table: "mark_records",
    value_column: "marks",
    with_subject: true,
};
const LAB_MARKS: UpsertSpec = UpsertSpec {
    table: "lab_mark_records",
    value_column: "marks",
    with_subject: true,
};
const ATTENDANCE: UpsertSpec = UpsertSpec {
    table: "attendance_records",
    value_column: "percentage",
    with_subject: true,
};
const MASTER_ATTENDANCE: UpsertSpec = UpsertSpec {
    table: "master_attendance_records",
    value_column: "percentage",
    with_subject: false,
};

fn handle_upsert(state: &mut AppState, req: &Request, spec: &UpsertSpec) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(reg_no) = req.params.get("studentRegNo").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentRegNo", None);
    };
    let subject_id = req.params.get("subjectId").and_then(|v| v.as_str());
    if spec.with_subject && subject_id.is_none() {
        return err(&req.id, "bad_params", "missing subjectId", None);
    }
    let Some(semester_id) = req.params.get("semesterId").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing semesterId", None);
    };
    let Some(internal_id) = req.params.get("internalId").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing internalId", None);
    };
    let Some(value) = req.params.get(spec.value_column).and_then(|v| v.as_f64()) else {
        return err(
            &req.id,
            "bad_params",
            format!("missing {}", spec.value_column),
            None,
        );
    };

    if !value_in_range(value) {
        return err(
            &req.id,
            "out_of_range",
            format!("{} must be between 0 and 100", spec.value_column),
            Some(json!({ "value": value })),
        );
    }

    match db::student_exists(conn, reg_no) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "unknown_student", "student not registered", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }

    let result = if spec.with_subject {
        let sql = format!(
            "INSERT INTO {t}(id, student_reg_no, subject_id, semester_id, internal_id, {v})
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_reg_no, subject_id, semester_id, internal_id)
             DO UPDATE SET {v} = excluded.{v}",
            t = spec.table,
            v = spec.value_column
        );
        conn.execute(
            &sql,
            rusqlite::params![
                Uuid::new_v4().to_string(),
                reg_no,
                subject_id,
                semester_id,
                internal_id,
                value
            ],
        )
    } else {
        let sql = format!(
            "INSERT INTO {t}(id, student_reg_no, semester_id, internal_id, {v})
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_reg_no, semester_id, internal_id)
             DO UPDATE SET {v} = excluded.{v}",
            t = spec.table,
            v = spec.value_column
        );
        conn.execute(
            &sql,
            rusqlite::params![
                Uuid::new_v4().to_string(),
                reg_no,
                semester_id,
                internal_id,
                value
            ],
        )
    };

    if let Err(e) = result {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": spec.table })),
        );
    }

    let mut saved = json!({
        "studentRegNo": reg_no,
        "subjectId": subject_id,
        "semesterId": semester_id,
        "internalId": internal_id,
    });
    saved[spec.value_column] = json!(value);
    ok(&req.id, saved)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.save" => Some(handle_upsert(state, req, &MARKS)),
        "marks.labSave" => Some(handle_upsert(state, req, &LAB_MARKS)),
        "attendance.save" => Some(handle_upsert(state, req, &ATTENDANCE)),
        "attendance.masterSave" => Some(handle_upsert(state, req, &MASTER_ATTENDANCE)),
        _ => None,
    }
}
