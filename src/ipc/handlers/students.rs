use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_students_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let reg_no = match req.params.get("registerNumber").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing registerNumber", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let roll_number = req
        .params
        .get("rollNumber")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());
    let parent_whatsapp = req
        .params
        .get("parentWhatsApp")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(register_number, roll_number, name, parent_whatsapp, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(register_number)
         DO UPDATE SET roll_number = excluded.roll_number,
                       name = excluded.name,
                       parent_whatsapp = excluded.parent_whatsapp,
                       updated_at = excluded.updated_at",
        rusqlite::params![reg_no, roll_number, name, parent_whatsapp, now],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({
            "student": {
                "registerNumber": reg_no,
                "rollNumber": roll_number,
                "name": name,
                "parentWhatsApp": parent_whatsapp,
            }
        }),
    )
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT register_number, roll_number, name, parent_whatsapp
         FROM students ORDER BY register_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "registerNumber": row.get::<_, String>(0)?,
                "rollNumber": row.get::<_, Option<String>>(1)?,
                "name": row.get::<_, String>(2)?,
                "parentWhatsApp": row.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let reg_no = match req.params.get("registerNumber").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing registerNumber", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM students WHERE register_number = ?",
            [&reg_no],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Marks and attendance go with the student; semester grade records are
    // deliberately retained (the export renders them with an Unknown name).
    for table in [
        "mark_records",
        "lab_mark_records",
        "attendance_records",
        "master_attendance_records",
    ] {
        let sql = format!("DELETE FROM {} WHERE student_reg_no = ?", table);
        if let Err(e) = tx.execute(&sql, [&reg_no]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE register_number = ?", [&reg_no]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.save" => Some(handle_students_save(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
