use crate::csv_import::{self, CsvIngestOutcome};
use crate::db;
use crate::export::{self, SheetCsv};
use crate::extract;
use crate::ingest;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn record_json(rec: &db::GradeRecord) -> serde_json::Value {
    json!({
        "studentRegNo": rec.student_reg_no,
        "semesterId": rec.semester_id,
        "results": rec.results,
    })
}

fn records_json(records: &[db::GradeRecord]) -> serde_json::Value {
    serde_json::Value::Array(records.iter().map(record_json).collect())
}

/// Sheet-shaped requests carry either the extracted lines directly or a path
/// to a plain-text dump of them. The document-to-text conversion itself is
/// external to this daemon.
fn read_sheet_lines(req: &Request) -> Result<Vec<String>, serde_json::Value> {
    if let Some(arr) = req.params.get("lines").and_then(|v| v.as_array()) {
        let mut lines = Vec::with_capacity(arr.len());
        for v in arr {
            match v.as_str() {
                Some(s) => lines.push(s.to_string()),
                None => {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        "params.lines must be an array of strings",
                        None,
                    ))
                }
            }
        }
        return Ok(lines);
    }

    if let Some(path) = req.params.get("textPath").and_then(|v| v.as_str()) {
        return match std::fs::read(PathBuf::from(path)) {
            Ok(bytes) => Ok(extract::lines_from_bytes(&bytes)),
            Err(e) => Err(err(
                &req.id,
                "read_failed",
                format!("failed to read {}: {}", path, e),
                None,
            )),
        };
    }

    Err(err(
        &req.id,
        "bad_params",
        "expected params.lines or params.textPath",
        None,
    ))
}

fn semester_param(req: &Request, key: &str) -> Option<u32> {
    req.params.get(key).and_then(|v| v.as_u64()).map(|v| v as u32)
}

fn handle_ingest_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let lines = match read_sheet_lines(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester_hint = semester_param(req, "semesterId");

    if extract::is_empty_extraction(&lines) {
        // Likely a scanned image. Not an error: report it and return the
        // unchanged record set.
        let records = match db::all_grade_records(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        return ok(
            &req.id,
            json!({
                "records": records_json(&records),
                "report": null,
                "diagnostic": "empty_extraction",
            }),
        );
    }

    let report = match ingest::ingest_sheet_lines(conn, &lines, semester_hint) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "ingest_failed", format!("{e:?}"), None),
    };
    let records = match db::all_grade_records(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    ok(
        &req.id,
        json!({
            "records": records_json(&records),
            "report": report,
        }),
    )
}

fn handle_ingest_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(semester_id) = semester_param(req, "semesterId") else {
        return err(&req.id, "bad_params", "missing semesterId", None);
    };

    let text = if let Some(t) = req.params.get("text").and_then(|v| v.as_str()) {
        t.to_string()
    } else if let Some(path) = req.params.get("csvPath").and_then(|v| v.as_str()) {
        match std::fs::read(PathBuf::from(path)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(e) => {
                return err(
                    &req.id,
                    "read_failed",
                    format!("failed to read {}: {}", path, e),
                    None,
                )
            }
        }
    } else {
        return err(
            &req.id,
            "bad_params",
            "expected params.text or params.csvPath",
            None,
        );
    };

    let outcome = match csv_import::ingest_csv_text(conn, &text, semester_id) {
        Ok(o) => o,
        Err(e) => return err(&req.id, "ingest_failed", format!("{e:?}"), None),
    };
    let report = match outcome {
        CsvIngestOutcome::Report(r) => r,
        CsvIngestOutcome::MissingKeyColumn => {
            return err(
                &req.id,
                "missing_key_column",
                "CSV must contain a Register Number column",
                None,
            )
        }
    };

    let records = match db::all_grade_records(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    ok(
        &req.id,
        json!({
            "records": records_json(&records),
            "report": report,
        }),
    )
}

fn handle_sheet_to_csv(_state: &mut AppState, req: &Request) -> serde_json::Value {
    // No workspace needed: this conversion requires no student
    // pre-registration and touches no store.
    let lines = match read_sheet_lines(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match export::sheet_to_csv_text(&lines) {
        SheetCsv::Csv(text) => ok(&req.id, json!({ "kind": "csv", "text": text })),
        SheetCsv::Diagnostic(text) => ok(&req.id, json!({ "kind": "diagnostic", "text": text })),
    }
}

fn handle_list_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(reg_no) = req.params.get("registerNumber").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing registerNumber", None);
    };

    match db::grade_records_for_student(conn, reg_no) {
        Ok(records) => ok(&req.id, json!({ "records": records_json(&records) })),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn handle_export_consolidated(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = req.params.get("outPath").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match export::export_consolidated(conn, &PathBuf::from(out_path)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path,
                "sheetNames": summary.sheet_names,
                "rowCount": summary.row_count,
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.ingestSheet" => Some(handle_ingest_sheet(state, req)),
        "grades.ingestCsv" => Some(handle_ingest_csv(state, req)),
        "grades.sheetToCsv" => Some(handle_sheet_to_csv(state, req)),
        "grades.listForStudent" => Some(handle_list_for_student(state, req)),
        "grades.exportConsolidated" => Some(handle_export_consolidated(state, req)),
        _ => None,
    }
}
