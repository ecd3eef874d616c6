use rusqlite::Connection;
use serde::Serialize;

use crate::merge::{self, MergeOutcome};
use crate::sheet::{self, RowOutcome, RowSkip, HEADER_SCAN_CAP};
use crate::vocab;

pub const DEFAULT_SEMESTER: u32 = 1;

/// Per-upload batch report. Row-level failures never abort the batch; they
/// are collected here so callers can see how many rows were dropped and why.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub semester_id: u32,
    pub schema: Vec<String>,
    pub rows_parsed: usize,
    pub rows_merged: usize,
    pub rows_skipped: usize,
    pub skips: Vec<SkipEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipEntry {
    pub line_no: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg_no: Option<String>,
    pub reason: String,
}

/// Semester precedence: caller hint, then a "Semester No : N" annotation in
/// the sheet itself, then 1.
pub fn resolve_semester(hint: Option<u32>, lines: &[String]) -> u32 {
    hint.or_else(|| vocab::detect_semester(lines))
        .unwrap_or(DEFAULT_SEMESTER)
}

/// Parse extracted sheet lines and merge every alignable data row.
///
/// Header detection and row alignment are heuristic; a sheet with no
/// detectable header still yields single-fact rows through the fallback
/// path. Each row is merged independently, continue-on-error.
pub fn ingest_sheet_lines(
    conn: &Connection,
    lines: &[String],
    semester_hint: Option<u32>,
) -> anyhow::Result<IngestReport> {
    let semester_id = resolve_semester(semester_hint, lines);
    let schema = sheet::detect_header(lines, HEADER_SCAN_CAP);

    let mut report = IngestReport {
        semester_id,
        schema: schema.clone(),
        rows_parsed: 0,
        rows_merged: 0,
        rows_skipped: 0,
        skips: Vec::new(),
    };

    for (line_no, line) in lines.iter().enumerate() {
        match sheet::align_row(line, &schema) {
            RowOutcome::Parsed(row) => {
                report.rows_parsed += 1;
                match merge::merge(conn, &row.reg_no, semester_id, &row.grades)? {
                    MergeOutcome::Merged => report.rows_merged += 1,
                    MergeOutcome::UnknownStudent => {
                        report.rows_skipped += 1;
                        report.skips.push(SkipEntry {
                            line_no,
                            reg_no: Some(row.reg_no),
                            reason: "unknown_student".to_string(),
                        });
                    }
                }
            }
            // Lines without a registration number are headers/titles/noise,
            // not failed rows.
            RowOutcome::Skipped {
                reason: RowSkip::NotADataRow,
                ..
            } => {}
            RowOutcome::Skipped { reg_no, reason } => {
                report.rows_skipped += 1;
                report.skips.push(SkipEntry {
                    line_no,
                    reg_no,
                    reason: reason.code().to_string(),
                });
            }
        }
    }

    Ok(report)
}
