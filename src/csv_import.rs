use rusqlite::Connection;

use crate::ingest::{IngestReport, SkipEntry};
use crate::merge::{self, MergeOutcome};
use crate::sheet::GradeMap;

const KEY_HEADERS: &[&str] = &["register number", "reg no", "regno"];
const IGNORED_HEADERS: &[&str] = &["name", "student name", "s.no"];

/// Column layout recovered from an explicit CSV header. Unlike the sheet
/// path there is no alignment ambiguity: every non-key, non-name column is
/// taken as a subject column with its header text as the code.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSchema {
    pub key_column: usize,
    pub subject_columns: Vec<(usize, String)>,
}

pub fn parse_header(headers: &csv::StringRecord) -> Option<CsvSchema> {
    let mut key_column: Option<usize> = None;
    let mut subject_columns: Vec<(usize, String)> = Vec::new();

    for (idx, raw) in headers.iter().enumerate() {
        let h = raw.trim();
        if KEY_HEADERS.iter().any(|k| h.eq_ignore_ascii_case(k)) {
            if key_column.is_none() {
                key_column = Some(idx);
            }
        } else if !IGNORED_HEADERS.iter().any(|k| h.eq_ignore_ascii_case(k)) {
            subject_columns.push((idx, h.to_string()));
        }
    }

    key_column.map(|key_column| CsvSchema {
        key_column,
        subject_columns,
    })
}

#[derive(Debug)]
pub enum CsvIngestOutcome {
    Report(IngestReport),
    /// No registration-number column: nothing can be keyed, the whole
    /// import fails.
    MissingKeyColumn,
}

pub fn ingest_csv_text(
    conn: &Connection,
    text: &str,
    semester_id: u32,
) -> anyhow::Result<CsvIngestOutcome> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let Some(schema) = parse_header(&headers) else {
        return Ok(CsvIngestOutcome::MissingKeyColumn);
    };

    let mut report = IngestReport {
        semester_id,
        schema: schema
            .subject_columns
            .iter()
            .map(|(_, code)| code.clone())
            .collect(),
        rows_parsed: 0,
        rows_merged: 0,
        rows_skipped: 0,
        skips: Vec::new(),
    };

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let line_no = row_idx + 1;

        let Some(reg_no) = record.get(schema.key_column).map(str::trim) else {
            continue;
        };
        if reg_no.is_empty() {
            continue;
        }

        // Blank cells are omitted, not recorded as empty grades.
        let mut grades = GradeMap::new();
        for (idx, code) in &schema.subject_columns {
            if let Some(cell) = record.get(*idx) {
                let cell = cell.trim();
                if !cell.is_empty() {
                    grades.insert(code.clone(), cell.to_string());
                }
            }
        }
        if grades.is_empty() {
            continue;
        }

        report.rows_parsed += 1;
        match merge::merge(conn, reg_no, semester_id, &grades)? {
            MergeOutcome::Merged => report.rows_merged += 1,
            MergeOutcome::UnknownStudent => {
                report.rows_skipped += 1;
                report.skips.push(SkipEntry {
                    line_no,
                    reg_no: Some(reg_no.to_string()),
                    reason: "unknown_student".to_string(),
                });
            }
        }
    }

    Ok(CsvIngestOutcome::Report(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn conn_with_student(prefix: &str, reg_no: &str) -> Connection {
        let conn = db::open_db(&temp_workspace(prefix)).expect("open db");
        conn.execute(
            "INSERT INTO students(register_number, name) VALUES(?, ?)",
            [reg_no, "STUDENT"],
        )
        .expect("insert student");
        conn
    }

    #[test]
    fn header_synonyms_pick_the_key_column() {
        for key in ["Register Number", "REG NO", "RegNo"] {
            let headers = csv::StringRecord::from(vec!["S.No", key, "Name", "CS3451"]);
            let schema = parse_header(&headers).expect("schema");
            assert_eq!(schema.key_column, 1);
            assert_eq!(schema.subject_columns, vec![(3, "CS3451".to_string())]);
        }
    }

    #[test]
    fn header_without_key_column_is_rejected() {
        let headers = csv::StringRecord::from(vec!["Name", "CS3451", "MA3451"]);
        assert!(parse_header(&headers).is_none());
    }

    #[test]
    fn imports_rows_keyed_by_registration_number() {
        let conn = conn_with_student("gradesheet-csv-basic", "123456789012");
        let text = "Register Number,Name,CS3451,MA3451\n123456789012,Jane,O,A+\n";

        let out = ingest_csv_text(&conn, text, 4).unwrap();
        let CsvIngestOutcome::Report(report) = out else {
            panic!("expected report");
        };
        assert_eq!(report.rows_merged, 1);

        let rec = db::find_grade_record(&conn, "123456789012", 4)
            .unwrap()
            .expect("record");
        let pairs: Vec<(&str, &str)> = rec
            .results
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(pairs, vec![("CS3451", "O"), ("MA3451", "A+")]);
    }

    #[test]
    fn blank_cells_and_blank_keys_are_omitted() {
        let conn = conn_with_student("gradesheet-csv-blanks", "123456789012");
        let text = "Register Number,CS3451,MA3451\n123456789012,O,\n,A+,B\n";

        let out = ingest_csv_text(&conn, text, 1).unwrap();
        let CsvIngestOutcome::Report(report) = out else {
            panic!("expected report");
        };
        assert_eq!(report.rows_merged, 1);

        let rec = db::find_grade_record(&conn, "123456789012", 1)
            .unwrap()
            .expect("record");
        assert_eq!(rec.results.len(), 1);
        assert!(rec.results.get("MA3451").is_none());
    }

    #[test]
    fn missing_key_column_fails_the_whole_import() {
        let conn = conn_with_student("gradesheet-csv-nokey", "123456789012");
        let text = "Name,CS3451\nJane,O\n";
        let out = ingest_csv_text(&conn, text, 1).unwrap();
        assert!(matches!(out, CsvIngestOutcome::MissingKeyColumn));
        assert!(db::find_grade_record(&conn, "123456789012", 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_students_are_reported_per_row() {
        let conn = conn_with_student("gradesheet-csv-unknown", "123456789012");
        let text = "Register Number,CS3451\n123456789012,O\n999999999999,A\n";
        let out = ingest_csv_text(&conn, text, 1).unwrap();
        let CsvIngestOutcome::Report(report) = out else {
            panic!("expected report");
        };
        assert_eq!(report.rows_merged, 1);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.skips[0].reason, "unknown_student");
    }
}
