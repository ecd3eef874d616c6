use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::sheet::GradeMap;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gradesheet.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            register_number TEXT PRIMARY KEY,
            roll_number TEXT,
            name TEXT NOT NULL,
            parent_whatsapp TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    // No foreign key on purpose: grade records outlive student master-data
    // deletion (removing a student is a master-data concern, not a grades one).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_grades(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            results TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(student_reg_no, semester_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semester_grades_semester ON semester_grades(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_records(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            marks REAL,
            UNIQUE(student_reg_no, subject_id, semester_id, internal_id),
            FOREIGN KEY(student_reg_no) REFERENCES students(register_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lab_mark_records(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            marks REAL,
            UNIQUE(student_reg_no, subject_id, semester_id, internal_id),
            FOREIGN KEY(student_reg_no) REFERENCES students(register_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            percentage REAL,
            UNIQUE(student_reg_no, subject_id, semester_id, internal_id),
            FOREIGN KEY(student_reg_no) REFERENCES students(register_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS master_attendance_records(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            percentage REAL,
            UNIQUE(student_reg_no, semester_id, internal_id),
            FOREIGN KEY(student_reg_no) REFERENCES students(register_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mark_records_student ON mark_records(student_reg_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lab_mark_records_student ON lab_mark_records(student_reg_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_student ON attendance_records(student_reg_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_master_attendance_student ON master_attendance_records(student_reg_no)",
        [],
    )?;

    Ok(conn)
}

pub fn student_exists(conn: &Connection, reg_no: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE register_number = ?",
            [reg_no],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn student_display_name(conn: &Connection, reg_no: &str) -> anyhow::Result<Option<String>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM students WHERE register_number = ?",
            [reg_no],
            |r| r.get(0),
        )
        .optional()?;
    Ok(name)
}

/// The unit of persistence: one insertion-ordered subject -> grade map per
/// (student, semester) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub student_reg_no: String,
    pub semester_id: u32,
    pub results: GradeMap,
}

pub fn find_grade_record(
    conn: &Connection,
    reg_no: &str,
    semester_id: u32,
) -> anyhow::Result<Option<GradeRecord>> {
    let row: Option<String> = conn
        .query_row(
            "SELECT results FROM semester_grades
             WHERE student_reg_no = ? AND semester_id = ?",
            rusqlite::params![reg_no, semester_id],
            |r| r.get(0),
        )
        .optional()?;

    match row {
        Some(json) => {
            let results: GradeMap = serde_json::from_str(&json)
                .with_context(|| format!("corrupt results json for {}", reg_no))?;
            Ok(Some(GradeRecord {
                student_reg_no: reg_no.to_string(),
                semester_id,
                results,
            }))
        }
        None => Ok(None),
    }
}

pub fn save_grade_record(conn: &Connection, record: &GradeRecord) -> anyhow::Result<()> {
    let json = serde_json::to_string(&record.results)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO semester_grades(id, student_reg_no, semester_id, results, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_reg_no, semester_id)
         DO UPDATE SET results = excluded.results, updated_at = excluded.updated_at",
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            record.student_reg_no,
            record.semester_id,
            json,
            now
        ],
    )?;
    Ok(())
}

pub fn all_grade_records(conn: &Connection) -> anyhow::Result<Vec<GradeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT student_reg_no, semester_id, results
         FROM semester_grades
         ORDER BY semester_id, student_reg_no",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (reg_no, semester_id, json) in rows {
        let results: GradeMap = serde_json::from_str(&json)
            .with_context(|| format!("corrupt results json for {}", reg_no))?;
        out.push(GradeRecord {
            student_reg_no: reg_no,
            semester_id: semester_id as u32,
            results,
        });
    }
    Ok(out)
}

pub fn grade_records_for_student(
    conn: &Connection,
    reg_no: &str,
) -> anyhow::Result<Vec<GradeRecord>> {
    Ok(all_grade_records(conn)?
        .into_iter()
        .filter(|r| r.student_reg_no == reg_no)
        .collect())
}
