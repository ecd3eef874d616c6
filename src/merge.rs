use rusqlite::Connection;

use crate::db::{self, GradeRecord};
use crate::sheet::GradeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged,
    /// The registration number is not in the student store. Not fatal to a
    /// batch; the row is dropped and reported.
    UnknownStudent,
}

/// Upsert newly parsed subject -> grade pairs into the stored record for
/// (student, semester).
///
/// Keys already present keep their position and take the new value; keys
/// only in the new map append in the new map's order; keys only in the old
/// record are retained. Merging the same map twice is a no-op and merging
/// disjoint maps commutes, so repeated uploads converge.
pub fn merge(
    conn: &Connection,
    reg_no: &str,
    semester_id: u32,
    new_pairs: &GradeMap,
) -> anyhow::Result<MergeOutcome> {
    if !db::student_exists(conn, reg_no)? {
        return Ok(MergeOutcome::UnknownStudent);
    }

    let mut results = db::find_grade_record(conn, reg_no, semester_id)?
        .map(|r| r.results)
        .unwrap_or_default();

    for (code, grade) in new_pairs {
        results.insert(code.clone(), grade.clone());
    }

    db::save_grade_record(
        conn,
        &GradeRecord {
            student_reg_no: reg_no.to_string(),
            semester_id,
            results,
        },
    )?;
    Ok(MergeOutcome::Merged)
}
