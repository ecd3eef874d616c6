use indexmap::IndexMap;

use crate::vocab;

/// Ordered subject-code -> grade-token pairs. Insertion order is significant:
/// it drives stable report columns and round-trips through the persisted
/// JSON column unchanged.
pub type GradeMap = IndexMap<String, String>;

/// Lines to consider when hunting for the table header.
pub const HEADER_SCAN_CAP: usize = 50;

/// A header line must yield at least this many distinct subject codes.
/// Below that, stray codes in titles/footers would masquerade as a schema.
const MIN_HEADER_CODES: usize = 3;

/// Tokens longer than this that fail the grade vocabulary invalidate the
/// whole row's alignment; shorter junk is recorded verbatim as a malformed
/// cell qualifier.
const MAX_TOLERATED_JUNK_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub reg_no: String,
    pub grades: GradeMap,
}

/// Why a line produced no grade map. Row-level conditions never abort a
/// batch; they are collected into the ingest report instead.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSkip {
    /// No registration number anywhere in the line.
    NotADataRow,
    /// Fewer trailing tokens than schema columns.
    InsufficientTokens { have: usize, need: usize },
    /// A selected token failed the grade vocabulary badly enough that the
    /// whole alignment is suspect (name overflow shifted into the columns).
    AlignmentRejected { token: String },
    /// Schema-less fallback found no subject-code/grade pair.
    NoFallbackFact,
}

impl RowSkip {
    pub fn code(&self) -> &'static str {
        match self {
            RowSkip::NotADataRow => "not_a_data_row",
            RowSkip::InsufficientTokens { .. } => "insufficient_tokens",
            RowSkip::AlignmentRejected { .. } => "row_alignment_rejected",
            RowSkip::NoFallbackFact => "no_fallback_fact",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Parsed(ParsedRow),
    Skipped {
        reg_no: Option<String>,
        reason: RowSkip,
    },
}

/// Scan the first `cap` lines for the ordered subject-code schema.
///
/// Lines containing a registration number are data rows, never headers.
/// Every qualifying line (>= 3 distinct strict-shape codes) contributes;
/// codes are unioned in first-appearance order so headers that wrap across
/// two physical lines still produce one schema. An empty result means
/// "schema undetected", which is a degraded mode, not an error.
pub fn detect_header(lines: &[String], cap: usize) -> Vec<String> {
    detect_header_with(lines, cap, vocab::find_subject_codes)
}

/// Loose-shape variant for the document-to-CSV path, where a missed column
/// costs more than an occasional false code.
pub fn detect_header_loose(lines: &[String], cap: usize) -> Vec<String> {
    detect_header_with(lines, cap, vocab::find_subject_codes_loose)
}

fn detect_header_with(
    lines: &[String],
    cap: usize,
    find_codes: fn(&str) -> Vec<String>,
) -> Vec<String> {
    let mut schema: Vec<String> = Vec::new();

    for line in lines.iter().take(cap) {
        if line.trim().is_empty() {
            continue;
        }
        if vocab::contains_registration_number(line) {
            continue;
        }

        let mut found: Vec<String> = Vec::new();
        for code in find_codes(line) {
            if !found.contains(&code) {
                found.push(code);
            }
        }
        if found.len() < MIN_HEADER_CODES {
            continue;
        }

        for code in found {
            if !schema.contains(&code) {
                schema.push(code);
            }
        }
    }

    schema
}

/// Align one line against the detected schema.
///
/// The registration number anchors the row; everything after it is split on
/// whitespace. With a schema of N columns the *last* N tokens are taken:
/// a variable-length name precedes a fixed-width block of grade columns, so
/// the columns are right-aligned. With no schema the row degrades to a
/// single (subject, grade) fact when one can be found.
pub fn align_row(line: &str, schema: &[String]) -> RowOutcome {
    let Some(reg) = vocab::find_registration_number(line) else {
        return RowOutcome::Skipped {
            reg_no: None,
            reason: RowSkip::NotADataRow,
        };
    };

    let remainder = line[reg.end..].trim();
    let tokens: Vec<&str> = remainder.split_whitespace().collect();

    if schema.is_empty() {
        return fallback_single_fact(&reg.value, remainder);
    }

    let need = schema.len();
    if tokens.len() < need {
        return RowOutcome::Skipped {
            reg_no: Some(reg.value),
            reason: RowSkip::InsufficientTokens {
                have: tokens.len(),
                need,
            },
        };
    }

    let tail = &tokens[tokens.len() - need..];
    let mut grades = GradeMap::new();
    for (code, token) in schema.iter().zip(tail.iter()) {
        if !vocab::is_grade_token(token)
            && token.len() > MAX_TOLERATED_JUNK_LEN
            && !token.starts_with("WH")
        {
            return RowOutcome::Skipped {
                reg_no: Some(reg.value),
                reason: RowSkip::AlignmentRejected {
                    token: token.to_string(),
                },
            };
        }
        grades.insert(code.clone(), token.to_string());
    }

    RowOutcome::Parsed(ParsedRow {
        reg_no: reg.value,
        grades,
    })
}

fn fallback_single_fact(reg_no: &str, remainder: &str) -> RowOutcome {
    if let Some((code, end)) = vocab::find_first_subject_code(remainder) {
        let after = remainder[end..].trim();
        if let Some(first) = after.split_whitespace().next() {
            if vocab::is_grade_token(first) {
                let mut grades = GradeMap::new();
                grades.insert(code, first.to_string());
                return RowOutcome::Parsed(ParsedRow {
                    reg_no: reg_no.to_string(),
                    grades,
                });
            }
        }
    }
    RowOutcome::Skipped {
        reg_no: Some(reg_no.to_string()),
        reason: RowSkip::NoFallbackFact,
    }
}

/// Recover a display name from the text between the registration number and
/// the grade columns. Alphabetic tokens (dots and commas allowed, initials
/// are common) accumulate until the first grade or subject-code shaped token.
/// Sheets without names yield "Unknown" so report rows are never blank.
pub fn extract_name(remainder: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for token in remainder.split_whitespace() {
        if vocab::is_grade_token(token) || vocab::looks_like_subject_code(token) {
            break;
        }
        if vocab::is_name_fragment(token) {
            parts.push(token);
        }
    }
    if parts.is_empty() {
        "Unknown".to_string()
    } else {
        parts.join(" ")
    }
}
