use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Letter grades used on university result sheets. WH ("withheld") carries
    // an arbitrary trailing qualifier, e.g. WH1 or WH-AB.
    static ref GRADE: Regex = Regex::new(r"^(O|A\+?|B\+?|C|U|UA|W|I|RA|WH.*|SA|AB)$").unwrap();
    // Loose shape for the CSV/export path, strict shape for primary ingestion.
    static ref SUBJECT_LOOSE: Regex = Regex::new(r"^[A-Z]{1,6}\d{1,6}$").unwrap();
    static ref SUBJECT_LOOSE_FIND: Regex = Regex::new(r"\b([A-Z]{1,6}\d{1,6})\b").unwrap();
    static ref SUBJECT_STRICT: Regex = Regex::new(r"\b([A-Z]{2,5}\d{3,5})\b").unwrap();
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();
    static ref NAME_FRAGMENT: Regex = Regex::new(r"^[A-Za-z.,]+$").unwrap();
    static ref SEMESTER_NO: Regex = Regex::new(r"(?i)Semester No\s*[:.]\s*(\d+)").unwrap();
}

const REG_NO_LEN: usize = 12;

pub fn is_grade_token(s: &str) -> bool {
    GRADE.is_match(s)
}

pub fn looks_like_subject_code(s: &str) -> bool {
    SUBJECT_LOOSE.is_match(s)
}

pub fn is_strict_subject_code(s: &str) -> bool {
    SUBJECT_STRICT
        .find(s)
        .map(|m| m.start() == 0 && m.end() == s.len())
        .unwrap_or(false)
}

/// All strict-shape subject codes in a line, in order of appearance.
pub fn find_subject_codes(line: &str) -> Vec<String> {
    SUBJECT_STRICT
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Loose-shape variant used by the CSV/export path, where recall matters
/// more than precision.
pub fn find_subject_codes_loose(line: &str) -> Vec<String> {
    SUBJECT_LOOSE_FIND
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First strict-shape subject code plus the byte offset just past it.
pub fn find_first_subject_code(line: &str) -> Option<(String, usize)> {
    SUBJECT_STRICT
        .find(line)
        .map(|m| (m.as_str().to_string(), m.end()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegNoMatch {
    pub value: String,
    /// Byte offset just past the matched digits.
    pub end: usize,
}

/// A registration number is a maximal run of exactly 12 digits. A 13-digit
/// run is not a registration number with a stray digit; it is rejected whole.
pub fn find_registration_number(line: &str) -> Option<RegNoMatch> {
    for m in DIGIT_RUN.find_iter(line) {
        if m.as_str().len() == REG_NO_LEN {
            return Some(RegNoMatch {
                value: m.as_str().to_string(),
                end: m.end(),
            });
        }
    }
    None
}

pub fn contains_registration_number(line: &str) -> bool {
    find_registration_number(line).is_some()
}

pub fn is_name_fragment(s: &str) -> bool {
    NAME_FRAGMENT.is_match(s)
}

/// Scan sheet text for a "Semester No : N" annotation.
pub fn detect_semester(lines: &[String]) -> Option<u32> {
    for line in lines {
        if let Some(caps) = SEMESTER_NO.captures(line) {
            if let Ok(n) = caps[1].parse::<u32>() {
                return Some(n);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_vocabulary_matches_fixed_set() {
        for g in ["O", "A", "A+", "B", "B+", "C", "U", "UA", "W", "I", "RA", "SA", "AB"] {
            assert!(is_grade_token(g), "expected grade: {}", g);
        }
        // WH takes an arbitrary qualifier suffix.
        assert!(is_grade_token("WH"));
        assert!(is_grade_token("WH1"));
        assert!(is_grade_token("WH-AB"));

        for not in ["", "D", "AA", "O+", "PASS", "a", "A++"] {
            assert!(!is_grade_token(not), "unexpected grade: {}", not);
        }
    }

    #[test]
    fn subject_code_bounds_differ_by_path() {
        // Strict: 2-5 letters + 3-5 digits.
        assert!(is_strict_subject_code("CS3451"));
        assert!(is_strict_subject_code("NM1074"));
        assert!(!is_strict_subject_code("C3451"));
        assert!(!is_strict_subject_code("CS34"));

        // Loose: 1-6 letters + 1-6 digits.
        assert!(looks_like_subject_code("C3451"));
        assert!(looks_like_subject_code("CS34"));
        assert!(!looks_like_subject_code("CS"));
        assert!(!looks_like_subject_code("3451"));
        assert!(!looks_like_subject_code("cs3451"));
    }

    #[test]
    fn registration_number_is_a_maximal_12_digit_run() {
        let m = find_registration_number("  123456789012 KUMAR A O").expect("match");
        assert_eq!(m.value, "123456789012");
        assert_eq!(&"  123456789012 KUMAR A O"[m.end..], " KUMAR A O");

        // 13 digits: no registration number anywhere in the run.
        assert!(find_registration_number("1234567890123 X").is_none());
        assert!(find_registration_number("ABC 12345 678").is_none());

        // Later runs are still considered.
        let m = find_registration_number("S.No 17 123456789012").expect("match");
        assert_eq!(m.value, "123456789012");
    }

    #[test]
    fn find_subject_codes_keeps_line_order() {
        let codes = find_subject_codes("Sl.No RegNo Name CS3451 MA3451 GE3451 Total");
        assert_eq!(codes, vec!["CS3451", "MA3451", "GE3451"]);
    }

    #[test]
    fn semester_annotation_detected_case_insensitively() {
        let lines = vec![
            "Anna University Results".to_string(),
            "semester no : 4".to_string(),
        ];
        assert_eq!(detect_semester(&lines), Some(4));
        assert_eq!(detect_semester(&["no marker here".to_string()]), None);
    }
}
