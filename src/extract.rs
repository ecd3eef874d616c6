/// Boundary to the external document-to-text conversion. The daemon never
/// parses PDFs itself; callers hand it the extracted text (or a path to a
/// plain-text dump of it). Scanned/image documents arrive here as empty or
/// unreadable bytes and must be signalled, not thrown.
pub fn lines_from_bytes(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

/// True when extraction produced nothing usable, which usually means a
/// scanned image rather than a text document.
pub fn is_empty_extraction(lines: &[String]) -> bool {
    lines.iter().all(|l| l.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_and_drops_carriage_returns() {
        let lines = lines_from_bytes(b"first\r\nsecond\nthird");
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn empty_and_blank_only_input_signal_empty_extraction() {
        assert!(is_empty_extraction(&[]));
        assert!(is_empty_extraction(&["".to_string(), "   ".to_string()]));
        assert!(!is_empty_extraction(&["data".to_string()]));
    }

    #[test]
    fn non_utf8_bytes_degrade_lossily_instead_of_failing() {
        let lines = lines_from_bytes(&[0xff, 0xfe, b'\n', b'o', b'k']);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "ok");
    }
}
