use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db;
use crate::extract;
use crate::sheet;
use crate::vocab;

pub const SEMESTER_RANGE: std::ops::RangeInclusive<u32> = 1..=8;

const EMPTY_EXTRACTION_DIAGNOSTIC: &str = "No extractable text was found in the document. \
It may be a scanned image, protected, or use a non-standard encoding. \
Run it through OCR software or download a text-based copy from the university portal.";

const SCHEMA_UNDETECTED_DIAGNOSTIC: &str = "Could not detect subject codes in the sheet header. \
Make sure the sheet has a header row with codes like CS3451, MA3451 or CB3401.";

/// One pivoted sheet: a header row followed by one row per student.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetModel {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub sheet_names: Vec<String>,
    pub row_count: usize,
}

/// Pivot all stored grade records into one sheet per non-empty semester.
///
/// Columns are the lexicographically sorted *union* of subject codes seen
/// across the semester's records, not any single upload's schema: records
/// accumulate from several uploads with different subject sets. Cells a
/// student has no entry for stay blank.
pub fn consolidated_sheets(conn: &Connection) -> anyhow::Result<Vec<SheetModel>> {
    let records = db::all_grade_records(conn)?;
    let mut sheets: Vec<SheetModel> = Vec::new();

    for sem in SEMESTER_RANGE {
        let mut sem_records: Vec<&db::GradeRecord> = records
            .iter()
            .filter(|r| r.semester_id == sem)
            .collect();
        if sem_records.is_empty() {
            continue;
        }
        sem_records.sort_by(|a, b| a.student_reg_no.cmp(&b.student_reg_no));

        let mut codes: BTreeSet<String> = BTreeSet::new();
        for rec in &sem_records {
            codes.extend(rec.results.keys().cloned());
        }
        if codes.is_empty() {
            continue;
        }

        let mut header = vec!["Register Number".to_string(), "Student Name".to_string()];
        header.extend(codes.iter().cloned());

        let mut rows = vec![header];
        for rec in &sem_records {
            let name = db::student_display_name(conn, &rec.student_reg_no)?
                .unwrap_or_else(|| "Unknown".to_string());
            let mut row = vec![rec.student_reg_no.clone(), name];
            for code in &codes {
                row.push(rec.results.get(code).cloned().unwrap_or_default());
            }
            rows.push(row);
        }

        sheets.push(SheetModel {
            name: format!("Sem {}", sem),
            rows,
        });
    }

    if sheets.is_empty() {
        sheets.push(SheetModel {
            name: "Info".to_string(),
            rows: vec![vec![
                "No semester grade data found in the system.".to_string(),
                "Upload grade sheets first.".to_string(),
            ]],
        });
    }

    Ok(sheets)
}

pub fn export_consolidated(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let sheets = consolidated_sheets(conn)?;
    write_workbook(&sheets, out_path)?;
    Ok(ExportSummary {
        sheet_names: sheets.iter().map(|s| s.name.clone()).collect(),
        // Data rows only; every sheet's first row is its header.
        row_count: sheets.iter().map(|s| s.rows.len().saturating_sub(1)).sum(),
    })
}

/// Write the sheets as an .xlsx workbook. A workbook is a zip of XML parts;
/// inline strings keep the writer free of a shared-strings table.
pub fn write_workbook(sheets: &[SheetModel], out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheets.len() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i
        ));
    }
    content_types.push_str("</Types>");
    zip.start_file("[Content_Types].xml", opts)
        .context("failed to start content-types entry")?;
    zip.write_all(content_types.as_bytes())?;

    zip.start_file("_rels/.rels", opts)
        .context("failed to start package rels entry")?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    )?;

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut workbook_rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            xml_escape(&sheet.name),
            n,
            n
        ));
        workbook_rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            n, n
        ));
    }
    workbook.push_str("</sheets></workbook>");
    workbook_rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", opts)
        .context("failed to start workbook entry")?;
    zip.write_all(workbook.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", opts)
        .context("failed to start workbook rels entry")?;
    zip.write_all(workbook_rels.as_bytes())?;

    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
            .with_context(|| format!("failed to start worksheet entry for {}", sheet.name))?;
        zip.write_all(worksheet_xml(sheet).as_bytes())?;
    }

    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

fn worksheet_xml(sheet: &SheetModel) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in sheet.rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            xml.push_str(&format!(
                r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                cell_ref(c, r),
                xml_escape(cell)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// 0-based column index to a spreadsheet column label (A, B, ..., Z, AA, ...).
fn col_ref(mut col: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    out
}

fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", col_ref(col), row + 1)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCsv {
    Csv(String),
    /// Degraded-but-non-throwing output: a human-readable explanation of why
    /// no CSV could be produced.
    Diagnostic(String),
}

/// Convert extracted sheet lines straight to CSV text, no student
/// pre-registration required. This path uses the loose subject-code shape
/// and pads rows with too few grades instead of rejecting them: the output
/// is meant for a human to inspect and fix up, not for direct persistence.
pub fn sheet_to_csv_text(lines: &[String]) -> SheetCsv {
    if extract::is_empty_extraction(lines) {
        return SheetCsv::Diagnostic(EMPTY_EXTRACTION_DIAGNOSTIC.to_string());
    }

    let schema = sheet::detect_header_loose(lines, sheet::HEADER_SCAN_CAP);
    if schema.is_empty() {
        return SheetCsv::Diagnostic(SCHEMA_UNDETECTED_DIAGNOSTIC.to_string());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["Register Number".to_string(), "Student Name".to_string()];
    header.extend(schema.iter().cloned());
    if writer.write_record(&header).is_err() {
        return SheetCsv::Diagnostic("Failed to render CSV output.".to_string());
    }

    for line in lines {
        let Some(reg) = vocab::find_registration_number(line) else {
            continue;
        };
        let remainder = line[reg.end..].trim();
        let name = sheet::extract_name(remainder);

        let grades: Vec<&str> = remainder
            .split_whitespace()
            .filter(|t| vocab::is_grade_token(t))
            .collect();
        // Overflow grades are trimmed from the front; a shortfall leaves
        // trailing columns blank.
        let start = grades.len().saturating_sub(schema.len());
        let tail = &grades[start..];

        let mut row = vec![reg.value, name];
        for i in 0..schema.len() {
            row.push(tail.get(i).map(|t| t.to_string()).unwrap_or_default());
        }
        if writer.write_record(&row).is_err() {
            return SheetCsv::Diagnostic("Failed to render CSV output.".to_string());
        }
    }

    match writer.into_inner() {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SheetCsv::Csv(text),
            Err(_) => SheetCsv::Diagnostic("Failed to render CSV output.".to_string()),
        },
        Err(_) => SheetCsv::Diagnostic("Failed to render CSV output.".to_string()),
    }
}
