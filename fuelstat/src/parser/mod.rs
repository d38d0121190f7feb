//! Reader for the extractor's flat export.
//!
//! The upstream extractor writes one row per observation, either as CSV
//! (encoding and delimiter auto-detected) or as a JSON array of
//! [`RawRecord`] objects. Column names are matched case-insensitively and
//! accept the common aliases found in exports:
//!
//! | Field | Columns |
//! |-------|---------|
//! | `source_file` | `source_file`, `file`, `source` (defaults to the input file name) |
//! | `sheet_name` | `sheet_name`, `sheet` |
//! | `period` | `period` (`YYYY-MM`), or `year` + `month` |
//! | `company_type` | `company_type`, `type` (inferred from the sheet name when absent) |
//! | `raw_company_name` | `raw_company_name`, `company_name`, `company` |
//! | `raw_product_label` | `raw_product_label`, `product_label`, `product` |
//! | `raw_value` | `raw_value`, `value`, `volume`, `quantity` |
//! | `unit_hint` | `unit_hint`, `unit` |
//! | `companion_value` | `companion_value`, `companion` |
//!
//! A malformed row becomes a [`RowError`] and is skipped; only an unreadable
//! file or a missing required column fails the whole parse.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::models::{CompanyType, Period, RawRecord, UnitHint};

const SOURCE_FILE: &[&str] = &["source_file", "file", "source"];
const SHEET_NAME: &[&str] = &["sheet_name", "sheet"];
const PERIOD: &[&str] = &["period"];
const YEAR: &[&str] = &["year"];
const MONTH: &[&str] = &["month"];
const COMPANY_TYPE: &[&str] = &["company_type", "type"];
const COMPANY: &[&str] = &["raw_company_name", "company_name", "company"];
const PRODUCT: &[&str] = &["raw_product_label", "product_label", "product"];
const VALUE: &[&str] = &["raw_value", "value", "volume", "quantity"];
const UNIT: &[&str] = &["unit_hint", "unit"];
const COMPANION: &[&str] = &["companion_value", "companion"];

/// A skipped input row, with context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => write!(f, "Line {}, column '{}': {}", self.line, col, self.message),
            _ => write!(f, "Line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for RowError {}

impl RowError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, column: None, value: None, message: message.into() }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Parsed input with metadata.
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    pub records: Vec<RawRecord>,
    /// Rows that could not be turned into a record.
    pub errors: Vec<RowError>,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

// =============================================================================
// Encoding and delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes using the given encoding. Unknown encodings decode as lossy UTF-8.
///
/// Latin-1 labels decode as windows-1252, as the WHATWG encoding standard
/// specifies; it agrees with ISO-8859-1 on every printable byte.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the header line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");
    let mut best_sep = ',';
    let mut best_count = 0;
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

// =============================================================================
// Field parsing
// =============================================================================

fn header_key(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Parse a spreadsheet number: thousands separators and spaces are ignored,
/// a lone dash means zero.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    match cleaned.as_str() {
        "" => None,
        "-" => Some(0.0),
        _ => cleaned.parse().ok(),
    }
}

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &[String]) -> Self {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            index.entry(header_key(header)).or_insert(i);
        }
        Self { index }
    }

    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| self.index.get(*alias).copied())
    }

    fn require(&self, field: &str, aliases: &[&str]) -> ParseResult<usize> {
        self.find(aliases)
            .ok_or_else(|| ParseError::MissingColumn(field.to_string()))
    }
}

struct Layout {
    source_file: Option<usize>,
    sheet_name: Option<usize>,
    period: PeriodColumns,
    company_type: Option<usize>,
    company: usize,
    product: usize,
    value: usize,
    unit: Option<usize>,
    companion: Option<usize>,
}

enum PeriodColumns {
    Combined(usize),
    Split { year: usize, month: usize },
}

impl Layout {
    fn from_headers(headers: &[String]) -> ParseResult<Self> {
        let columns = Columns::new(headers);
        let period = match columns.find(PERIOD) {
            Some(i) => PeriodColumns::Combined(i),
            None => PeriodColumns::Split {
                year: columns.require("period", YEAR)?,
                month: columns.require("month", MONTH)?,
            },
        };
        Ok(Self {
            source_file: columns.find(SOURCE_FILE),
            sheet_name: columns.find(SHEET_NAME),
            period,
            company_type: columns.find(COMPANY_TYPE),
            company: columns.require("raw_company_name", COMPANY)?,
            product: columns.require("raw_product_label", PRODUCT)?,
            value: columns.require("raw_value", VALUE)?,
            unit: columns.find(UNIT),
            companion: columns.find(COMPANION),
        })
    }
}

fn cell<'a>(row: &'a csv::StringRecord, index: usize) -> &'a str {
    row.get(index).map(str::trim).unwrap_or("")
}

fn parse_row(
    row: &csv::StringRecord,
    line: usize,
    layout: &Layout,
    headers: &[String],
    default_source: &str,
) -> Result<RawRecord, RowError> {
    let column_error = |index: usize, message: &str| {
        RowError::new(line, message)
            .with_column(headers.get(index).cloned().unwrap_or_default())
            .with_value(cell(row, index))
    };

    let source_file = layout
        .source_file
        .map(|i| cell(row, i))
        .filter(|s| !s.is_empty())
        .unwrap_or(default_source)
        .to_string();
    let sheet_name = layout.sheet_name.map(|i| cell(row, i)).unwrap_or("").to_string();

    let period = match layout.period {
        PeriodColumns::Combined(i) => {
            Period::parse(cell(row, i)).ok_or_else(|| column_error(i, "Expected YYYY-MM"))?
        }
        PeriodColumns::Split { year, month } => {
            let y = cell(row, year).parse().map_err(|_| column_error(year, "Invalid year"))?;
            let m = cell(row, month).parse().map_err(|_| column_error(month, "Invalid month"))?;
            Period::new(y, m)
        }
    };

    let company_type = match layout.company_type.map(|i| (i, cell(row, i))) {
        Some((i, code)) if !code.is_empty() => {
            CompanyType::from_code(code).ok_or_else(|| column_error(i, "Expected BDC or OMC"))?
        }
        _ => CompanyType::infer_from_sheet(&sheet_name),
    };

    let raw_value = parse_number(cell(row, layout.value))
        .ok_or_else(|| column_error(layout.value, "Expected a number"))?;

    let unit_hint = match layout.unit {
        Some(i) => UnitHint::from_code(cell(row, i)).ok_or_else(|| column_error(i, "Unrecognised unit"))?,
        None => UnitHint::Unknown,
    };

    let companion_value = match layout.companion.map(|i| (i, cell(row, i))) {
        Some((i, text)) if !text.is_empty() => {
            Some(parse_number(text).ok_or_else(|| column_error(i, "Expected a number"))?)
        }
        _ => None,
    };

    Ok(RawRecord {
        source_file,
        sheet_name,
        period,
        company_type,
        raw_company_name: cell(row, layout.company).to_string(),
        raw_product_label: cell(row, layout.product).to_string(),
        raw_value,
        unit_hint,
        companion_value,
    })
}

// =============================================================================
// Entry points
// =============================================================================

/// Parse CSV text with an explicit delimiter.
pub fn parse_csv_str(content: &str, delimiter: char, default_source: &str) -> ParseResult<ParsedInput> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeaders);
    }
    let layout = Layout::from_headers(&headers)?;

    let mut parsed = ParsedInput {
        delimiter,
        encoding: "utf-8".to_string(),
        ..Default::default()
    };

    for (index, result) in reader.records().enumerate() {
        let row = result?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(index + 2);
        if row.iter().all(str::is_empty) {
            continue;
        }
        match parse_row(&row, line, &layout, &headers, default_source) {
            Ok(record) => parsed.records.push(record),
            Err(err) => {
                tracing::debug!("{}", err);
                parsed.errors.push(err);
            }
        }
    }
    parsed.headers = headers;
    Ok(parsed)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_csv_bytes(bytes: &[u8], default_source: &str) -> ParseResult<ParsedInput> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let mut parsed = parse_csv_str(&content, delimiter, default_source)?;
    parsed.encoding = encoding;
    Ok(parsed)
}

/// Parse a JSON array of raw records.
pub fn parse_json_str(content: &str) -> ParseResult<ParsedInput> {
    let records: Vec<RawRecord> = serde_json::from_str(content)?;
    Ok(ParsedInput {
        records,
        encoding: "utf-8".to_string(),
        ..Default::default()
    })
}

/// Load raw records from a `.json` or CSV file.
pub fn load_raw_records(path: &Path) -> ParseResult<ParsedInput> {
    let bytes = std::fs::read(path)?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let content = std::str::from_utf8(&bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;
        parse_json_str(content)
    } else {
        let default_source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input");
        parse_csv_bytes(&bytes, default_source)
    }
}
