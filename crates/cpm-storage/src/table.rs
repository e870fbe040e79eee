//! Tabular reader/writer: CSV (header row, optional UTF-8 BOM) and JSON
//! arrays of objects, both producing ordered `RawRow`s.

use std::path::{Path, PathBuf};

use cpm_core::{CellValue, RawRow};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed JSON rows: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON rows must be an array of objects; row {0} is not an object")]
    NotAnObject(usize),
    #[error("JSON rows must be an array of objects")]
    NotAnArray,
    #[error("unsupported table format for {0} (expected .csv or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("writing CSV: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            _ => Err(TableError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn parse_csv_rows(bytes: &[u8]) -> Result<Vec<RawRow>, TableError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = RawRow::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| (name.trim(), CellValue::text(record.get(i).unwrap_or_default()))),
        );
        rows.push(row);
    }
    Ok(rows)
}

fn json_cell(value: &JsonValue) -> CellValue {
    match value {
        JsonValue::Null => CellValue::Empty,
        JsonValue::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
        JsonValue::String(s) => CellValue::text(s.as_str()),
        JsonValue::Bool(b) => CellValue::Text(b.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

pub fn parse_json_rows(bytes: &[u8]) -> Result<Vec<RawRow>, TableError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let value: JsonValue = serde_json::from_slice(bytes)?;
    let JsonValue::Array(items) = value else {
        return Err(TableError::NotAnArray);
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let object = item.as_object().ok_or(TableError::NotAnObject(i))?;
            Ok(RawRow::from_pairs(
                object.iter().map(|(k, v)| (k.trim(), json_cell(v))),
            ))
        })
        .collect()
}

/// Read a whole table, choosing the parser from the file extension.
pub async fn read_table(path: impl AsRef<Path>) -> Result<Vec<RawRow>, TableError> {
    let path = path.as_ref();
    let format = TableFormat::from_path(path)?;
    let bytes = fs::read(path).await.map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = match format {
        TableFormat::Csv => parse_csv_rows(&bytes)?,
        TableFormat::Json => parse_json_rows(&bytes)?,
    };
    debug!(path = %path.display(), rows = rows.len(), "read table");
    Ok(rows)
}

/// Render rows as CSV with a BOM so spreadsheet tools pick UTF-8.
pub fn render_csv<S: AsRef<str>>(columns: &[&str], rows: &[Vec<S>]) -> Result<Vec<u8>, TableError> {
    let mut writer = csv::WriterBuilder::new().from_writer(UTF8_BOM.to_vec());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(|cell| AsRef::<str>::as_ref(cell)))?;
    }
    writer
        .into_inner()
        .map_err(|e| TableError::Write(e.error().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_keep_header_order_and_strip_bom() {
        let text = "\u{feff}공사명, 발주처 ,계약금액\n\"신축, 1공구\",서울시,\"1,000\"\n증축,,\n";
        let rows = parse_csv_rows(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["공사명", "발주처", "계약금액"]);
        assert_eq!(rows[0].text("공사명"), "신축, 1공구");
        assert_eq!(rows[0].cell("계약금액").as_f64(), Some(1000.0));
        assert_eq!(rows[1].cell("발주처"), CellValue::Empty);
    }

    #[test]
    fn short_csv_records_pad_with_empty_cells() {
        let rows = parse_csv_rows("a,b,c\n1\n".as_bytes()).unwrap();
        assert_eq!(rows[0].text("a"), "1");
        assert_eq!(rows[0].cell("c"), CellValue::Empty);
    }

    #[test]
    fn json_rows_keep_numbers_numeric() {
        let rows = parse_json_rows(
            r#"[{"No.": 1, "시도코드": 11, "공사명": "A", "비고": null}]"#.as_bytes(),
        )
        .unwrap();
        assert_eq!(rows[0].cell("시도코드"), CellValue::Number(11.0));
        assert_eq!(rows[0].cell("비고"), CellValue::Empty);
        assert_eq!(rows[0].columns().next(), Some("No."));
    }

    #[test]
    fn json_rows_must_be_objects() {
        assert!(matches!(parse_json_rows(b"{}"), Err(TableError::NotAnArray)));
        assert!(matches!(parse_json_rows(b"[1]"), Err(TableError::NotAnObject(0))));
    }

    #[test]
    fn rendered_csv_reads_back() {
        let bytes = render_csv(&["x", "y"], &[vec!["1", "a,b"], vec!["2", ""]]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let rows = parse_csv_rows(&bytes).unwrap();
        assert_eq!(rows[0].text("y"), "a,b");
        assert_eq!(rows[1].text("x"), "2");
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(matches!(
            TableFormat::from_path(Path::new("input.xlsx")),
            Err(TableError::UnsupportedFormat(_))
        ));
        assert_eq!(TableFormat::from_path(Path::new("a.CSV")).unwrap(), TableFormat::Csv);
    }
}
