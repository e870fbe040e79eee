//! Core domain model for CPM: cell values, raw tabular rows, the canonical
//! construction-project record, pipeline configuration and the run log.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod config;
mod runlog;

pub use config::{parse_list, ConfigError, ListInput, PipelineConfig};
pub use runlog::{LogEntry, LogLevel, RunLog};

pub const CRATE_NAME: &str = "cpm-core";

/// Source tag written for Whobuilds-derived records.
pub const SOURCE_TAG_WHOBUILDS: &str = "01";
/// Source tag written for procurement (Narajang) records.
pub const SOURCE_TAG_NARAJANG: &str = "02";

/// A single spreadsheet cell as handed over by a tabular reader.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Date(_) => false,
        }
    }

    /// Text rendering used for keys, exports and text-typed columns.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Finite numeric reading of the cell; text is accepted with thousands
    /// separators.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse::<f64>().ok()
                }
            }
            Self::Empty | Self::Date(_) => None,
        };
        value.filter(|n| n.is_finite())
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::text).unwrap_or_default()
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One input row: ordered column name -> value pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, CellValue)>,
    {
        Self {
            cells: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name.trim() == column)
            .map(|(_, value)| value)
    }

    /// Cell for `column`, or `Empty` when the column is absent.
    pub fn cell(&self, column: &str) -> CellValue {
        self.get(column).cloned().unwrap_or_default()
    }

    /// Trimmed text of `column`; missing columns read as "".
    pub fn text(&self, column: &str) -> String {
        self.get(column)
            .map(|v| v.to_text().trim().to_string())
            .unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Export headers, in canonical column order.
pub const PROJECT_COLUMNS: [&str; 29] = [
    "No.",
    "공사명",
    "발주처",
    "시공사",
    "주소",
    "시도코드",
    "시군구코드",
    "공사구분코드",
    "공사상세코드",
    "착공일",
    "준공일",
    "등록일",
    "연면적",
    "대지면적",
    "지하층수",
    "지상층수",
    "세대수",
    "계약금액",
    "공동도급여부",
    "현장전화",
    "현장팩스",
    "현장소장",
    "담당자",
    "담당자연락처",
    "계약번호",
    "설계사",
    "감리사",
    "공사개요",
    "출처",
];

/// Canonical construction-project record shared by every source.
///
/// `no` is a running sequence number, reassigned on every export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstructionProject {
    pub no: u64,
    pub project_name: String,
    pub ordering_agency: String,
    pub contractor: String,
    pub address: String,
    pub province_code: CellValue,
    pub sub_region_code: CellValue,
    pub construction_type_code: String,
    pub detail_type_code: String,
    pub start_date: String,
    pub completion_date: String,
    pub registration_date: String,
    pub built_up_area: String,
    pub site_area: String,
    pub basement_floors: CellValue,
    pub above_ground_floors: CellValue,
    pub households: CellValue,
    pub contract_amount: CellValue,
    pub co_contract: String,
    pub site_phone: String,
    pub site_fax: String,
    pub site_manager: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub contract_number: String,
    pub designer: String,
    pub supervisor: String,
    pub overview: String,
    pub source: String,
}

impl ConstructionProject {
    /// Text cells in `PROJECT_COLUMNS` order.
    pub fn to_text_row(&self) -> Vec<String> {
        vec![
            self.no.to_string(),
            self.project_name.clone(),
            self.ordering_agency.clone(),
            self.contractor.clone(),
            self.address.clone(),
            self.province_code.to_text(),
            self.sub_region_code.to_text(),
            self.construction_type_code.clone(),
            self.detail_type_code.clone(),
            self.start_date.clone(),
            self.completion_date.clone(),
            self.registration_date.clone(),
            self.built_up_area.clone(),
            self.site_area.clone(),
            self.basement_floors.to_text(),
            self.above_ground_floors.to_text(),
            self.households.to_text(),
            self.contract_amount.to_text(),
            self.co_contract.clone(),
            self.site_phone.clone(),
            self.site_fax.clone(),
            self.site_manager.clone(),
            self.contact_person.clone(),
            self.contact_phone.clone(),
            self.contract_number.clone(),
            self.designer.clone(),
            self.supervisor.clone(),
            self.overview.clone(),
            self.source.clone(),
        ]
    }

    /// Rebuild a record from a previously exported row (master files).
    ///
    /// Unknown columns are ignored and missing ones become empty. Numeric
    /// cells survive in the mixed-type columns; everything else is coerced
    /// to text.
    pub fn from_row(row: &RawRow) -> Self {
        let text = |column: &str| row.get(column).map(CellValue::to_text).unwrap_or_default();
        let mixed = |column: &str| match row.cell(column) {
            CellValue::Number(n) => CellValue::Number(n),
            other => CellValue::from(Some(other.to_text())),
        };
        Self {
            no: row
                .cell("No.")
                .as_f64()
                .filter(|n| *n >= 0.0)
                .map(|n| n as u64)
                .unwrap_or_default(),
            project_name: text("공사명"),
            ordering_agency: text("발주처"),
            contractor: text("시공사"),
            address: text("주소"),
            province_code: mixed("시도코드"),
            sub_region_code: mixed("시군구코드"),
            construction_type_code: text("공사구분코드"),
            detail_type_code: text("공사상세코드"),
            start_date: text("착공일"),
            completion_date: text("준공일"),
            registration_date: text("등록일"),
            built_up_area: text("연면적"),
            site_area: text("대지면적"),
            basement_floors: mixed("지하층수"),
            above_ground_floors: mixed("지상층수"),
            households: mixed("세대수"),
            contract_amount: mixed("계약금액"),
            co_contract: text("공동도급여부"),
            site_phone: text("현장전화"),
            site_fax: text("현장팩스"),
            site_manager: text("현장소장"),
            contact_person: text("담당자"),
            contact_phone: text("담당자연락처"),
            contract_number: text("계약번호"),
            designer: text("설계사"),
            supervisor: text("감리사"),
            overview: text("공사개요"),
            source: text("출처"),
        }
    }

    pub fn with_no(mut self, no: u64) -> Self {
        self.no = no;
        self
    }
}

/// Which input schema a record was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Whobuilds,
    Narajang,
}

impl SourceKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Whobuilds => SOURCE_TAG_WHOBUILDS,
            Self::Narajang => SOURCE_TAG_NARAJANG,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Whobuilds => "whobuilds",
            Self::Narajang => "narajang",
        }
    }
}

/// Normalizer output: the canonical record plus the untransformed type label
/// that only the eligibility filter reads.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProject {
    pub kind: SourceKind,
    pub record: ConstructionProject,
    pub original_type: String,
}

impl NormalizedProject {
    pub fn into_record(self) -> ConstructionProject {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_cells_have_no_numeric_reading() {
        for text in ["NaN", "nan", "inf", "-inf", "infinity"] {
            assert_eq!(CellValue::text(text).as_f64(), None, "{text}");
        }
        assert_eq!(CellValue::Number(f64::NAN).as_f64(), None);
        assert_eq!(CellValue::Number(f64::INFINITY).as_f64(), None);
        assert_eq!(CellValue::text("1,500").as_f64(), Some(1500.0));
    }

    #[test]
    fn numbers_render_without_fraction_when_integral() {
        assert_eq!(CellValue::Number(1234.0).to_text(), "1234");
        assert_eq!(CellValue::Number(12.5).to_text(), "12.5");
        assert_eq!(CellValue::Empty.to_text(), "");
    }

    #[test]
    fn text_cells_parse_grouped_numbers() {
        assert_eq!(CellValue::text("1,500,000").as_f64(), Some(1_500_000.0));
        assert_eq!(CellValue::text("  ").as_f64(), None);
        assert_eq!(CellValue::text("abc").as_f64(), None);
    }

    #[test]
    fn raw_row_reads_missing_columns_as_empty() {
        let row = RawRow::from_pairs([(" 공사명 ", CellValue::text(" 신축공사 "))]);
        assert_eq!(row.text("공사명"), "신축공사");
        assert_eq!(row.text("발주처"), "");
        assert_eq!(row.cell("발주처"), CellValue::Empty);
    }

    #[test]
    fn text_row_follows_canonical_column_order() {
        let record = ConstructionProject {
            no: 3,
            project_name: "A".into(),
            source: "02".into(),
            contract_amount: CellValue::Number(5_000_000.0),
            ..Default::default()
        };
        let row = record.to_text_row();
        assert_eq!(row.len(), PROJECT_COLUMNS.len());
        assert_eq!(row[0], "3");
        assert_eq!(row[1], "A");
        assert_eq!(row[17], "5000000");
        assert_eq!(row[28], "02");
    }

    #[test]
    fn master_rows_keep_numeric_mixed_columns() {
        let row = RawRow::from_pairs([
            ("No.", CellValue::Number(7.0)),
            ("공사명", CellValue::text("물류센터")),
            ("시도코드", CellValue::Number(11.0)),
            ("지상층수", CellValue::text("15")),
            ("계약번호", CellValue::Number(2024001.0)),
            ("unrelated", CellValue::text("x")),
        ]);
        let record = ConstructionProject::from_row(&row);
        assert_eq!(record.no, 7);
        assert_eq!(record.province_code, CellValue::Number(11.0));
        assert_eq!(record.above_ground_floors, CellValue::Text("15".into()));
        assert_eq!(record.contract_number, "2024001");
        assert_eq!(record.households, CellValue::Empty);
    }
}
