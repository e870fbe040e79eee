//! Per-source mapping of raw rows into the canonical record.

use cpm_core::{CellValue, ConstructionProject, NormalizedProject, RawRow, SourceKind};

use crate::extract::{
    clean_project_name, extract_amount, extract_area, extract_floors, extract_households,
    map_region, parse_date, parse_date_text, AreaLabel, FloorLabel,
};
use crate::lookup::LookupTables;

/// Raw column headers of the Whobuilds field-log export.
pub mod whobuilds_columns {
    pub const PROJECT_NAME: &str = "공사명";
    pub const ORDERING_AGENCY: &str = "발주처";
    pub const CONTRACTOR: &str = "시공사";
    pub const ADDRESS: &str = "현장주소";
    pub const CONSTRUCTION_TYPE: &str = "공사종류";
    pub const PERIOD: &str = "공사기간";
    pub const PHONE_FAX: &str = "전화/팩스";
    pub const OVERVIEW: &str = "공사개요";
    pub const REGISTERED_AT: &str = "등록일";
    pub const SITE_MANAGER: &str = "현장소장";
    pub const DESIGNER: &str = "설계사";
    pub const SUPERVISOR: &str = "감리사";
}

/// Raw column headers of the Narajang procurement export.
pub mod narajang_columns {
    pub const PROJECT_NAME: &str = "공사명";
    pub const DEMAND_AGENCY: &str = "수요기관";
    pub const COMPANY: &str = "업체명";
    pub const SITE: &str = "공사현장";
    pub const WORK_TYPE: &str = "공종";
    pub const START_DATE: &str = "착공일자";
    pub const COMPLETION_DATE: &str = "준공일자";
    pub const CONTRACT_DATE: &str = "계약일자";
    pub const CONTRACT_AMOUNT: &str = "계약금액";
    pub const COLLABORATION_METHOD: &str = "공동수급방식";
    pub const CONTRACT_NUMBER: &str = "계약번호";
    pub const CONTACT_PERSON: &str = "담당자";
    pub const CONTACT_PHONE: &str = "전화번호";
}

const ADDRESS_VICINITY: &str = "일원";
const PHONE_PREFIX: &str = "TEL";
const FAX_PREFIX: &str = "FAX";
const SOLE_CONTRACT: &str = "단독";

pub trait SourceNormalizer {
    fn source_kind(&self) -> SourceKind;

    fn normalize_row(&self, row: &RawRow) -> NormalizedProject;

    fn normalize_rows(&self, rows: &[RawRow]) -> Vec<NormalizedProject> {
        rows.iter().map(|row| self.normalize_row(row)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WhobuildsNormalizer<'a> {
    lookups: &'a LookupTables,
}

impl<'a> WhobuildsNormalizer<'a> {
    pub fn new(lookups: &'a LookupTables) -> Self {
        Self { lookups }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NarajangNormalizer<'a> {
    lookups: &'a LookupTables,
}

impl<'a> NarajangNormalizer<'a> {
    pub fn new(lookups: &'a LookupTables) -> Self {
        Self { lookups }
    }
}

pub fn normalizer_for(kind: SourceKind, lookups: &LookupTables) -> Box<dyn SourceNormalizer + '_> {
    match kind {
        SourceKind::Whobuilds => Box::new(WhobuildsNormalizer::new(lookups)),
        SourceKind::Narajang => Box::new(NarajangNormalizer::new(lookups)),
    }
}

/// `"2023.01.01~2025.12.31"` -> independently parsed start and completion.
fn split_period(value: &CellValue) -> (String, String) {
    if let CellValue::Date(_) = value {
        return (parse_date(value).unwrap_or_default(), String::new());
    }
    let text = value.to_text();
    let mut parts = text.split('~');
    let start = parts.next().and_then(parse_date_text).unwrap_or_default();
    let completion = parts.next().and_then(parse_date_text).unwrap_or_default();
    (start, completion)
}

/// `"TEL 02-123-4567 / FAX 02-123-4568"` -> (phone, fax).
fn split_phone_fax(text: &str) -> (String, String) {
    let mut parts = text.split('/');
    let phone = parts
        .next()
        .map(|s| s.replace(PHONE_PREFIX, "").trim().to_string())
        .unwrap_or_default();
    let fax = parts
        .next()
        .map(|s| s.replace(FAX_PREFIX, "").trim().to_string())
        .unwrap_or_default();
    (phone, fax)
}

fn text_cell(value: Option<String>) -> CellValue {
    CellValue::from(value)
}

impl SourceNormalizer for WhobuildsNormalizer<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Whobuilds
    }

    fn normalize_row(&self, row: &RawRow) -> NormalizedProject {
        use whobuilds_columns as col;

        let original_type = row.text(col::CONSTRUCTION_TYPE);
        let (start_date, completion_date) = split_period(&row.cell(col::PERIOD));
        let (site_phone, site_fax) = split_phone_fax(&row.text(col::PHONE_FAX));
        let address = row.text(col::ADDRESS).replace(ADDRESS_VICINITY, "").trim().to_string();
        let overview = row.text(col::OVERVIEW);

        let record = ConstructionProject {
            no: 0,
            project_name: row.text(col::PROJECT_NAME),
            ordering_agency: row.text(col::ORDERING_AGENCY),
            contractor: row.text(col::CONTRACTOR),
            province_code: text_cell(Some(map_region(&address, &self.lookups.provinces))),
            sub_region_code: text_cell(Some(map_region(&address, &self.lookups.sub_regions))),
            construction_type_code: self
                .lookups
                .construction_type_code(&original_type)
                .unwrap_or_default()
                .to_string(),
            detail_type_code: self
                .lookups
                .detail_type_code(&original_type)
                .unwrap_or_default()
                .to_string(),
            start_date,
            completion_date,
            registration_date: parse_date(&row.cell(col::REGISTERED_AT)).unwrap_or_default(),
            built_up_area: extract_area(&overview, AreaLabel::BuiltUp).unwrap_or_default(),
            site_area: extract_area(&overview, AreaLabel::Site).unwrap_or_default(),
            basement_floors: text_cell(
                extract_floors(&overview, FloorLabel::Basement).map(|n| n.to_string()),
            ),
            above_ground_floors: text_cell(
                extract_floors(&overview, FloorLabel::Ground).map(|n| n.to_string()),
            ),
            households: text_cell(extract_households(&overview)),
            contract_amount: text_cell(extract_amount(&overview)),
            co_contract: String::new(),
            site_phone,
            site_fax,
            site_manager: row.text(col::SITE_MANAGER),
            designer: row.text(col::DESIGNER),
            supervisor: row.text(col::SUPERVISOR),
            overview,
            address,
            source: SourceKind::Whobuilds.tag().to_string(),
            ..Default::default()
        };

        NormalizedProject {
            kind: SourceKind::Whobuilds,
            record,
            original_type,
        }
    }
}

impl SourceNormalizer for NarajangNormalizer<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Narajang
    }

    fn normalize_row(&self, row: &RawRow) -> NormalizedProject {
        use narajang_columns as col;

        let original_type = row.text(col::WORK_TYPE);
        let address = row.text(col::SITE);
        let co_contract = if row.text(col::COLLABORATION_METHOD) == SOLE_CONTRACT {
            "N"
        } else {
            "Y"
        };

        let record = ConstructionProject {
            no: 0,
            project_name: clean_project_name(&row.text(col::PROJECT_NAME)),
            ordering_agency: row.text(col::DEMAND_AGENCY),
            contractor: row.text(col::COMPANY),
            province_code: text_cell(Some(map_region(&address, &self.lookups.provinces))),
            sub_region_code: text_cell(Some(map_region(&address, &self.lookups.sub_regions))),
            construction_type_code: self
                .lookups
                .construction_type_code(&original_type)
                .unwrap_or(&self.lookups.narajang_fallback_type_code)
                .to_string(),
            detail_type_code: self
                .lookups
                .detail_type_code(&original_type)
                .unwrap_or_default()
                .to_string(),
            start_date: parse_date(&row.cell(col::START_DATE)).unwrap_or_default(),
            completion_date: parse_date(&row.cell(col::COMPLETION_DATE)).unwrap_or_default(),
            registration_date: parse_date(&row.cell(col::CONTRACT_DATE)).unwrap_or_default(),
            contract_amount: CellValue::Number(
                row.cell(col::CONTRACT_AMOUNT).as_f64().unwrap_or(0.0),
            ),
            co_contract: co_contract.to_string(),
            contact_person: row.text(col::CONTACT_PERSON),
            contact_phone: row.text(col::CONTACT_PHONE),
            contract_number: row.text(col::CONTRACT_NUMBER),
            address,
            source: SourceKind::Narajang.tag().to_string(),
            ..Default::default()
        };

        NormalizedProject {
            kind: SourceKind::Narajang,
            record,
            original_type,
        }
    }
}
