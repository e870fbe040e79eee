//! Source adapters: field extractors, lookup tables and per-source
//! normalizers that turn raw tabular rows into canonical records.

pub mod extract;
pub mod lookup;
pub mod normalize;

pub use extract::{
    clean_project_name, contains_any_keyword, extract_amount, extract_area, extract_floors,
    extract_households, map_region, parse_date, parse_date_text, AreaLabel, FloorLabel,
};
pub use lookup::{LookupError, LookupTables, RegionEntry};
pub use normalize::{
    narajang_columns, normalizer_for, whobuilds_columns, NarajangNormalizer, SourceNormalizer,
    WhobuildsNormalizer,
};

pub const CRATE_NAME: &str = "cpm-adapters";
