use std::path::Path;

use cpm_adapters::{normalizer_for, LookupTables};
use cpm_core::{CellValue, RawRow, SourceKind};

fn shipped_lookups() -> LookupTables {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/lookups.yaml");
    LookupTables::from_path(path).expect("config/lookups.yaml")
}

#[test]
fn gyeonggi_gwangju_maps_to_gyeonggi_codes() {
    let tables = shipped_lookups();
    let row = RawRow::from_pairs([
        ("공사명", CellValue::text("오포 물류센터 신축")),
        ("현장주소", CellValue::text("경기도 광주시 오포읍 일원")),
        ("공사종류", CellValue::text("물류센터")),
    ]);
    let record = normalizer_for(SourceKind::Whobuilds, &tables)
        .normalize_row(&row)
        .into_record();
    assert_eq!(record.province_code, CellValue::text("41"));
    assert_eq!(record.sub_region_code, CellValue::text("41610"));
    assert_eq!(record.construction_type_code, "05");
    assert_eq!(record.detail_type_code, "0503");
}

#[test]
fn gwangju_metropolitan_city_keeps_its_own_code() {
    let tables = shipped_lookups();
    let row = RawRow::from_pairs([
        ("공사명", CellValue::text("첨단지구 도로 개설")),
        ("공사현장", CellValue::text("광주광역시 북구 첨단과기로")),
        ("공종", CellValue::text("도로")),
    ]);
    let record = normalizer_for(SourceKind::Narajang, &tables)
        .normalize_row(&row)
        .into_record();
    assert_eq!(record.province_code, CellValue::text("29"));
    assert_eq!(record.sub_region_code, CellValue::Empty);
    assert_eq!(record.construction_type_code, "08");
}
