//! Renumbering, master append and export chunking.

use chrono::NaiveDate;
use cpm_core::ConstructionProject;

/// Reassign `No.` as the 1-based position, ignoring any incoming value.
pub fn renumber(records: Vec<ConstructionProject>) -> Vec<ConstructionProject> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| record.with_no(i as u64 + 1))
        .collect()
}

/// Master records followed by the new ones, numbered across the whole list.
pub fn merge_into_master(
    master: &[ConstructionProject],
    unique_new: &[ConstructionProject],
) -> Vec<ConstructionProject> {
    renumber(master.iter().chain(unique_new).cloned().collect())
}

/// Contiguous chunks of `chunk_size`, each numbered from 1. The last chunk
/// may be shorter. A zero size is treated as one.
pub fn chunk_records(
    records: &[ConstructionProject],
    chunk_size: usize,
) -> Vec<Vec<ConstructionProject>> {
    records
        .chunks(chunk_size.max(1))
        .map(|chunk| renumber(chunk.to_vec()))
        .collect()
}

/// `YYYYMMDD` used in export names.
pub fn date_tag(today: NaiveDate) -> String {
    today.format("%Y%m%d").to_string()
}
