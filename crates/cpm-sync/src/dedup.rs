//! Exact composite-key deduplication of new records against the master set.

use std::collections::HashSet;

use cpm_core::ConstructionProject;

/// (project name, ordering agency, contractor, address), each trimmed.
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub project_name: String,
    pub ordering_agency: String,
    pub contractor: String,
    pub address: String,
}

impl DedupKey {
    pub fn of(record: &ConstructionProject) -> Self {
        Self {
            project_name: record.project_name.trim().to_string(),
            ordering_agency: record.ordering_agency.trim().to_string(),
            contractor: record.contractor.trim().to_string(),
            address: record.address.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    pub duplicates: Vec<ConstructionProject>,
    pub unique_new: Vec<ConstructionProject>,
}

/// Hashed key index over the master set.
#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    keys: HashSet<DedupKey>,
}

impl MasterIndex {
    pub fn build(master: &[ConstructionProject]) -> Self {
        Self {
            keys: master.iter().map(DedupKey::of).collect(),
        }
    }

    pub fn contains(&self, record: &ConstructionProject) -> bool {
        self.keys.contains(&DedupKey::of(record))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Split `candidates` into master duplicates and new records, keeping
    /// input order in both. Candidates are not compared with each other.
    pub fn partition(&self, candidates: Vec<ConstructionProject>) -> DedupOutcome {
        let (duplicates, unique_new) = candidates
            .into_iter()
            .partition(|record| self.contains(record));
        DedupOutcome {
            duplicates,
            unique_new,
        }
    }
}

pub fn deduplicate(
    master: &[ConstructionProject],
    candidates: Vec<ConstructionProject>,
) -> DedupOutcome {
    MasterIndex::build(master).partition(candidates)
}
