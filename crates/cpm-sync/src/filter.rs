//! Eligibility rules applied per source after normalization and once more,
//! for structural bounds, after both sources are concatenated.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use cpm_adapters::contains_any_keyword;
use cpm_core::{ConstructionProject, NormalizedProject, PipelineConfig, SourceKind};
use serde::Serialize;

/// Whobuilds rows ordered by this agency are never taken.
pub const DEFENSE_AGENCY: &str = "국방시설본부";
pub const BASEMENT_FLOOR_LIMIT: f64 = 10.0;
pub const ABOVE_GROUND_FLOOR_LIMIT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DefenseAgency,
    CompletionBeforeCutoff,
    ExcludedType,
    ExcludedKeyword,
    BelowMinimumAmount,
    TooManyBasementFloors,
    TooManyAboveGroundFloors,
}

impl RejectReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::DefenseAgency => "defense agency",
            Self::CompletionBeforeCutoff => "completion date missing or before cutoff",
            Self::ExcludedType => "excluded construction type",
            Self::ExcludedKeyword => "excluded keyword in project name",
            Self::BelowMinimumAmount => "contract amount below minimum",
            Self::TooManyBasementFloors => "basement floors out of range",
            Self::TooManyAboveGroundFloors => "above-ground floors out of range",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome<T> {
    pub kept: Vec<T>,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl<T> FilterOutcome<T> {
    fn partition(items: Vec<T>, check: impl Fn(&T) -> Option<RejectReason>) -> Self {
        let mut kept = Vec::with_capacity(items.len());
        let mut rejected = BTreeMap::new();
        for item in items {
            match check(&item) {
                Some(reason) => *rejected.entry(reason).or_default() += 1,
                None => kept.push(item),
            }
        }
        Self { kept, rejected }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// `"reason=count, ..."` for run-log messages.
    pub fn rejection_summary(&self) -> String {
        self.rejected
            .iter()
            .map(|(reason, count)| format!("{}={count}", reason.describe()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// ISO text of `today + offset_days`.
pub fn cutoff_date(today: NaiveDate, offset_days: i64) -> String {
    (today + Duration::days(offset_days))
        .format("%Y-%m-%d")
        .to_string()
}

/// Per-source eligibility with the cutoff fixed for the whole run.
#[derive(Debug, Clone)]
pub struct EligibilityFilter<'a> {
    config: &'a PipelineConfig,
    cutoff: String,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(config: &'a PipelineConfig, today: NaiveDate) -> Self {
        Self {
            config,
            cutoff: cutoff_date(today, config.completion_offset_days),
        }
    }

    pub fn cutoff(&self) -> &str {
        &self.cutoff
    }

    fn common_checks(&self, item: &NormalizedProject) -> Option<RejectReason> {
        let completion = item.record.completion_date.as_str();
        if completion.is_empty() || completion < self.cutoff.as_str() {
            return Some(RejectReason::CompletionBeforeCutoff);
        }
        if self.config.excluded_types.iter().any(|t| t == &item.original_type) {
            return Some(RejectReason::ExcludedType);
        }
        if contains_any_keyword(&item.record.project_name, &self.config.excluded_keywords) {
            return Some(RejectReason::ExcludedKeyword);
        }
        None
    }

    pub fn check(&self, item: &NormalizedProject) -> Option<RejectReason> {
        match item.kind {
            SourceKind::Whobuilds => {
                if item.record.ordering_agency.contains(DEFENSE_AGENCY) {
                    return Some(RejectReason::DefenseAgency);
                }
                self.common_checks(item)
            }
            SourceKind::Narajang => self.common_checks(item).or_else(|| {
                let amount = item.record.contract_amount.as_f64().unwrap_or(0.0);
                (!(amount >= self.config.min_contract_amount))
                    .then_some(RejectReason::BelowMinimumAmount)
            }),
        }
    }

    pub fn apply(&self, items: Vec<NormalizedProject>) -> FilterOutcome<NormalizedProject> {
        FilterOutcome::partition(items, |item| self.check(item))
    }
}

/// Floor-count sanity bounds; absent or non-numeric counts pass.
pub fn check_structure(record: &ConstructionProject) -> Option<RejectReason> {
    if record
        .basement_floors
        .as_f64()
        .is_some_and(|n| n >= BASEMENT_FLOOR_LIMIT)
    {
        return Some(RejectReason::TooManyBasementFloors);
    }
    if record
        .above_ground_floors
        .as_f64()
        .is_some_and(|n| n >= ABOVE_GROUND_FLOOR_LIMIT)
    {
        return Some(RejectReason::TooManyAboveGroundFloors);
    }
    None
}

pub fn apply_structural(records: Vec<ConstructionProject>) -> FilterOutcome<ConstructionProject> {
    FilterOutcome::partition(records, check_structure)
}
