//! Filtering, deduplication, merging and export of construction-project
//! records, plus the run orchestration tying them together.

pub mod dedup;
pub mod export;
pub mod filter;
pub mod merge;
pub mod pipeline;

pub use dedup::{deduplicate, DedupKey, DedupOutcome, MasterIndex};
pub use export::{report_recent_runs, write_run_exports, ExportManifest, ManifestFile};
pub use filter::{
    apply_structural, check_structure, cutoff_date, EligibilityFilter, FilterOutcome, RejectReason,
    DEFENSE_AGENCY,
};
pub use merge::{chunk_records, date_tag, merge_into_master, renumber};
pub use pipeline::{
    load_pipeline_config, transform, PipelineInputs, RunCounts, RunEnv, RunOutput, RunRequest,
    SyncPipeline, SyncRunSummary,
};

pub const CRATE_NAME: &str = "cpm-sync";

/// Build a pipeline from `CPM_*` environment settings and run it once.
pub async fn run_sync_once_from_env(request: &RunRequest) -> anyhow::Result<SyncRunSummary> {
    let env = RunEnv::from_env();
    SyncPipeline::from_env(&env)?.run_once(request).await
}
