//! Run orchestration: sequential input reads, the pure transform over
//! in-memory rows, and the export hand-off.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use cpm_adapters::{normalizer_for, LookupTables};
use cpm_core::{
    ConfigError, ConstructionProject, NormalizedProject, PipelineConfig, RawRow, RunLog, SourceKind,
};
use cpm_storage::{read_table, ExportStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dedup::{deduplicate, DedupOutcome};
use crate::export::{write_run_exports, ExportManifest};
use crate::filter::{apply_structural, EligibilityFilter, FilterOutcome};
use crate::merge::{chunk_records, date_tag, merge_into_master, renumber};

/// Where a run finds its configuration and writes its exports.
#[derive(Debug, Clone)]
pub struct RunEnv {
    pub config_path: PathBuf,
    pub lookups_path: PathBuf,
    pub out_dir: PathBuf,
}

impl RunEnv {
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("CPM_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/pipeline.yaml")),
            lookups_path: std::env::var("CPM_LOOKUPS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/lookups.yaml")),
            out_dir: std::env::var("CPM_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./exports")),
        }
    }
}

pub fn load_pipeline_config(path: &std::path::Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: PipelineConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

/// Input files for one run. Whobuilds files are read in the given order.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub whobuilds_files: Vec<PathBuf>,
    pub narajang_file: Option<PathBuf>,
    pub master_file: Option<PathBuf>,
}

/// Fully materialized rows handed to `transform`.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub whobuilds: Vec<RawRow>,
    pub narajang: Vec<RawRow>,
    pub master: Option<Vec<RawRow>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub whobuilds_rows: usize,
    pub whobuilds_kept: usize,
    pub narajang_rows: usize,
    pub narajang_kept: usize,
    pub structural_rejected: usize,
    pub master_rows: usize,
    pub duplicates: usize,
    pub unique_new: usize,
    pub updated_master: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub date_tag: String,
    pub cutoff: String,
    pub result: Vec<ConstructionProject>,
    pub duplicates: Vec<ConstructionProject>,
    pub updated_master: Vec<ConstructionProject>,
    pub chunks: Vec<Vec<ConstructionProject>>,
    pub counts: RunCounts,
    pub log: RunLog,
}

fn normalize_and_filter(
    kind: SourceKind,
    rows: &[RawRow],
    lookups: &LookupTables,
    filter: &EligibilityFilter<'_>,
    log: &mut RunLog,
) -> FilterOutcome<NormalizedProject> {
    let normalized = normalizer_for(kind, lookups).normalize_rows(rows);
    let outcome = filter.apply(normalized);
    if rows.is_empty() {
        log.info(format!("{}: no rows", kind.display_name()));
    } else if outcome.rejected.is_empty() {
        log.info(format!(
            "{}: {} rows normalized, all {} eligible",
            kind.display_name(),
            rows.len(),
            outcome.kept.len()
        ));
    } else {
        log.info(format!(
            "{}: {} rows normalized, {} eligible, {} excluded ({})",
            kind.display_name(),
            rows.len(),
            outcome.kept.len(),
            outcome.rejected_total(),
            outcome.rejection_summary()
        ));
    }
    outcome
}

/// The whole pipeline over in-memory rows. Deterministic apart from the
/// run id and log timestamps.
pub fn transform(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    lookups: &LookupTables,
    today: NaiveDate,
) -> Result<RunOutput, ConfigError> {
    config.validate()?;
    let mut log = RunLog::new();
    let filter = EligibilityFilter::new(config, today);
    log.info(format!(
        "cutoff date {} (today {} + {} days)",
        filter.cutoff(),
        today,
        config.completion_offset_days
    ));

    let whobuilds = normalize_and_filter(SourceKind::Whobuilds, &inputs.whobuilds, lookups, &filter, &mut log);
    let narajang = normalize_and_filter(SourceKind::Narajang, &inputs.narajang, lookups, &filter, &mut log);
    let mut counts = RunCounts {
        whobuilds_rows: inputs.whobuilds.len(),
        whobuilds_kept: whobuilds.kept.len(),
        narajang_rows: inputs.narajang.len(),
        narajang_kept: narajang.kept.len(),
        ..Default::default()
    };

    let merged: Vec<ConstructionProject> = whobuilds
        .kept
        .into_iter()
        .chain(narajang.kept)
        .map(NormalizedProject::into_record)
        .collect();
    let merged_len = merged.len();
    let structural = apply_structural(merged);
    counts.structural_rejected = structural.rejected_total();
    if counts.structural_rejected > 0 {
        log.warning(format!(
            "merged set: {} of {} records outside floor bounds ({})",
            counts.structural_rejected,
            merged_len,
            structural.rejection_summary()
        ));
    } else {
        log.info(format!("merged set: {merged_len} records"));
    }

    let master: Vec<ConstructionProject> = match &inputs.master {
        Some(rows) => rows.iter().map(ConstructionProject::from_row).collect(),
        None => {
            log.warning("no master set supplied; every eligible record counts as new");
            Vec::new()
        }
    };
    counts.master_rows = master.len();

    let DedupOutcome {
        duplicates,
        unique_new,
    } = deduplicate(&master, structural.kept);
    log.info(format!(
        "dedup against {} master records: {} duplicates, {} new",
        master.len(),
        duplicates.len(),
        unique_new.len()
    ));

    let result = renumber(unique_new);
    let duplicates = renumber(duplicates);
    let updated_master = merge_into_master(&master, &result);
    let chunks = chunk_records(&result, config.chunk_size);

    counts.duplicates = duplicates.len();
    counts.unique_new = result.len();
    counts.updated_master = updated_master.len();
    counts.chunks = chunks.len();
    log.success(format!(
        "{} new records, master now {} records, {} export chunk(s) of up to {}",
        result.len(),
        updated_master.len(),
        chunks.len(),
        config.chunk_size
    ));

    Ok(RunOutput {
        run_id: Uuid::new_v4(),
        date_tag: date_tag(today),
        cutoff: filter.cutoff().to_string(),
        result,
        duplicates,
        updated_master,
        chunks,
        counts,
        log,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub export_dir: PathBuf,
    pub manifest: ExportManifest,
    pub output: RunOutput,
}

pub struct SyncPipeline {
    config: PipelineConfig,
    lookups: LookupTables,
    store: ExportStore,
}

impl SyncPipeline {
    pub fn new(
        config: PipelineConfig,
        lookups: LookupTables,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate().context("invalid pipeline configuration")?;
        Ok(Self {
            config,
            lookups,
            store: ExportStore::new(out_dir),
        })
    }

    pub fn from_env(env: &RunEnv) -> Result<Self> {
        let config = load_pipeline_config(&env.config_path)?;
        let lookups = LookupTables::from_path(&env.lookups_path)
            .with_context(|| format!("loading {}", env.lookups_path.display()))?;
        Self::new(config, lookups, env.out_dir.clone())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn lookups(&self) -> &LookupTables {
        &self.lookups
    }

    /// Read every input, one file at a time, before any transformation.
    pub async fn read_inputs(&self, request: &RunRequest, log: &mut RunLog) -> Result<PipelineInputs> {
        let mut inputs = PipelineInputs::default();

        for path in &request.whobuilds_files {
            let rows = match read_table(path).await {
                Ok(rows) => rows,
                Err(err) => {
                    log.error(format!("failed to read whobuilds file {}: {err}", path.display()));
                    return Err(err).with_context(|| format!("reading whobuilds file {}", path.display()));
                }
            };
            log.info(format!("read {} rows from whobuilds file {}", rows.len(), path.display()));
            inputs.whobuilds.extend(rows);
        }

        if let Some(path) = &request.narajang_file {
            let rows = match read_table(path).await {
                Ok(rows) => rows,
                Err(err) => {
                    log.error(format!("failed to read narajang file {}: {err}", path.display()));
                    return Err(err).with_context(|| format!("reading narajang file {}", path.display()));
                }
            };
            log.info(format!("read {} rows from narajang file {}", rows.len(), path.display()));
            inputs.narajang = rows;
        }

        if let Some(path) = &request.master_file {
            let rows = match read_table(path).await {
                Ok(rows) => rows,
                Err(err) => {
                    log.error(format!("failed to read master file {}: {err}", path.display()));
                    return Err(err).with_context(|| format!("reading master file {}", path.display()));
                }
            };
            log.info(format!("read {} rows from master file {}", rows.len(), path.display()));
            inputs.master = Some(rows);
        }

        Ok(inputs)
    }

    pub async fn run_once(&self, request: &RunRequest) -> Result<SyncRunSummary> {
        self.run_once_on(request, Local::now().date_naive()).await
    }

    /// Same as `run_once` with an explicit "today".
    pub async fn run_once_on(&self, request: &RunRequest, today: NaiveDate) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let mut log = RunLog::new();
        let inputs = self.read_inputs(request, &mut log).await?;

        let mut output = transform(&inputs, &self.config, &self.lookups, today)?;
        log.extend(std::mem::take(&mut output.log));
        output.log = log;

        let (export_dir, manifest) = write_run_exports(&self.store, &output).await?;
        output
            .log
            .success(format!("exports written to {}", export_dir.display()));

        Ok(SyncRunSummary {
            run_id: output.run_id,
            started_at,
            finished_at: Utc::now(),
            export_dir,
            manifest,
            output,
        })
    }
}
