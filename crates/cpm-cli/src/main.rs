use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use cpm_adapters::LookupTables;
use cpm_core::PipelineConfig;
use cpm_sync::{load_pipeline_config, report_recent_runs, RunEnv, RunRequest, SyncPipeline};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "cpm-cli")]
#[command(about = "Construction project merge pipeline")]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `CPM_*` environment settings.
#[derive(Debug, Args)]
struct PathArgs {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    lookups: Option<PathBuf>,
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Filter, deduplicate and export one batch of source files.
    Run(RunArgs),
    /// Summarize the most recent export directories.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    /// Load and validate the configuration and lookup tables.
    CheckConfig,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Whobuilds export; repeat for several files.
    #[arg(long = "whobuilds")]
    whobuilds_files: Vec<PathBuf>,
    #[arg(long = "narajang")]
    narajang_file: Option<PathBuf>,
    #[arg(long = "master")]
    master_file: Option<PathBuf>,
    /// Run as if today were this date (YYYY-MM-DD).
    #[arg(long)]
    today: Option<NaiveDate>,
    #[arg(long)]
    offset_days: Option<i64>,
    #[arg(long)]
    min_amount: Option<f64>,
    /// Comma-separated.
    #[arg(long)]
    excluded_types: Option<String>,
    /// Comma-separated.
    #[arg(long)]
    excluded_keywords: Option<String>,
    #[arg(long)]
    chunk_size: Option<usize>,
}

impl RunArgs {
    fn apply_overrides(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(days) = self.offset_days {
            config.completion_offset_days = days;
        }
        if let Some(amount) = self.min_amount {
            config.min_contract_amount = amount;
        }
        if let Some(text) = &self.excluded_types {
            config = config.with_excluded_types(text);
        }
        if let Some(text) = &self.excluded_keywords {
            config = config.with_excluded_keywords(text);
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        config
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            whobuilds_files: self.whobuilds_files.clone(),
            narajang_file: self.narajang_file.clone(),
            master_file: self.master_file.clone(),
        }
    }
}

fn resolve_env(paths: PathArgs) -> RunEnv {
    let mut env = RunEnv::from_env();
    if let Some(path) = paths.config {
        env.config_path = path;
    }
    if let Some(path) = paths.lookups {
        env.lookups_path = path;
    }
    if let Some(path) = paths.out_dir {
        env.out_dir = path;
    }
    env
}

fn load_lookups(env: &RunEnv) -> Result<LookupTables> {
    LookupTables::from_path(&env.lookups_path)
        .with_context(|| format!("loading {}", env.lookups_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    let env = resolve_env(cli.paths);

    match cli.command {
        Commands::Run(args) => {
            let config = args.apply_overrides(load_pipeline_config(&env.config_path)?);
            let pipeline = SyncPipeline::new(config, load_lookups(&env)?, env.out_dir.clone())?;
            let request = args.request();
            let summary = match args.today {
                Some(today) => pipeline.run_once_on(&request, today).await?,
                None => pipeline.run_once(&request).await?,
            };
            let counts = &summary.output.counts;
            println!(
                "run complete: run_id={} new={} duplicates={} master={} chunks={} exports={}",
                summary.run_id,
                counts.unique_new,
                counts.duplicates,
                counts.updated_master,
                counts.chunks,
                summary.export_dir.display()
            );
        }
        Commands::Report { runs } => {
            println!("{}", report_recent_runs(&env.out_dir, runs)?);
        }
        Commands::CheckConfig => {
            let config = load_pipeline_config(&env.config_path)?;
            let lookups = load_lookups(&env)?;
            info!(
                config = %env.config_path.display(),
                lookups = %env.lookups_path.display(),
                "configuration valid"
            );
            println!(
                "config ok: offset_days={} min_amount={} excluded_types={} excluded_keywords={} chunk_size={}",
                config.completion_offset_days,
                config.min_contract_amount,
                config.excluded_types.len(),
                config.excluded_keywords.len(),
                config.chunk_size
            );
            println!(
                "lookups ok: construction_types={} detail_types={} provinces={} sub_regions={}",
                lookups.construction_types.len(),
                lookups.detail_types.len(),
                lookups.provinces.len(),
                lookups.sub_regions.len()
            );
        }
    }

    Ok(())
}
