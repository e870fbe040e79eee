//! Export artifacts for one run, written all-or-nothing through the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use cpm_core::{ConstructionProject, PROJECT_COLUMNS};
use cpm_storage::{render_csv, ExportStore, StagedExport};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::{RunCounts, RunOutput};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SUMMARY_FILE: &str = "run_summary.md";
pub const SNAPSHOT_FILE: &str = "snapshots/updated_master.parquet";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub date_tag: String,
    pub counts: RunCounts,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

pub fn result_file_name(tag: &str) -> String {
    format!("result_{tag}.csv")
}

pub fn duplicates_file_name(tag: &str) -> String {
    format!("duplicates_{tag}.csv")
}

pub fn master_file_name(tag: &str) -> String {
    format!("master_{tag}.csv")
}

/// 1-based, zero-padded to two digits.
pub fn chunk_file_name(tag: &str, part: usize) -> String {
    format!("result_{tag}_part{part:02}.csv")
}

pub fn export_dir_name(output: &RunOutput) -> String {
    format!("{}_{}", output.date_tag, output.run_id)
}

pub fn render_records_csv(records: &[ConstructionProject]) -> Result<Vec<u8>> {
    let rows: Vec<Vec<String>> = records.iter().map(ConstructionProject::to_text_row).collect();
    render_csv(&PROJECT_COLUMNS, &rows).context("rendering csv export")
}

/// Every column as Utf8, in export order.
pub fn render_records_parquet(records: &[ConstructionProject]) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(
        PROJECT_COLUMNS
            .iter()
            .map(|name| ArrowField::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ));
    let rows: Vec<Vec<String>> = records.iter().map(ConstructionProject::to_text_row).collect();
    let columns: Vec<ArrayRef> = (0..PROJECT_COLUMNS.len())
        .map(|i| {
            Arc::new(StringArray::from(
                rows.iter().map(|row| row[i].as_str()).collect::<Vec<_>>(),
            )) as ArrayRef
        })
        .collect();
    let batch = RecordBatch::try_new(schema, columns).context("building master record batch")?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(&batch).context("writing master record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buffer)
}

pub fn render_run_summary(output: &RunOutput) -> String {
    let c = &output.counts;
    let mut lines = vec![
        "# CPM Run Summary".to_string(),
        String::new(),
        format!("- Run ID: `{}`", output.run_id),
        format!("- Date tag: {}", output.date_tag),
        format!("- Cutoff: {}", output.cutoff),
        String::new(),
        "## Counts".to_string(),
        format!("- whobuilds: {} read, {} eligible", c.whobuilds_rows, c.whobuilds_kept),
        format!("- narajang: {} read, {} eligible", c.narajang_rows, c.narajang_kept),
        format!("- floor bounds rejected: {}", c.structural_rejected),
        format!("- master: {} before, {} after", c.master_rows, c.updated_master),
        format!("- duplicates: {}", c.duplicates),
        format!("- new records: {}", c.unique_new),
        format!("- chunks: {}", c.chunks),
        String::new(),
        "## Log".to_string(),
    ];
    lines.push(output.log.to_markdown());
    lines.join("\n")
}

async fn write_tracked(
    staged: &mut StagedExport,
    files: &mut Vec<ManifestFile>,
    name: &str,
    path: &str,
    bytes: &[u8],
    rows: Option<usize>,
) -> Result<()> {
    let stored = staged.write_file(path, bytes).await?;
    files.push(ManifestFile {
        name: name.to_string(),
        path: path.to_string(),
        sha256: stored.content_hash,
        bytes: stored.byte_size as u64,
        rows,
    });
    Ok(())
}

async fn write_artifacts(staged: &mut StagedExport, output: &RunOutput) -> Result<ExportManifest> {
    let tag = output.date_tag.as_str();
    let mut files = Vec::new();

    for (name, path, records) in [
        ("result", result_file_name(tag), &output.result),
        ("duplicates", duplicates_file_name(tag), &output.duplicates),
        ("master", master_file_name(tag), &output.updated_master),
    ] {
        let bytes = render_records_csv(records)?;
        write_tracked(staged, &mut files, name, &path, &bytes, Some(records.len())).await?;
    }

    for (i, chunk) in output.chunks.iter().enumerate() {
        let part = i + 1;
        let bytes = render_records_csv(chunk)?;
        let name = format!("result_part{part:02}");
        let path = chunk_file_name(tag, part);
        write_tracked(staged, &mut files, &name, &path, &bytes, Some(chunk.len())).await?;
    }

    let snapshot = render_records_parquet(&output.updated_master)?;
    write_tracked(
        staged,
        &mut files,
        "updated_master_snapshot",
        SNAPSHOT_FILE,
        &snapshot,
        Some(output.updated_master.len()),
    )
    .await?;

    let summary = render_run_summary(output);
    write_tracked(staged, &mut files, "run_summary", SUMMARY_FILE, summary.as_bytes(), None).await?;

    let manifest = ExportManifest {
        schema_version: 1,
        run_id: output.run_id,
        date_tag: output.date_tag.clone(),
        counts: output.counts.clone(),
        files,
    };
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing export manifest")?;
    staged.write_file(MANIFEST_FILE, &bytes).await?;
    Ok(manifest)
}

/// Commit the staged directory, removing it if the rename fails.
async fn publish(staged: StagedExport) -> Result<PathBuf> {
    let staging_dir = staged.staging_dir().to_path_buf();
    match staged.commit().await {
        Ok(dir) => Ok(dir),
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging_dir).await {
                warn!(
                    staging_dir = %staging_dir.display(),
                    error = %cleanup,
                    "could not remove staging directory"
                );
            }
            Err(err)
        }
    }
}

/// Write every artifact into a staging directory and publish it as
/// `{out_dir}/{tag}_{run_id}`. Nothing is published if any write fails.
pub async fn write_run_exports(
    store: &ExportStore,
    output: &RunOutput,
) -> Result<(PathBuf, ExportManifest)> {
    let dir_name = export_dir_name(output);
    let mut staged = store.begin(&dir_name).await?;

    let manifest = match write_artifacts(&mut staged, output).await {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(run_id = %output.run_id, error = %err, "export failed, discarding staged files");
            staged.abort().await;
            return Err(err);
        }
    };

    let export_dir = publish(staged).await?;
    info!(
        run_id = %output.run_id,
        dir = %export_dir.display(),
        files = manifest.files.len(),
        "exports published"
    );
    Ok((export_dir, manifest))
}

fn read_manifest(path: &Path) -> Result<ExportManifest> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Markdown index of the `runs` most recently modified export directories.
pub fn report_recent_runs(out_dir: &Path, runs: usize) -> Result<String> {
    let mut dirs = std::fs::read_dir(out_dir)
        .with_context(|| format!("reading {}", out_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# CPM Recent Runs".to_string(), String::new()];
    let mut listed = 0;
    for dir in dirs {
        if listed == runs.max(1) {
            break;
        }
        let dir_name = dir.file_name().to_string_lossy().to_string();
        let manifest_path = dir.path().join(MANIFEST_FILE);
        let manifest = match read_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(
                    dir = %dir.path().display(),
                    error = %format!("{err:#}"),
                    "skipping export directory"
                );
                continue;
            }
        };
        listed += 1;

        lines.push(format!("## Run `{dir_name}`"));
        lines.push(format!("- date tag: {}", manifest.date_tag));
        lines.push(format!("- new records: {}", manifest.counts.unique_new));
        lines.push(format!("- duplicates: {}", manifest.counts.duplicates));
        lines.push(format!("- master size: {}", manifest.counts.updated_master));
        lines.push(format!("- files: {}", manifest.files.len()));
        let summary_path = dir.path().join(SUMMARY_FILE);
        if summary_path.exists() {
            lines.push(format!("- summary: `{}`", summary_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpm_core::{CellValue, RunLog};
    use tempfile::tempdir;

    fn record(no: u64, name: &str) -> ConstructionProject {
        ConstructionProject {
            no,
            project_name: name.into(),
            households: CellValue::Number(120.0),
            source: "01".into(),
            ..Default::default()
        }
    }

    fn output() -> RunOutput {
        let result = vec![record(1, "가"), record(2, "나"), record(3, "다")];
        RunOutput {
            run_id: Uuid::new_v4(),
            date_tag: "20261018".into(),
            cutoff: "2026-11-17".into(),
            duplicates: vec![record(1, "라")],
            updated_master: result.clone(),
            chunks: vec![result[..2].to_vec(), vec![record(1, "다")]],
            result,
            counts: RunCounts {
                unique_new: 3,
                duplicates: 1,
                updated_master: 3,
                chunks: 2,
                ..Default::default()
            },
            log: RunLog::new(),
        }
    }

    #[test]
    fn chunk_names_are_zero_padded() {
        assert_eq!(chunk_file_name("20261018", 1), "result_20261018_part01.csv");
        assert_eq!(chunk_file_name("20261018", 12), "result_20261018_part12.csv");
    }

    #[test]
    fn csv_export_uses_canonical_header() {
        let bytes = render_records_csv(&[record(1, "가")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let text = text.trim_start_matches('\u{feff}');
        let header = text.lines().next().unwrap();
        assert_eq!(header, PROJECT_COLUMNS.join(","));
        assert!(text.lines().nth(1).unwrap().starts_with("1,가,"));
    }

    #[test]
    fn parquet_snapshot_has_magic_bytes() {
        let bytes = render_records_parquet(&[record(1, "가"), record(2, "나")]).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
    }

    #[tokio::test]
    async fn exports_are_published_with_matching_hashes() {
        let dir = tempdir().expect("tempdir");
        let store = ExportStore::new(dir.path());
        let out = output();
        let (export_dir, manifest) = write_run_exports(&store, &out).await.expect("export");

        assert_eq!(export_dir, dir.path().join(format!("20261018_{}", out.run_id)));
        let names: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "result_20261018.csv",
                "duplicates_20261018.csv",
                "master_20261018.csv",
                "result_20261018_part01.csv",
                "result_20261018_part02.csv",
                SNAPSHOT_FILE,
                SUMMARY_FILE,
            ]
        );
        for file in &manifest.files {
            let bytes = std::fs::read(export_dir.join(&file.path)).unwrap();
            assert_eq!(ExportStore::sha256_hex(&bytes), file.sha256);
            assert_eq!(bytes.len() as u64, file.bytes);
        }
        assert!(export_dir.join(MANIFEST_FILE).exists());

        let report = report_recent_runs(dir.path(), 5).unwrap();
        assert!(report.contains("- new records: 3"));
        assert!(report.contains("- duplicates: 1"));
    }

    #[tokio::test]
    async fn failed_publish_removes_the_staging_directory() {
        let dir = tempdir().expect("tempdir");
        let store = ExportStore::new(dir.path());
        let mut staged = store.begin("20261018_run").await.expect("begin");
        staged.write_file("result.csv", b"x").await.expect("write");
        let staging_dir = staged.staging_dir().to_path_buf();

        // A non-empty directory now occupies the final name, so the rename fails.
        let taken = dir.path().join("20261018_run");
        std::fs::create_dir(&taken).unwrap();
        std::fs::write(taken.join("other.csv"), b"y").unwrap();

        assert!(publish(staged).await.is_err());
        assert!(!staging_dir.exists());
        assert_eq!(std::fs::read(taken.join("other.csv")).unwrap(), b"y");
    }

    #[tokio::test]
    async fn report_skips_directories_without_a_manifest() {
        let dir = tempdir().expect("tempdir");
        let store = ExportStore::new(dir.path());
        let out = output();
        write_run_exports(&store, &out).await.expect("export");
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::create_dir(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken").join(MANIFEST_FILE), b"{not json").unwrap();

        let report = report_recent_runs(dir.path(), 10).expect("report");
        assert!(report.contains(&out.run_id.to_string()));
        assert!(!report.contains("`notes`"));
        assert!(!report.contains("`broken`"));
    }

    #[tokio::test]
    async fn a_second_export_of_the_same_run_is_refused() {
        let dir = tempdir().expect("tempdir");
        let store = ExportStore::new(dir.path());
        let out = output();
        write_run_exports(&store, &out).await.expect("first export");
        assert!(write_run_exports(&store, &out).await.is_err());
        let visible = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(visible, 1);
    }
}
