use std::path::PathBuf;

use chrono::NaiveDate;
use cpm_adapters::LookupTables;
use cpm_core::{LogLevel, PipelineConfig};
use cpm_storage::{read_table, ExportStore};
use cpm_sync::{load_pipeline_config, RunRequest, SyncPipeline};
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture(name: &str) -> PathBuf {
    workspace_root().join("fixtures/sample").join(name)
}

fn shipped_config() -> PipelineConfig {
    load_pipeline_config(&workspace_root().join("config/pipeline.yaml")).expect("pipeline.yaml")
}

fn shipped_lookups() -> LookupTables {
    LookupTables::from_path(workspace_root().join("config/lookups.yaml")).expect("lookups.yaml")
}

fn full_request() -> RunRequest {
    RunRequest {
        whobuilds_files: vec![fixture("whobuilds_sample.csv")],
        narajang_file: Some(fixture("narajang_sample.csv")),
        master_file: Some(fixture("master_sample.csv")),
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

#[tokio::test]
async fn sample_run_filters_dedups_and_exports() {
    let out = tempdir().expect("tempdir");
    let config = PipelineConfig {
        chunk_size: 2,
        ..shipped_config()
    };
    let pipeline = SyncPipeline::new(config, shipped_lookups(), out.path()).expect("pipeline");
    let summary = pipeline
        .run_once_on(&full_request(), today())
        .await
        .expect("run");
    let output = &summary.output;

    assert_eq!(output.cutoff, "2026-11-17");
    assert_eq!(output.counts.whobuilds_rows, 6);
    assert_eq!(output.counts.whobuilds_kept, 3);
    assert_eq!(output.counts.narajang_rows, 3);
    assert_eq!(output.counts.narajang_kept, 1);
    assert_eq!(output.counts.master_rows, 2);

    let names: Vec<_> = output.result.iter().map(|r| r.project_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["판교 업무시설 신축공사", "분당 오피스텔 신축", "국도 확장공사"]
    );
    assert_eq!(output.result.iter().map(|r| r.no).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(output.duplicates.len(), 1);
    assert_eq!(output.duplicates[0].project_name, "반포 아파트 재건축");

    assert_eq!(output.updated_master.len(), 5);
    assert_eq!(output.updated_master[0].project_name, "반포 아파트 재건축");
    assert_eq!(output.updated_master[4].project_name, "국도 확장공사");
    assert_eq!(
        output.updated_master.iter().map(|r| r.no).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    let road = &output.result[2];
    assert_eq!(road.province_code.to_text(), "41");
    assert_eq!(road.sub_region_code.to_text(), "41610");
    assert_eq!(road.construction_type_code, "08");
    assert_eq!(road.co_contract, "Y");
    assert_eq!(road.source, "02");

    let pangyo = &output.result[0];
    assert_eq!(pangyo.built_up_area, "45000");
    assert_eq!(pangyo.site_area, "8200.5");
    assert_eq!(pangyo.site_phone, "031-111-2222");
    assert_eq!(pangyo.site_fax, "031-111-2223");
    assert_eq!(pangyo.address, "경기도 성남시 분당구 삼평동");

    assert_eq!(output.chunks.len(), 2);
    assert_eq!(output.chunks[1][0].no, 1);
    assert_eq!(output.log.entries().last().unwrap().level, LogLevel::Success);

    assert_eq!(
        summary.export_dir,
        out.path().join(format!("20261018_{}", summary.run_id))
    );
    assert_eq!(summary.manifest.files.len(), 7);
    for file in &summary.manifest.files {
        let bytes = std::fs::read(summary.export_dir.join(&file.path)).expect("exported file");
        assert_eq!(ExportStore::sha256_hex(&bytes), file.sha256, "{}", file.path);
    }

    let master_csv = summary.export_dir.join("master_20261018.csv");
    let reread = read_table(&master_csv).await.expect("re-read master");
    assert_eq!(reread.len(), 5);
    assert_eq!(reread[4].text("공사명"), "국도 확장공사");
}

#[tokio::test]
async fn unreadable_input_aborts_before_writing() {
    let out = tempdir().expect("tempdir");
    let pipeline = SyncPipeline::new(shipped_config(), shipped_lookups(), out.path()).expect("pipeline");
    let request = RunRequest {
        whobuilds_files: vec![fixture("whobuilds_sample.csv"), fixture("missing.csv")],
        ..Default::default()
    };
    let err = pipeline.run_once_on(&request, today()).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing.csv"));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn run_without_master_treats_everything_as_new() {
    let out = tempdir().expect("tempdir");
    let pipeline = SyncPipeline::new(shipped_config(), shipped_lookups(), out.path()).expect("pipeline");
    let request = RunRequest {
        whobuilds_files: vec![fixture("whobuilds_sample.csv")],
        ..Default::default()
    };
    let summary = pipeline.run_once_on(&request, today()).await.expect("run");
    assert_eq!(summary.output.result.len(), 3);
    assert!(summary.output.duplicates.is_empty());
    assert_eq!(summary.output.updated_master, summary.output.result);
    assert_eq!(summary.output.chunks.len(), 1);

    let report = cpm_sync::report_recent_runs(out.path(), 3).expect("report");
    assert!(report.contains(&summary.run_id.to_string()));
    assert!(report.contains("- new records: 3"));
}
