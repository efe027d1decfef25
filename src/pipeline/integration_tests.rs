// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::backends::stub::{Gauge, StubTool};
use crate::config::{Config, RuntimeBuilder};
use crate::dataset::{ManifestDataset, ScanFile, SubjectData};
use crate::engine::RECORDS_FILE;
use crate::errors::{DatasetError, PipelineError};
use crate::pipeline::{
    Outcome, PipelineDriver, SubjectState, CONFIG_SNAPSHOT_FILE, DATASET_DESCRIPTION_FILE,
};
use crate::report::{StageDetail, StageStatus};

/// End-to-end runs with builtin tools over a manifest dataset
#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
tools:
  - name: stage
    version: "1.0"
    kind: builtin
    function: copy
  - name: summarize
    kind: builtin
    function: summarize
  - name: broken_qc
    kind: command
    program: sh
    args: ["-c", "echo qc exploded >&2; exit 3"]
rules:
  - id: t1w_reference
    capability: anat_reference
    stage: anatomical
    tool: stage
    priority: 20
    mandatory: true
    requires:
      - has_modality: t1w
    inputs:
      - name: t1w
    outputs:
      - name: anat_ref
        file: anat_ref.nii.gz
    hint: provide a T1w image
  - id: pet_hmc
    capability: pet_hmc
    stage: motion_correction
    tool: stage
    foreach: pet
    requires:
      - min_frames
    inputs:
      - name: pet
    outputs:
      - name: hmc
        file: hmc.nii.gz
  - id: pet_summary
    capability: pet_summary
    stage: reporting
    tool: summarize
    inputs:
      - name: series
        from: hmc
      - name: anat
        from: anat_ref
    outputs:
      - name: summary
        file: summary.json
"#;

    const BROKEN_QC_RULE: &str = r#"
  - id: anat_qc
    capability: anat_qc
    stage: quality
    tool: broken_qc
    inputs:
      - name: anat
        from: anat_ref
    outputs:
      - name: qc
        file: qc.json
  - id: qc_report
    capability: qc_report
    stage: quality
    tool: stage
    inputs:
      - name: qc
    outputs:
      - name: qc_copy
        file: qc_copy.json
"#;

    fn config(work: &Path, extra_rules: &str, run_extra: &str) -> Config {
        let yaml = format!(
            "run:\n  work_dir: {}\n  max_concurrent_subjects: 2\n  max_concurrent_nodes: 2\n  retry:\n    attempts: 0\n{}{}{}",
            work.display(),
            run_extra,
            RULES,
            extra_rules
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn scan(dir: &Path, name: &str, content: &str) -> ScanFile {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        ScanFile::new(path)
    }

    /// 01: T1w and two PET series; 02: structural only; 03: PET without T1w
    fn dataset(dir: &Path) -> ManifestDataset {
        let full = SubjectData::new("01")
            .with_scan("t1w", scan(dir, "sub-01_T1w.nii.gz", "t1w of 01"))
            .with_scan(
                "pet",
                scan(dir, "sub-01_trc-FDG_pet.nii.gz", "fdg of 01").with_metadata("frame_count", 24),
            )
            .with_scan(
                "pet",
                scan(dir, "sub-01_trc-PIB_pet.nii.gz", "pib of 01").with_metadata("frame_count", 30),
            )
            .with_metadata("TracerName", "FDG");
        let structural = SubjectData::new("02")
            .with_scan("t1w", scan(dir, "sub-02_T1w.nii.gz", "t1w of 02"));
        let no_anat = SubjectData::new("03").with_scan(
            "pet",
            scan(dir, "sub-03_trc-FDG_pet.nii.gz", "fdg of 03").with_metadata("frame_count", 24),
        );
        ManifestDataset::from_subjects(vec![full, structural, no_anat])
    }

    fn driver(config: Config) -> PipelineDriver {
        PipelineDriver::new(RuntimeBuilder::from_config(config).unwrap())
    }

    fn only(config: &mut Config, labels: &[&str]) {
        config.workflow.participant_labels = labels.iter().map(|s| s.to_string()).collect();
    }

    #[tokio::test]
    async fn test_run_writes_reports_records_and_snapshots() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mut config = config(&work, "", "");
        only(&mut config, &["01", "02"]);

        let summary = driver(config).run(&dataset(temp.path())).await.unwrap();

        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.count(Outcome::Success), 2);

        let full = summary.subject("01").unwrap();
        assert_eq!(full.state, SubjectState::Done(Outcome::Success));
        let capabilities: Vec<&str> = full
            .report
            .stages
            .iter()
            .map(|s| s.capability.as_str())
            .collect();
        assert_eq!(
            capabilities,
            vec!["anat_reference", "pet_hmc", "pet_hmc", "pet_summary"]
        );
        assert_eq!(full.report.summary.metadata["TracerName"], "FDG");

        let sub01 = work.join("sub-01");
        assert!(sub01.join("report.json").exists());
        assert!(sub01.join("report.txt").exists());
        let log_dir = sub01.join("log").join(&summary.run_id);
        assert!(log_dir.join(RECORDS_FILE).exists());
        assert!(log_dir.join(CONFIG_SNAPSHOT_FILE).exists());
        assert!(work.join(DATASET_DESCRIPTION_FILE).exists());

        let summary_json = &full.report.stage("pet_summary").unwrap().artifacts["summary"];
        assert!(summary_json.exists());
    }

    #[tokio::test]
    async fn test_structural_only_subject_omits_pet_stages() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp.path().join("work"), "", "");
        only(&mut config, &["sub-02"]);

        let summary = driver(config).run(&dataset(temp.path())).await.unwrap();

        let structural = summary.subject("02").unwrap();
        assert_eq!(structural.outcome, Outcome::Success);
        let stages: Vec<&str> = structural
            .report
            .stages
            .iter()
            .map(|s| s.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["anatomical"]);
    }

    #[tokio::test]
    async fn test_missing_mandatory_input_fails_before_any_invocation() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp.path().join("work"), "", "");
        only(&mut config, &["03"]);
        let stage = StubTool::new("stage");
        let summarize = StubTool::new("summarize");
        let runtime = RuntimeBuilder::from_config(config)
            .unwrap()
            .with_tool(Arc::new(stage.clone()))
            .with_tool(Arc::new(summarize.clone()));

        let summary = PipelineDriver::new(runtime)
            .run(&dataset(temp.path()))
            .await
            .unwrap();

        let subject = summary.subject("03").unwrap();
        assert_eq!(subject.state, SubjectState::Done(Outcome::Failed));
        assert!(subject.execution.is_none());
        assert!(subject.report.stages.is_empty());
        let error = subject.report.error.as_deref().unwrap();
        assert!(error.contains("anat_reference"), "{}", error);
        assert!(error.contains("provide a T1w image"), "{}", error);
        assert_eq!(stage.calls() + summarize.calls(), 0);
        assert_eq!(summary.exit_code(), 1);
        assert!(temp.path().join("work/sub-03/report.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_stage_makes_subject_partial() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp.path().join("work"), BROKEN_QC_RULE, "");
        only(&mut config, &["02"]);

        let summary = driver(config).run(&dataset(temp.path())).await.unwrap();

        let subject = summary.subject("02").unwrap();
        assert_eq!(subject.outcome, Outcome::Partial);
        assert_eq!(summary.exit_code(), 1);

        let report = &subject.report;
        assert_eq!(report.stage("anat_reference").unwrap().status, StageStatus::Success);
        let qc = report.stage("anat_qc").unwrap();
        assert_eq!(qc.status, StageStatus::Failed);
        assert!(qc.error.as_deref().unwrap().contains("qc exploded"));
        let downstream = report.stage("qc_report").unwrap();
        assert_eq!(downstream.status, StageStatus::Skipped);
        assert_eq!(
            downstream.detail,
            StageDetail::UpstreamFailure {
                upstream: "anat_qc".into()
            }
        );
    }

    #[tokio::test]
    async fn test_second_run_is_fully_cached() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp.path().join("work"), "", "");
        only(&mut config, &["01"]);
        let driver = driver(config);
        let dataset = dataset(temp.path());

        let first = driver.run(&dataset).await.unwrap();
        let second = driver.run(&dataset).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        let report = &second.subject("01").unwrap().report;
        assert_eq!(report.stages.len(), 4);
        for stage in &report.stages {
            assert_eq!(stage.detail, StageDetail::Cached, "{}", stage.node_id);
            let original = first.subject("01").unwrap().report.stage(&stage.node_id).unwrap();
            assert_eq!(stage.artifacts, original.artifacts);
        }
        assert_eq!(second.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_missing_participant_is_fatal() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mut config = config(&work, "", "");
        only(&mut config, &["01", "sub-09"]);

        let error = driver(config).run(&dataset(temp.path())).await.unwrap_err();

        assert!(matches!(
            &error,
            PipelineError::Dataset(DatasetError::ParticipantsNotFound(missing)) if missing == &vec!["09".to_string()]
        ));
        assert_eq!(error.exit_code(), 2);
        assert!(!work.join("sub-01").exists());
    }

    #[tokio::test]
    async fn test_cancel_before_run_executes_nothing() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let driver = driver(config(&work, "", ""));
        driver.cancel();

        let error = driver.run(&dataset(temp.path())).await.unwrap_err();

        assert!(matches!(error, PipelineError::Cancelled));
        assert!(!work.join("sub-01").exists());
        assert!(!driver.cancel_subject("01"));
    }

    #[tokio::test]
    async fn test_prune_outdated_removes_old_tool_versions() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mut first = config(&work, "", "");
        only(&mut first, &["02"]);
        driver(first.clone()).run(&dataset(temp.path())).await.unwrap();

        let mut upgraded = first;
        upgraded.cache.prune_outdated = true;
        for tool in &mut upgraded.tools {
            if tool.name == "stage" {
                tool.version = "2.0".into();
            }
        }
        let driver = driver(upgraded);
        let summary = driver.run(&dataset(temp.path())).await.unwrap();

        let stage = summary.subject("02").unwrap().report.stage("anat_reference").unwrap().clone();
        assert_eq!(stage.detail, StageDetail::Executed);
        assert_eq!(driver.prune_outdated_cache().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subjects_in_flight_never_exceed_the_limit() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp.path().join("work"), "", "");
        assert_eq!(config.run.max_concurrent_subjects(), 2);
        let gauge = Gauge::new();
        let stage = StubTool::new("stage")
            .with_delay(Duration::from_millis(80))
            .with_gauge(gauge.clone());
        let runtime = RuntimeBuilder::from_config(config)
            .unwrap()
            .with_tool(Arc::new(stage.clone()))
            .with_tool(Arc::new(StubTool::new("summarize")));
        // Structural-only subjects run exactly one node each.
        let subjects = ["01", "02", "03", "04", "05"]
            .iter()
            .map(|id| {
                let t1w = scan(temp.path(), &format!("sub-{}_T1w.nii.gz", id), id);
                SubjectData::new(*id).with_scan("t1w", t1w)
            })
            .collect();

        let summary = PipelineDriver::new(runtime)
            .run(&ManifestDataset::from_subjects(subjects))
            .await
            .unwrap();

        assert_eq!(summary.count(Outcome::Success), 5);
        assert_eq!(stage.calls(), 5);
        assert_eq!(gauge.peak(), 2);
    }
}
