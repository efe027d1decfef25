// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage-ordered subject reports.
//!
//! The aggregator only reads: execution records, the subject's DAG and its
//! dataset summary go in, an immutable [`SubjectReport`] comes out. Every node
//! of the DAG appears exactly once, including nodes that never ran, so a
//! report of a partially failed subject still accounts for all of it.
//!
//! Stages are ordered by topological rank, then stage name, then node id.

mod render;

pub use render::{JsonRenderer, TextRenderer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::cache::OutputSet;
use crate::config::WorkflowOptions;
use crate::dataset::SubjectData;
use crate::engine::{ExecutionRecord, SubjectExecution};
use crate::graph::{NodeSpec, NodeState, SubjectDag};
use crate::pipeline::Outcome;

/// Acquisition metadata copied into the summary when the dataset has it.
pub const SUMMARY_METADATA_KEYS: &[&str] = &[
    "InjectedRadioactivity",
    "InjectedRadioactivityUnits",
    "Manufacturer",
    "ManufacturersModelName",
    "TracerName",
    "TracerRadionuclide",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

/// Why a stage has its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StageDetail {
    Executed,
    Cached,
    UpstreamFailure { upstream: String },
    Cancelled,
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub node_id: String,
    pub capability: String,
    pub rule_id: String,
    pub tool: String,
    pub rank: usize,
    pub status: StageStatus,
    pub detail: StageDetail,
    /// Declared output name -> file
    pub artifacts: OutputSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl StageReport {
    fn from_record(node: &NodeSpec, rank: usize, record: Option<&ExecutionRecord>) -> Self {
        let mut stage = Self {
            stage: node.stage.clone(),
            node_id: node.id.clone(),
            capability: node.capability.clone(),
            rule_id: node.rule_id.clone(),
            tool: node.tool.clone(),
            rank,
            status: StageStatus::Skipped,
            detail: StageDetail::NotRun,
            artifacts: OutputSet::new(),
            error: None,
            attempts: 0,
            retries: 0,
            duration_seconds: None,
        };
        let Some(record) = record else {
            return stage;
        };

        stage.attempts = record.attempts;
        stage.retries = record.retries;
        stage.duration_seconds = record.duration().map(|d| d.as_secs_f64());
        stage.error = record.error.as_ref().map(|e| e.to_string());
        match record.state {
            NodeState::Succeeded => {
                stage.status = StageStatus::Success;
                stage.detail = StageDetail::Executed;
                stage.artifacts = record.outputs.clone();
            }
            NodeState::SkippedCached => {
                stage.status = StageStatus::Success;
                stage.detail = StageDetail::Cached;
                stage.artifacts = record.outputs.clone();
            }
            NodeState::Failed => {
                stage.status = StageStatus::Failed;
                stage.detail = StageDetail::Executed;
            }
            NodeState::SkippedUpstreamFailure => {
                let upstream = record.upstream_failure.clone().unwrap_or_default();
                stage.error = Some(format!("not run: upstream '{}' failed", upstream));
                stage.detail = StageDetail::UpstreamFailure { upstream };
            }
            NodeState::Cancelled => stage.detail = StageDetail::Cancelled,
            NodeState::Pending | NodeState::Ready | NodeState::Running => {}
        }
        stage
    }
}

/// What the pipeline knew about the subject before building its graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub modalities: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

impl ReportSummary {
    pub fn new(subject: &SubjectData, workflow: &WorkflowOptions) -> Self {
        let mut metadata = BTreeMap::new();
        for key in SUMMARY_METADATA_KEYS {
            let value = subject.metadata_value(key).cloned().or_else(|| {
                subject
                    .files("pet")
                    .iter()
                    .find_map(|scan| scan.metadata.get(*key).cloned())
            });
            if let Some(value) = value {
                metadata.insert(key.to_string(), value);
            }
        }

        let mut options = BTreeMap::new();
        options.insert("anat_only".to_string(), Value::Bool(workflow.anat_only));
        options.insert("sloppy".to_string(), Value::Bool(workflow.sloppy));
        options.insert(
            "min_pet_frames".to_string(),
            Value::from(workflow.min_pet_frames()),
        );
        if !workflow.output_spaces.is_empty() {
            options.insert(
                "output_spaces".to_string(),
                Value::from(workflow.output_spaces.clone()),
            );
        }
        if !workflow.ignore.is_empty() {
            options.insert("ignore".to_string(), Value::from(workflow.ignore.clone()));
        }

        Self {
            modalities: subject.modality_counts(),
            metadata,
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectReport {
    pub subject: String,
    pub run_id: String,
    pub outcome: Outcome,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub stages: Vec<StageReport>,
    /// Why the subject never executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubjectReport {
    pub fn stage(&self, node_id: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.node_id == node_id)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }
}

pub struct ReportAggregator;

impl ReportAggregator {
    /// Report of a subject whose DAG executed, successfully or not.
    pub fn aggregate(
        run_id: &str,
        summary: ReportSummary,
        dag: &SubjectDag,
        execution: &SubjectExecution,
        outcome: Outcome,
    ) -> SubjectReport {
        let mut stages: Vec<StageReport> = dag
            .nodes()
            .map(|node| {
                let rank = dag.rank(&node.id).unwrap_or(0);
                StageReport::from_record(node, rank, execution.record(&node.id))
            })
            .collect();
        stages.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| a.stage.cmp(&b.stage))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        SubjectReport {
            subject: dag.subject().to_string(),
            run_id: run_id.to_string(),
            outcome,
            generated_at: Utc::now(),
            summary,
            stages,
            error: None,
        }
    }

    /// Report of a subject that failed before execution: summary and error only.
    pub fn not_executed(
        run_id: &str,
        subject: &str,
        summary: ReportSummary,
        error: &dyn std::error::Error,
    ) -> SubjectReport {
        SubjectReport {
            subject: subject.to_string(),
            run_id: run_id.to_string(),
            outcome: Outcome::Failed,
            generated_at: Utc::now(),
            summary,
            stages: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ScanFile;
    use crate::errors::{NodeError, NodeErrorKind};
    use crate::graph::{NodeInput, OutputRef};
    use std::time::Duration;

    fn node(id: &str, stage: &str, deps: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.into(),
            capability: id.split('.').next().unwrap_or(id).into(),
            stage: stage.into(),
            rule_id: format!("{}_rule", id),
            tool: "tool".into(),
            params: BTreeMap::new(),
            inputs: deps
                .iter()
                .map(|d| {
                    (
                        d.to_string(),
                        NodeInput::Upstream(OutputRef {
                            node_id: d.to_string(),
                            output: "out".into(),
                        }),
                    )
                })
                .collect(),
            outputs: [("out".to_string(), "out.nii.gz".to_string())].into(),
            resources: Default::default(),
            item: None,
        }
    }

    fn record(dag: &SubjectDag, id: &str, state: NodeState) -> ExecutionRecord {
        let mut record = ExecutionRecord::new("01", dag.node(id).unwrap(), dag.rank(id).unwrap());
        record.start();
        record.attempts = 1;
        match state {
            NodeState::Failed => record.fail(NodeError::new(NodeErrorKind::Invocation, "exit 1")),
            NodeState::SkippedUpstreamFailure => {
                record.attempts = 0;
                record.skip_upstream("pet_hmc.trc-FDG");
            }
            other => {
                record.outputs = [("out".to_string(), format!("/work/{}/out.nii.gz", id).into())].into();
                record.finish(other);
            }
        }
        record
    }

    fn execution(records: Vec<ExecutionRecord>) -> SubjectExecution {
        SubjectExecution {
            subject: "01".into(),
            records: records.into_iter().map(|r| (r.node_id.clone(), r)).collect(),
            duration: Duration::from_secs(1),
        }
    }

    fn dag() -> SubjectDag {
        SubjectDag::new(
            "01",
            vec![
                node("summary", "reporting", &["pet_coreg.trc-FDG", "anat_reference"]),
                node("pet_coreg.trc-FDG", "coregistration", &["pet_hmc.trc-FDG", "anat_reference"]),
                node("pet_hmc.trc-FDG", "motion_correction", &[]),
                node("anat_reference", "anatomical", &[]),
                node("brain_mask", "anatomical", &["anat_reference"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_stages_ordered_by_rank_then_stage_then_id() {
        let dag = dag();
        let report = ReportAggregator::aggregate(
            "run",
            ReportSummary::default(),
            &dag,
            &execution(vec![]),
            Outcome::Failed,
        );

        let order: Vec<&str> = report.stages.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "anat_reference",
                "pet_hmc.trc-FDG",
                "brain_mask",
                "pet_coreg.trc-FDG",
                "summary"
            ]
        );
    }

    #[test]
    fn test_every_state_maps_to_a_stage() {
        let dag = dag();
        let exec = execution(vec![
            record(&dag, "anat_reference", NodeState::SkippedCached),
            record(&dag, "brain_mask", NodeState::Succeeded),
            record(&dag, "pet_hmc.trc-FDG", NodeState::Failed),
            record(&dag, "pet_coreg.trc-FDG", NodeState::SkippedUpstreamFailure),
        ]);

        let report = ReportAggregator::aggregate(
            "run",
            ReportSummary::default(),
            &dag,
            &exec,
            Outcome::Partial,
        );

        let test_cases = vec![
            ("anat_reference", StageStatus::Success, StageDetail::Cached),
            ("brain_mask", StageStatus::Success, StageDetail::Executed),
            ("pet_hmc.trc-FDG", StageStatus::Failed, StageDetail::Executed),
            (
                "pet_coreg.trc-FDG",
                StageStatus::Skipped,
                StageDetail::UpstreamFailure {
                    upstream: "pet_hmc.trc-FDG".into(),
                },
            ),
            ("summary", StageStatus::Skipped, StageDetail::NotRun),
        ];
        for (id, status, detail) in test_cases {
            let stage = report.stage(id).unwrap();
            assert_eq!(stage.status, status, "{}", id);
            assert_eq!(stage.detail, detail, "{}", id);
        }

        assert_eq!(report.stages.len(), 5);
        assert!(report.stage("brain_mask").unwrap().artifacts.contains_key("out"));
        assert!(report.stage("pet_hmc.trc-FDG").unwrap().artifacts.is_empty());
        assert_eq!(
            report.stage("pet_hmc.trc-FDG").unwrap().error.as_deref(),
            Some("invocation error: exit 1")
        );
        assert_eq!(report.count(StageStatus::Success), 2);
    }

    #[test]
    fn test_summary_collects_metadata_from_pet_sidecars() {
        let subject = SubjectData::new("01")
            .with_scan("t1w", ScanFile::new("/data/sub-01_T1w.nii.gz"))
            .with_scan(
                "pet",
                ScanFile::new("/data/sub-01_trc-FDG_pet.nii.gz")
                    .with_metadata("TracerName", "FDG")
                    .with_metadata("InjectedRadioactivity", 185.0),
            )
            .with_metadata("Manufacturer", "Siemens");
        let workflow = WorkflowOptions::default();

        let summary = ReportSummary::new(&subject, &workflow);

        assert_eq!(summary.modalities["pet"], 1);
        assert_eq!(summary.modalities["t1w"], 1);
        assert_eq!(summary.metadata["TracerName"], Value::from("FDG"));
        assert_eq!(summary.metadata["Manufacturer"], Value::from("Siemens"));
        assert_eq!(summary.metadata["InjectedRadioactivity"], Value::from(185.0));
        assert_eq!(summary.options["anat_only"], Value::Bool(false));
        assert!(!summary.metadata.contains_key("TracerRadionuclide"));
    }

    #[test]
    fn test_not_executed_report_has_no_stages() {
        let error = crate::errors::DatasetError::SubjectNotFound("07".into());
        let report = ReportAggregator::not_executed("run", "07", ReportSummary::default(), &error);

        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.stages.is_empty());
        assert!(report.error.unwrap().contains("07"));
    }
}
