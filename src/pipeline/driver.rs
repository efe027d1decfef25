// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline driver: Build → Execute → Report for every subject.
//!
//! # Phases
//!
//! 1. **Select**: list the dataset's subjects and apply `participant_labels`
//! 2. **Build**: build every subject's DAG before anything runs, so a broken
//!    rule set aborts the run with nothing executed. A subject whose
//!    prerequisites are missing goes straight to `Done(failed)` and still
//!    gets a report
//! 3. **Execute**: one task per subject under `max_concurrent_subjects`; each
//!    runs its DAG on the shared engine, then writes its reports
//!
//! # Cancellation
//!
//! The driver owns a root token. Each subject runs under a child token, so
//! [`PipelineDriver::cancel`] stops everything and
//! [`PipelineDriver::cancel_subject`] stops one subject.

use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{CacheStore, Invalidation};
use crate::config::consts::{PIPELINE_NAME, PIPELINE_VERSION};
use crate::config::{Config, Runtime};
use crate::dataset::SubjectData;
use crate::engine::{SubjectExecution, SubjectRun, WorkQueueExecutor};
use crate::errors::{BuildError, CacheError, DatasetError, PipelineError};
use crate::graph::{GraphBuilder, SubjectDag};
use crate::observability::messages::builder::PrerequisiteUnsatisfied;
use crate::observability::messages::cache::CachePruned;
use crate::observability::messages::pipeline::{
    ArtifactWriteFailed, ReportWritten, RunCancelled, RunCompleted, RunStarted, SubjectFinished,
};
use crate::observability::messages::StructuredLog;
use crate::pipeline::summary::new_run_id;
use crate::pipeline::{Outcome, RunSummary, SubjectResult, SubjectState, SubjectTracker};
use crate::report::{JsonRenderer, ReportAggregator, ReportSummary, SubjectReport, TextRenderer};
use crate::traits::{DatasetReader, ReportRenderer};

pub const DATASET_DESCRIPTION_FILE: &str = "dataset_description.json";
pub const CONFIG_SNAPSHOT_FILE: &str = "config.toml";

/// `<work_dir>/sub-<id>`
pub fn subject_dir(work_dir: &Path, subject: &str) -> PathBuf {
    work_dir.join(format!("sub-{}", subject))
}

/// Keeps the requested subjects, in dataset order. Labels may carry the `sub-` prefix.
pub fn select_subjects(
    available: Vec<String>,
    requested: &[String],
) -> Result<Vec<String>, DatasetError> {
    if requested.is_empty() {
        return Ok(available);
    }
    let wanted: Vec<&str> = requested
        .iter()
        .map(|label| label.strip_prefix("sub-").unwrap_or(label))
        .collect();

    let mut missing: Vec<String> = wanted
        .iter()
        .filter(|label| !available.iter().any(|s| s == *label))
        .map(|label| label.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(DatasetError::ParticipantsNotFound(missing));
    }

    Ok(available
        .into_iter()
        .filter(|s| wanted.contains(&s.as_str()))
        .collect())
}

/// Removes cache entries of `tool` recorded under a version other than `current_version`.
pub async fn prune_tool(
    cache: &CacheStore,
    tool: &str,
    current_version: &str,
) -> Result<usize, CacheError> {
    let removed = cache
        .invalidate(Invalidation::OutdatedTool {
            tool: tool.to_string(),
            current_version: current_version.to_string(),
        })
        .await?;
    CachePruned {
        tool,
        current_version,
        removed,
    }
    .log();
    Ok(removed)
}

/// What the build phase decided for one subject.
enum Plan {
    Execute {
        tracker: SubjectTracker,
        dag: SubjectDag,
        summary: ReportSummary,
    },
    NotExecuted {
        tracker: SubjectTracker,
        summary: ReportSummary,
        error: BuildError,
    },
}

pub struct PipelineDriver {
    runtime: Runtime,
    builder: GraphBuilder,
    executor: Arc<WorkQueueExecutor>,
    renderers: Vec<Arc<dyn ReportRenderer>>,
    cancel: CancellationToken,
    subject_tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl PipelineDriver {
    pub fn new(runtime: Runtime) -> Self {
        let builder = GraphBuilder::new(runtime.registry.clone(), runtime.config.clone());
        let executor = WorkQueueExecutor::new(
            runtime.config.clone(),
            runtime.tools.clone(),
            runtime.cache.clone(),
        );
        Self {
            runtime,
            builder,
            executor: Arc::new(executor),
            renderers: vec![Arc::new(JsonRenderer), Arc::new(TextRenderer)],
            cancel: CancellationToken::new(),
            subject_tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_renderers(mut self, renderers: Vec<Arc<dyn ReportRenderer>>) -> Self {
        self.renderers = renderers;
        self
    }

    /// Swaps the engine, e.g. for one with a custom retry policy.
    pub fn with_executor(mut self, executor: WorkQueueExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn config(&self) -> &Config {
        &self.runtime.config
    }

    /// Stops new dispatch in every subject.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the root token, e.g. for a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels one subject of the current run. `false` if the subject is unknown.
    pub fn cancel_subject(&self, subject: &str) -> bool {
        let Ok(tokens) = self.subject_tokens.lock() else {
            return false;
        };
        match tokens.get(subject.strip_prefix("sub-").unwrap_or(subject)) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn subject_token(&self, subject: &str) -> CancellationToken {
        let token = self.cancel.child_token();
        if let Ok(mut tokens) = self.subject_tokens.lock() {
            tokens.insert(subject.to_string(), token.clone());
        }
        token
    }

    /// Prunes outdated entries for every configured tool.
    pub async fn prune_outdated_cache(&self) -> Result<usize, CacheError> {
        let mut versions: Vec<(String, String)> =
            self.runtime.tools.versions().into_iter().collect();
        versions.sort();

        let mut removed = 0;
        for (tool, version) in versions {
            removed += prune_tool(&self.runtime.cache, &tool, &version).await?;
        }
        Ok(removed)
    }

    pub async fn run(&self, dataset: &dyn DatasetReader) -> Result<RunSummary, PipelineError> {
        let run_id = new_run_id();
        let config = self.runtime.config.clone();
        let subjects = select_subjects(dataset.subjects()?, &config.workflow.participant_labels)?;

        let work_dir = config.run.work_dir();
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: work_dir.clone(),
                source,
            })?;

        RunStarted {
            run_id: &run_id,
            subject_count: subjects.len(),
            max_concurrent_subjects: config.run.max_concurrent_subjects(),
        }
        .log();
        write_dataset_description(&work_dir, &run_id).await;

        if config.cache.prune_outdated {
            self.prune_outdated_cache().await?;
        }

        let plans = self.build_all(dataset, &subjects, &run_id)?;

        let context = SubjectContext {
            run_id: run_id.clone(),
            work_dir,
            config: config.clone(),
            executor: self.executor.clone(),
            renderers: self.renderers.clone(),
            permits: Arc::new(Semaphore::new(config.run.max_concurrent_subjects())),
        };

        let mut handles = Vec::with_capacity(plans.len());
        for plan in plans {
            let subject = plan.subject().to_string();
            let token = self.subject_token(&subject);
            let span = tracing::info_span!("subject", subject = %subject, run_id = %run_id);
            let task = context.clone().run(plan, token).instrument(span);
            handles.push((subject, tokio::spawn(task)));
        }

        let mut results = BTreeMap::new();
        for (subject, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => SubjectResult {
                    subject: subject.clone(),
                    state: SubjectState::Done(Outcome::Failed),
                    outcome: Outcome::Failed,
                    report: ReportAggregator::not_executed(
                        &run_id,
                        &subject,
                        ReportSummary::default(),
                        &e,
                    ),
                    execution: None,
                    duration: Default::default(),
                },
            };
            results.insert(subject, result);
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            RunCancelled { run_id: &run_id }.log();
        }
        let summary = RunSummary {
            run_id,
            subjects: results,
            cancelled,
        };
        RunCompleted {
            run_id: &summary.run_id,
            succeeded: summary.count(Outcome::Success),
            partial: summary.count(Outcome::Partial),
            failed: summary.count(Outcome::Failed),
            exit_code: summary.exit_code(),
        }
        .log();
        Ok(summary)
    }

    /// Builds every subject. A fatal build error aborts before anything executes.
    fn build_all(
        &self,
        dataset: &dyn DatasetReader,
        subjects: &[String],
        run_id: &str,
    ) -> Result<Vec<Plan>, PipelineError> {
        let workflow = &self.runtime.config.workflow;
        let mut plans = Vec::with_capacity(subjects.len());

        for subject in subjects {
            if self.cancel.is_cancelled() {
                RunCancelled { run_id }.log();
                return Err(PipelineError::Cancelled);
            }
            let mut tracker = SubjectTracker::new(subject);

            let data = match dataset.subject(subject) {
                Ok(data) => data,
                Err(e) => {
                    let error = BuildError::Dataset(e);
                    PrerequisiteUnsatisfied {
                        subject,
                        capability: "dataset",
                        error: &error,
                    }
                    .log();
                    advance(&mut tracker, SubjectState::Done(Outcome::Failed));
                    plans.push(Plan::NotExecuted {
                        tracker,
                        summary: ReportSummary::new(&SubjectData::new(subject.as_str()), workflow),
                        error,
                    });
                    continue;
                }
            };
            let summary = ReportSummary::new(&data, workflow);

            match self.builder.build(&data) {
                Ok(dag) => {
                    advance(&mut tracker, SubjectState::Ready);
                    plans.push(Plan::Execute {
                        tracker,
                        dag,
                        summary,
                    });
                }
                Err(error) if error.is_fatal_for_run() => {
                    return Err(PipelineError::Build(error));
                }
                Err(error) => {
                    let capability = match &error {
                        BuildError::UnsatisfiablePrerequisite { capability, .. } => {
                            capability.as_str()
                        }
                        _ => "dataset",
                    };
                    PrerequisiteUnsatisfied {
                        subject,
                        capability,
                        error: &error,
                    }
                    .log();
                    advance(&mut tracker, SubjectState::Done(Outcome::Failed));
                    plans.push(Plan::NotExecuted {
                        tracker,
                        summary,
                        error,
                    });
                }
            }
        }
        Ok(plans)
    }
}

impl Plan {
    fn subject(&self) -> &str {
        match self {
            Plan::Execute { tracker, .. } | Plan::NotExecuted { tracker, .. } => tracker.subject(),
        }
    }
}

fn advance(tracker: &mut SubjectTracker, next: SubjectState) {
    if let Err(e) = tracker.advance(next) {
        tracing::error!(subject = tracker.subject(), error = %e, "{}", e);
    }
}

/// Shared, owned state for subject tasks.
#[derive(Clone)]
struct SubjectContext {
    run_id: String,
    work_dir: PathBuf,
    config: Arc<Config>,
    executor: Arc<WorkQueueExecutor>,
    renderers: Vec<Arc<dyn ReportRenderer>>,
    permits: Arc<Semaphore>,
}

impl SubjectContext {
    async fn run(self, plan: Plan, cancel: CancellationToken) -> SubjectResult {
        let started = Instant::now();
        let (mut tracker, report, execution) = match plan {
            Plan::NotExecuted {
                tracker,
                summary,
                error,
            } => {
                let report =
                    ReportAggregator::not_executed(&self.run_id, tracker.subject(), summary, &error);
                (tracker, report, None)
            }
            Plan::Execute {
                mut tracker,
                dag,
                summary,
            } => {
                let (report, execution) = self.execute(&mut tracker, &dag, summary, cancel).await;
                (tracker, report, execution)
            }
        };

        let subject = tracker.subject().to_string();
        let dir = subject_dir(&self.work_dir, &subject);
        self.write_reports(&dir, &report).await;

        if tracker.state() == SubjectState::Reporting {
            advance(&mut tracker, SubjectState::Done(report.outcome));
        }
        let duration = started.elapsed();
        SubjectFinished {
            subject: &subject,
            outcome: report.outcome.label(),
            duration,
        }
        .log();

        SubjectResult {
            subject,
            state: tracker.state(),
            outcome: report.outcome,
            report,
            execution,
            duration,
        }
    }

    async fn execute(
        &self,
        tracker: &mut SubjectTracker,
        dag: &SubjectDag,
        summary: ReportSummary,
        cancel: CancellationToken,
    ) -> (SubjectReport, Option<SubjectExecution>) {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };
        let Some(_permit) = permit else {
            advance(tracker, SubjectState::Done(Outcome::Failed));
            let empty = SubjectExecution {
                subject: dag.subject().to_string(),
                records: BTreeMap::new(),
                duration: Default::default(),
            };
            let mut report =
                ReportAggregator::aggregate(&self.run_id, summary, dag, &empty, Outcome::Failed);
            report.error = Some("cancelled before the subject started".to_string());
            return (report, None);
        };

        advance(tracker, SubjectState::Executing);
        let dir = subject_dir(&self.work_dir, dag.subject());
        self.write_config_snapshot(&dir, dag.subject()).await;

        let run = SubjectRun {
            subject_dir: dir,
            run_id: self.run_id.clone(),
            cancel,
        };
        let execution = self.executor.execute(dag, &run).await;

        advance(tracker, SubjectState::Reporting);
        let outcome = Outcome::from_execution(&execution);
        let report = ReportAggregator::aggregate(&self.run_id, summary, dag, &execution, outcome);
        (report, Some(execution))
    }

    async fn write_config_snapshot(&self, dir: &Path, subject: &str) {
        let path = dir.join("log").join(&self.run_id).join(CONFIG_SNAPSHOT_FILE);
        let content = match toml::to_string(self.config.as_ref()) {
            Ok(content) => content,
            Err(e) => {
                ArtifactWriteFailed {
                    subject,
                    artifact: CONFIG_SNAPSHOT_FILE,
                    path: &path,
                    error: &e.to_string(),
                }
                .log();
                return;
            }
        };
        if let Err(e) = write_file(&path, content.as_bytes()).await {
            ArtifactWriteFailed {
                subject,
                artifact: CONFIG_SNAPSHOT_FILE,
                path: &path,
                error: &e.to_string(),
            }
            .log();
        }
    }

    async fn write_reports(&self, dir: &Path, report: &SubjectReport) {
        for renderer in &self.renderers {
            let path = dir.join(renderer.file_name());
            let written = match renderer.render(report) {
                Ok(content) => write_file(&path, content.as_bytes())
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => ReportWritten {
                    subject: &report.subject,
                    path: &path,
                }
                .log(),
                Err(error) => ArtifactWriteFailed {
                    subject: &report.subject,
                    artifact: renderer.file_name(),
                    path: &path,
                    error: &error,
                }
                .log(),
            }
        }
    }
}

async fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

async fn write_dataset_description(work_dir: &Path, run_id: &str) {
    let path = work_dir.join(DATASET_DESCRIPTION_FILE);
    let description = json!({
        "Name": format!("{} derivatives", PIPELINE_NAME),
        "DatasetType": "derivative",
        "GeneratedBy": [{
            "Name": PIPELINE_NAME,
            "Version": PIPELINE_VERSION,
        }],
        "RunId": run_id,
    });
    let written = match serde_json::to_vec_pretty(&description) {
        Ok(content) => write_file(&path, &content).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(error) = written {
        ArtifactWriteFailed {
            subject: "",
            artifact: DATASET_DESCRIPTION_FILE,
            path: &path,
            error: &error,
        }
        .log();
    }
}
