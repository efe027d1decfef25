// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Work queue executor: dependency counting over one subject's DAG.
//!
//! # Architecture Overview
//!
//! - Ready nodes wait in a [`PriorityWorkQueue`] (lower rank first, then id)
//! - Each node keeps a count of unfinished dependencies; when a dependency
//!   ends `succeeded` or `skipped-cached` the count drops, and at zero the
//!   node is queued
//! - Dispatched nodes run as tasks in a `JoinSet`; at most
//!   `max_concurrent_nodes` are outstanding per subject
//! - A tool attempt holds a permit of the node semaphore. Permits are released
//!   during backoff and while waiting on the cache, so retries never exceed
//!   the bound
//!
//! # Per-node Flow
//!
//! ```text
//! identity (blocking pool) → cache lock → cache get ─hit─► skipped-cached
//!                                              │miss
//!                                              ▼
//!        ┌──► reset output dir → permit → timeout(invoke) → validate outputs ──ok──► put → succeeded
//!        │                                                     │error
//!        └──────────── backoff (retryable, attempts left) ◄────┘ otherwise ► failed
//! ```
//!
//! # Failure Containment
//!
//! When a node fails, every node downstream of it becomes
//! `skipped-upstream-failure` without running. Independent subtrees keep going.
//!
//! # Cancellation
//!
//! Once the subject's token is cancelled no new node is dispatched. A node in
//! the middle of a tool attempt gets `cancel_grace` to finish; after that its
//! invocation is dropped, which kills a command tool's child process. Nodes
//! that never ran are recorded `cancelled`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{compute_identity, CacheStore, EntryMetadata, OutputSet};
use crate::config::{ConcurrencyScope, Config, ToolMap};
use crate::engine::priority_work_queue::{PriorityWorkQueue, PrioritizedTask};
use crate::engine::record::{ExecutionRecord, RecordLog};
use crate::engine::retry::RetryPolicy;
use crate::errors::NodeError;
use crate::graph::{NodeSpec, NodeState, SubjectDag};
use crate::observability::messages::cache::{CacheReadFailed, CacheWriteFailed};
use crate::observability::messages::engine::{
    CancellationObserved, ExecutionCompleted, ExecutionStarted, NodeAttemptFailed,
    NodeCacheHit, NodeCancelled, NodeDispatched, NodeFailed, NodeSkippedUpstream,
    NodeSucceeded, RecordWriteFailed,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{InputValue, Invocation, Tool};

/// Where one subject's execution writes, and how it is stopped.
#[derive(Debug, Clone)]
pub struct SubjectRun {
    /// `<work_dir>/sub-<id>`; node outputs go to `nodes/<node_id>/`
    pub subject_dir: PathBuf,
    pub run_id: String,
    pub cancel: CancellationToken,
}

impl SubjectRun {
    pub fn node_dir(&self, node_id: &str) -> PathBuf {
        self.subject_dir.join("nodes").join(node_id)
    }
}

/// Terminal records of every node of one subject.
#[derive(Debug, Clone)]
pub struct SubjectExecution {
    pub subject: String,
    pub records: BTreeMap<String, ExecutionRecord>,
    pub duration: Duration,
}

impl SubjectExecution {
    pub fn count(&self, state: NodeState) -> usize {
        self.records.values().filter(|r| r.state == state).count()
    }

    pub fn record(&self, node_id: &str) -> Option<&ExecutionRecord> {
        self.records.get(node_id)
    }

    /// Every node succeeded or was served from the cache.
    pub fn all_non_failing(&self) -> bool {
        self.records.values().all(|r| r.state.is_non_failing())
    }

    pub fn any_non_failing(&self) -> bool {
        self.records.values().any(|r| r.state.is_non_failing())
    }
}

pub struct WorkQueueExecutor {
    tools: Arc<ToolMap>,
    cache: Arc<CacheStore>,
    retry: RetryPolicy,
    node_timeout: Duration,
    cancel_grace: Duration,
    max_concurrency: usize,
    /// Set when the node pool is shared by all subjects
    shared_permits: Option<Arc<Semaphore>>,
}

impl WorkQueueExecutor {
    pub fn new(config: Arc<Config>, tools: Arc<ToolMap>, cache: Arc<CacheStore>) -> Self {
        let run = &config.run;
        let max_concurrency = run.max_concurrent_nodes().max(1);
        let shared_permits = match run.node_concurrency_scope {
            ConcurrencyScope::Global => Some(Arc::new(Semaphore::new(max_concurrency))),
            ConcurrencyScope::PerSubject => None,
        };
        Self {
            tools,
            cache,
            retry: RetryPolicy::from_options(&run.retry),
            node_timeout: run.node_timeout(),
            cancel_grace: run.cancel_grace(),
            max_concurrency,
            shared_permits,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Runs every node of `dag` to a terminal state. Node failures end up in
    /// the records; this never fails as a whole.
    pub async fn execute(&self, dag: &SubjectDag, run: &SubjectRun) -> SubjectExecution {
        let started = Instant::now();
        let subject = dag.subject().to_string();
        ExecutionStarted {
            subject: &subject,
            node_count: dag.len(),
            max_concurrency: self.max_concurrency,
        }
        .log();

        let log = RecordLog::for_run(&run.subject_dir, &run.run_id);
        let permits = self
            .shared_permits
            .clone()
            .unwrap_or_else(|| Arc::new(Semaphore::new(self.max_concurrency)));

        let mut state = SchedulerState::new(dag);
        let mut join_set: JoinSet<ExecutionRecord> = JoinSet::new();
        let mut cancel_logged = false;

        loop {
            while join_set.len() < self.max_concurrency && !run.cancel.is_cancelled() {
                let Some(node_id) = state.queue.pop() else {
                    break;
                };
                let Some(node) = dag.node(&node_id) else {
                    continue;
                };
                let Some(record) = state.dispatch(&node_id) else {
                    continue;
                };

                let Some(inputs) = resolve_inputs(node, &state.finished) else {
                    let mut record = record;
                    record.start();
                    record.fail(NodeError::internal("an upstream output is unavailable"));
                    state.complete(dag, record, &log).await;
                    continue;
                };

                let task = NodeTask {
                    node: node.clone(),
                    inputs,
                    record: record.clone(),
                    tool: self.tools.get(&node.tool).cloned(),
                    cache: self.cache.clone(),
                    permits: permits.clone(),
                    cancel: run.cancel.clone(),
                    retry: self.retry,
                    timeout: self.node_timeout,
                    grace: self.cancel_grace,
                    output_dir: run.node_dir(&node.id),
                };
                let span = tracing::info_span!("node", subject = %subject, node_id = %node.id);
                join_set.spawn(async move {
                    match tokio::spawn(task.run().instrument(span)).await {
                        Ok(record) => record,
                        Err(e) => {
                            let mut record = record;
                            record.fail(NodeError::internal(format!("node task failed: {}", e)));
                            record
                        }
                    }
                });
            }

            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = run.cancel.cancelled(), if !cancel_logged => {
                    cancel_logged = true;
                    CancellationObserved {
                        subject: &subject,
                        in_flight: join_set.len(),
                        grace: self.cancel_grace,
                    }
                    .log();
                    continue;
                }
            };
            match joined {
                Some(Ok(record)) => state.complete(dag, record, &log).await,
                Some(Err(_)) => continue,
                None => break,
            }
        }

        state.cancel_remaining(&subject, &log).await;

        let execution = SubjectExecution {
            subject,
            records: state.records,
            duration: started.elapsed(),
        };
        ExecutionCompleted {
            subject: &execution.subject,
            succeeded: execution.count(NodeState::Succeeded),
            cached: execution.count(NodeState::SkippedCached),
            failed: execution.count(NodeState::Failed),
            skipped: execution.count(NodeState::SkippedUpstreamFailure),
            cancelled: execution.count(NodeState::Cancelled),
            duration: execution.duration,
        }
        .log();
        execution
    }
}

/// Bookkeeping owned by the dispatch loop.
struct SchedulerState {
    records: BTreeMap<String, ExecutionRecord>,
    remaining: HashMap<String, usize>,
    finished: HashMap<String, OutputSet>,
    queue: PriorityWorkQueue,
}

impl SchedulerState {
    fn new(dag: &SubjectDag) -> Self {
        let mut state = Self {
            records: BTreeMap::new(),
            remaining: HashMap::new(),
            finished: HashMap::new(),
            queue: PriorityWorkQueue::new(),
        };
        for node in dag.nodes() {
            let rank = dag.rank(&node.id).unwrap_or(0);
            let mut record = ExecutionRecord::new(dag.subject(), node, rank);
            let dependencies = dag.dependencies(&node.id).len();
            if dependencies == 0 {
                record.state = NodeState::Ready;
                state.queue.push(PrioritizedTask::new(node.id.clone(), rank));
            }
            state.remaining.insert(node.id.clone(), dependencies);
            state.records.insert(node.id.clone(), record);
        }
        state
    }

    /// Marks a queued node running and hands out its record.
    fn dispatch(&mut self, node_id: &str) -> Option<ExecutionRecord> {
        let record = self.records.get_mut(node_id)?;
        if record.state != NodeState::Ready {
            return None;
        }
        record.state = NodeState::Running;
        Some(record.clone())
    }

    async fn complete(&mut self, dag: &SubjectDag, record: ExecutionRecord, log: &RecordLog) {
        append(log, &record).await;
        let node_id = record.node_id.clone();
        let state = record.state;

        if state.is_non_failing() {
            self.finished.insert(node_id.clone(), record.outputs.clone());
        }
        self.records.insert(node_id.clone(), record);

        match state {
            NodeState::Succeeded | NodeState::SkippedCached => {
                for dependent in dag.dependents(&node_id) {
                    let Some(count) = self.remaining.get_mut(dependent) else {
                        continue;
                    };
                    *count = count.saturating_sub(1);
                    if *count > 0 {
                        continue;
                    }
                    if let Some(next) = self.records.get_mut(dependent) {
                        if next.state == NodeState::Pending {
                            next.state = NodeState::Ready;
                            self.queue
                                .push(PrioritizedTask::new(dependent.clone(), next.rank));
                        }
                    }
                }
            }
            NodeState::Failed | NodeState::SkippedUpstreamFailure => {
                for downstream in dag.transitive_dependents(&node_id) {
                    let Some(skipped) = self.records.get_mut(&downstream) else {
                        continue;
                    };
                    if !matches!(skipped.state, NodeState::Pending | NodeState::Ready) {
                        continue;
                    }
                    skipped.skip_upstream(&node_id);
                    NodeSkippedUpstream {
                        subject: &skipped.subject,
                        node_id: &skipped.node_id,
                        upstream: &node_id,
                    }
                    .log();
                    append(log, skipped).await;
                }
            }
            _ => {}
        }
    }

    /// Records every node that never reached a terminal state as cancelled.
    async fn cancel_remaining(&mut self, subject: &str, log: &RecordLog) {
        for record in self.records.values_mut() {
            if record.state.is_terminal() {
                continue;
            }
            NodeCancelled {
                subject,
                node_id: &record.node_id,
                in_flight: false,
            }
            .log();
            record.cancel(NodeError::cancelled("subject cancelled before the node was dispatched"));
            append(log, record).await;
        }
    }
}

async fn append(log: &RecordLog, record: &ExecutionRecord) {
    if let Err(e) = log.append(record).await {
        RecordWriteFailed {
            subject: &record.subject,
            path: log.path(),
            error: &e,
        }
        .log();
    }
}

fn resolve_inputs(
    node: &NodeSpec,
    finished: &HashMap<String, OutputSet>,
) -> Option<BTreeMap<String, InputValue>> {
    node.inputs
        .iter()
        .map(|(name, input)| input.resolve(finished).map(|value| (name.clone(), value)))
        .collect()
}

/// Everything one node needs, moved into its task.
struct NodeTask {
    node: NodeSpec,
    inputs: BTreeMap<String, InputValue>,
    record: ExecutionRecord,
    tool: Option<Arc<dyn Tool>>,
    cache: Arc<CacheStore>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    retry: RetryPolicy,
    timeout: Duration,
    grace: Duration,
    output_dir: PathBuf,
}

impl NodeTask {
    async fn run(mut self) -> ExecutionRecord {
        self.record.start();
        let Some(tool) = self.tool.clone() else {
            let message = format!("tool '{}' is not registered", self.node.tool);
            return self.fail(NodeError::internal(message));
        };
        self.record.tool_version = Some(tool.version().to_string());

        let identity = {
            let name = self.node.tool.clone();
            let version = tool.version().to_string();
            let params = self.node.params.clone();
            let outputs: Vec<String> = self.node.outputs.keys().cloned().collect();
            let inputs = self.inputs.clone();
            tokio::task::spawn_blocking(move || {
                compute_identity(
                    &name,
                    &version,
                    &params,
                    outputs.iter().map(String::as_str),
                    &inputs,
                )
            })
            .await
        };
        let identity = match identity {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                return self.fail(NodeError::internal(format!("failed to fingerprint inputs: {}", e)))
            }
            Err(e) => return self.fail(NodeError::internal(format!("hashing task failed: {}", e))),
        };
        self.record.identity = Some(identity);
        let short = identity.short();

        let guard = tokio::select! {
            guard = self.cache.lock(identity) => Some(guard),
            _ = self.cancel.cancelled() => None,
        };
        let Some(guard) = guard else {
            return self.cancelled(false);
        };

        match self.cache.get(&identity).await {
            Ok(Some(entry)) => {
                NodeCacheHit {
                    subject: &self.record.subject,
                    node_id: &self.node.id,
                    identity: &short,
                }
                .log();
                self.record.outputs = entry.outputs;
                self.record.finish(NodeState::SkippedCached);
                return self.record;
            }
            Ok(None) => {}
            Err(e) => CacheReadFailed {
                identity: &short,
                error: &e,
            }
            .log(),
        }

        let max_attempts = self.retry.max_attempts();
        loop {
            if self.cancel.is_cancelled() {
                return self.cancelled(false);
            }
            let attempt = self.record.attempts + 1;

            if let Err(e) = reset_dir(&self.output_dir).await {
                let message = format!(
                    "failed to prepare output directory {}: {}",
                    self.output_dir.display(),
                    e
                );
                return self.fail(NodeError::internal(message));
            }

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => Some(permit),
                _ = self.cancel.cancelled() => None,
            };
            let permit = match permit {
                Some(Ok(permit)) => permit,
                Some(Err(_)) => return self.fail(NodeError::internal("node pool is closed")),
                None => return self.cancelled(false),
            };

            self.record.attempts = attempt;
            NodeDispatched {
                subject: &self.record.subject,
                node_id: &self.node.id,
                tool: &self.node.tool,
                identity: &short,
                attempt,
            }
            .log();

            let invocation = Invocation {
                node_id: self.node.id.clone(),
                params: self.node.params.clone(),
                inputs: self.inputs.clone(),
                outputs: self.node.output_paths(&self.output_dir),
                work_dir: self.output_dir.clone(),
            };
            let expected = invocation.outputs.clone();

            let result = tokio::select! {
                result = tokio::time::timeout(self.timeout, tool.invoke(invocation)) => Some(result),
                _ = grace_expired(&self.cancel, self.grace) => None,
            };
            drop(permit);
            let Some(result) = result else {
                return self.cancelled(true);
            };

            let error = match result {
                Err(_) => NodeError::timeout(self.timeout),
                Ok(outcome) => {
                    self.record.exit_code = outcome.exit_code;
                    if outcome.is_success() {
                        match validate_outputs(&expected).await {
                            Ok(()) => return self.succeed(&guard, tool.as_ref(), expected).await,
                            Err(error) => error,
                        }
                    } else {
                        NodeError::invocation(outcome.exit_code, &outcome.stderr)
                    }
                }
            };

            if error.is_retryable() && attempt < max_attempts {
                let backoff = self.retry.backoff_for(attempt - 1);
                NodeAttemptFailed {
                    subject: &self.record.subject,
                    node_id: &self.node.id,
                    attempt,
                    max_attempts,
                    backoff,
                    error: &error,
                }
                .log();
                let waited = tokio::select! {
                    _ = tokio::time::sleep(backoff) => true,
                    _ = self.cancel.cancelled() => false,
                };
                if !waited {
                    return self.cancelled(false);
                }
                continue;
            }

            NodeFailed {
                subject: &self.record.subject,
                node_id: &self.node.id,
                attempts: attempt,
                error: &error,
            }
            .log();
            self.record.fail(error);
            return self.record;
        }
    }

    async fn succeed(
        mut self,
        guard: &crate::cache::IdentityGuard,
        tool: &dyn Tool,
        outputs: OutputSet,
    ) -> ExecutionRecord {
        let metadata = EntryMetadata {
            tool: self.node.tool.clone(),
            tool_version: tool.version().to_string(),
            node_id: self.node.id.clone(),
            subject: self.record.subject.clone(),
            params: self.node.params.clone(),
        };
        if let Err(e) = self.cache.put(guard, outputs.clone(), metadata).await {
            CacheWriteFailed {
                identity: &guard.identity().short(),
                node_id: &self.node.id,
                error: &e,
            }
            .log();
        }

        self.record.outputs = outputs;
        self.record.finish(NodeState::Succeeded);
        NodeSucceeded {
            subject: &self.record.subject,
            node_id: &self.node.id,
            attempts: self.record.attempts,
            duration: self.record.duration().unwrap_or_default(),
        }
        .log();
        self.record
    }

    fn fail(mut self, error: NodeError) -> ExecutionRecord {
        NodeFailed {
            subject: &self.record.subject,
            node_id: &self.node.id,
            attempts: self.record.attempts,
            error: &error,
        }
        .log();
        self.record.fail(error);
        self.record
    }

    fn cancelled(mut self, in_flight: bool) -> ExecutionRecord {
        NodeCancelled {
            subject: &self.record.subject,
            node_id: &self.node.id,
            in_flight,
        }
        .log();
        let message = if in_flight {
            format!("killed {}s after cancellation", self.grace.as_secs_f64())
        } else {
            "subject cancelled before the node was dispatched".to_string()
        };
        self.record.cancel(NodeError::cancelled(message));
        self.record
    }
}

/// Resolves once `cancel` fires and `grace` has passed.
async fn grace_expired(cancel: &CancellationToken, grace: Duration) {
    cancel.cancelled().await;
    tokio::time::sleep(grace).await;
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

/// Every declared output must exist; files must be non-empty.
async fn validate_outputs(outputs: &OutputSet) -> Result<(), NodeError> {
    for (name, path) in outputs {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                return Err(NodeError::empty_output(name, path))
            }
            Ok(_) => {}
            Err(_) => return Err(NodeError::missing_output(name, path)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{FailingTool, Journal, JournalEvent, NoOutputTool, StubTool};
    use crate::graph::{NodeInput, OutputRef};
    use crate::errors::NodeErrorKind;
    use tempfile::TempDir;

    fn node(id: &str, tool: &str, deps: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.into(),
            capability: id.into(),
            stage: id.into(),
            rule_id: id.into(),
            tool: tool.into(),
            params: [("node".to_string(), serde_json::json!(id))].into(),
            inputs: deps
                .iter()
                .map(|d| {
                    (
                        format!("in_{}", d),
                        NodeInput::Upstream(OutputRef {
                            node_id: d.to_string(),
                            output: "out".into(),
                        }),
                    )
                })
                .collect(),
            outputs: [("out".to_string(), "out.txt".to_string())].into(),
            resources: Default::default(),
            item: None,
        }
    }

    struct Fixture {
        temp: TempDir,
        tools: ToolMap,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                tools: ToolMap::new(),
            }
        }

        fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
            self.tools.insert(tool.name().to_string(), tool);
            self
        }

        fn executor(&self, max_concurrency: usize) -> WorkQueueExecutor {
            let mut config = Config::default();
            config.run.max_concurrent_nodes = Some(max_concurrency);
            let cache = CacheStore::open(self.temp.path().join("cache")).unwrap();
            WorkQueueExecutor::new(Arc::new(config), Arc::new(self.tools.clone()), Arc::new(cache))
                .with_retry_policy(RetryPolicy::none())
        }

        fn run(&self, subject: &str) -> SubjectRun {
            SubjectRun {
                subject_dir: self.temp.path().join(format!("sub-{}", subject)),
                run_id: "test-run".into(),
                cancel: CancellationToken::new(),
            }
        }
    }

    #[tokio::test]
    async fn test_linear_chain_runs_in_order() {
        let journal = Journal::new();
        let stub = StubTool::new("stub").with_journal(journal.clone());
        let fixture = Fixture::new().tool(Arc::new(stub.clone()));
        let dag = SubjectDag::new(
            "01",
            vec![
                node("a", "stub", &[]),
                node("b", "stub", &["a"]),
                node("c", "stub", &["b"]),
            ],
        )
        .unwrap();

        let execution = fixture.executor(4).execute(&dag, &fixture.run("01")).await;

        assert!(execution.all_non_failing());
        assert_eq!(execution.count(NodeState::Succeeded), 3);
        assert_eq!(stub.calls(), 3);
        assert!(journal.position("a", JournalEvent::Finished) < journal.position("b", JournalEvent::Started));
        assert!(journal.position("b", JournalEvent::Finished) < journal.position("c", JournalEvent::Started));

        let c = execution.record("c").unwrap();
        assert_eq!(c.attempts, 1);
        assert_eq!(c.retries, 0);
        assert!(c.outputs["out"].ends_with("sub-01/nodes/c/out.txt"));
    }

    #[tokio::test]
    async fn test_respects_concurrency_bound() {
        let stub = StubTool::new("stub").with_delay(Duration::from_millis(50));
        let fixture = Fixture::new().tool(Arc::new(stub.clone()));
        let nodes = (0..6).map(|i| node(&format!("n{}", i), "stub", &[])).collect();
        let dag = SubjectDag::new("01", nodes).unwrap();

        let execution = fixture.executor(2).execute(&dag, &fixture.run("01")).await;

        assert_eq!(execution.count(NodeState::Succeeded), 6);
        assert!(stub.max_in_flight() <= 2, "peak {}", stub.max_in_flight());
    }

    #[tokio::test]
    async fn test_same_rank_dispatches_by_id_with_single_slot() {
        let journal = Journal::new();
        let stub = StubTool::new("stub").with_journal(journal.clone());
        let fixture = Fixture::new().tool(Arc::new(stub));
        let dag = SubjectDag::new(
            "01",
            vec![node("c", "stub", &[]), node("a", "stub", &[]), node("b", "stub", &[])],
        )
        .unwrap();

        fixture.executor(1).execute(&dag, &fixture.run("01")).await;

        let started: Vec<String> = journal
            .entries()
            .into_iter()
            .filter(|(_, event)| *event == JournalEvent::Started)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(started, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_output_is_validation_failure() {
        let fixture = Fixture::new().tool(Arc::new(NoOutputTool::new("silent")));
        let dag = SubjectDag::new("01", vec![node("a", "silent", &[])]).unwrap();

        let execution = fixture.executor(1).execute(&dag, &fixture.run("01")).await;

        let record = execution.record("a").unwrap();
        assert_eq!(record.state, NodeState::Failed);
        assert_eq!(record.error.as_ref().unwrap().kind, NodeErrorKind::OutputValidation);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let flaky = FailingTool::first("flaky", 1);
        let fixture = Fixture::new().tool(Arc::new(flaky.clone()));
        let dag = SubjectDag::new("01", vec![node("a", "flaky", &[])]).unwrap();
        let executor = fixture.executor(1).with_retry_policy(RetryPolicy {
            retries: 2,
            backoff: Duration::from_millis(1),
            multiplier: 1.0,
            max_backoff: Duration::from_millis(1),
        });

        let execution = executor.execute(&dag, &fixture.run("01")).await;

        let record = execution.record("a").unwrap();
        assert_eq!(record.state, NodeState::Succeeded);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.retries, 1);
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_tool_fails_node() {
        let fixture = Fixture::new();
        let dag = SubjectDag::new("01", vec![node("a", "ghost", &[])]).unwrap();

        let execution = fixture.executor(1).execute(&dag, &fixture.run("01")).await;

        let record = execution.record("a").unwrap();
        assert_eq!(record.state, NodeState::Failed);
        assert_eq!(record.error.as_ref().unwrap().kind, NodeErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_records_are_appended_to_run_log() {
        let fixture = Fixture::new().tool(Arc::new(StubTool::new("stub")));
        let dag = SubjectDag::new("01", vec![node("a", "stub", &[]), node("b", "stub", &["a"])]).unwrap();
        let run = fixture.run("01");

        fixture.executor(2).execute(&dag, &run).await;

        let records = RecordLog::for_run(&run.subject_dir, &run.run_id)
            .read_all()
            .await
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(records.iter().all(|r| r.state == NodeState::Succeeded));
    }

    #[tokio::test]
    async fn test_empty_dag() {
        let fixture = Fixture::new();
        let dag = SubjectDag::new("01", vec![]).unwrap();
        let execution = fixture.executor(1).execute(&dag, &fixture.run("01")).await;
        assert!(execution.records.is_empty());
        assert!(execution.all_non_failing());
    }
}
