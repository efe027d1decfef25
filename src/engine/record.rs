// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution records: what happened to each node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::cache::{IdentityHash, OutputSet};
use crate::errors::NodeError;
use crate::graph::{NodeSpec, NodeState};

pub const RECORDS_FILE: &str = "records.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub subject: String,
    pub node_id: String,
    pub capability: String,
    pub stage: String,
    pub rule_id: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityHash>,
    pub state: NodeState,
    /// Tool invocations made; 0 for cache hits and nodes that never ran
    pub attempts: u32,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// The failed node that kept this one from running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_failure: Option<String>,
    #[serde(default)]
    pub outputs: OutputSet,
}

impl ExecutionRecord {
    /// A pending record for `node`.
    pub fn new(subject: &str, node: &NodeSpec, rank: usize) -> Self {
        Self {
            subject: subject.to_string(),
            node_id: node.id.clone(),
            capability: node.capability.clone(),
            stage: node.stage.clone(),
            rule_id: node.rule_id.clone(),
            tool: node.tool.clone(),
            tool_version: None,
            rank,
            identity: None,
            state: NodeState::Pending,
            attempts: 0,
            retries: 0,
            started_at: None,
            finished_at: None,
            exit_code: None,
            error: None,
            upstream_failure: None,
            outputs: BTreeMap::new(),
        }
    }

    pub fn start(&mut self) {
        self.state = NodeState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, state: NodeState) {
        self.state = state;
        self.retries = self.attempts.saturating_sub(1);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: NodeError) {
        self.error = Some(error);
        self.finish(NodeState::Failed);
    }

    pub fn cancel(&mut self, error: NodeError) {
        self.error = Some(error);
        self.finish(NodeState::Cancelled);
    }

    pub fn skip_upstream(&mut self, upstream: &str) {
        self.upstream_failure = Some(upstream.to_string());
        self.finish(NodeState::SkippedUpstreamFailure);
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// Append-only JSON Lines log of terminal records.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordLog {
    /// `<subject_dir>/log/<run_id>/records.jsonl`
    pub fn for_run(subject_dir: &Path, run_id: &str) -> Self {
        Self::new(subject_dir.join("log").join(run_id).join(RECORDS_FILE))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &ExecutionRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }

    /// Reads every record back, in append order.
    pub async fn read_all(&self) -> std::io::Result<Vec<ExecutionRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::other))
            .collect()
    }
}
