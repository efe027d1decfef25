// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::OutputSet;
use crate::config::ResourceHints;
use crate::traits::InputValue;

/// One declared output of an upstream node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub node_id: String,
    pub output: String,
}

/// How a node input gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeInput {
    /// Known at build time: a dataset file, a metadata scalar or an option
    Value(InputValue),
    /// An edge: the value is an upstream output, known once that node finishes
    Upstream(OutputRef),
    /// Several edges collapsed into one file list, one per fan-out item
    FanIn(Vec<OutputRef>),
}

impl NodeInput {
    pub fn upstream(&self) -> Vec<&OutputRef> {
        match self {
            NodeInput::Value(_) => vec![],
            NodeInput::Upstream(r) => vec![r],
            NodeInput::FanIn(refs) => refs.iter().collect(),
        }
    }

    /// Concrete value given the outputs of finished nodes. `None` if an upstream output is unknown.
    pub fn resolve(&self, finished: &HashMap<String, OutputSet>) -> Option<InputValue> {
        let lookup = |r: &OutputRef| {
            finished
                .get(&r.node_id)
                .and_then(|outputs| outputs.get(&r.output))
                .cloned()
        };
        match self {
            NodeInput::Value(value) => Some(value.clone()),
            NodeInput::Upstream(r) => lookup(r).map(InputValue::File),
            NodeInput::FanIn(refs) => refs
                .iter()
                .map(lookup)
                .collect::<Option<Vec<_>>>()
                .map(InputValue::Files),
        }
    }
}

/// A node as the builder emits it: everything needed to run it except the
/// values of its upstream inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// `<capability>` or, for per-file rules, `<capability>.<run label>`
    pub id: String,
    pub capability: String,
    pub stage: String,
    pub rule_id: String,
    pub tool: String,
    pub params: BTreeMap<String, Value>,
    pub inputs: BTreeMap<String, NodeInput>,
    /// Declared output name -> file name inside the node's output directory
    pub outputs: BTreeMap<String, String>,
    pub resources: ResourceHints,
    /// The dataset file a per-file node was instantiated for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<PathBuf>,
}

impl NodeSpec {
    /// Ids of the nodes this one consumes outputs from.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.inputs
            .values()
            .flat_map(|input| input.upstream())
            .map(|r| r.node_id.as_str())
            .collect()
    }

    pub fn output_paths(&self, dir: &Path) -> OutputSet {
        self.outputs
            .iter()
            .map(|(name, file)| (name.clone(), dir.join(file)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    SkippedCached,
    SkippedUpstreamFailure,
    Cancelled,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Succeeded
                | NodeState::Failed
                | NodeState::SkippedCached
                | NodeState::SkippedUpstreamFailure
                | NodeState::Cancelled
        )
    }

    /// Outputs are available to dependents.
    pub fn is_non_failing(&self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::SkippedCached)
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Succeeded => "succeeded",
            NodeState::Failed => "failed",
            NodeState::SkippedCached => "skipped-cached",
            NodeState::SkippedUpstreamFailure => "skipped-upstream-failure",
            NodeState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
