// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Declarative rule definitions.
//!
//! A rule says: when these requirements hold for a subject, instantiate a node
//! for `capability` running `tool`, reading `inputs` and producing `outputs`.
//! Rules that share a capability compete; see [`crate::graph::CapabilityRegistry`]
//! for the priority order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::consts::{DEFAULT_BUILDER, METADATA_SOURCE_PREFIX, OPTION_SOURCE_PREFIX};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub capability: String,
    /// Report stage name; defaults to the capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub tool: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub mandatory: bool,
    /// Instantiate one node per file of this modality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<String>,
    /// Written as YAML maps (`- has_modality: t1w`) rather than `!tags`
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub requires: Vec<Requirement>,
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceHints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    /// Remediation hint reported when a mandatory capability cannot be satisfied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl RuleConfig {
    pub fn stage(&self) -> &str {
        self.stage.as_deref().unwrap_or(&self.capability)
    }

    pub fn builder(&self) -> &str {
        self.builder.as_deref().unwrap_or(DEFAULT_BUILDER)
    }

    pub fn output_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.outputs.iter().map(|o| o.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// A condition a subject (or, for per-file rules, a single file) must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    HasModality(String),
    LacksModality(String),
    /// The key must exist; `equals`, `min` and `max` narrow it further
    Metadata {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    #[serde(rename = "option")]
    WorkflowOption { key: String, equals: Value },
    /// Per-file `frame_count` must reach the configured minimum
    MinFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A file whose content is fingerprinted
    #[default]
    File,
    /// A location, often a directory, fingerprinted by the content of its whole tree
    Path,
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    /// Where the value comes from; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub optional: bool,
}

/// Parsed form of [`InputDecl::from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource<'a> {
    Metadata(&'a str),
    WorkflowOption(&'a str),
    /// A dataset modality or a rule output, resolved by name
    Named(&'a str),
}

impl InputDecl {
    pub fn source(&self) -> InputSource<'_> {
        let raw = self.from.as_deref().unwrap_or(&self.name);
        if let Some(key) = raw.strip_prefix(METADATA_SOURCE_PREFIX) {
            InputSource::Metadata(key)
        } else if let Some(key) = raw.strip_prefix(OPTION_SOURCE_PREFIX) {
            InputSource::WorkflowOption(key)
        } else {
            InputSource::Named(raw)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDecl {
    pub name: String,
    /// File name relative to the node's output directory
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_mem_gb")]
    pub mem_gb: f64,
}

impl Default for ResourceHints {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            mem_gb: default_mem_gb(),
        }
    }
}

fn default_cpus() -> u32 {
    1
}

fn default_mem_gb() -> f64 {
    1.0
}
