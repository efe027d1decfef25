// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Capability registry: capability name -> competing rules, plus the named
//! builder functions that turn a selected rule into a [`NodeSpec`].
//!
//! # Priority
//!
//! Rules of one capability are tried highest `priority` first; equal
//! priorities fall back to the lexicographically smaller rule id. The first
//! satisfiable rule wins.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::{
    validate_rule_set, Config, DependencyGraph, ResourceHints, RuleConfig, WorkflowOptions,
};
use crate::dataset::{ScanFile, SubjectData};
use crate::errors::{BuildError, ConfigError, ValidationError};
use crate::graph::node::{NodeInput, NodeSpec};

/// Rule param naming which `pet_series` memory estimate becomes the node's `mem_gb`.
pub const MEM_PROFILE_PARAM: &str = "mem_profile";

/// Everything a builder needs to emit one node.
pub struct BuildContext<'a> {
    pub subject: &'a SubjectData,
    pub rule: &'a RuleConfig,
    pub node_id: String,
    /// The file a per-file rule is being instantiated for
    pub item: Option<&'a ScanFile>,
    pub inputs: BTreeMap<String, NodeInput>,
    pub workflow: &'a WorkflowOptions,
}

pub type NodeBuilderFn = fn(&BuildContext<'_>) -> Result<NodeSpec, BuildError>;

#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub name: String,
    /// In evaluation order
    pub rules: Vec<RuleConfig>,
}

impl CapabilityEntry {
    /// A capability is mandatory when any of its rules says so.
    pub fn is_mandatory(&self) -> bool {
        self.rules.iter().any(|r| r.mandatory)
    }

    /// First remediation hint declared by any rule.
    pub fn hint(&self) -> Option<&str> {
        self.rules.iter().find_map(|r| r.hint.as_deref())
    }
}

pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, CapabilityEntry>,
    builders: HashMap<String, NodeBuilderFn>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builders: Vec<&String> = self.builders.keys().collect();
        builders.sort();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .field("builders", &builders)
            .finish()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builders available to rules without registration.
pub fn builtin_builder_names() -> Vec<&'static str> {
    vec!["template", "pet_series"]
}

impl CapabilityRegistry {
    /// Empty registry with the built-in builders.
    pub fn new() -> Self {
        let mut builders: HashMap<String, NodeBuilderFn> = HashMap::new();
        builders.insert("template".to_string(), template_builder);
        builders.insert("pet_series".to_string(), pet_series_builder);
        Self {
            capabilities: BTreeMap::new(),
            builders,
        }
    }

    /// Validates the rule set and registers every rule.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        validate_rule_set(config).map_err(ConfigError::Validation)?;
        let mut registry = Self::new();
        for rule in &config.rules {
            registry.register_rule(rule.clone());
        }
        Ok(registry)
    }

    pub fn register_rule(&mut self, rule: RuleConfig) {
        let entry = self
            .capabilities
            .entry(rule.capability.clone())
            .or_insert_with(|| CapabilityEntry {
                name: rule.capability.clone(),
                rules: Vec::new(),
            });
        entry.rules.push(rule);
        entry
            .rules
            .sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    }

    pub fn register_builder(&mut self, name: &str, builder: NodeBuilderFn) {
        self.builders.insert(name.to_string(), builder);
    }

    pub fn builder(&self, name: &str) -> Option<NodeBuilderFn> {
        self.builders.get(name).copied()
    }

    pub fn get(&self, capability: &str) -> Option<&CapabilityEntry> {
        self.capabilities.get(capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Capabilities ordered so producers come before consumers; ties by name.
    pub fn evaluation_order(&self) -> Result<Vec<String>, ValidationError> {
        let rules: Vec<RuleConfig> = self
            .capabilities
            .values()
            .flat_map(|entry| entry.rules.iter().cloned())
            .collect();
        let graph = DependencyGraph::from_rules(&rules);
        graph.topological_order().ok_or_else(|| ValidationError::CyclicDependency {
            cycle: graph.find_cycle().unwrap_or_default(),
        })
    }
}

fn template_builder(ctx: &BuildContext<'_>) -> Result<NodeSpec, BuildError> {
    let rule = ctx.rule;
    Ok(NodeSpec {
        id: ctx.node_id.clone(),
        capability: rule.capability.clone(),
        stage: rule.stage().to_string(),
        rule_id: rule.id.clone(),
        tool: rule.tool.clone(),
        params: rule.params.clone(),
        inputs: ctx.inputs.clone(),
        outputs: rule
            .outputs
            .iter()
            .map(|o| (o.name.clone(), o.file.clone()))
            .collect(),
        resources: rule.resources.clone().unwrap_or_default(),
        item: ctx.item.map(|item| item.path.clone()),
    })
}

/// Memory estimates for a PET series, in GB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryEstimate {
    pub filesize: f64,
    pub resampled: f64,
    pub largemem: f64,
}

impl MemoryEstimate {
    pub fn for_series(size_gb: f64, frames: u64) -> Self {
        Self {
            filesize: size_gb,
            resampled: size_gb * 4.0,
            largemem: size_gb * ((frames as f64 / 100.0).max(1.0) + 4.0),
        }
    }

    /// Used when the series file cannot be inspected.
    pub fn unknown() -> Self {
        Self {
            filesize: 1.0,
            resampled: 1.0,
            largemem: 1.0,
        }
    }

    pub fn profile(&self, name: &str) -> Option<f64> {
        match name {
            "filesize" => Some(self.filesize),
            "resampled" => Some(self.resampled),
            "largemem" => Some(self.largemem),
            _ => None,
        }
    }
}

/// Template node sized from the PET series it processes. Adds a `frame_count`
/// param and raises `mem_gb` to the estimate named by `mem_profile` (default
/// `resampled`).
fn pet_series_builder(ctx: &BuildContext<'_>) -> Result<NodeSpec, BuildError> {
    let item = ctx.item.ok_or_else(|| BuildError::Builder {
        builder: "pet_series".to_string(),
        rule_id: ctx.rule.id.clone(),
        message: "the rule must declare `foreach`".to_string(),
    })?;

    let mut node = template_builder(ctx)?;
    let frames = item.frame_count();
    let estimate = match std::fs::metadata(&item.path) {
        Ok(meta) if meta.is_file() => {
            MemoryEstimate::for_series(meta.len() as f64 / 1024f64.powi(3), frames.unwrap_or(1))
        }
        _ => MemoryEstimate::unknown(),
    };

    let profile = match node.params.remove(MEM_PROFILE_PARAM) {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(BuildError::Builder {
                builder: "pet_series".to_string(),
                rule_id: ctx.rule.id.clone(),
                message: format!("`{}` must be a string, got {}", MEM_PROFILE_PARAM, other),
            })
        }
        None => "resampled".to_string(),
    };
    let mem_gb = estimate.profile(&profile).ok_or_else(|| BuildError::Builder {
        builder: "pet_series".to_string(),
        rule_id: ctx.rule.id.clone(),
        message: format!(
            "unknown `{}` '{}' (expected filesize, resampled or largemem)",
            MEM_PROFILE_PARAM, profile
        ),
    })?;

    let declared = ctx.rule.resources.clone().unwrap_or_default();
    node.resources = ResourceHints {
        cpus: declared.cpus,
        mem_gb: declared.mem_gb.max(mem_gb),
    };
    if let Some(frames) = frames {
        node.params.insert("frame_count".to_string(), Value::from(frames));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputDecl, InputKind, OutputDecl};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rule(id: &str, capability: &str, priority: i32) -> RuleConfig {
        RuleConfig {
            id: id.to_string(),
            capability: capability.to_string(),
            stage: None,
            tool: "touch".to_string(),
            priority,
            mandatory: false,
            foreach: None,
            requires: vec![],
            inputs: vec![],
            outputs: vec![OutputDecl {
                name: format!("{}_out", capability),
                file: "out.txt".to_string(),
            }],
            params: BTreeMap::new(),
            resources: None,
            builder: None,
            hint: None,
        }
    }

    #[test]
    fn test_rules_sorted_by_priority_then_id() {
        let mut registry = CapabilityRegistry::new();
        registry.register_rule(rule("b_low", "anat_reference", 10));
        registry.register_rule(rule("z_high", "anat_reference", 20));
        registry.register_rule(rule("a_low", "anat_reference", 10));

        let ids: Vec<&str> = registry
            .get("anat_reference")
            .unwrap()
            .rules
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["z_high", "a_low", "b_low"]);
    }

    #[test]
    fn test_evaluation_order_follows_data_dependencies() {
        let mut registry = CapabilityRegistry::new();
        let mut consumer = rule("mask", "brain_mask", 0);
        consumer.inputs.push(InputDecl {
            name: "reference".into(),
            from: Some("anat_reference_out".into()),
            kind: InputKind::File,
            optional: false,
        });
        registry.register_rule(consumer);
        registry.register_rule(rule("ref", "anat_reference", 0));
        registry.register_rule(rule("summary", "aaa_summary", 0));

        assert_eq!(
            registry.evaluation_order().unwrap(),
            vec!["aaa_summary", "anat_reference", "brain_mask"]
        );
    }

    #[test]
    fn test_memory_estimate_formulas() {
        let test_cases = vec![
            (2.0, 50, MemoryEstimate { filesize: 2.0, resampled: 8.0, largemem: 10.0 }),
            (2.0, 300, MemoryEstimate { filesize: 2.0, resampled: 8.0, largemem: 14.0 }),
        ];
        for (size, frames, expected) in test_cases {
            assert_eq!(MemoryEstimate::for_series(size, frames), expected);
        }
    }

    #[test]
    fn test_pet_series_builder_adds_frames_and_memory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub-01_pet.nii.gz");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        let scan = ScanFile::new(&path).with_metadata("frame_count", 24);
        let subject = SubjectData::new("01").with_scan("pet", scan.clone());

        let mut pet_rule = rule("hmc", "pet_hmc", 0);
        pet_rule.foreach = Some("pet".into());
        pet_rule.builder = Some("pet_series".into());
        pet_rule.params.insert(MEM_PROFILE_PARAM.into(), json!("largemem"));
        pet_rule.resources = Some(ResourceHints { cpus: 2, mem_gb: 0.5 });

        let workflow = WorkflowOptions::default();
        let ctx = BuildContext {
            subject: &subject,
            rule: &pet_rule,
            node_id: "pet_hmc.run".into(),
            item: Some(&scan),
            inputs: BTreeMap::new(),
            workflow: &workflow,
        };
        let node = pet_series_builder(&ctx).unwrap();

        assert_eq!(node.params.get("frame_count"), Some(&json!(24)));
        assert!(!node.params.contains_key(MEM_PROFILE_PARAM));
        assert_eq!(node.resources.cpus, 2);
        assert_eq!(node.resources.mem_gb, 0.5, "tiny file keeps the declared floor");
        assert_eq!(node.item.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_pet_series_builder_requires_foreach() {
        let subject = SubjectData::new("01");
        let workflow = WorkflowOptions::default();
        let mut r = rule("hmc", "pet_hmc", 0);
        r.builder = Some("pet_series".into());
        let ctx = BuildContext {
            subject: &subject,
            rule: &r,
            node_id: "pet_hmc".into(),
            item: None,
            inputs: BTreeMap::new(),
            workflow: &workflow,
        };
        assert!(matches!(pet_series_builder(&ctx), Err(BuildError::Builder { .. })));
    }

    #[test]
    fn test_builtin_builders_are_registered() {
        let registry = CapabilityRegistry::new();
        for name in builtin_builder_names() {
            assert!(registry.builder(name).is_some(), "{}", name);
        }
    }

    fn snapshot_builder(ctx: &BuildContext<'_>) -> Result<NodeSpec, BuildError> {
        let mut node = template_builder(ctx)?;
        node.params.insert("snapshot_of".into(), json!(ctx.subject.subject_id));
        Ok(node)
    }

    #[test]
    fn test_registered_builder_is_used_by_the_graph_builder() {
        let mut qc = rule("qc", "qc_snapshot", 0);
        qc.builder = Some("snapshot".into());
        let subject = SubjectData::new("07");

        let mut registry = CapabilityRegistry::new();
        registry.register_rule(qc.clone());
        let missing = crate::graph::GraphBuilder::new(Arc::new(registry), Arc::new(Config::default()))
            .build(&subject);
        assert!(matches!(missing, Err(BuildError::Builder { ref builder, .. }) if builder == "snapshot"));

        let mut registry = CapabilityRegistry::new();
        registry.register_rule(qc);
        registry.register_builder("snapshot", snapshot_builder);
        assert!(registry.builder("snapshot").is_some());
        let dag = crate::graph::GraphBuilder::new(Arc::new(registry), Arc::new(Config::default()))
            .build(&subject)
            .unwrap();

        let node = dag.node("qc_snapshot").unwrap();
        assert_eq!(node.params.get("snapshot_of"), Some(&json!("07")));
        assert_eq!(node.rule_id, "qc");
    }
}
