// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-subject graph construction.
//!
//! Capabilities are visited producers-first. For each one the registry's
//! rules are tried in priority order; the first rule whose requirements and
//! inputs are satisfied for this subject is instantiated into one node, or one
//! node per file for `foreach` rules. Outputs of chosen rules become available
//! to later capabilities by name.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, InputDecl, InputKind, InputSource, RuleConfig};
use crate::dataset::SubjectData;
use crate::errors::BuildError;
use crate::graph::dag::SubjectDag;
use crate::graph::node::{NodeInput, NodeSpec, OutputRef};
use crate::graph::registry::{BuildContext, CapabilityRegistry, NodeBuilderFn};
use crate::graph::rules::{self, Scope};
use crate::observability::messages::builder::{
    CapabilityOmitted, GraphBuildCompleted, GraphBuildStarted, InputCandidateChosen,
    RuleSelected, SeriesSkipped,
};
use crate::observability::messages::StructuredLog;
use crate::traits::InputValue;

const DEFAULT_HINT: &str = "check that the subject has the inputs this capability needs";

/// Where a named output can be read from once a capability has been chosen.
#[derive(Debug, Clone)]
enum Produced {
    Singleton(String),
    /// Per-file producer: file path -> node id
    PerItem {
        foreach: String,
        items: BTreeMap<PathBuf, String>,
    },
}

/// A candidate picked among several files for a singleton input.
struct Choice {
    node_id: String,
    input: String,
    chosen: PathBuf,
    candidate_count: usize,
}

/// Why a rule was not instantiated.
enum Rejected {
    /// The subject does not meet the rule; the next rule is tried
    Unsatisfied(String),
    /// The rule set itself is broken
    Failed(BuildError),
}

impl From<String> for Rejected {
    fn from(reason: String) -> Self {
        Rejected::Unsatisfied(reason)
    }
}

impl From<BuildError> for Rejected {
    fn from(error: BuildError) -> Self {
        Rejected::Failed(error)
    }
}

/// A rule instantiated for one subject.
struct Instantiation {
    nodes: Vec<NodeSpec>,
    choices: Vec<Choice>,
    skipped: Vec<(PathBuf, String)>,
}

pub struct GraphBuilder {
    registry: Arc<CapabilityRegistry>,
    config: Arc<Config>,
}

impl GraphBuilder {
    pub fn new(registry: Arc<CapabilityRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }

    /// Builds the DAG for one subject.
    ///
    /// Fails with [`BuildError::UnsatisfiablePrerequisite`] when a mandatory
    /// capability has no satisfiable rule; optional capabilities are omitted.
    pub fn build(&self, subject: &SubjectData) -> Result<SubjectDag, BuildError> {
        let subject = subject.without_modalities(&self.config.workflow.ignore);
        let subject_id = subject.subject_id.as_str();

        GraphBuildStarted {
            subject: subject_id,
            capability_count: self.registry.len(),
            modality_count: subject.modality_counts().len(),
        }
        .log();

        let order = self
            .registry
            .evaluation_order()
            .map_err(|source| BuildError::Cycle {
                subject: subject_id.to_string(),
                source,
            })?;

        let mut produced: HashMap<String, Produced> = HashMap::new();
        let mut nodes: Vec<NodeSpec> = Vec::new();

        for capability in &order {
            let Some(entry) = self.registry.get(capability) else {
                continue;
            };

            let mut attempts: Vec<(String, String)> = Vec::new();
            let mut selected = None;
            for (index, rule) in entry.rules.iter().enumerate() {
                match self.instantiate(rule, &subject, &produced) {
                    Ok(instantiation) => {
                        selected = Some((index, rule, instantiation));
                        break;
                    }
                    Err(Rejected::Unsatisfied(reason)) => attempts.push((rule.id.clone(), reason)),
                    Err(Rejected::Failed(error)) => return Err(error),
                }
            }

            let Some((index, rule, instantiation)) = selected else {
                if entry.is_mandatory() {
                    return Err(BuildError::UnsatisfiablePrerequisite {
                        subject: subject_id.to_string(),
                        capability: capability.clone(),
                        attempts,
                        hint: entry.hint().unwrap_or(DEFAULT_HINT).to_string(),
                    });
                }
                let reason = attempts
                    .iter()
                    .map(|(rule, reason)| format!("{}: {}", rule, reason))
                    .collect::<Vec<_>>()
                    .join("; ");
                CapabilityOmitted {
                    subject: subject_id,
                    capability,
                    reason: &reason,
                }
                .log();
                continue;
            };

            let passed_over: Vec<String> = attempts
                .iter()
                .map(|(rule, reason)| format!("{} ({})", rule, reason))
                .chain(
                    entry.rules[index + 1..]
                        .iter()
                        .map(|r| format!("{} (lower priority)", r.id)),
                )
                .collect();
            RuleSelected {
                subject: subject_id,
                capability,
                rule_id: &rule.id,
                priority: rule.priority,
                passed_over: &passed_over,
            }
            .log();
            for choice in &instantiation.choices {
                InputCandidateChosen {
                    subject: subject_id,
                    node_id: &choice.node_id,
                    input: &choice.input,
                    chosen: &choice.chosen,
                    candidate_count: choice.candidate_count,
                }
                .log();
            }
            for (file, reason) in &instantiation.skipped {
                SeriesSkipped {
                    subject: subject_id,
                    capability,
                    file,
                    reason,
                }
                .log();
            }

            register_outputs(rule, &instantiation.nodes, &mut produced);
            nodes.extend(instantiation.nodes);
        }

        let dag = SubjectDag::new(subject_id, nodes)?;
        GraphBuildCompleted {
            subject: subject_id,
            node_count: dag.len(),
            edge_count: dag.edge_count(),
        }
        .log();
        Ok(dag)
    }

    fn instantiate(
        &self,
        rule: &RuleConfig,
        subject: &SubjectData,
        produced: &HashMap<String, Produced>,
    ) -> Result<Instantiation, Rejected> {
        let workflow = &self.config.workflow;
        let subject_scope = Scope {
            subject,
            item: None,
            workflow,
        };
        for requirement in rule.requires.iter().filter(|r| !rules::is_per_file(r)) {
            rules::check(requirement, &subject_scope)?;
        }

        let builder_name = rule.builder();
        let builder = self
            .registry
            .builder(builder_name)
            .ok_or_else(|| BuildError::Builder {
                builder: builder_name.to_string(),
                rule_id: rule.id.clone(),
                message: "builder is not registered".to_string(),
            })?;

        let mut instantiation = Instantiation {
            nodes: Vec::new(),
            choices: Vec::new(),
            skipped: Vec::new(),
        };

        let Some(modality) = rule.foreach.as_deref() else {
            for requirement in rule.requires.iter().filter(|r| rules::is_per_file(r)) {
                rules::check(requirement, &subject_scope)?;
            }
            let node_id = rule.capability.clone();
            let inputs = resolve_inputs(rule, &subject_scope, produced, &node_id, &mut instantiation.choices)?;
            let node = build_node(builder, subject_scope, rule, node_id, inputs)?;
            instantiation.nodes.push(node);
            return Ok(instantiation);
        };

        let files = subject.files(modality);
        if files.is_empty() {
            return Err(format!("missing modality '{}'", modality).into());
        }

        let mut labels: BTreeSet<String> = BTreeSet::new();
        for file in files {
            let scope = Scope {
                subject,
                item: Some(file),
                workflow,
            };
            let accepted = rule
                .requires
                .iter()
                .filter(|r| rules::is_per_file(r))
                .try_for_each(|requirement| rules::check(requirement, &scope));
            if let Err(reason) = accepted {
                instantiation.skipped.push((file.path.clone(), reason));
                continue;
            }

            let node_id = format!(
                "{}.{}",
                rule.capability,
                unique_label(&mut labels, file.run_label(&subject.subject_id))
            );
            let mut choices = Vec::new();
            match resolve_inputs(rule, &scope, produced, &node_id, &mut choices) {
                Ok(inputs) => {
                    instantiation.choices.extend(choices);
                    instantiation
                        .nodes
                        .push(build_node(builder, scope, rule, node_id, inputs)?);
                }
                Err(reason) => instantiation.skipped.push((file.path.clone(), reason)),
            }
        }

        if instantiation.nodes.is_empty() {
            let reasons = instantiation
                .skipped
                .iter()
                .map(|(file, reason)| format!("{}: {}", display_name(file), reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!("no usable '{}' file ({})", modality, reasons).into());
        }
        Ok(instantiation)
    }
}

fn build_node(
    builder: NodeBuilderFn,
    scope: Scope<'_>,
    rule: &RuleConfig,
    node_id: String,
    inputs: BTreeMap<String, NodeInput>,
) -> Result<NodeSpec, BuildError> {
    let ctx = BuildContext {
        subject: scope.subject,
        rule,
        node_id,
        item: scope.item,
        inputs,
        workflow: scope.workflow,
    };
    builder(&ctx)
}

fn resolve_inputs(
    rule: &RuleConfig,
    scope: &Scope<'_>,
    produced: &HashMap<String, Produced>,
    node_id: &str,
    choices: &mut Vec<Choice>,
) -> Result<BTreeMap<String, NodeInput>, String> {
    let mut inputs = BTreeMap::new();
    for decl in &rule.inputs {
        match resolve_input(decl, rule, scope, produced, node_id, choices)? {
            Some(input) => {
                inputs.insert(decl.name.clone(), input);
            }
            None if decl.optional => {}
            None => return Err(format!("input '{}' is unavailable", decl.name)),
        }
    }
    Ok(inputs)
}

/// `Ok(None)` means the source is absent; `Err` means it exists but cannot be used.
fn resolve_input(
    decl: &InputDecl,
    rule: &RuleConfig,
    scope: &Scope<'_>,
    produced: &HashMap<String, Produced>,
    node_id: &str,
    choices: &mut Vec<Choice>,
) -> Result<Option<NodeInput>, String> {
    match decl.source() {
        InputSource::Metadata(key) => Ok(scope
            .metadata(key)
            .map(|value| NodeInput::Value(InputValue::Scalar(value.clone())))),
        InputSource::WorkflowOption(key) => {
            let Some(value) = scope.workflow.option(key).filter(|v| !v.is_null()) else {
                return Ok(None);
            };
            let value = match (decl.kind, value.as_str()) {
                (InputKind::Path, Some(path)) => InputValue::Path(PathBuf::from(path)),
                (InputKind::File, Some(path)) => InputValue::File(PathBuf::from(path)),
                _ => InputValue::Scalar(value),
            };
            Ok(Some(NodeInput::Value(value)))
        }
        InputSource::Named(name) => {
            if let Some(source) = produced.get(name) {
                return produced_input(name, source, rule, scope).map(Some);
            }
            if rule.foreach.as_deref() == Some(name) {
                if let Some(item) = scope.item {
                    return Ok(Some(NodeInput::Value(file_value(decl, &item.path))));
                }
            }
            let files = scope.subject.files(name);
            let Some(chosen) = files.iter().map(|f| &f.path).min() else {
                return Ok(None);
            };
            if files.len() > 1 {
                choices.push(Choice {
                    node_id: node_id.to_string(),
                    input: decl.name.clone(),
                    chosen: chosen.clone(),
                    candidate_count: files.len(),
                });
            }
            Ok(Some(NodeInput::Value(file_value(decl, chosen))))
        }
    }
}

fn produced_input(
    name: &str,
    source: &Produced,
    rule: &RuleConfig,
    scope: &Scope<'_>,
) -> Result<NodeInput, String> {
    let output_ref = |node_id: &String| OutputRef {
        node_id: node_id.clone(),
        output: name.to_string(),
    };
    match source {
        Produced::Singleton(node_id) => Ok(NodeInput::Upstream(output_ref(node_id))),
        Produced::PerItem { foreach, items } => match scope.item {
            Some(item) if rule.foreach.as_deref() == Some(foreach.as_str()) => items
                .get(&item.path)
                .map(|node_id| NodeInput::Upstream(output_ref(node_id)))
                .ok_or_else(|| format!("'{}' was not produced for this series", name)),
            _ => Ok(NodeInput::FanIn(items.values().map(output_ref).collect())),
        },
    }
}

fn file_value(decl: &InputDecl, path: &Path) -> InputValue {
    match decl.kind {
        InputKind::Path => InputValue::Path(path.to_path_buf()),
        _ => InputValue::File(path.to_path_buf()),
    }
}

fn register_outputs(rule: &RuleConfig, nodes: &[NodeSpec], produced: &mut HashMap<String, Produced>) {
    for output in &rule.outputs {
        let source = match rule.foreach.as_deref() {
            None => match nodes.first() {
                Some(node) => Produced::Singleton(node.id.clone()),
                None => continue,
            },
            Some(foreach) => Produced::PerItem {
                foreach: foreach.to_string(),
                items: nodes
                    .iter()
                    .filter_map(|node| node.item.clone().map(|item| (item, node.id.clone())))
                    .collect(),
            },
        };
        produced.insert(output.name.clone(), source);
    }
}

/// Appends `-2`, `-3`, ... until the label is unused.
fn unique_label(used: &mut BTreeSet<String>, label: String) -> String {
    let mut candidate = label.clone();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}-{}", label, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
