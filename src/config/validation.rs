// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Rule-set validation.
//!
//! A broken rule set is a fatal configuration error: it means the pipeline
//! definition, not the data, is wrong, so it must be caught before any
//! subject is touched.
//!
//! # Validation Pipeline
//!
//! 1. **Options**: concurrency, timeout and retry values are usable
//! 2. **Uniqueness**: tool names and rule IDs are unique
//! 3. **References**: tools and builders exist; every named input resolves to a
//!    dataset modality or some rule's output; outputs are owned by one capability
//! 4. **Cycle Detection**: three-color DFS over the capability graph
//!
//! Cycle detection needs a structurally valid graph, so it only runs when the
//! earlier stages found nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::rule::{InputSource, RuleConfig};
use crate::config::{Config, DependencyGraph};
use crate::errors::ValidationError;
use crate::graph::builtin_builder_names;
use crate::observability::messages::validation::{
    ValidationCompleted, ValidationErrorFound, ValidationFailed, ValidationStarted,
};
use crate::observability::messages::StructuredLog;

/// Validates a configuration's rule set for structural integrity.
///
/// Errors are accumulated so users see every problem at once.
pub fn validate_rule_set(config: &Config) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        rule_count: config.rules.len(),
        tool_count: config.tools.len(),
    }
    .log();

    let mut errors = Vec::new();

    errors.extend(validate_options(config));
    errors.extend(validate_unique_names(config));
    errors.extend(validate_references(config));
    errors.extend(validate_outputs(config));
    errors.extend(validate_fanout(config));

    if errors.is_empty() {
        if let Some(cycle) = DependencyGraph::from_rules(&config.rules).find_cycle() {
            errors.push(ValidationError::CyclicDependency { cycle });
        }
    }

    if errors.is_empty() {
        let capabilities: BTreeSet<&str> =
            config.rules.iter().map(|r| r.capability.as_str()).collect();
        ValidationCompleted {
            rule_count: config.rules.len(),
            capability_count: capabilities.len(),
        }
        .log();
        Ok(())
    } else {
        for error in &errors {
            ValidationErrorFound { error }.log();
        }
        ValidationFailed {
            error_count: errors.len(),
        }
        .log();
        Err(errors)
    }
}

fn validate_options(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let run = &config.run;

    let mut invalid = |option: &str, reason: &str| {
        errors.push(ValidationError::InvalidOption {
            option: option.to_string(),
            reason: reason.to_string(),
        })
    };

    if run.max_concurrent_subjects == Some(0) {
        invalid("run.max_concurrent_subjects", "must be at least 1");
    }
    if run.max_concurrent_nodes == Some(0) {
        invalid("run.max_concurrent_nodes", "must be at least 1");
    }
    if let Some(timeout) = run.node_timeout_seconds {
        if !(timeout.is_finite() && timeout > 0.0) {
            invalid("run.node_timeout_seconds", "must be a positive number of seconds");
        }
    }
    if let Some(grace) = run.cancel_grace_seconds {
        if !(grace.is_finite() && grace >= 0.0) {
            invalid("run.cancel_grace_seconds", "must not be negative");
        }
    }
    if let Some(multiplier) = run.retry.backoff_multiplier {
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            invalid("run.retry.backoff_multiplier", "must be at least 1.0");
        }
    }

    let known: HashSet<&str> = config.dataset.modalities.iter().map(String::as_str).collect();
    for rule in &config.rules {
        if let Some(modality) = &rule.foreach {
            if !known.contains(modality.as_str()) {
                invalid(
                    &format!("rules.{}.foreach", rule.id),
                    &format!("'{}' is not a dataset modality", modality),
                );
            }
        }
    }

    errors
}

fn validate_unique_names(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_tools = HashSet::new();
    for tool in &config.tools {
        if !seen_tools.insert(&tool.name) {
            errors.push(ValidationError::DuplicateToolName {
                tool: tool.name.clone(),
            });
        }
    }

    let mut seen_rules = HashSet::new();
    for rule in &config.rules {
        if !seen_rules.insert(&rule.id) {
            errors.push(ValidationError::DuplicateRuleId {
                rule_id: rule.id.clone(),
            });
        }
    }

    errors
}

fn validate_references(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let tools: HashSet<&str> = config.tools.iter().map(|t| t.name.as_str()).collect();
    let builders: HashSet<&str> = builtin_builder_names().into_iter().collect();
    let modalities: HashSet<&str> = config.dataset.modalities.iter().map(String::as_str).collect();
    let outputs: HashSet<&str> = config
        .rules
        .iter()
        .flat_map(|r| r.outputs.iter().map(|o| o.name.as_str()))
        .collect();

    for rule in &config.rules {
        if !tools.contains(rule.tool.as_str()) {
            errors.push(ValidationError::UnknownTool {
                rule_id: rule.id.clone(),
                tool: rule.tool.clone(),
            });
        }
        if !builders.contains(rule.builder()) {
            errors.push(ValidationError::UnknownBuilder {
                rule_id: rule.id.clone(),
                builder: rule.builder().to_string(),
            });
        }
        for input in &rule.inputs {
            if let InputSource::Named(name) = input.source() {
                if !modalities.contains(name) && !outputs.contains(name) {
                    errors.push(ValidationError::UnresolvedInput {
                        rule_id: rule.id.clone(),
                        input: input.name.clone(),
                        source: name.to_string(),
                    });
                }
            }
        }
    }

    errors
}

fn validate_outputs(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for rule in &config.rules {
        for output in &rule.outputs {
            owners
                .entry(output.name.as_str())
                .or_default()
                .insert(rule.capability.as_str());
        }
    }
    for (output, capabilities) in owners {
        if capabilities.len() > 1 {
            errors.push(ValidationError::ConflictingOutput {
                output: output.to_string(),
                capabilities: capabilities.into_iter().map(String::from).collect(),
            });
        }
    }

    let mut first_by_capability: BTreeMap<&str, &RuleConfig> = BTreeMap::new();
    for rule in &config.rules {
        match first_by_capability.get(rule.capability.as_str()) {
            Some(first) => {
                if first.output_names() != rule.output_names() || first.foreach != rule.foreach {
                    errors.push(ValidationError::InconsistentCapabilityOutputs {
                        capability: rule.capability.clone(),
                        rule_id: rule.id.clone(),
                    });
                }
            }
            None => {
                first_by_capability.insert(rule.capability.as_str(), rule);
            }
        }
    }

    errors
}

/// A per-file consumer may read per-file outputs only when both fan out over
/// the same modality; singleton consumers may fan in anything.
fn validate_fanout(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut producer_fanout: BTreeMap<&str, (&str, Option<&str>)> = BTreeMap::new();
    for rule in &config.rules {
        for output in &rule.outputs {
            producer_fanout
                .entry(output.name.as_str())
                .or_insert((rule.id.as_str(), rule.foreach.as_deref()));
        }
    }

    for rule in &config.rules {
        let Some(consumer) = rule.foreach.as_deref() else {
            continue;
        };
        for input in &rule.inputs {
            if let InputSource::Named(name) = input.source() {
                if let Some((producer, Some(fanout))) = producer_fanout.get(name) {
                    if *fanout != consumer {
                        errors.push(ValidationError::MismatchedFanout {
                            rule_id: rule.id.clone(),
                            input: input.name.clone(),
                            producer: producer.to_string(),
                        });
                    }
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rule::{InputDecl, InputKind, OutputDecl};
    use crate::config::{ToolConfig, ToolSpec};

    fn tool(name: &str) -> ToolConfig {
        ToolConfig {
            name: name.to_string(),
            version: "1".to_string(),
            spec: ToolSpec::Builtin {
                function: "touch".to_string(),
            },
        }
    }

    fn create_test_rule(id: &str, capability: &str, inputs: &[&str], outputs: &[&str]) -> RuleConfig {
        RuleConfig {
            id: id.to_string(),
            capability: capability.to_string(),
            stage: None,
            tool: "touch".to_string(),
            priority: 0,
            mandatory: false,
            foreach: None,
            requires: vec![],
            inputs: inputs
                .iter()
                .map(|name| InputDecl {
                    name: name.to_string(),
                    from: None,
                    kind: InputKind::File,
                    optional: false,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|name| OutputDecl {
                    name: name.to_string(),
                    file: format!("{}.nii.gz", name),
                })
                .collect(),
            params: Default::default(),
            resources: None,
            builder: None,
            hint: None,
        }
    }

    fn config(rules: Vec<RuleConfig>) -> Config {
        Config {
            tools: vec![tool("touch")],
            rules,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_empty_config() {
        assert!(validate_rule_set(&config(vec![])).is_ok());
    }

    #[test]
    fn test_valid_chain() {
        let cfg = config(vec![
            create_test_rule("ref", "anat_reference", &["t1w"], &["t1w_preproc"]),
            create_test_rule("mask", "brain_mask", &["t1w_preproc"], &["mask"]),
        ]);
        assert!(validate_rule_set(&cfg).is_ok());
    }

    #[test]
    fn test_competing_rules_share_outputs() {
        let cfg = config(vec![
            create_test_rule("ref_from_t1w", "anat_reference", &["t1w"], &["t1w_preproc"]),
            create_test_rule(
                "ref_from_derivatives",
                "anat_reference",
                &["anat_derivatives"],
                &["t1w_preproc"],
            ),
        ]);
        assert!(validate_rule_set(&cfg).is_ok());
    }

    #[test]
    fn test_validation_errors_table_driven() {
        struct TestCase {
            name: &'static str,
            config: Config,
            expected: ValidationError,
        }

        let mut unknown_tool = create_test_rule("a", "cap_a", &[], &["x"]);
        unknown_tool.tool = "missing".into();

        let mut unknown_builder = create_test_rule("a", "cap_a", &[], &["x"]);
        unknown_builder.builder = Some("nope".into());

        let mut bad_fanout = create_test_rule("b", "cap_b", &["x"], &["y"]);
        bad_fanout.foreach = Some("t1w".into());
        let mut pet_producer = create_test_rule("a", "cap_a", &[], &["x"]);
        pet_producer.foreach = Some("pet".into());

        let mut zero_nodes = config(vec![]);
        zero_nodes.run.max_concurrent_nodes = Some(0);

        let test_cases = vec![
            TestCase {
                name: "duplicate rule id",
                config: config(vec![
                    create_test_rule("a", "cap_a", &[], &["x"]),
                    create_test_rule("a", "cap_a", &[], &["x"]),
                ]),
                expected: ValidationError::DuplicateRuleId { rule_id: "a".into() },
            },
            TestCase {
                name: "unknown tool",
                config: config(vec![unknown_tool]),
                expected: ValidationError::UnknownTool {
                    rule_id: "a".into(),
                    tool: "missing".into(),
                },
            },
            TestCase {
                name: "unknown builder",
                config: config(vec![unknown_builder]),
                expected: ValidationError::UnknownBuilder {
                    rule_id: "a".into(),
                    builder: "nope".into(),
                },
            },
            TestCase {
                name: "unresolved input",
                config: config(vec![create_test_rule("a", "cap_a", &["ghost"], &["x"])]),
                expected: ValidationError::UnresolvedInput {
                    rule_id: "a".into(),
                    input: "ghost".into(),
                    source: "ghost".into(),
                },
            },
            TestCase {
                name: "output owned by two capabilities",
                config: config(vec![
                    create_test_rule("a", "cap_a", &[], &["x"]),
                    create_test_rule("b", "cap_b", &[], &["x"]),
                ]),
                expected: ValidationError::ConflictingOutput {
                    output: "x".into(),
                    capabilities: vec!["cap_a".into(), "cap_b".into()],
                },
            },
            TestCase {
                name: "competitors with different outputs",
                config: config(vec![
                    create_test_rule("a1", "cap_a", &[], &["x"]),
                    create_test_rule("a2", "cap_a", &[], &["x", "z"]),
                ]),
                expected: ValidationError::InconsistentCapabilityOutputs {
                    capability: "cap_a".into(),
                    rule_id: "a2".into(),
                },
            },
            TestCase {
                name: "mismatched fanout",
                config: config(vec![pet_producer, bad_fanout]),
                expected: ValidationError::MismatchedFanout {
                    rule_id: "b".into(),
                    input: "x".into(),
                    producer: "a".into(),
                },
            },
            TestCase {
                name: "zero node concurrency",
                config: zero_nodes,
                expected: ValidationError::InvalidOption {
                    option: "run.max_concurrent_nodes".into(),
                    reason: "must be at least 1".into(),
                },
            },
        ];

        for case in test_cases {
            let errors = validate_rule_set(&case.config).expect_err(case.name);
            assert!(
                errors.contains(&case.expected),
                "case '{}': expected {:?} in {:?}",
                case.name,
                case.expected,
                errors
            );
        }
    }

    #[test]
    fn test_cycle_between_capabilities() {
        let cfg = config(vec![
            create_test_rule("a", "cap_a", &["y"], &["x"]),
            create_test_rule("b", "cap_b", &["x"], &["y"]),
        ]);

        let errors = validate_rule_set(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicDependency {
                cycle: vec!["cap_a".into(), "cap_b".into(), "cap_a".into()],
            }]
        );
    }

    #[test]
    fn test_errors_accumulate() {
        let cfg = config(vec![
            create_test_rule("a", "cap_a", &["ghost"], &["x"]),
            create_test_rule("a", "cap_a", &["phantom"], &["x"]),
        ]);

        let errors = validate_rule_set(&cfg).unwrap_err();
        assert!(errors.len() >= 3, "{:?}", errors);
    }
}
