// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::ToolMapError;

/// Errors that can occur while validating a rule set
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected between capabilities
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// A rule consumes an input that no dataset modality and no rule output provides
    UnresolvedInput {
        rule_id: String,
        input: String,
        source: String,
    },
    /// Two rules share an ID
    DuplicateRuleId { rule_id: String },
    /// Two tools share a name
    DuplicateToolName { tool: String },
    /// A rule references a tool that is not defined
    UnknownTool { rule_id: String, tool: String },
    /// A rule names a builder function that is not registered
    UnknownBuilder { rule_id: String, builder: String },
    /// The same output name is declared by more than one capability
    ConflictingOutput {
        output: String,
        capabilities: Vec<String>,
    },
    /// Rules competing for one capability must declare the same outputs
    InconsistentCapabilityOutputs { capability: String, rule_id: String },
    /// A per-file rule consumes a per-file output fanned out over a different modality
    MismatchedFanout {
        rule_id: String,
        input: String,
        producer: String,
    },
    /// A run or workflow option holds an unusable value
    InvalidOption { option: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnresolvedInput {
                rule_id,
                input,
                source,
            } => {
                write!(
                    f,
                    "Rule '{}' input '{}' reads '{}', which is neither a dataset modality nor an output of any rule",
                    rule_id, input, source
                )
            }
            ValidationError::DuplicateRuleId { rule_id } => {
                write!(f, "Duplicate rule ID: '{}'", rule_id)
            }
            ValidationError::DuplicateToolName { tool } => {
                write!(f, "Duplicate tool name: '{}'", tool)
            }
            ValidationError::UnknownTool { rule_id, tool } => {
                write!(f, "Rule '{}' uses tool '{}' which is not defined", rule_id, tool)
            }
            ValidationError::UnknownBuilder { rule_id, builder } => {
                write!(
                    f,
                    "Rule '{}' uses builder '{}' which is not registered",
                    rule_id, builder
                )
            }
            ValidationError::ConflictingOutput {
                output,
                capabilities,
            } => {
                write!(
                    f,
                    "Output '{}' is declared by several capabilities: {}",
                    output,
                    capabilities.join(", ")
                )
            }
            ValidationError::InconsistentCapabilityOutputs {
                capability,
                rule_id,
            } => {
                write!(
                    f,
                    "Rule '{}' declares different outputs than the other rules of capability '{}'",
                    rule_id, capability
                )
            }
            ValidationError::MismatchedFanout {
                rule_id,
                input,
                producer,
            } => {
                write!(
                    f,
                    "Rule '{}' input '{}' is fanned out over a different modality than its producer '{}'",
                    rule_id, input, producer
                )
            }
            ValidationError::InvalidOption { option, reason } => {
                write!(f, "Invalid option '{}': {}", option, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Fatal configuration errors. Any of these aborts the run before a subject starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse TOML config '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported config format '{path}' (expected .yaml, .yml or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid rule set: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    ToolMap(#[from] ToolMapError),
}

impl ConfigError {
    /// Remediation hint shown next to the error.
    pub fn hint(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "check that the config path exists and is readable",
            ConfigError::Yaml { .. } | ConfigError::Toml { .. } => {
                "fix the syntax error at the reported line and column"
            }
            ConfigError::UnsupportedFormat { .. } => "rename the config to .yaml, .yml or .toml",
            ConfigError::Validation(_) => {
                "fix the listed rules; run `petflow validate <config>` to recheck without executing"
            }
            ConfigError::ToolMap(_) => "fix the tool definitions in the `tools` section",
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
