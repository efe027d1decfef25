// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use super::{DatasetError, ValidationError};

/// Errors raised while turning a subject's inputs into a DAG.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A mandatory capability has no satisfiable rule for this subject.
    #[error(
        "unsatisfiable prerequisite for subject '{subject}': capability '{capability}' has no satisfiable rule ({}). Hint: {hint}",
        describe_attempts(.attempts)
    )]
    UnsatisfiablePrerequisite {
        subject: String,
        capability: String,
        /// (rule id, reason it was rejected)
        attempts: Vec<(String, String)>,
        hint: String,
    },

    /// The instantiated graph contains a cycle; the rule set itself is broken.
    #[error("rule set produced a cyclic graph for subject '{subject}': {source}")]
    Cycle {
        subject: String,
        #[source]
        source: ValidationError,
    },

    #[error("node builder '{builder}' failed for rule '{rule_id}': {message}")]
    Builder {
        builder: String,
        rule_id: String,
        message: String,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl BuildError {
    /// Prerequisite errors are scoped to one subject; everything else is fatal for the run.
    pub fn is_fatal_for_run(&self) -> bool {
        !matches!(
            self,
            BuildError::UnsatisfiablePrerequisite { .. } | BuildError::Dataset(_)
        )
    }
}

fn describe_attempts(attempts: &[(String, String)]) -> String {
    if attempts.is_empty() {
        return "no rules registered".to_string();
    }
    attempts
        .iter()
        .map(|(rule, reason)| format!("{}: {}", rule, reason))
        .collect::<Vec<_>>()
        .join("; ")
}
