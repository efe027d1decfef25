// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use thiserror::Error;

use super::{BuildError, CacheError, ConfigError, DatasetError};
use crate::config::consts::{EXIT_ENVIRONMENT, EXIT_FATAL_CONFIG, EXIT_SUBJECT_FAILURES};

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fatal configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fatal configuration error: {0}")]
    Build(BuildError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to prepare '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled before any subject executed")]
    Cancelled,
}

impl PipelineError {
    /// Fatal configuration problems are detected before any subject executes.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_)
                | PipelineError::Build(_)
                | PipelineError::Dataset(DatasetError::ParticipantsNotFound(_))
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_fatal_config() {
            EXIT_FATAL_CONFIG
        } else if matches!(self, PipelineError::Cancelled) {
            EXIT_SUBJECT_FAILURES
        } else {
            EXIT_ENVIRONMENT
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            PipelineError::Config(e) => e.hint(),
            PipelineError::Build(_) => {
                "the rule set wires capabilities into a loop; check rule inputs against rule outputs"
            }
            PipelineError::Dataset(DatasetError::ParticipantsNotFound(_)) => {
                "check `workflow.participant_labels` against the subjects present in the dataset"
            }
            PipelineError::Dataset(_) => "check the dataset path and its layout",
            PipelineError::Cache(_) => "check that the cache directory is writable",
            PipelineError::Io { .. } => "check that the work directory is writable",
            PipelineError::Cancelled => "the run was interrupted; rerun to resume from the cache",
        }
    }
}

/// A subject lifecycle step that is not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid subject state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}
