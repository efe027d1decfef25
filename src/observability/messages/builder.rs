// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph construction.
//!
//! This module contains message types for logging events related to:
//! * Rule selection between competing rules
//! * Omitted optional capabilities and skipped series
//! * Prerequisite failures

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::Span;

/// Graph construction started for a subject.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use petflow::observability::messages::builder::GraphBuildStarted;
///
/// let msg = GraphBuildStarted {
///     subject: "01",
///     capability_count: 9,
///     modality_count: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct GraphBuildStarted<'a> {
    pub subject: &'a str,
    pub capability_count: usize,
    pub modality_count: usize,
}

impl Display for GraphBuildStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Building graph for subject '{}': {} capabilities over {} available modalities",
            self.subject, self.capability_count, self.modality_count
        )
    }
}

impl StructuredLog for GraphBuildStarted<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            capability_count = self.capability_count,
            modality_count = self.modality_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph_build",
            span_name = name,
            subject = self.subject,
            capability_count = self.capability_count,
        )
    }
}

/// A rule won its capability. `passed_over` lists satisfiable competitors that lost on priority.
///
/// # Log Level
/// `info!` - The choice is part of the run's provenance
pub struct RuleSelected<'a> {
    pub subject: &'a str,
    pub capability: &'a str,
    pub rule_id: &'a str,
    pub priority: i32,
    pub passed_over: &'a [String],
}

impl Display for RuleSelected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}': capability '{}' uses rule '{}' (priority {})",
            self.subject, self.capability, self.rule_id, self.priority
        )?;
        if !self.passed_over.is_empty() {
            write!(f, " over {}", self.passed_over.join(", "))?;
        }
        Ok(())
    }
}

impl StructuredLog for RuleSelected<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            capability = self.capability,
            rule_id = self.rule_id,
            priority = self.priority,
            passed_over = ?self.passed_over,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "rule_selected",
            span_name = name,
            subject = self.subject,
            capability = self.capability,
            rule_id = self.rule_id,
        )
    }
}

/// Several files could feed one input; the first in path order was used.
///
/// # Log Level
/// `info!` - The choice is part of the run's provenance
pub struct InputCandidateChosen<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub input: &'a str,
    pub chosen: &'a Path,
    pub candidate_count: usize,
}

impl Display for InputCandidateChosen<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}': node '{}' input '{}' uses {} (first of {} candidates)",
            self.subject,
            self.node_id,
            self.input,
            self.chosen.display(),
            self.candidate_count
        )
    }
}

impl StructuredLog for InputCandidateChosen<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            node_id = self.node_id,
            input = self.input,
            chosen = %self.chosen.display(),
            candidate_count = self.candidate_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "input_candidate_chosen",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
        )
    }
}

/// An optional capability had no satisfiable rule and was left out of the graph.
///
/// # Log Level
/// `debug!` - Expected for most datasets
pub struct CapabilityOmitted<'a> {
    pub subject: &'a str,
    pub capability: &'a str,
    pub reason: &'a str,
}

impl Display for CapabilityOmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}': omitting capability '{}' ({})",
            self.subject, self.capability, self.reason
        )
    }
}

impl StructuredLog for CapabilityOmitted<'_> {
    fn log(&self) {
        tracing::debug!(
            subject = self.subject,
            capability = self.capability,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "capability_omitted",
            span_name = name,
            subject = self.subject,
            capability = self.capability,
        )
    }
}

/// One file of a per-file capability failed its requirements, e.g. too few PET frames.
///
/// # Log Level
/// `warn!` - Data the user supplied will not be processed
pub struct SeriesSkipped<'a> {
    pub subject: &'a str,
    pub capability: &'a str,
    pub file: &'a Path,
    pub reason: &'a str,
}

impl Display for SeriesSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}': skipping {} for capability '{}' ({})",
            self.subject,
            self.file.display(),
            self.capability,
            self.reason
        )
    }
}

impl StructuredLog for SeriesSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            capability = self.capability,
            file = %self.file.display(),
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "series_skipped",
            span_name = name,
            subject = self.subject,
            capability = self.capability,
        )
    }
}

/// Graph construction finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct GraphBuildCompleted<'a> {
    pub subject: &'a str,
    pub node_count: usize,
    pub edge_count: usize,
}

impl Display for GraphBuildCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph for subject '{}' has {} nodes and {} edges",
            self.subject, self.node_count, self.edge_count
        )
    }
}

impl StructuredLog for GraphBuildCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            node_count = self.node_count,
            edge_count = self.edge_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph_build_completed",
            span_name = name,
            subject = self.subject,
            node_count = self.node_count,
        )
    }
}

/// A mandatory capability cannot be satisfied; the subject will not execute.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct PrerequisiteUnsatisfied<'a> {
    pub subject: &'a str,
    pub capability: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PrerequisiteUnsatisfied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl StructuredLog for PrerequisiteUnsatisfied<'_> {
    fn log(&self) {
        tracing::error!(
            subject = self.subject,
            capability = self.capability,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "prerequisite_unsatisfied",
            span_name = name,
            subject = self.subject,
            capability = self.capability,
        )
    }
}
