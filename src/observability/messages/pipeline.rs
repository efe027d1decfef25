// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the run and subject lifecycle.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;
use tracing::Span;

/// A run started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunStarted<'a> {
    pub run_id: &'a str,
    pub subject_count: usize,
    pub max_concurrent_subjects: usize,
}

impl Display for RunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting run {}: {} subjects, max_concurrent_subjects={}",
            self.run_id, self.subject_count, self.max_concurrent_subjects
        )
    }
}

impl StructuredLog for RunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            run_id = self.run_id,
            subject_count = self.subject_count,
            max_concurrent_subjects = self.max_concurrent_subjects,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run",
            span_name = name,
            run_id = self.run_id,
            subject_count = self.subject_count,
        )
    }
}

/// A subject moved between lifecycle states.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use petflow::observability::messages::pipeline::SubjectStateChanged;
///
/// let msg = SubjectStateChanged {
///     subject: "01",
///     from: "building",
///     to: "ready",
/// };
///
/// assert_eq!(msg.to_string(), "Subject '01': building -> ready");
/// ```
pub struct SubjectStateChanged<'a> {
    pub subject: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

impl Display for SubjectStateChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Subject '{}': {} -> {}", self.subject, self.from, self.to)
    }
}

impl StructuredLog for SubjectStateChanged<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            from = self.from,
            to = self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("subject", span_name = name, subject = self.subject)
    }
}

/// A subject reached Done.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SubjectFinished<'a> {
    pub subject: &'a str,
    pub outcome: &'a str,
    pub duration: Duration,
}

impl Display for SubjectFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}' finished with outcome '{}' in {:?}",
            self.subject, self.outcome, self.duration
        )
    }
}

impl StructuredLog for SubjectFinished<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            outcome = self.outcome,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("subject_finished", span_name = name, subject = self.subject)
    }
}

/// A report file was written.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ReportWritten<'a> {
    pub subject: &'a str,
    pub path: &'a Path,
}

impl Display for ReportWritten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Wrote report for subject '{}' to {}",
            self.subject,
            self.path.display()
        )
    }
}

impl StructuredLog for ReportWritten<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            path = %self.path.display(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("report", span_name = name, subject = self.subject)
    }
}

/// A per-subject artifact (report, config snapshot) could not be written.
///
/// # Log Level
/// `warn!` - The run continues
pub struct ArtifactWriteFailed<'a> {
    pub subject: &'a str,
    pub artifact: &'a str,
    pub path: &'a Path,
    pub error: &'a str,
}

impl Display for ArtifactWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to write {} for subject '{}' to {}: {}",
            self.artifact,
            self.subject,
            self.path.display(),
            self.error
        )
    }
}

impl StructuredLog for ArtifactWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            artifact = self.artifact,
            path = %self.path.display(),
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "artifact_write_failed",
            span_name = name,
            subject = self.subject,
            artifact = self.artifact,
        )
    }
}

/// The whole run was cancelled.
///
/// # Log Level
/// `warn!` - Operator-requested interruption
pub struct RunCancelled<'a> {
    pub run_id: &'a str,
}

impl Display for RunCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run {} cancelled; finishing in-flight work", self.run_id)
    }
}

impl StructuredLog for RunCancelled<'_> {
    fn log(&self) {
        tracing::warn!(run_id = self.run_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("run_cancelled", span_name = name, run_id = self.run_id)
    }
}

/// All subjects reached Done.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunCompleted<'a> {
    pub run_id: &'a str,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub exit_code: i32,
}

impl Display for RunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Run {} completed: {} success, {} partial, {} failed (exit code {})",
            self.run_id, self.succeeded, self.partial, self.failed, self.exit_code
        )
    }
}

impl StructuredLog for RunCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            run_id = self.run_id,
            succeeded = self.succeeded,
            partial = self.partial,
            failed = self.failed,
            exit_code = self.exit_code,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("run_completed", span_name = name, run_id = self.run_id)
    }
}
