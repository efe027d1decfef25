// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the execution engine.
//!
//! This module contains message types for logging events related to:
//! * Subject DAG execution lifecycle (start, completion)
//! * Node dispatch, cache substitution and terminal states
//! * Retries with backoff
//! * Cancellation

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;
use tracing::Span;

/// Execution of one subject's DAG started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use petflow::observability::messages::engine::ExecutionStarted;
///
/// let msg = ExecutionStarted {
///     subject: "01",
///     node_count: 7,
///     max_concurrency: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ExecutionStarted<'a> {
    pub subject: &'a str,
    pub node_count: usize,
    pub max_concurrency: usize,
}

impl Display for ExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executing subject '{}': {} nodes, max_concurrency={}",
            self.subject, self.node_count, self.max_concurrency
        )
    }
}

impl StructuredLog for ExecutionStarted<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            node_count = self.node_count,
            max_concurrency = self.max_concurrency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution",
            span_name = name,
            subject = self.subject,
            node_count = self.node_count,
            max_concurrency = self.max_concurrency,
        )
    }
}

/// Execution of one subject's DAG finished. Every node has a terminal state.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use petflow::observability::messages::engine::ExecutionCompleted;
/// use std::time::Duration;
///
/// let msg = ExecutionCompleted {
///     subject: "01",
///     succeeded: 5,
///     cached: 1,
///     failed: 1,
///     skipped: 2,
///     cancelled: 0,
///     duration: Duration::from_secs(42),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ExecutionCompleted<'a> {
    pub subject: &'a str,
    pub succeeded: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub duration: Duration,
}

impl Display for ExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}' executed in {:?}: {} succeeded, {} cached, {} failed, {} skipped, {} cancelled",
            self.subject,
            self.duration,
            self.succeeded,
            self.cached,
            self.failed,
            self.skipped,
            self.cancelled
        )
    }
}

impl StructuredLog for ExecutionCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            succeeded = self.succeeded,
            cached = self.cached,
            failed = self.failed,
            skipped = self.skipped,
            cancelled = self.cancelled,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution_completed",
            span_name = name,
            subject = self.subject,
            duration = ?self.duration,
        )
    }
}

/// A node attempt was handed to its tool.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct NodeDispatched<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub tool: &'a str,
    pub identity: &'a str,
    pub attempt: u32,
}

impl Display for NodeDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching node '{}' of subject '{}' to tool '{}' (attempt {})",
            self.node_id, self.subject, self.tool, self.attempt
        )
    }
}

impl StructuredLog for NodeDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            subject = self.subject,
            node_id = self.node_id,
            tool = self.tool,
            identity = self.identity,
            attempt = self.attempt,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "node",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
            identity = self.identity,
        )
    }
}

/// A node's identity matched a cache entry; its outputs were substituted.
///
/// # Log Level
/// `info!` - Important operational event
pub struct NodeCacheHit<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub identity: &'a str,
}

impl Display for NodeCacheHit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' of subject '{}' skipped: cached result {}",
            self.node_id, self.subject, self.identity
        )
    }
}

impl StructuredLog for NodeCacheHit<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            node_id = self.node_id,
            identity = self.identity,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "node_cache_hit",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
        )
    }
}

/// A node's tool succeeded and its outputs validated.
///
/// # Log Level
/// `info!` - Important operational event
pub struct NodeSucceeded<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub attempts: u32,
    pub duration: Duration,
}

impl Display for NodeSucceeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' of subject '{}' succeeded after {} attempt(s) in {:?}",
            self.node_id, self.subject, self.attempts, self.duration
        )
    }
}

impl StructuredLog for NodeSucceeded<'_> {
    fn log(&self) {
        tracing::info!(
            subject = self.subject,
            node_id = self.node_id,
            attempts = self.attempts,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "node_succeeded",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
        )
    }
}

/// One attempt failed and another will follow after `backoff`.
///
/// # Log Level
/// `warn!` - Recoverable failure
///
/// # Example
/// ```
/// use petflow::errors::NodeError;
/// use petflow::observability::messages::engine::NodeAttemptFailed;
/// use std::time::Duration;
///
/// let error = NodeError::timeout(Duration::from_secs(60));
/// let msg = NodeAttemptFailed {
///     subject: "01",
///     node_id: "pet_hmc.run-1",
///     attempt: 1,
///     max_attempts: 2,
///     backoff: Duration::from_secs(1),
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct NodeAttemptFailed<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub error: &'a dyn std::error::Error,
}

impl Display for NodeAttemptFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' of subject '{}' attempt {}/{} failed, retrying in {:?}: {}",
            self.node_id, self.subject, self.attempt, self.max_attempts, self.backoff, self.error
        )
    }
}

impl StructuredLog for NodeAttemptFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            node_id = self.node_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            backoff_ms = self.backoff.as_millis() as u64,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_attempt_failed",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
            attempt = self.attempt,
        )
    }
}

/// A node exhausted its attempts.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct NodeFailed<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub attempts: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for NodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' of subject '{}' failed after {} attempt(s): {}",
            self.node_id, self.subject, self.attempts, self.error
        )
    }
}

impl StructuredLog for NodeFailed<'_> {
    fn log(&self) {
        tracing::error!(
            subject = self.subject,
            node_id = self.node_id,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "node_failed",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
        )
    }
}

/// A node will not run because a predecessor did not produce its outputs.
///
/// # Log Level
/// `warn!` - Contained failure
pub struct NodeSkippedUpstream<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub upstream: &'a str,
}

impl Display for NodeSkippedUpstream<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' of subject '{}' skipped: upstream node '{}' did not succeed",
            self.node_id, self.subject, self.upstream
        )
    }
}

impl StructuredLog for NodeSkippedUpstream<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            node_id = self.node_id,
            upstream = self.upstream,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_skipped_upstream",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
            upstream = self.upstream,
        )
    }
}

/// A node was stopped or never started because its subject was cancelled.
///
/// # Log Level
/// `warn!` - Operator-requested interruption
pub struct NodeCancelled<'a> {
    pub subject: &'a str,
    pub node_id: &'a str,
    pub in_flight: bool,
}

impl Display for NodeCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.in_flight {
            write!(
                f,
                "Node '{}' of subject '{}' killed after the cancellation grace period",
                self.node_id, self.subject
            )
        } else {
            write!(
                f,
                "Node '{}' of subject '{}' not started: subject cancelled",
                self.node_id, self.subject
            )
        }
    }
}

impl StructuredLog for NodeCancelled<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            node_id = self.node_id,
            in_flight = self.in_flight,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "node_cancelled",
            span_name = name,
            subject = self.subject,
            node_id = self.node_id,
        )
    }
}

/// Cancellation reached a subject's executor; dispatch stops.
///
/// # Log Level
/// `warn!` - Operator-requested interruption
pub struct CancellationObserved<'a> {
    pub subject: &'a str,
    pub in_flight: usize,
    pub grace: Duration,
}

impl Display for CancellationObserved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Subject '{}' cancelled: no new nodes will start; {} in flight get {:?} to finish",
            self.subject, self.in_flight, self.grace
        )
    }
}

impl StructuredLog for CancellationObserved<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            in_flight = self.in_flight,
            grace_ms = self.grace.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "cancellation",
            span_name = name,
            subject = self.subject,
        )
    }
}

/// An execution record could not be appended to the run log.
///
/// # Log Level
/// `warn!` - The record is still reported; only the on-disk copy is missing
pub struct RecordWriteFailed<'a> {
    pub subject: &'a str,
    pub path: &'a Path,
    pub error: &'a dyn std::error::Error,
}

impl Display for RecordWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to append execution record for subject '{}' to {}: {}",
            self.subject,
            self.path.display(),
            self.error
        )
    }
}

impl StructuredLog for RecordWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            subject = self.subject,
            path = %self.path.display(),
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "record_write_failed",
            span_name = name,
            subject = self.subject,
        )
    }
}
