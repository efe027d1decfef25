// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Node-level failures. These never unwind: they end up in a node's
//! terminal state and its execution record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Lines of stderr kept in an error message.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorKind {
    /// The tool exited nonzero or could not be started.
    Invocation,
    /// The tool exceeded its hard timeout and was killed.
    Timeout,
    /// The tool exited zero but a declared output is missing or empty.
    OutputValidation,
    /// The engine could not run the node (hashing, task failure).
    Internal,
    /// Subject cancellation stopped the node.
    Cancelled,
}

impl fmt::Display for NodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeErrorKind::Invocation => "invocation error",
            NodeErrorKind::Timeout => "timeout",
            NodeErrorKind::OutputValidation => "output validation error",
            NodeErrorKind::Internal => "internal error",
            NodeErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct NodeError {
    pub kind: NodeErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invocation(exit_code: Option<i32>, stderr: &str) -> Self {
        let status = match exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated without an exit status".to_string(),
        };
        let tail = stderr_tail(stderr);
        let message = if tail.is_empty() {
            status
        } else {
            format!("{}; stderr: {}", status, tail)
        };
        Self::new(NodeErrorKind::Invocation, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            NodeErrorKind::Timeout,
            format!("exceeded timeout of {}s and was killed", after.as_secs_f64()),
        )
    }

    pub fn missing_output(name: &str, path: &Path) -> Self {
        Self::new(
            NodeErrorKind::OutputValidation,
            format!("declared output '{}' is missing at {}", name, path.display()),
        )
    }

    pub fn empty_output(name: &str, path: &Path) -> Self {
        Self::new(
            NodeErrorKind::OutputValidation,
            format!("declared output '{}' is empty at {}", name, path.display()),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(NodeErrorKind::Internal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(NodeErrorKind::Cancelled, message)
    }

    /// Invocation, timeout and output validation failures go through the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            NodeErrorKind::Invocation | NodeErrorKind::Timeout | NodeErrorKind::OutputValidation
        )
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_error_keeps_stderr_tail() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let error = NodeError::invocation(Some(1), &stderr);

        assert_eq!(error.kind, NodeErrorKind::Invocation);
        assert!(error.message.starts_with("exited with status 1"));
        assert!(error.message.contains("line 29"));
        assert!(!error.message.contains("line 9\n"));
    }

    #[test]
    fn test_retryable_kinds() {
        let test_cases = vec![
            (NodeError::invocation(Some(2), ""), true),
            (NodeError::timeout(Duration::from_secs(1)), true),
            (NodeError::missing_output("out", Path::new("/x")), true),
            (NodeError::internal("join failed"), false),
            (NodeError::cancelled("subject cancelled"), false),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.is_retryable(), expected, "{}", error);
        }
    }

    #[test]
    fn test_timeout_message_names_cause() {
        let error = NodeError::timeout(Duration::from_secs(2));
        assert_eq!(error.to_string(), "timeout: exceeded timeout of 2s and was killed");
    }
}
