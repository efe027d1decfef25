// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for tool invocations.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A tool process is about to be spawned.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
///
/// # Example
/// ```
/// use petflow::observability::messages::tool::ToolInvocationStarted;
///
/// let args = vec!["-in".to_string(), "pet.nii.gz".to_string()];
/// let msg = ToolInvocationStarted {
///     tool: "mcflirt",
///     node_id: "pet_hmc.run-1",
///     program: "mcflirt",
///     args: &args,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct ToolInvocationStarted<'a> {
    pub tool: &'a str,
    pub node_id: &'a str,
    pub program: &'a str,
    pub args: &'a [String],
}

impl Display for ToolInvocationStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invoking tool '{}' for node '{}': {} {}",
            self.tool,
            self.node_id,
            self.program,
            self.args.join(" ")
        )
    }
}

impl StructuredLog for ToolInvocationStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            tool = self.tool,
            node_id = self.node_id,
            program = self.program,
            args = ?self.args,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "tool_invocation",
            span_name = name,
            tool = self.tool,
            node_id = self.node_id,
        )
    }
}

/// A tool returned. A nonzero exit code is reported here and judged by the engine.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ToolInvocationCompleted<'a> {
    pub tool: &'a str,
    pub node_id: &'a str,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl Display for ToolInvocationCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(
                f,
                "Tool '{}' for node '{}' exited with {} after {:?}",
                self.tool, self.node_id, code, self.duration
            ),
            None => write!(
                f,
                "Tool '{}' for node '{}' ended without an exit status after {:?}",
                self.tool, self.node_id, self.duration
            ),
        }
    }
}

impl StructuredLog for ToolInvocationCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            tool = self.tool,
            node_id = self.node_id,
            exit_code = ?self.exit_code,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "tool_invocation_completed",
            span_name = name,
            tool = self.tool,
            node_id = self.node_id,
        )
    }
}

/// The tool could not be started or its function failed before producing an exit status.
///
/// # Log Level
/// `warn!` - The engine decides whether to retry
pub struct ToolInvocationFailed<'a> {
    pub tool: &'a str,
    pub node_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ToolInvocationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Tool '{}' for node '{}' could not run: {}",
            self.tool, self.node_id, self.error
        )
    }
}

impl StructuredLog for ToolInvocationFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            tool = self.tool,
            node_id = self.node_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "tool_invocation_failed",
            span_name = name,
            tool = self.tool,
            node_id = self.node_id,
        )
    }
}
