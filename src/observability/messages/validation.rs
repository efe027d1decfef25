// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for rule-set validation.
//!
//! This module contains message types for logging events related to:
//! * Validation lifecycle (start, success, failure)
//! * Individual validation errors

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Rule-set validation started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use petflow::observability::messages::validation::ValidationStarted;
///
/// let msg = ValidationStarted {
///     rule_count: 12,
///     tool_count: 8,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ValidationStarted {
    pub rule_count: usize,
    pub tool_count: usize,
}

impl Display for ValidationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Validating rule set: {} rules, {} tools",
            self.rule_count, self.tool_count
        )
    }
}

impl StructuredLog for ValidationStarted {
    fn log(&self) {
        tracing::info!(
            rule_count = self.rule_count,
            tool_count = self.tool_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "validation",
            span_name = name,
            rule_count = self.rule_count,
            tool_count = self.tool_count,
        )
    }
}

/// Rule-set validation completed successfully.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ValidationCompleted {
    pub rule_count: usize,
    pub capability_count: usize,
}

impl Display for ValidationCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rule set is valid: {} rules across {} capabilities",
            self.rule_count, self.capability_count
        )
    }
}

impl StructuredLog for ValidationCompleted {
    fn log(&self) {
        tracing::info!(
            rule_count = self.rule_count,
            capability_count = self.capability_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "validation_completed",
            span_name = name,
            rule_count = self.rule_count,
            capability_count = self.capability_count,
        )
    }
}

/// One validation error. Emitted once per error so none are hidden behind a summary.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use petflow::errors::ValidationError;
/// use petflow::observability::messages::validation::ValidationErrorFound;
///
/// let error = ValidationError::DuplicateRuleId { rule_id: "pet_hmc".into() };
/// let msg = ValidationErrorFound { error: &error };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ValidationErrorFound<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for ValidationErrorFound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Rule set validation error: {}", self.error)
    }
}

impl StructuredLog for ValidationErrorFound<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "validation_error",
            span_name = name,
            error = %self.error,
        )
    }
}

/// Rule-set validation failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ValidationFailed {
    pub error_count: usize,
}

impl Display for ValidationFailed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rule set validation failed with {} error(s); no subject will be processed",
            self.error_count
        )
    }
}

impl StructuredLog for ValidationFailed {
    fn log(&self) {
        tracing::error!(error_count = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "validation_failed",
            span_name = name,
            error_count = self.error_count,
        )
    }
}
