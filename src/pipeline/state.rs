// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-subject lifecycle.
//!
//! ```text
//! Building ──► Ready ──► Executing ──► Reporting ──► Done(success | partial | failed)
//!    │           │
//!    └───────────┴──────────────────────────────────► Done(failed)
//! ```
//!
//! `Building → Done(failed)` is taken on a prerequisite error, `Ready →
//! Done(failed)` when the run is cancelled before the subject starts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::SubjectExecution;
use crate::errors::TransitionError;
use crate::observability::messages::pipeline::SubjectStateChanged;
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
}

impl Outcome {
    /// `success` when every node is non-failing, `failed` when none is, `partial` otherwise.
    pub fn from_execution(execution: &SubjectExecution) -> Self {
        if execution.all_non_failing() {
            Outcome::Success
        } else if execution.any_non_failing() {
            Outcome::Partial
        } else {
            Outcome::Failed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectState {
    Building,
    Ready,
    Executing,
    Reporting,
    Done(Outcome),
}

impl SubjectState {
    pub fn is_done(&self) -> bool {
        matches!(self, SubjectState::Done(_))
    }

    pub fn can_advance(&self, next: SubjectState) -> bool {
        use SubjectState::*;
        matches!(
            (self, next),
            (Building, Ready)
                | (Building, Done(Outcome::Failed))
                | (Ready, Executing)
                | (Ready, Done(Outcome::Failed))
                | (Executing, Reporting)
                | (Reporting, Done(_))
        )
    }

    /// The next state, if the transition is allowed.
    pub fn advance(self, next: SubjectState) -> Result<SubjectState, TransitionError> {
        if self.can_advance(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for SubjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectState::Building => f.write_str("building"),
            SubjectState::Ready => f.write_str("ready"),
            SubjectState::Executing => f.write_str("executing"),
            SubjectState::Reporting => f.write_str("reporting"),
            SubjectState::Done(outcome) => write!(f, "done({})", outcome),
        }
    }
}

/// A subject's current state; every change is logged.
#[derive(Debug)]
pub struct SubjectTracker {
    subject: String,
    state: SubjectState,
}

impl SubjectTracker {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            state: SubjectState::Building,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn state(&self) -> SubjectState {
        self.state
    }

    pub fn advance(&mut self, next: SubjectState) -> Result<(), TransitionError> {
        let previous = self.state;
        self.state = previous.advance(next)?;
        SubjectStateChanged {
            subject: &self.subject,
            from: &previous.to_string(),
            to: &next.to_string(),
        }
        .log();
        Ok(())
    }
}
