// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::config::consts::{EXIT_SUBJECT_FAILURES, EXIT_SUCCESS};
use crate::engine::SubjectExecution;
use crate::pipeline::{Outcome, SubjectState};
use crate::report::SubjectReport;

/// `<UTC yyyymmdd-HHMMSS>_<uuid v4>`
pub fn new_run_id() -> String {
    format!("{}_{}", Utc::now().format("%Y%m%d-%H%M%S"), Uuid::new_v4())
}

/// How one subject ended.
#[derive(Debug, Clone)]
pub struct SubjectResult {
    pub subject: String,
    pub state: SubjectState,
    pub outcome: Outcome,
    pub report: SubjectReport,
    /// `None` when the subject never executed
    pub execution: Option<SubjectExecution>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub subjects: BTreeMap<String, SubjectResult>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.subjects
            .values()
            .filter(|r| r.outcome == outcome)
            .count()
    }

    pub fn subject(&self, subject: &str) -> Option<&SubjectResult> {
        self.subjects.get(subject)
    }

    /// 0 when every subject succeeded and the run was not cancelled, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if !self.cancelled && self.subjects.values().all(|r| r.outcome == Outcome::Success) {
            EXIT_SUCCESS
        } else {
            EXIT_SUBJECT_FAILURES
        }
    }
}
