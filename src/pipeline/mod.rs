// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runs subjects through Build → Execute → Report.
//!
//! Subjects run in parallel under `run.max_concurrent_subjects`, a bound
//! distinct from the node pool. Each subject walks the [`SubjectState`]
//! machine and ends in `Done(success | partial | failed)`; the run's exit code
//! comes from [`RunSummary::exit_code`].

mod driver;
mod state;
mod summary;
#[cfg(test)]
mod integration_tests;

pub use driver::{
    prune_tool, select_subjects, subject_dir, PipelineDriver, CONFIG_SNAPSHOT_FILE,
    DATASET_DESCRIPTION_FILE,
};
pub use state::{Outcome, SubjectState, SubjectTracker};
pub use summary::{new_run_id, RunSummary, SubjectResult};
