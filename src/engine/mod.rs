// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution engine: runs one subject's DAG on a bounded node pool.
//!
//! [`WorkQueueExecutor`] consults the cache before every tool run, retries
//! transient failures with backoff, contains failures to their downstream
//! subtree and honours cancellation. Every terminal node state is appended to
//! `<subject>/log/<run_id>/records.jsonl`.

pub mod priority_work_queue;
pub mod record;
pub mod retry;
pub mod work_queue;

pub use record::{ExecutionRecord, RecordLog, RECORDS_FILE};
pub use retry::RetryPolicy;
pub use work_queue::{SubjectExecution, SubjectRun, WorkQueueExecutor};
