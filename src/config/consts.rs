// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default root for subject directories and the shared cache
pub const DEFAULT_WORK_DIR: &str = "work";
/// Subjects processed at once when not configured
pub const DEFAULT_MAX_CONCURRENT_SUBJECTS: usize = 1;
/// Fallback node concurrency when available parallelism cannot be queried
pub const FALLBACK_MAX_CONCURRENT_NODES: usize = 4;
/// Hard per-node timeout (6 hours); long PET reconstructions need most of it
pub const DEFAULT_NODE_TIMEOUT_SECONDS: u64 = 6 * 60 * 60;
/// Retries after the first failed attempt
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
/// Delay before the first retry
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;
/// Growth factor between consecutive retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
/// Upper bound for a single retry delay
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
/// How long in-flight nodes may keep running after cancellation
pub const DEFAULT_CANCEL_GRACE_SECONDS: u64 = 10;
/// PET series with fewer frames are skipped
pub const DEFAULT_MIN_PET_FRAMES: u32 = 6;
/// Tool version recorded when a tool does not declare one
pub const DEFAULT_TOOL_VERSION: &str = "unversioned";
/// Builder used by rules that do not name one
pub const DEFAULT_BUILDER: &str = "template";

/// Modalities a dataset reader may report
pub const DEFAULT_MODALITIES: &[&str] = &["t1w", "t2w", "flair", "pet", "anat_derivatives"];

/// Input source prefix for subject or per-file metadata scalars
pub const METADATA_SOURCE_PREFIX: &str = "meta:";
/// Input source prefix for workflow option scalars
pub const OPTION_SOURCE_PREFIX: &str = "option:";

pub const PIPELINE_NAME: &str = "petflow";
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every subject succeeded
pub const EXIT_SUCCESS: i32 = 0;
/// At least one subject finished partial or failed
pub const EXIT_SUBJECT_FAILURES: i32 = 1;
/// Invalid config, rule set or participant selection; nothing executed
pub const EXIT_FATAL_CONFIG: i32 = 2;
/// Usage error or I/O failure outside any subject
pub const EXIT_ENVIRONMENT: i32 = 3;
