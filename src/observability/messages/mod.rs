// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! # Usage Pattern
//!
//! ```rust
//! use petflow::observability::messages::{pipeline::RunStarted, StructuredLog};
//!
//! let msg = RunStarted {
//!     run_id: "20250101-120000_abc",
//!     subject_count: 3,
//!     max_concurrent_subjects: 2,
//! };
//!
//! let span = msg.span("run");
//! let _guard = span.enter();
//! msg.log();
//! ```

use tracing::Span;

pub mod builder;
pub mod cache;
pub mod engine;
pub mod pipeline;
pub mod tool;
pub mod validation;

/// A log event with a fixed level and structured fields.
pub trait StructuredLog {
    /// Emit the event at the message's level.
    fn log(&self);

    /// Span carrying the message's fields, for work done on its behalf.
    fn span(&self, name: &str) -> Span;
}
