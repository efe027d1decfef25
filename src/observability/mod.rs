// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic and operational log line in petflow comes from a message
//! struct in [`messages`]. Each message implements `Display` for the human text
//! and [`messages::StructuredLog`] to emit the same event with key/value fields,
//! so log text lives in one place and stays consistent across subsystems.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::validation` - Rule-set validation
//! * `messages::builder` - Graph construction and rule selection
//! * `messages::engine` - Node scheduling, retries and terminal states
//! * `messages::tool` - Tool invocations
//! * `messages::cache` - Cache reads, writes, self-healing and invalidation
//! * `messages::pipeline` - Run and subject lifecycle
//!
//! # Usage
//!
//! ```rust
//! use petflow::observability::messages::{engine::NodeSkippedUpstream, StructuredLog};
//!
//! NodeSkippedUpstream {
//!     subject: "01",
//!     node_id: "pet_confounds.run-1",
//!     upstream: "pet_hmc.run-1",
//! }
//! .log();
//! ```

pub mod messages;
