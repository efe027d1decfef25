// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // tool backends
pub mod cache;      // identity-keyed cache + provenance
pub mod config;     // config + rule set + runtime
pub mod dataset;    // dataset readers
pub mod engine;     // DAG executor
pub mod errors;     // error handling
pub mod graph;      // nodes, registry, graph builder
pub mod observability;
pub mod pipeline;   // per-subject driver
pub mod report;     // report aggregation + rendering
pub mod traits;     // unified abstractions
