// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod build;
mod cache;
mod config;
mod dataset;
mod execution;
mod pipeline;
mod tool_map;

pub use build::BuildError;
pub use cache::CacheError;
pub use config::{ConfigError, ValidationError};
pub use dataset::DatasetError;
pub use execution::{NodeError, NodeErrorKind};
pub use pipeline::{PipelineError, TransitionError};
pub use tool_map::ToolMapError;
