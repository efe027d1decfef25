// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod dependency_graph;
mod loader;
mod rule;
mod runtime;
mod tool_map;
mod validation;

pub mod consts;

pub use dependency_graph::DependencyGraph;
pub use loader::{
    load_and_validate_config, load_config, CacheOptions, ConcurrencyScope, Config,
    DatasetOptions, RetryOptions, RunOptions, ToolConfig, ToolSpec, WorkflowOptions,
};
pub use rule::{
    InputDecl, InputKind, InputSource, OutputDecl, Requirement, ResourceHints, RuleConfig,
};
pub use runtime::{Runtime, RuntimeBuilder};
pub use tool_map::ToolMap;
pub use validation::validate_rule_set;
