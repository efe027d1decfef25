// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::{Config, ToolMap};
use crate::errors::PipelineError;
use crate::graph::CapabilityRegistry;
use crate::traits::Tool;

/// Everything a run shares, built once from a validated configuration.
///
/// Each part is handed out as an `Arc`, so the graph builder, the engine and
/// every subject task see the same immutable config, registry, tools and cache.
#[derive(Clone)]
pub struct Runtime {
    pub config: Arc<Config>,
    pub registry: Arc<CapabilityRegistry>,
    pub tools: Arc<ToolMap>,
    pub cache: Arc<CacheStore>,
}

impl Runtime {
    /// Replaces the implementation behind a configured tool name.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        Arc::make_mut(&mut self.tools).insert(tool.name().to_string(), tool);
        self
    }
}

/// Runtime builder - validates the rule set and assembles the shared parts.
///
/// # Examples
///
/// ```
/// use petflow::config::{Config, RuntimeBuilder};
///
/// let mut config = Config::default();
/// config.run.work_dir = Some(std::env::temp_dir().join("petflow-doc"));
///
/// let runtime = RuntimeBuilder::from_config(config).unwrap();
/// assert!(runtime.registry.is_empty());
/// assert!(runtime.tools.is_empty());
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the runtime from configuration.
    ///
    /// Creates and returns a [`Runtime`] holding:
    /// - `CapabilityRegistry`: rules grouped by capability, priority-sorted
    /// - `ToolMap`: one backend per configured tool
    /// - `CacheStore`: opened at `cache.dir`, default `<work_dir>/cache`
    pub fn from_config(config: Config) -> Result<Runtime, PipelineError> {
        let registry = CapabilityRegistry::from_config(&config)?;
        let tools = ToolMap::from_config(&config).map_err(crate::errors::ConfigError::from)?;
        let cache = CacheStore::open(config.cache_dir())?;
        Ok(Runtime {
            config: Arc::new(config),
            registry: Arc::new(registry),
            tools: Arc::new(tools),
            cache: Arc::new(cache),
        })
    }
}
