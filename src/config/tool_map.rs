// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::builtin::BuiltinToolFactory;
use crate::backends::command::CommandTool;
use crate::config::{Config, ToolSpec};
use crate::errors::ToolMapError;
use crate::traits::Tool;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool name -> ready-to-invoke tool.
#[derive(Clone, Default)]
pub struct ToolMap(pub HashMap<String, Arc<dyn Tool>>);

impl ToolMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Builds every configured tool, dispatching on the tool kind.
    pub fn from_config(cfg: &Config) -> Result<Self, ToolMapError> {
        let mut tools = HashMap::new();

        for t in &cfg.tools {
            let tool: Arc<dyn Tool> = match &t.spec {
                ToolSpec::Command { program, args, env } => {
                    if program.trim().is_empty() {
                        return Err(ToolMapError::EmptyProgram {
                            tool: t.name.clone(),
                        });
                    }
                    Arc::new(CommandTool::new(
                        t.name.clone(),
                        t.version.clone(),
                        program.clone(),
                        args.clone(),
                        env.clone(),
                    ))
                }
                ToolSpec::Builtin { function } => {
                    BuiltinToolFactory::create_tool(&t.name, &t.version, function)?
                }
            };

            tools.insert(t.name.clone(), tool);
        }

        Ok(Self(tools))
    }

    pub fn insert(&mut self, name: String, tool: Arc<dyn Tool>) {
        self.0.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tool name -> version, used to prune outdated cache entries.
    pub fn versions(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(name, tool)| (name.clone(), tool.version().to_string()))
            .collect()
    }
}

impl std::fmt::Debug for ToolMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.0.keys().collect();
        names.sort();
        f.debug_struct("ToolMap")
            .field("tool_count", &self.0.len())
            .field("tool_names", &names)
            .finish()
    }
}

impl From<HashMap<String, Arc<dyn Tool>>> for ToolMap {
    fn from(map: HashMap<String, Arc<dyn Tool>>) -> Self {
        Self(map)
    }
}
