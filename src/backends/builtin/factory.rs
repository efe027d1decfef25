// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::{concatenate, copy, summarize, touch, BuiltinFn, BuiltinTool};
use crate::errors::ToolMapError;
use crate::traits::Tool;

/// Factory for in-process tools, keyed by function name.
pub struct BuiltinToolFactory;

impl BuiltinToolFactory {
    /// Create a tool from a `kind: builtin` entry.
    ///
    /// - "copy" -> first file input to the first output
    /// - "concatenate" -> every file input, in order, into the first output
    /// - "summarize" -> JSON summary of params and inputs into the first output
    /// - "touch" -> `param.content` (or the node id) into every output
    pub fn create_tool(
        name: &str,
        version: &str,
        function: &str,
    ) -> Result<Arc<dyn Tool>, ToolMapError> {
        let (function, run): (&'static str, BuiltinFn) = match function {
            "copy" => ("copy", copy::copy),
            "concatenate" => ("concatenate", concatenate::concatenate),
            "summarize" => ("summarize", summarize::summarize),
            "touch" => ("touch", touch::touch),
            _ => {
                return Err(ToolMapError::UnknownBuiltin {
                    tool: name.to_string(),
                    function: function.to_string(),
                })
            }
        };
        Ok(Arc::new(BuiltinTool::new(name, version, function, run)))
    }

    pub fn list_available_functions() -> Vec<&'static str> {
        vec!["copy", "concatenate", "summarize", "touch"]
    }

    pub fn is_function_available(function: &str) -> bool {
        Self::list_available_functions().contains(&function)
    }
}
