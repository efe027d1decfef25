// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for tool map creation and tool instantiation.

use std::error::Error;
use std::fmt;

/// Errors that can occur during tool map creation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolMapError {
    /// A builtin tool names a function that does not exist
    UnknownBuiltin { tool: String, function: String },

    /// A command tool has an empty program
    EmptyProgram { tool: String },
}

impl fmt::Display for ToolMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolMapError::UnknownBuiltin { tool, function } => {
                write!(
                    f,
                    "Tool '{}' uses builtin function '{}' which does not exist",
                    tool, function
                )
            }
            ToolMapError::EmptyProgram { tool } => {
                write!(f, "Command tool '{}' has an empty program", tool)
            }
        }
    }
}

impl Error for ToolMapError {}
