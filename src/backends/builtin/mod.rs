// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process tools.
//!
//! Built-ins cover the bookkeeping steps of a workflow (staging a file,
//! merging text sidecars, writing a summary) without spawning a process. Each
//! function runs on the blocking pool and reports failures the same way a
//! command does, as a nonzero exit code with a stderr message.

mod concatenate;
mod copy;
mod factory;
mod summarize;
mod touch;

pub use factory::BuiltinToolFactory;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use crate::traits::{Invocation, Tool, ToolKind, ToolOutcome};

/// Exit code reported when a built-in function returns an error.
pub const BUILTIN_FAILURE_EXIT_CODE: i32 = 1;

pub(crate) type BuiltinFn = fn(&Invocation) -> io::Result<()>;

pub struct BuiltinTool {
    name: String,
    version: String,
    function: &'static str,
    run: BuiltinFn,
}

impl BuiltinTool {
    pub(crate) fn new(name: &str, version: &str, function: &'static str, run: BuiltinFn) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            function,
            run,
        }
    }

    pub fn function(&self) -> &str {
        self.function
    }
}

#[async_trait]
impl Tool for BuiltinTool {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome {
        let run = self.run;
        let outputs = invocation.outputs.clone();
        match tokio::task::spawn_blocking(move || run(&invocation)).await {
            Ok(Ok(())) => ToolOutcome::success(outputs),
            Ok(Err(e)) => ToolOutcome::failure(
                Some(BUILTIN_FAILURE_EXIT_CODE),
                format!("{}: {}", self.function, e),
            ),
            Err(e) => ToolOutcome::failure(None, format!("{} did not complete: {}", self.function, e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}

/// Every file bound to the invocation, in input-name order.
pub(crate) fn file_inputs(invocation: &Invocation) -> Vec<&Path> {
    invocation
        .inputs
        .values()
        .flat_map(|value| value.content_files())
        .collect()
}

pub(crate) fn first_output(invocation: &Invocation) -> io::Result<&PathBuf> {
    invocation.outputs.values().next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("node '{}' declares no outputs", invocation.node_id),
        )
    })
}

pub(crate) fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
