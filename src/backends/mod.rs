// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tool backends for petflow.
//!
//! Every processing step runs through the [`crate::traits::Tool`] trait, so the
//! engine treats a subprocess and an in-process function the same way: one
//! `invoke` call returning an exit status, stdout, stderr and output paths.
//!
//! # Available Backends
//!
//! ## Command Backend
//! External programs (FSL, FreeSurfer, PETPVC, shell scripts):
//! - **Templated arguments**: `{in.*}`, `{out.*}`, `{param.*}`, `{work_dir}`
//! - **Process control**: piped output, killed when the invocation is dropped
//! - **Use Case**: Every real imaging step
//!
//! ## Builtin Backend
//! In-process bookkeeping functions (`copy`, `concatenate`, `summarize`, `touch`):
//! - **Execution**: Runs on the blocking thread pool
//! - **Use Case**: Staging files, merging sidecars, demos and tests
//!
//! ## Stub Backend (Test-Only)
//! Tools with observable behavior for engine tests (only available in test builds):
//! - **StubTool**: Writes outputs, counts calls, tracks peak concurrency, optional delay
//! - **FailingTool**: Fails always or for the first N calls
//! - **Gauge**: In-flight counter shared by several stubs to measure combined concurrency
//! - **NoOutputTool**: Succeeds without writing outputs
//!
//! # Architecture
//!
//! ```text
//! Configuration (tools:) → ToolMap::from_config → Arc<dyn Tool> → Engine
//! ```
//!
//! # Examples
//!
//! ```rust
//! use petflow::backends::builtin::BuiltinToolFactory;
//! use petflow::traits::{Tool, ToolKind};
//!
//! let tool = BuiltinToolFactory::create_tool("stage_t1w", "1.0", "copy")?;
//! assert_eq!(tool.kind(), ToolKind::Builtin);
//! # Ok::<(), petflow::errors::ToolMapError>(())
//! ```

pub mod builtin;
pub mod command;
#[cfg(test)]
pub mod stub;
