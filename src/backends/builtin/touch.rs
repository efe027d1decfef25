// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::fs;
use std::io;

use super::ensure_parent;
use crate::traits::Invocation;

/// Writes `param.content` (or the node id) into every declared output.
pub(crate) fn touch(invocation: &Invocation) -> io::Result<()> {
    let content = match invocation.params.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => invocation.node_id.clone(),
    };
    for target in invocation.outputs.values() {
        ensure_parent(target)?;
        fs::write(target, &content)?;
    }
    Ok(())
}
