// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{json, Map, Value};
use std::fs;
use std::io;

use super::{ensure_parent, first_output};
use crate::traits::{InputValue, Invocation};

/// Writes a JSON document describing the node's params and inputs to the first output.
///
/// Scalars are embedded as-is; file inputs are listed by path.
pub(crate) fn summarize(invocation: &Invocation) -> io::Result<()> {
    let inputs: Map<String, Value> = invocation
        .inputs
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                InputValue::Scalar(v) => v.clone(),
                InputValue::File(p) | InputValue::Path(p) => json!(p.display().to_string()),
                InputValue::Files(paths) => json!(paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()),
            };
            (name.clone(), rendered)
        })
        .collect();

    let summary = json!({
        "node_id": invocation.node_id,
        "params": invocation.params,
        "inputs": inputs,
    });

    let target = first_output(invocation)?;
    ensure_parent(target)?;
    let text = serde_json::to_string_pretty(&summary).map_err(io::Error::other)?;
    fs::write(target, text)
}
