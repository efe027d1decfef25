// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Requirement evaluation.

use serde_json::Value;

use crate::config::{Requirement, WorkflowOptions};
use crate::dataset::{ScanFile, SubjectData};

/// What a requirement is checked against: the subject, and for per-file
/// rules the file being considered.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub subject: &'a SubjectData,
    pub item: Option<&'a ScanFile>,
    pub workflow: &'a WorkflowOptions,
}

impl<'a> Scope<'a> {
    /// File metadata shadows subject metadata.
    pub fn metadata(&self, key: &str) -> Option<&'a Value> {
        self.item
            .and_then(|item| item.metadata.get(key))
            .or_else(|| self.subject.metadata_value(key))
    }
}

/// Requirements that depend on the file being considered.
pub(crate) fn is_per_file(requirement: &Requirement) -> bool {
    matches!(
        requirement,
        Requirement::Metadata { .. } | Requirement::MinFrames
    )
}

/// `Err` carries a human-readable reason.
pub(crate) fn check(requirement: &Requirement, scope: &Scope<'_>) -> Result<(), String> {
    match requirement {
        Requirement::HasModality(modality) => {
            if scope.subject.has_modality(modality) {
                Ok(())
            } else {
                Err(format!("missing modality '{}'", modality))
            }
        }
        Requirement::LacksModality(modality) => {
            if scope.subject.has_modality(modality) {
                Err(format!("modality '{}' is present", modality))
            } else {
                Ok(())
            }
        }
        Requirement::Metadata {
            key,
            equals,
            min,
            max,
        } => {
            let value = scope
                .metadata(key)
                .ok_or_else(|| format!("metadata '{}' is missing", key))?;
            if let Some(expected) = equals {
                if !values_equal(value, expected) {
                    return Err(format!("metadata '{}' is {}, not {}", key, value, expected));
                }
            }
            if min.is_some() || max.is_some() {
                let number = value
                    .as_f64()
                    .ok_or_else(|| format!("metadata '{}' is not numeric", key))?;
                if let Some(min) = min {
                    if number < *min {
                        return Err(format!("metadata '{}' is {} (< {})", key, number, min));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        return Err(format!("metadata '{}' is {} (> {})", key, number, max));
                    }
                }
            }
            Ok(())
        }
        Requirement::WorkflowOption { key, equals } => {
            let value = scope.workflow.option(key).unwrap_or(Value::Null);
            if values_equal(&value, equals) {
                Ok(())
            } else {
                Err(format!("option '{}' is {}, not {}", key, value, equals))
            }
        }
        Requirement::MinFrames => {
            let minimum = u64::from(scope.workflow.min_pet_frames());
            match scope.metadata(crate::dataset::FRAME_COUNT_KEY).and_then(Value::as_u64) {
                Some(frames) if frames >= minimum => Ok(()),
                Some(frames) => Err(format!(
                    "too short PET series ({} frames, need at least {})",
                    frames, minimum
                )),
                None => Err("frame count is unknown".to_string()),
            }
        }
    }
}

/// Numbers compare by value so `1` matches `1.0`.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}
