// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The subject capability set and the readers that produce it.
//!
//! The engine never parses imaging data. It asks a [`crate::traits::DatasetReader`]
//! which modalities a subject has, where the files are and what their sidecar
//! metadata says, and builds the graph from that alone.

mod layout;
mod manifest;

pub use layout::LayoutDataset;
pub use manifest::ManifestDataset;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata key holding a PET series' number of frames.
pub const FRAME_COUNT_KEY: &str = "frame_count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFile {
    pub path: PathBuf,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ScanFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.metadata.get(FRAME_COUNT_KEY).and_then(Value::as_u64)
    }

    /// Entities that distinguish this file from its siblings, e.g.
    /// `sub-01_ses-baseline_trc-FDG_pet.nii.gz` -> `ses-baseline_trc-FDG`.
    pub fn run_label(&self, subject_id: &str) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = strip_image_extension(&name);
        let prefix = format!("sub-{}_", subject_id);
        let stem = stem.strip_prefix(prefix.as_str()).unwrap_or(stem);
        let label = match stem.rfind('_') {
            Some(idx) => &stem[..idx],
            None => "",
        };
        if label.is_empty() {
            "run".to_string()
        } else {
            label.to_string()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectData {
    pub subject_id: String,
    /// Modality -> files, sorted by path
    #[serde(default)]
    pub scans: BTreeMap<String, Vec<ScanFile>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl SubjectData {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn with_scan(mut self, modality: &str, scan: ScanFile) -> Self {
        let files = self.scans.entry(modality.to_string()).or_default();
        files.push(scan);
        files.sort_by(|a, b| a.path.cmp(&b.path));
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn has_modality(&self, modality: &str) -> bool {
        self.scans.get(modality).is_some_and(|files| !files.is_empty())
    }

    pub fn files(&self, modality: &str) -> &[ScanFile] {
        self.scans.get(modality).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_path(&self, modality: &str) -> Option<&Path> {
        self.files(modality).first().map(|f| f.path.as_path())
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Copy of this subject with the given modalities hidden.
    pub fn without_modalities(&self, ignore: &[String]) -> SubjectData {
        let mut view = self.clone();
        view.scans.retain(|modality, _| !ignore.contains(modality));
        view
    }

    pub fn modality_counts(&self) -> BTreeMap<String, usize> {
        self.scans
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(modality, files)| (modality.clone(), files.len()))
            .collect()
    }

    pub(crate) fn normalize(&mut self) {
        for files in self.scans.values_mut() {
            files.sort_by(|a, b| a.path.cmp(&b.path));
            for file in files.iter_mut() {
                ensure_frame_count(&mut file.metadata);
            }
        }
    }
}

/// Fills `frame_count` from BIDS PET timing fields when it is not given.
pub(crate) fn ensure_frame_count(metadata: &mut BTreeMap<String, Value>) {
    if metadata.contains_key(FRAME_COUNT_KEY) {
        return;
    }
    let from_array = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|a| a.len() as u64)
    };
    let count = from_array("FrameTimesStart")
        .or_else(|| from_array("FrameDuration"))
        .or_else(|| metadata.get("NumberOfFrames").and_then(Value::as_u64));
    if let Some(count) = count {
        metadata.insert(FRAME_COUNT_KEY.to_string(), Value::from(count));
    }
}

pub(crate) fn sidecar_metadata(object: Map<String, Value>) -> BTreeMap<String, Value> {
    let mut metadata: BTreeMap<String, Value> = object.into_iter().collect();
    ensure_frame_count(&mut metadata);
    metadata
}

pub(crate) fn strip_image_extension(name: &str) -> &str {
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .or_else(|| name.rsplit_once('.').map(|(stem, _)| stem))
        .unwrap_or(name)
}
