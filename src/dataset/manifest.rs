// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::SubjectData;
use crate::errors::DatasetError;
use crate::traits::DatasetReader;

#[derive(Debug, Deserialize)]
struct Manifest {
    subjects: Vec<SubjectData>,
}

/// Dataset described by a YAML manifest:
///
/// ```yaml
/// subjects:
///   - subject_id: "01"
///     metadata: { Manufacturer: Siemens }
///     scans:
///       t1w: [{ path: sub-01/anat/sub-01_T1w.nii.gz }]
///       pet: [{ path: sub-01/pet/sub-01_pet.nii.gz, metadata: { frame_count: 24 } }]
/// ```
///
/// Relative paths are resolved against the manifest's directory.
#[derive(Debug, Clone, Default)]
pub struct ManifestDataset {
    subjects: Vec<SubjectData>,
}

impl ManifestDataset {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_yaml::from_str(&content).map_err(|e| DatasetError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut subjects = manifest.subjects;
        for subject in &mut subjects {
            for files in subject.scans.values_mut() {
                for file in files.iter_mut() {
                    if file.path.is_relative() {
                        file.path = base.join(&file.path);
                    }
                }
            }
        }
        Ok(Self::from_subjects(subjects))
    }

    pub fn from_subjects(mut subjects: Vec<SubjectData>) -> Self {
        for subject in &mut subjects {
            subject.normalize();
        }
        subjects.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        Self { subjects }
    }
}

impl DatasetReader for ManifestDataset {
    fn subjects(&self) -> Result<Vec<String>, DatasetError> {
        Ok(self.subjects.iter().map(|s| s.subject_id.clone()).collect())
    }

    fn subject(&self, subject_id: &str) -> Result<SubjectData, DatasetError> {
        self.subjects
            .iter()
            .find(|s| s.subject_id == subject_id)
            .cloned()
            .ok_or_else(|| DatasetError::SubjectNotFound(subject_id.to_string()))
    }
}
