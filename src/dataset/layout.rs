// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{sidecar_metadata, strip_image_extension, ScanFile, SubjectData};
use crate::errors::DatasetError;
use crate::traits::DatasetReader;

/// Suffix of the file stem -> modality name.
const SUFFIX_MODALITIES: &[(&str, &str)] = &[
    ("T1w", "t1w"),
    ("T2w", "t2w"),
    ("FLAIR", "flair"),
    ("pet", "pet"),
];

const DATATYPE_DIRS: &[&str] = &["anat", "pet"];

/// Minimal reader for a BIDS-like directory tree:
/// `sub-<id>/[ses-<s>/]{anat,pet}/<name>_<suffix>.nii[.gz]` with optional JSON sidecars.
///
/// Full format validation is someone else's job; unrecognised files are ignored.
#[derive(Debug, Clone)]
pub struct LayoutDataset {
    root: PathBuf,
    anat_derivatives: Option<PathBuf>,
}

impl LayoutDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            anat_derivatives: None,
        }
    }

    /// Offers `<dir>/sub-<id>` as modality `anat_derivatives` when it exists.
    pub fn with_anat_derivatives(mut self, dir: Option<PathBuf>) -> Self {
        self.anat_derivatives = dir;
        self
    }

    fn read_dir_sorted(path: &Path) -> Result<Vec<PathBuf>, DatasetError> {
        let entries = fs::read_dir(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn scan_datatype_dir(&self, dir: &Path, subject: &mut SubjectData) -> Result<(), DatasetError> {
        for path in Self::read_dir_sorted(dir)? {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if name.ends_with(".nii") || name.ends_with(".nii.gz") => name,
                _ => continue,
            };
            let stem = strip_image_extension(name);
            let suffix = stem.rsplit('_').next().unwrap_or(stem);
            let Some((_, modality)) = SUFFIX_MODALITIES.iter().find(|(s, _)| *s == suffix) else {
                continue;
            };

            let mut scan = ScanFile::new(&path);
            let sidecar = dir.join(format!("{}.json", stem));
            if sidecar.is_file() {
                scan.metadata = read_sidecar(&sidecar)?;
            }
            subject.scans.entry(modality.to_string()).or_default().push(scan);
        }
        Ok(())
    }
}

fn read_sidecar(path: &Path) -> Result<std::collections::BTreeMap<String, Value>, DatasetError> {
    let content = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(object)) => Ok(sidecar_metadata(object)),
        Ok(_) => Err(DatasetError::Parse {
            path: path.to_path_buf(),
            message: "sidecar is not a JSON object".to_string(),
        }),
        Err(e) => Err(DatasetError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

impl DatasetReader for LayoutDataset {
    fn subjects(&self) -> Result<Vec<String>, DatasetError> {
        let mut subjects: Vec<String> = Self::read_dir_sorted(&self.root)?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("sub-"))
                    .map(str::to_string)
            })
            .collect();
        subjects.sort();
        Ok(subjects)
    }

    fn subject(&self, subject_id: &str) -> Result<SubjectData, DatasetError> {
        let subject_dir = self.root.join(format!("sub-{}", subject_id));
        if !subject_dir.is_dir() {
            return Err(DatasetError::SubjectNotFound(subject_id.to_string()));
        }

        let mut subject = SubjectData::new(subject_id);
        let mut containers = vec![subject_dir.clone()];
        for path in Self::read_dir_sorted(&subject_dir)? {
            let is_session = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("ses-"));
            if is_session && path.is_dir() {
                containers.push(path);
            }
        }

        for container in containers {
            for datatype in DATATYPE_DIRS {
                let dir = container.join(datatype);
                if dir.is_dir() {
                    self.scan_datatype_dir(&dir, &mut subject)?;
                }
            }
        }

        if let Some(derivatives) = &self.anat_derivatives {
            let dir = derivatives.join(format!("sub-{}", subject_id));
            if dir.is_dir() {
                subject
                    .scans
                    .entry("anat_derivatives".to_string())
                    .or_default()
                    .push(ScanFile::new(dir));
            }
        }

        subject.normalize();
        Ok(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_layout_discovers_modalities_and_sidecars() {
        let root = TempDir::new().unwrap();
        let r = root.path();
        touch(&r.join("sub-01/anat/sub-01_T1w.nii.gz"), "t1");
        touch(&r.join("sub-01/anat/sub-01_FLAIR.nii.gz"), "flair");
        touch(&r.join("sub-01/ses-a/pet/sub-01_ses-a_pet.nii.gz"), "pet");
        touch(
            &r.join("sub-01/ses-a/pet/sub-01_ses-a_pet.json"),
            r#"{"FrameTimesStart": [0, 10, 20], "TracerName": "FDG"}"#,
        );
        touch(&r.join("sub-01/anat/notes.txt"), "ignored");
        touch(&r.join("sub-02/anat/sub-02_T1w.nii"), "t1");
        touch(&r.join("README"), "not a subject");

        let dataset = LayoutDataset::new(r);
        assert_eq!(dataset.subjects().unwrap(), vec!["01", "02"]);

        let subject = dataset.subject("01").unwrap();
        assert!(subject.has_modality("t1w"));
        assert!(subject.has_modality("flair"));
        assert_eq!(subject.files("pet").len(), 1);
        assert_eq!(subject.files("pet")[0].frame_count(), Some(3));
        assert_eq!(
            subject.files("pet")[0].metadata.get("TracerName"),
            Some(&Value::from("FDG"))
        );
        assert_eq!(subject.modality_counts().len(), 3);
    }

    #[test]
    fn test_anat_derivatives_are_offered_when_present() {
        let root = TempDir::new().unwrap();
        let derivatives = TempDir::new().unwrap();
        touch(&root.path().join("sub-01/anat/sub-01_T1w.nii.gz"), "t1");
        fs::create_dir_all(derivatives.path().join("sub-01")).unwrap();

        let dataset = LayoutDataset::new(root.path())
            .with_anat_derivatives(Some(derivatives.path().to_path_buf()));
        let subject = dataset.subject("01").unwrap();

        assert!(subject.has_modality("anat_derivatives"));
    }

    #[test]
    fn test_missing_subject() {
        let root = TempDir::new().unwrap();
        let dataset = LayoutDataset::new(root.path());
        assert!(matches!(
            dataset.subject("07"),
            Err(DatasetError::SubjectNotFound(_))
        ));
    }
}
