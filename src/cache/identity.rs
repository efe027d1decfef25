// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Node identity: a blake3 digest over the tool, its version, the parameters,
//! the declared output names and the ordered input fingerprints.
//!
//! File inputs are fingerprinted by content, so an upstream node that re-runs
//! and produces identical bytes leaves its dependents' identities unchanged.
//! Path inputs that name a directory are fingerprinted by walking the tree in
//! sorted order and hashing every relative path with its file content.

use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::traits::InputValue;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityHash(pub [u8; 32]);

impl IdentityHash {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityHash({})", self.short())
    }
}

impl Serialize for IdentityHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        IdentityHash::from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid identity hash '{}'", hex)))
    }
}

/// Content hash of one file, streamed.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Content hash of a file or of a whole directory tree. A missing path keeps
/// its name in the digest so it still differs from an empty directory.
pub fn fingerprint_path(path: &Path) -> io::Result<String> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(format!("missing:{}", path.display()))
        }
        Err(e) => return Err(e),
    };
    if !meta.is_dir() {
        return fingerprint_file(path);
    }

    let mut files = Vec::new();
    collect_files(path, &mut files)?;
    files.sort();

    let mut hasher = Hasher::new();
    for file in files {
        let relative = file.strip_prefix(path).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(fingerprint_file(&file)?.as_bytes());
        hasher.update(&[0]);
    }
    Ok(format!("tree:{}", hasher.finalize().to_hex()))
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn fingerprint(value: &InputValue) -> io::Result<Value> {
    Ok(match value {
        InputValue::File(path) => Value::String(fingerprint_file(path)?),
        InputValue::Files(paths) => Value::Array(
            paths
                .iter()
                .map(|p| fingerprint_file(p).map(Value::String))
                .collect::<io::Result<Vec<_>>>()?,
        ),
        InputValue::Path(path) => Value::String(fingerprint_path(path)?),
        InputValue::Scalar(value) => value.clone(),
    })
}

#[derive(Serialize)]
struct IdentityDocument<'a> {
    tool: &'a str,
    tool_version: &'a str,
    params: &'a BTreeMap<String, Value>,
    outputs: Vec<&'a str>,
    inputs: Vec<(&'a str, Value)>,
}

/// Computes a node identity. Reads every file input, so call it off the async runtime.
pub fn compute_identity<'o>(
    tool: &str,
    tool_version: &str,
    params: &BTreeMap<String, Value>,
    outputs: impl IntoIterator<Item = &'o str>,
    inputs: &BTreeMap<String, InputValue>,
) -> io::Result<IdentityHash> {
    let mut outputs: Vec<&str> = outputs.into_iter().collect();
    outputs.sort_unstable();
    outputs.dedup();
    let inputs = inputs
        .iter()
        .map(|(name, value)| Ok((name.as_str(), fingerprint(value)?)))
        .collect::<io::Result<Vec<_>>>()?;
    let document = IdentityDocument {
        tool,
        tool_version,
        params,
        outputs,
        inputs,
    };
    // serde_json maps are ordered, so the encoding is canonical.
    let bytes = serde_json::to_vec(&document).map_err(io::Error::other)?;
    Ok(IdentityHash(blake3::hash(&bytes).into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const OUT: [&str; 1] = ["out"];

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_identity_is_deterministic_and_content_based() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.nii");
        let b = temp.path().join("b.nii");
        std::fs::write(&a, "same bytes").unwrap();
        std::fs::write(&b, "same bytes").unwrap();

        let p = params(&[("dof", json!(6))]);
        let inputs_a: BTreeMap<_, _> = [("in".to_string(), InputValue::File(a.clone()))].into();
        let inputs_b: BTreeMap<_, _> = [("in".to_string(), InputValue::File(b))].into();

        let first = compute_identity("flirt", "6.0", &p, OUT, &inputs_a).unwrap();
        let again = compute_identity("flirt", "6.0", &p, OUT, &inputs_a).unwrap();
        let moved = compute_identity("flirt", "6.0", &p, OUT, &inputs_b).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, moved, "same content at another path hashes the same");

        std::fs::write(&a, "different bytes").unwrap();
        let changed = compute_identity("flirt", "6.0", &p, OUT, &inputs_a).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn test_identity_components_table_driven() {
        let base_params = params(&[("dof", json!(6))]);
        let scalar: BTreeMap<_, _> = [("dose".to_string(), InputValue::Scalar(json!(185)))].into();
        let base = compute_identity("flirt", "6.0", &base_params, OUT, &scalar).unwrap();

        let test_cases = vec![
            ("tool name", compute_identity("epi_reg", "6.0", &base_params, OUT, &scalar)),
            ("tool version", compute_identity("flirt", "6.1", &base_params, OUT, &scalar)),
            (
                "params",
                compute_identity("flirt", "6.0", &params(&[("dof", json!(12))]), OUT, &scalar),
            ),
            (
                "input value",
                compute_identity(
                    "flirt",
                    "6.0",
                    &base_params,
                    OUT,
                    &[("dose".to_string(), InputValue::Scalar(json!(186)))].into(),
                ),
            ),
            (
                "input name",
                compute_identity(
                    "flirt",
                    "6.0",
                    &base_params,
                    OUT,
                    &[("activity".to_string(), InputValue::Scalar(json!(185)))].into(),
                ),
            ),
            (
                "path input",
                compute_identity(
                    "flirt",
                    "6.0",
                    &base_params,
                    OUT,
                    &[("dose".to_string(), InputValue::Path(PathBuf::from("185")))].into(),
                ),
            ),
            (
                "declared outputs",
                compute_identity("flirt", "6.0", &base_params, ["flag"], &scalar),
            ),
        ];

        for (component, identity) in test_cases {
            assert_ne!(identity.unwrap(), base, "changing {} must change identity", component);
        }
    }

    #[test]
    fn test_output_names_are_order_independent() {
        let p = BTreeMap::new();
        let inputs = BTreeMap::new();
        let ab = compute_identity("split", "1", &p, ["a", "b"], &inputs).unwrap();
        let ba = compute_identity("split", "1", &p, ["b", "a"], &inputs).unwrap();
        let a = compute_identity("split", "1", &p, ["a"], &inputs).unwrap();
        assert_eq!(ab, ba);
        assert_ne!(ab, a);
    }

    #[test]
    fn test_directory_input_is_fingerprinted_by_content() {
        let temp = TempDir::new().unwrap();
        let derivatives = temp.path().join("derivatives");
        std::fs::create_dir_all(derivatives.join("anat")).unwrap();
        std::fs::write(derivatives.join("anat/T1w.nii.gz"), "brain v1").unwrap();
        std::fs::write(derivatives.join("dataset_description.json"), "{}").unwrap();
        let inputs: BTreeMap<_, _> =
            [("anat_derivatives".to_string(), InputValue::Path(derivatives.clone()))].into();
        let identity = || compute_identity("fetch", "1", &BTreeMap::new(), OUT, &inputs).unwrap();

        let first = identity();
        assert_eq!(first, identity());

        std::fs::write(derivatives.join("anat/T1w.nii.gz"), "brain v2").unwrap();
        let rewritten = identity();
        assert_ne!(first, rewritten);

        std::fs::rename(
            derivatives.join("anat/T1w.nii.gz"),
            derivatives.join("anat/T1w_brain.nii.gz"),
        )
        .unwrap();
        assert_ne!(rewritten, identity(), "renaming a file changes the tree");

        let copy = temp.path().join("copy");
        std::fs::create_dir_all(copy.join("anat")).unwrap();
        std::fs::write(copy.join("anat/T1w_brain.nii.gz"), "brain v2").unwrap();
        std::fs::write(copy.join("dataset_description.json"), "{}").unwrap();
        let copied: BTreeMap<_, _> =
            [("anat_derivatives".to_string(), InputValue::Path(copy))].into();
        assert_eq!(
            identity(),
            compute_identity("fetch", "1", &BTreeMap::new(), OUT, &copied).unwrap(),
            "the same tree elsewhere hashes the same"
        );
    }

    #[test]
    fn test_missing_file_input_is_an_error() {
        let inputs: BTreeMap<_, _> =
            [("in".to_string(), InputValue::File(PathBuf::from("/nonexistent/x.nii")))].into();
        assert!(compute_identity("flirt", "6.0", &BTreeMap::new(), OUT, &inputs).is_err());
    }

    #[test]
    fn test_hex_roundtrip_and_serde() {
        let id = compute_identity("t", "1", &BTreeMap::new(), OUT, &BTreeMap::new()).unwrap();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(IdentityHash::from_hex(&hex), Some(id));
        assert_eq!(IdentityHash::from_hex("xyz"), None);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", hex));
        let back: IdentityHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
