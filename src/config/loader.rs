// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_BACKOFF_MS, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CANCEL_GRACE_SECONDS,
    DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_CONCURRENT_SUBJECTS, DEFAULT_MIN_PET_FRAMES,
    DEFAULT_MODALITIES, DEFAULT_NODE_TIMEOUT_SECONDS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_TOOL_VERSION, DEFAULT_WORK_DIR, FALLBACK_MAX_CONCURRENT_NODES,
};
use crate::config::rule::RuleConfig;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The complete, immutable run configuration.
///
/// Loaded once, validated, then shared as `Arc<Config>` with the graph builder,
/// the execution engine and the cache store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunOptions,
    #[serde(default)]
    pub workflow: WorkflowOptions,
    #[serde(default)]
    pub cache: CacheOptions,
    #[serde(default)]
    pub dataset: DatasetOptions,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyScope {
    /// Each subject gets its own pool of `max_concurrent_nodes`
    #[default]
    PerSubject,
    /// One pool of `max_concurrent_nodes` shared by all subjects
    Global,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_subjects: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_nodes: Option<usize>,
    #[serde(default)]
    pub node_concurrency_scope: ConcurrencyScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub retry: RetryOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_grace_seconds: Option<f64>,
}

impl RunOptions {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR))
    }

    pub fn max_concurrent_subjects(&self) -> usize {
        self.max_concurrent_subjects
            .unwrap_or(DEFAULT_MAX_CONCURRENT_SUBJECTS)
            .max(1)
    }

    pub fn max_concurrent_nodes(&self) -> usize {
        self.max_concurrent_nodes
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(FALLBACK_MAX_CONCURRENT_NODES)
            })
            .max(1)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs_f64(
            self.node_timeout_seconds
                .unwrap_or(DEFAULT_NODE_TIMEOUT_SECONDS as f64),
        )
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs_f64(
            self.cancel_grace_seconds
                .unwrap_or(DEFAULT_CANCEL_GRACE_SECONDS as f64),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Retries after the first attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

impl RetryOptions {
    pub fn get_attempts(&self) -> u32 {
        self.attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS)
    }

    pub fn get_backoff_ms(&self) -> u64 {
        self.backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS)
    }

    pub fn get_backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER)
    }

    pub fn get_max_backoff_ms(&self) -> u64 {
        self.max_backoff_ms.unwrap_or(DEFAULT_MAX_BACKOFF_MS)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOptions {
    /// Subjects to process; empty means every subject in the dataset
    #[serde(default)]
    pub participant_labels: Vec<String>,
    #[serde(default)]
    pub anat_only: bool,
    /// Modalities hidden from the graph builder
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pet_frames: Option<u32>,
    /// Lowers the frame minimum by one for quick test runs
    #[serde(default)]
    pub sloppy: bool,
    /// Precomputed anatomical derivatives, offered to rules as `anat_derivatives`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anat_derivatives: Option<PathBuf>,
    #[serde(default)]
    pub output_spaces: Vec<String>,
    /// Free-form options read by `option:` inputs and `option` requirements
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl WorkflowOptions {
    pub fn min_pet_frames(&self) -> u32 {
        let minimum = self.min_pet_frames.unwrap_or(DEFAULT_MIN_PET_FRAMES);
        if self.sloppy {
            minimum.saturating_sub(1)
        } else {
            minimum
        }
    }

    /// Looks up a named option; built-in flags shadow the free-form map.
    pub fn option(&self, key: &str) -> Option<Value> {
        match key {
            "anat_only" => Some(Value::Bool(self.anat_only)),
            "sloppy" => Some(Value::Bool(self.sloppy)),
            "output_spaces" => Some(Value::from(self.output_spaces.clone())),
            "anat_derivatives" => self
                .anat_derivatives
                .as_ref()
                .map(|p| Value::from(p.display().to_string())),
            _ => self.options.get(key).cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Cache root; defaults to `<work_dir>/cache`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Remove entries whose tool version no longer matches the config at startup
    #[serde(default)]
    pub prune_outdated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Modality names rules may read
    #[serde(default = "default_modalities")]
    pub modalities: Vec<String>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            modalities: default_modalities(),
        }
    }
}

fn default_modalities() -> Vec<String> {
    DEFAULT_MODALITIES.iter().map(|m| m.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default = "default_tool_version")]
    pub version: String,
    #[serde(flatten)]
    pub spec: ToolSpec,
}

/// How a tool runs. The variant decides which backend the tool map builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolSpec {
    /// External program; args are templates (`{in.x}`, `{out.y}`, `{param.z}`, `{work_dir}`)
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// In-process function
    Builtin { function: String },
}

fn default_tool_version() -> String {
    DEFAULT_TOOL_VERSION.to_string()
}

impl Config {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| self.run.work_dir().join("cache"))
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Loads a config, picking the parser from the file extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;

    crate::config::validate_rule_set(&cfg).map_err(ConfigError::Validation)?;

    Ok(cfg)
}
