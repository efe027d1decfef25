use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Command,
    Builtin,
}

/// A value bound to one declared input of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
    File(PathBuf),
    Files(Vec<PathBuf>),
    Path(PathBuf),
    Scalar(Value),
}

impl InputValue {
    /// Files whose content identifies this input.
    pub fn content_files(&self) -> Vec<&Path> {
        match self {
            InputValue::File(path) => vec![path.as_path()],
            InputValue::Files(paths) => paths.iter().map(PathBuf::as_path).collect(),
            InputValue::Path(_) | InputValue::Scalar(_) => vec![],
        }
    }

    /// Command-line rendering; a file list becomes several arguments.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            InputValue::File(path) | InputValue::Path(path) => vec![path.display().to_string()],
            InputValue::Files(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            InputValue::Scalar(Value::String(s)) => vec![s.clone()],
            InputValue::Scalar(value) => vec![value.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub node_id: String,
    pub params: BTreeMap<String, Value>,
    pub inputs: BTreeMap<String, InputValue>,
    /// Declared output name -> path the tool must write
    pub outputs: BTreeMap<String, PathBuf>,
    /// Empty scratch directory owned by this attempt
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// `None` when the process was killed or never started
    pub exit_code: Option<i32>,
    pub outputs: BTreeMap<String, PathBuf>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutcome {
    pub fn success(outputs: BTreeMap<String, PathBuf>) -> Self {
        Self {
            exit_code: Some(0),
            outputs,
            ..Default::default()
        }
    }

    pub fn failure(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One processing step's executable. Subprocesses and in-process functions
/// look the same to the engine.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn kind(&self) -> ToolKind;
}
