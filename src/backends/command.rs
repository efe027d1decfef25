// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! External command tools.
//!
//! Arguments are templates rendered per invocation:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{in.<name>}` | bound input; a file list expands to one argument per file |
//! | `{out.<name>}` | path the tool must write for a declared output |
//! | `{param.<name>}` | node parameter (strings unquoted, other JSON verbatim) |
//! | `{work_dir}` | the node's output directory, also the process working directory |
//!
//! An argument that references an unbound input is dropped, so optional inputs
//! can be passed as `{in.mask}` without special casing. Braces that do not
//! match a placeholder prefix are left alone.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::observability::messages::tool::{
    ToolInvocationCompleted, ToolInvocationFailed, ToolInvocationStarted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{InputValue, Invocation, Tool, ToolKind, ToolOutcome};

#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    version: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

/// Rendering failed: the template names something the invocation does not have.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("argument template '{template}' references unknown {placeholder}")]
pub struct TemplateError {
    pub template: String,
    pub placeholder: String,
}

impl CommandTool {
    pub fn new(
        name: String,
        version: String,
        program: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            version,
            program,
            args,
            env,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Renders every argument template against one invocation.
    pub fn render_args(&self, invocation: &Invocation) -> Result<Vec<String>, TemplateError> {
        let mut rendered = Vec::with_capacity(self.args.len());
        for template in &self.args {
            // A lone input placeholder keeps file lists as separate arguments.
            if let Some(name) = whole_input_placeholder(template) {
                if let Some(value) = invocation.inputs.get(name) {
                    rendered.extend(value.to_args());
                }
                continue;
            }
            if let Some(arg) = render_template(template, invocation)? {
                rendered.push(arg);
            }
        }
        Ok(rendered)
    }
}

fn whole_input_placeholder(template: &str) -> Option<&str> {
    template
        .strip_prefix("{in.")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.contains(['{', '}']))
}

/// `Ok(None)` when the template references an unbound input.
fn render_template(template: &str, invocation: &Invocation) -> Result<Option<String>, TemplateError> {
    let unknown = |placeholder: &str| TemplateError {
        template: template.to_string(),
        placeholder: placeholder.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(Some(out));
        };
        let key = &after[..end];

        if key == "work_dir" {
            out.push_str(&invocation.work_dir.display().to_string());
        } else if let Some(name) = key.strip_prefix("in.") {
            match invocation.inputs.get(name) {
                Some(value) => out.push_str(&value.to_args().join(" ")),
                None => return Ok(None),
            }
        } else if let Some(name) = key.strip_prefix("out.") {
            let path = invocation
                .outputs
                .get(name)
                .ok_or_else(|| unknown(&format!("output '{}'", name)))?;
            out.push_str(&path.display().to_string());
        } else if let Some(name) = key.strip_prefix("param.") {
            let value = invocation
                .params
                .get(name)
                .ok_or_else(|| unknown(&format!("parameter '{}'", name)))?;
            out.push_str(&InputValue::Scalar(value.clone()).to_args().join(" "));
        } else {
            out.push('{');
            out.push_str(key);
            out.push('}');
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Some(out))
}

/// Drains a pipe to EOF. Bytes are decoded lossily so a tool printing non-UTF-8
/// never sees its pipe closed early.
fn collect_output<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return String::new();
        };
        let mut bytes = Vec::new();
        if let Err(e) = stream.read_to_end(&mut bytes).await {
            bytes.extend_from_slice(format!("\n<stream read failed: {}>", e).as_bytes());
        }
        String::from_utf8_lossy(&bytes)
            .trim_end_matches(['\n', '\r'])
            .to_string()
    })
}

#[async_trait]
impl Tool for CommandTool {
    async fn invoke(&self, invocation: Invocation) -> ToolOutcome {
        let args = match self.render_args(&invocation) {
            Ok(args) => args,
            Err(e) => {
                ToolInvocationFailed {
                    tool: &self.name,
                    node_id: &invocation.node_id,
                    error: &e,
                }
                .log();
                return ToolOutcome::failure(None, e.to_string());
            }
        };

        ToolInvocationStarted {
            tool: &self.name,
            node_id: &invocation.node_id,
            program: &self.program,
            args: &args,
        }
        .log();

        let started = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .current_dir(&invocation.work_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the invocation (timeout, cancellation) kills the process.
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                ToolInvocationFailed {
                    tool: &self.name,
                    node_id: &invocation.node_id,
                    error: &e,
                }
                .log();
                return ToolOutcome::failure(
                    None,
                    format!("failed to spawn '{}': {}", self.program, e),
                );
            }
        };

        let stdout_handle = collect_output(child.stdout.take());
        let stderr_handle = collect_output(child.stderr.take());

        let status = child.wait().await;
        let stdout = stdout_handle.await.unwrap_or_default();
        let mut stderr = stderr_handle.await.unwrap_or_default();

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                stderr.push_str(&format!("\nfailed to wait for '{}': {}", self.program, e));
                None
            }
        };

        ToolInvocationCompleted {
            tool: &self.name,
            node_id: &invocation.node_id,
            exit_code,
            duration: started.elapsed(),
        }
        .log();

        ToolOutcome {
            exit_code,
            outputs: invocation.outputs,
            stdout,
            stderr,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandTool {
        CommandTool::new(
            "sh".into(),
            "1".into(),
            "sh".into(),
            vec!["-c".into(), script.into()],
            BTreeMap::new(),
        )
    }

    fn invocation(work_dir: PathBuf) -> Invocation {
        let mut inputs = BTreeMap::new();
        inputs.insert("pet".to_string(), InputValue::File(PathBuf::from("/d/pet.nii.gz")));
        inputs.insert(
            "t1w".to_string(),
            InputValue::Files(vec![PathBuf::from("/d/a.nii"), PathBuf::from("/d/b.nii")]),
        );
        inputs.insert("dose".to_string(), InputValue::Scalar(json!(185.0)));

        let mut params = BTreeMap::new();
        params.insert("dof".to_string(), json!(6));
        params.insert("cost".to_string(), json!("mutualinfo"));

        let mut outputs = BTreeMap::new();
        outputs.insert("xfm".to_string(), work_dir.join("xfm.mat"));

        Invocation {
            node_id: "pet_coreg".into(),
            params,
            inputs,
            outputs,
            work_dir,
        }
    }

    #[test]
    fn test_render_args_table_driven() {
        let work_dir = PathBuf::from("/work/nodes/pet_coreg");
        let inv = invocation(work_dir.clone());

        let test_cases: Vec<(&str, Vec<&str>, Result<Vec<String>, ()>)> = vec![
            ("single input", vec!["-in", "{in.pet}"], Ok(vec!["-in".into(), "/d/pet.nii.gz".into()])),
            (
                "file list expands",
                vec!["{in.t1w}"],
                Ok(vec!["/d/a.nii".into(), "/d/b.nii".into()]),
            ),
            ("inline param", vec!["-dof={param.dof}"], Ok(vec!["-dof=6".into()])),
            ("string param unquoted", vec!["{param.cost}"], Ok(vec!["mutualinfo".into()])),
            ("scalar input", vec!["{in.dose}"], Ok(vec!["185.0".into()])),
            (
                "output and work dir",
                vec!["-omat", "{out.xfm}", "{work_dir}"],
                Ok(vec![
                    "-omat".into(),
                    "/work/nodes/pet_coreg/xfm.mat".into(),
                    "/work/nodes/pet_coreg".into(),
                ]),
            ),
            ("unbound input dropped", vec!["{in.mask}", "--mask={in.mask}"], Ok(vec![])),
            ("shell braces untouched", vec!["${HOME}"], Ok(vec!["${HOME}".into()])),
            ("unknown param", vec!["{param.nope}"], Err(())),
            ("unknown output", vec!["{out.nope}"], Err(())),
        ];

        for (name, args, expected) in test_cases {
            let tool = CommandTool::new(
                "flirt".into(),
                "6".into(),
                "flirt".into(),
                args.into_iter().map(String::from).collect(),
                BTreeMap::new(),
            );
            let result = tool.render_args(&inv).map_err(|_| ());
            assert_eq!(result, expected, "case: {}", name);
        }
    }

    #[tokio::test]
    async fn test_invoke_captures_exit_code_and_streams() {
        let temp = TempDir::new().unwrap();
        let tool = sh("printf 'hello'; printf 'oops' >&2; exit 3");

        let outcome = tool.invoke(invocation(temp.path().to_path_buf())).await;

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, "hello");
        assert_eq!(outcome.stderr, "oops");
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_invoke_runs_in_work_dir_and_writes_output() {
        let temp = TempDir::new().unwrap();
        let tool = CommandTool::new(
            "writer".into(),
            "1".into(),
            "sh".into(),
            vec!["-c".into(), "printf '%s' \"$1\" > xfm.mat".into(), "sh".into(), "{param.dof}".into()],
            BTreeMap::new(),
        );

        let outcome = tool.invoke(invocation(temp.path().to_path_buf())).await;

        assert!(outcome.is_success(), "stderr: {}", outcome.stderr);
        let written = std::fs::read_to_string(temp.path().join("xfm.mat")).unwrap();
        assert_eq!(written, "6");
        assert_eq!(outcome.outputs["xfm"], temp.path().join("xfm.mat"));
    }

    #[tokio::test]
    async fn test_env_is_passed_to_process() {
        let temp = TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("FSLOUTPUTTYPE".to_string(), "NIFTI_GZ".to_string());
        let tool = CommandTool::new(
            "env".into(),
            "1".into(),
            "sh".into(),
            vec!["-c".into(), "printf '%s' \"$FSLOUTPUTTYPE\"".into()],
            env,
        );

        let outcome = tool.invoke(invocation(temp.path().to_path_buf())).await;
        assert_eq!(outcome.stdout, "NIFTI_GZ");
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_drained_to_completion() {
        let temp = TempDir::new().unwrap();
        let tool = sh(
            "printf '\\377\\n'; i=0; while [ $i -lt 5000 ]; do echo line $i; i=$((i+1)); done; echo 'real error' >&2; exit 0",
        );

        let outcome = tool.invoke(invocation(temp.path().to_path_buf())).await;

        assert_eq!(outcome.exit_code, Some(0), "stderr: {}", outcome.stderr);
        assert!(outcome.stdout.starts_with('\u{FFFD}'));
        assert!(outcome.stdout.ends_with("line 4999"));
        assert_eq!(outcome.stderr, "real error");
    }

    #[tokio::test]
    async fn test_missing_program_reports_no_exit_code() {
        let temp = TempDir::new().unwrap();
        let tool = CommandTool::new(
            "ghost".into(),
            "1".into(),
            "petflow-definitely-not-installed".into(),
            vec![],
            BTreeMap::new(),
        );

        let outcome = tool.invoke(invocation(temp.path().to_path_buf())).await;

        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stderr.contains("failed to spawn"));
    }
}
