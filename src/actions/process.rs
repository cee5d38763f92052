//! Process invocation boundary: argv + environment in, exit status and
//! captured output out.

use std::collections::HashMap;
use std::process::Output;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::stage::{Probe, StageAction, StageError};

async fn run_command(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<Output, StageError> {
    debug!(program, ?args, "spawning");
    Command::new(program)
        .args(args)
        .envs(env)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| StageError::fatal(anyhow!("failed to spawn '{program}': {e}")))
}

fn merged_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// A stage action that runs one external process. Non-zero exit status
/// is an error; classification happens at the stage boundary.
pub struct ProcessAction {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl ProcessAction {
    /// Run `program` with the given arguments.
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
        }
    }

    /// Add an environment variable for the child process.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl StageAction for ProcessAction {
    async fn run(&self) -> Result<String, StageError> {
        let output = run_command(&self.program, &self.args, &self.env).await?;
        let text = merged_output(&output);

        if output.status.success() {
            Ok(text)
        } else {
            Err(StageError::fatal(anyhow!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                text.trim()
            )))
        }
    }
}

/// A probe backed by a process invocation: true iff the command exits 0
/// (and, when `require_stdout` is set, prints something).
///
/// Spawn failures surface as transient errors so a poll loop keeps
/// trying.
pub struct ProcessProbe {
    program: String,
    args: Vec<String>,
    require_stdout: bool,
}

impl ProcessProbe {
    /// Probe true iff the command exits successfully.
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            require_stdout: false,
        }
    }

    /// Additionally require non-empty stdout. Useful for filter-style
    /// commands that exit 0 whether or not they matched.
    pub fn require_stdout(mut self) -> Self {
        self.require_stdout = true;
        self
    }
}

#[async_trait]
impl Probe for ProcessProbe {
    async fn evaluate(&self) -> Result<bool, StageError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StageError::transient(anyhow!("failed to spawn '{}': {e}", self.program)))?;

        if !output.status.success() {
            return Ok(false);
        }
        if self.require_stdout {
            return Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty());
        }
        Ok(true)
    }
}
