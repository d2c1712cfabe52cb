/// Functions and structs for locating external tools, building their arguments
/// and running them as subprocesses.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use tokio::process::Command;

use crate::config::defs::{
    PipelineError, RunConfig, SNIPPY_INSTALL_HINT, SNIPPY_MULTI_TAG, SNIPPY_TAG, TOOL_VERSIONS,
};


/// A single subprocess call: what to run, where, and which files it is expected to leave behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub expected_outputs: Vec<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: &Path) -> Self {
        ToolInvocation {
            program: program.into(),
            args,
            cwd: cwd.to_path_buf(),
            expected_outputs: Vec::new(),
        }
    }

    pub fn expecting(mut self, outputs: Vec<PathBuf>) -> Self {
        self.expected_outputs = outputs;
        self
    }

    pub fn display(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}


/// Structured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRun {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Declared outputs that were actually present once the process exited.
    pub present_outputs: Vec<PathBuf>,
    pub missing_outputs: Vec<PathBuf>,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .lines()
            .map(str::to_string)
            .collect()
    }
}


/// Narrow seam between the stage and the outside world. The production implementation
/// spawns real processes; tests substitute canned results.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    /// Resolves a tool name to an executable path.
    fn locate(&self, tool: &str) -> Result<PathBuf, PipelineError>;

    /// Runs the invocation to completion. Errors only when the process could not be launched;
    /// a non-zero exit is reported through `ToolRun::exit_code`.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolRun, PipelineError>;
}


/// Runs tools as child processes, looking them up on `PATH` or in an explicit directory.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    pub tool_dir: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new(tool_dir: Option<PathBuf>) -> Self {
        SystemRunner { tool_dir }
    }

    /// `PATH` for children, with `tool_dir` first so that commands inside generated
    /// scripts resolve to the same install.
    fn child_path(&self) -> Option<OsString> {
        let tool_dir = self.tool_dir.as_ref()?;
        let mut dirs = vec![tool_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(dirs).ok()
    }
}

impl ToolRunner for SystemRunner {
    fn locate(&self, tool: &str) -> Result<PathBuf, PipelineError> {
        let not_found = || PipelineError::ToolNotFound {
            tool: tool.to_string(),
            hint: SNIPPY_INSTALL_HINT.to_string(),
        };
        match &self.tool_dir {
            Some(dir) => {
                let candidate = dir.join(tool);
                if candidate.is_file() {
                    Ok(candidate)
                } else {
                    Err(not_found())
                }
            }
            None => which::which(tool).map_err(|_| not_found()),
        }
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolRun, PipelineError> {
        debug!("Running {} in {:?}", invocation.display(), invocation.cwd);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = self.child_path() {
            cmd.env("PATH", path);
        }

        let output = cmd.output().await.map_err(|e| PipelineError::ToolExecution {
            tool: invocation.program.display().to_string(),
            error: format!("failed to launch: {}", e),
        })?;

        let (present_outputs, missing_outputs): (Vec<PathBuf>, Vec<PathBuf>) = invocation
            .expected_outputs
            .iter()
            .cloned()
            .partition(|p| p.exists());

        Ok(ToolRun {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            present_outputs,
            missing_outputs,
        })
    }
}


pub mod snippy {
    use super::{ToolInvocation, ToolRunner};
    use crate::config::defs::{PipelineError, SNIPPY_TAG};

    /// Queries `snippy --version` and returns the version string (e.g. `4.6.0`).
    pub async fn snippy_presence_check<R: ToolRunner>(runner: &R) -> Result<String, PipelineError> {
        let program = runner.locate(SNIPPY_TAG)?;
        let cwd = std::env::temp_dir();
        let run = runner
            .run(&ToolInvocation::new(program, vec!["--version".to_string()], &cwd))
            .await?;

        // snippy prints its version to stderr on some releases, stdout on others.
        let mut text = String::from_utf8_lossy(&run.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&run.stderr));
        let first_line = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| PipelineError::ToolExecution {
                tool: SNIPPY_TAG.to_string(),
                error: "No output from snippy --version".to_string(),
            })?;
        let version = first_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| PipelineError::ToolExecution {
                tool: SNIPPY_TAG.to_string(),
                error: format!("Invalid snippy --version output: {}", first_line),
            })?;
        Ok(version.to_string())
    }
}


mod snippy_multi {
    use crate::config::defs::RunConfig;

    pub fn arg_generator(config: &RunConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(config.paths.manifest.to_string_lossy().to_string());
        args_vec.push("--ref".to_string());
        args_vec.push(config.paths.reference.to_string_lossy().to_string());
        args_vec.push("--cpus".to_string());
        args_vec.push(config.paths.cpus.to_string());
        args_vec
    }
}


pub fn generate_cli(tool: &str, config: &RunConfig) -> Result<Vec<String>, PipelineError> {
    let cmd = match tool {
        SNIPPY_MULTI_TAG => snippy_multi::arg_generator(config),
        _ => {
            return Err(PipelineError::ToolExecution {
                tool: tool.to_string(),
                error: "Unknown tool".to_string(),
            })
        }
    };
    Ok(cmd)
}


/// Parses the `major.minor` prefix of a version string.
pub fn version_number(version: &str) -> Option<f32> {
    let mut parts = version.trim_start_matches('v').split('.');
    let major = parts.next()?;
    let minor = parts.next().unwrap_or("0");
    format!("{}.{}", major, minor).parse::<f32>().ok()
}


/// Checks the installed version of `tool` and warns when it is older than the tested one.
/// A version that cannot be determined is logged but not fatal.
pub async fn check_version<R: ToolRunner>(runner: &R, tool: &str) -> Result<Option<String>, PipelineError> {
    let version = match tool {
        SNIPPY_TAG => snippy::snippy_presence_check(runner).await,
        _ => {
            return Err(PipelineError::ToolExecution {
                tool: tool.to_string(),
                error: "Unknown tool".to_string(),
            })
        }
    };

    match version {
        Ok(v) => {
            if let (Some(found), Some(min)) = (version_number(&v), TOOL_VERSIONS.get(tool)) {
                if found < *min {
                    warn!("{} version {} is older than the tested version {}", tool, v, min);
                }
            }
            Ok(Some(v))
        }
        Err(e @ PipelineError::ToolNotFound { .. }) => Err(e),
        Err(e) => {
            warn!("Could not determine {} version: {}", tool, e);
            Ok(None)
        }
    }
}


/// Confirms every tool the stage shells out to can be found. Fails on the first missing one.
pub fn check_tools<R: ToolRunner>(runner: &R, tools: &[&str]) -> Result<Vec<PathBuf>, PipelineError> {
    tools.iter().map(|tool| runner.locate(tool)).collect()
}
