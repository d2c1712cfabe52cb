// src/utils/script.rs: The snippy runner script and the force-overwrite rewrite

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defs::{FORCE_FLAG, SNIPPY_TAG};
use crate::utils::file::make_executable;


/// Ordered list of shell commands produced by `snippy-multi`, as persisted on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerScript {
    pub path: PathBuf,
    pub commands: Vec<String>,
}

impl RunnerScript {
    pub fn new(path: PathBuf, lines: Vec<String>) -> Self {
        let commands = lines
            .into_iter()
            .map(|l| l.trim_end().to_string())
            .filter(|l| !l.trim().is_empty())
            .collect();
        RunnerScript { path, commands }
    }

    /// Per-sample `snippy` calls, in script order.
    pub fn sample_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(String::as_str)
            .filter(|c| is_sample_command(c))
            .collect()
    }

    /// Everything after the per-sample calls that must run once they are all done
    /// (normally the `snippy-core` merge).
    pub fn merge_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(String::as_str)
            .filter(|c| !is_sample_command(c) && !c.trim_start().starts_with('#'))
            .collect()
    }

    /// Rewrites every per-sample command to carry `--force`. Plain string substitution
    /// on the command text; the merge command is left alone.
    pub fn with_force(mut self) -> Self {
        self.commands = self.commands.into_iter().map(|c| force_command(&c)).collect();
        self
    }

    /// Writes the script with a shebang and marks it executable.
    pub fn persist(&self) -> std::io::Result<()> {
        let mut body = String::from("#!/usr/bin/env bash\n");
        for cmd in self.commands.iter().filter(|c| !c.starts_with("#!")) {
            body.push_str(cmd);
            body.push('\n');
        }
        fs::write(&self.path, body)?;
        make_executable(&self.path)
    }

    /// Reads a previously persisted script back.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let lines = content
            .lines()
            .filter(|l| !l.starts_with("#!"))
            .map(str::to_string)
            .collect();
        Ok(RunnerScript::new(path.to_path_buf(), lines))
    }
}


fn is_sample_command(cmd: &str) -> bool {
    let mut tokens = cmd.split_whitespace();
    tokens.next() == Some(SNIPPY_TAG)
}


/// Value of `--outdir` in a per-sample command, which snippy-multi sets to the sample_id.
pub fn command_sample_id(cmd: &str) -> Option<String> {
    let mut tokens = cmd.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "--outdir" {
            return tokens.next().map(|t| t.trim_matches(|c| c == '\'' || c == '"').to_string());
        }
        if let Some(value) = token.strip_prefix("--outdir=") {
            return Some(value.trim_matches(|c| c == '\'' || c == '"').to_string());
        }
    }
    None
}


fn force_command(cmd: &str) -> String {
    if !is_sample_command(cmd) || cmd.split_whitespace().any(|t| t == FORCE_FLAG) {
        return cmd.to_string();
    }
    let trimmed = cmd.trim_start();
    let indent = &cmd[..cmd.len() - trimmed.len()];
    format!("{}{} {}{}", indent, SNIPPY_TAG, FORCE_FLAG, &trimmed[SNIPPY_TAG.len()..])
}
