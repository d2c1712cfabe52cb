use std::path::PathBuf;
use std::collections::HashMap;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::cli::Arguments;

// External software
pub const SNIPPY_TAG: &str = "snippy";
pub const SNIPPY_MULTI_TAG: &str = "snippy-multi";
pub const SNIPPY_CORE_TAG: &str = "snippy-core";
pub const SHELL_TAG: &str = "bash";

pub const FORCE_FLAG: &str = "--force";

lazy_static! {
    pub static ref TOOL_VERSIONS: HashMap<&'static str, f32> = {
        let mut m = HashMap::new();
        m.insert(SNIPPY_TAG, 4.6);
        m
    };
}

// Static Filenames
pub const RUNNER_SCRIPT: &str = "runme.sh";
pub const CORE_ALN: &str = "core.aln";
pub const CORE_FULL_ALN: &str = "core.full.aln";
pub const SNPS_ALIGNED_FA: &str = "snps.aligned.fa";
pub const SNPS_TAB: &str = "snps.tab";
pub const DONE_MARKER: &str = "snippy_done.txt";
pub const BATCH_LOG: &str = "snippy_batch.log";

// Static Parameters
pub const DEFAULT_OUT_DIR: &str = "snippy";
pub const DEFAULT_CPUS: &str = "4";
pub const UNKNOWN_BASE: u8 = b'N';
pub const PLACEHOLDER_ID: &str = "placeholder";

// Exit codes
pub const EXIT_TOOL_NOT_FOUND: i32 = 1;
pub const EXIT_CONFIGURATION: i32 = 2;

pub const SNIPPY_INSTALL_HINT: &str =
    "Install snippy (e.g. `conda install -c bioconda snippy`) and activate its environment, \
     or pass --tool-dir pointing at the directory holding the snippy executables.";


/// Fatal errors of the stage. Anything not listed here is absorbed by the
/// fallback policy and surfaced as a `PipelineWarning`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Tool not found: {tool}. {hint}")]
    ToolNotFound { tool: String, hint: String },

    #[error("Tool {tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("IO error: {0}")]
    IOError(String),
}

impl PipelineError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Configuration(_) | PipelineError::InvalidManifest { .. } => EXIT_CONFIGURATION,
            PipelineError::ToolNotFound { .. } => EXIT_TOOL_NOT_FOUND,
            PipelineError::ToolExecution { .. } | PipelineError::IOError(_) => 1,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}


/// Non-fatal conditions reported to the operator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineWarning {
    #[error("Sample {sample_id}: {reason}")]
    SampleExecution { sample_id: String, reason: String },

    #[error("Degraded core alignment ({tier}): {reason}")]
    DegradedArtifact { tier: String, reason: String },

    #[error("Batch execution: {0}")]
    Launch(String),
}


/// Absolute paths produced by the path resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    pub manifest: PathBuf,
    pub reference: PathBuf,
    pub out_dir: PathBuf,
    pub cpus: usize,
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub paths: ResolvedPaths,
    pub args: Arguments,
}

impl RunConfig {
    pub fn runner_script(&self) -> PathBuf {
        self.paths.out_dir.join(RUNNER_SCRIPT)
    }
}
