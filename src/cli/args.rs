use clap::Parser;
use crate::config::defs::{DEFAULT_CPUS, DEFAULT_OUT_DIR};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "snippy-core-stage", version, about = "Runs snippy across a sample manifest and guarantees a usable core alignment")]
pub struct Arguments {

    #[arg(short = 'i', long = "input", help = "Tab-separated manifest: sample_id, read_file_1, read_file_2")]
    pub input: String,

    #[arg(short = 'r', long = "ref", help = "Reference sequence shared by all samples")]
    pub reference: String,

    #[arg(short = 'o', long = "outdir", default_value = DEFAULT_OUT_DIR)]
    pub out_dir: String,

    // Kept as a raw string so that `--cpus -1` and `--cpus abc` reach the path resolver.
    #[arg(short = 'c', long = "cpus", default_value = DEFAULT_CPUS, allow_hyphen_values = true)]
    pub cpus: String,

    #[arg(short = 'f', long = "force", action, help = "Overwrite per-sample directories from a previous run")]
    pub force: bool,

    #[arg(short = 'j', long = "jobs", default_value_t = 1, help = "Per-sample commands to run concurrently")]
    pub jobs: usize,

    #[arg(long = "tool-dir", help = "Directory holding the snippy executables, if they are not on PATH")]
    pub tool_dir: Option<String>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}
