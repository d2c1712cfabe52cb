// src/pipelines/batch.rs: Runs the generated snippy script

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Semaphore;

use crate::config::defs::{
    PipelineWarning, BATCH_LOG, CORE_FULL_ALN, SHELL_TAG, SNPS_ALIGNED_FA, SNPS_TAB,
};
use crate::utils::command::{ToolInvocation, ToolRun, ToolRunner};
use crate::utils::file::is_nonempty_file;
use crate::utils::manifest::SampleEntry;
use crate::utils::script::{command_sample_id, RunnerScript};


/// What the batch left behind. Exit codes are recorded, never judged here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Aggregate exit code: the script's own status when run serially, otherwise the first
    /// non-zero status among all commands. `None` if nothing reported a status.
    pub exit_code: Option<i32>,
    pub warnings: Vec<PipelineWarning>,
}


/// Executes the runner script inside `out_dir`. Per-sample failures do not stop later
/// samples; a launch failure becomes a warning.
///
/// # Arguments
///
/// * `runner` - Subprocess seam.
/// * `script` - Persisted runner script.
/// * `out_dir` - Working directory for every command.
/// * `jobs` - 1 runs the script as-is; more runs per-sample commands concurrently.
///
/// # Returns
/// BatchOutcome with the aggregate exit code and any launch/exit warnings.
pub async fn execute_batch<R: ToolRunner>(
    runner: &R,
    script: &RunnerScript,
    out_dir: &Path,
    jobs: usize,
) -> BatchOutcome {
    let outcome = if jobs <= 1 {
        run_serial(runner, script, out_dir).await
    } else {
        run_parallel(runner, script, out_dir, jobs).await
    };

    match outcome.exit_code {
        Some(0) => info!("Batch finished cleanly"),
        Some(code) => info!("Batch finished with status {}; checking output tree for evidence", code),
        None => warn!("Batch did not report an exit status"),
    }
    outcome
}


fn declared_outputs(script: &RunnerScript, out_dir: &Path) -> Vec<PathBuf> {
    let mut outputs: Vec<PathBuf> = script
        .sample_commands()
        .iter()
        .filter_map(|c| command_sample_id(c))
        .map(|id| out_dir.join(id).join(SNPS_ALIGNED_FA))
        .collect();
    outputs.push(out_dir.join(CORE_FULL_ALN));
    outputs
}


async fn run_serial<R: ToolRunner>(runner: &R, script: &RunnerScript, out_dir: &Path) -> BatchOutcome {
    let invocation = ToolInvocation::new(
        SHELL_TAG,
        vec![script.path.to_string_lossy().to_string()],
        out_dir,
    )
    .expecting(declared_outputs(script, out_dir));

    let mut outcome = BatchOutcome::default();
    match runner.run(&invocation).await {
        Ok(run) => {
            append_log(out_dir, &invocation, &run);
            debug!("Missing declared outputs: {:?}", run.missing_outputs);
            outcome.exit_code = run.exit_code;
        }
        Err(e) => {
            let warning = PipelineWarning::Launch(e.to_string());
            warn!("{}", warning);
            outcome.warnings.push(warning);
        }
    }
    outcome
}


async fn run_parallel<R: ToolRunner>(
    runner: &R,
    script: &RunnerScript,
    out_dir: &Path,
    jobs: usize,
) -> BatchOutcome {
    let semaphore = Semaphore::new(jobs);
    let sample_commands = script.sample_commands();
    info!("Running {} sample commands, {} at a time", sample_commands.len(), jobs);

    let sample_runs = sample_commands.iter().map(|&cmd| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.ok();
            let invocation = shell_command(cmd, out_dir);
            (cmd, invocation.clone(), runner.run(&invocation).await)
        }
    });
    let mut results = join_all(sample_runs).await;

    // The merge step needs every sample directory, so it only starts here.
    for cmd in script.merge_commands() {
        let invocation = shell_command(cmd, out_dir);
        let result = runner.run(&invocation).await;
        results.push((cmd, invocation, result));
    }

    let mut outcome = BatchOutcome::default();
    for (cmd, invocation, result) in results {
        match result {
            Ok(run) => {
                append_log(out_dir, &invocation, &run);
                if let Some(code) = run.exit_code {
                    if outcome.exit_code.is_none_or(|c| c == 0) {
                        outcome.exit_code = Some(code);
                    }
                    if code != 0 {
                        let reason = format!("command exited with status {}", code);
                        outcome.warnings.push(match command_sample_id(cmd) {
                            Some(sample_id) => PipelineWarning::SampleExecution { sample_id, reason },
                            None => PipelineWarning::Launch(format!("{}: {}", cmd, reason)),
                        });
                    }
                }
            }
            Err(e) => outcome.warnings.push(PipelineWarning::Launch(e.to_string())),
        }
    }
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
    outcome
}


fn shell_command(cmd: &str, out_dir: &Path) -> ToolInvocation {
    ToolInvocation::new(SHELL_TAG, vec!["-c".to_string(), cmd.to_string()], out_dir)
}


fn append_log(out_dir: &Path, invocation: &ToolInvocation, run: &ToolRun) {
    let path = out_dir.join(BATCH_LOG);
    let result = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| {
            writeln!(file, "### {} (exit {:?})", invocation.display(), run.exit_code)?;
            file.write_all(&run.stdout)?;
            file.write_all(&run.stderr)?;
            writeln!(file)
        });
    if let Err(e) = result {
        warn!("Could not write {}: {}", path.display(), e);
    }
}


/// Checks every manifest sample for the files snippy should have produced.
///
/// # Arguments
///
/// * `out_dir` - Output directory of the batch.
/// * `samples` - Manifest entries.
///
/// # Returns
/// One SampleExecution warning per sample with missing output or zero variants.
pub fn audit_samples(out_dir: &Path, samples: &[SampleEntry]) -> Vec<PipelineWarning> {
    let mut warnings = Vec::new();
    for sample in samples {
        let sample_dir = out_dir.join(&sample.sample_id);
        let reason = if !sample_dir.is_dir() {
            Some("no output directory was created".to_string())
        } else if !is_nonempty_file(&sample_dir.join(SNPS_ALIGNED_FA)) {
            Some(format!("no {} was produced", SNPS_ALIGNED_FA))
        } else {
            match count_variants(&sample_dir.join(SNPS_TAB)) {
                Some(0) => Some("no variants found".to_string()),
                _ => None,
            }
        };
        if let Some(reason) = reason {
            warnings.push(PipelineWarning::SampleExecution {
                sample_id: sample.sample_id.clone(),
                reason,
            });
        }
    }
    warnings
}


/// Number of variant rows in a snps.tab (header excluded); `None` if unreadable.
fn count_variants(path: &Path) -> Option<usize> {
    let reader = BufReader::new(File::open(path).ok()?);
    let rows = reader
        .lines()
        .map_while(Result::ok)
        .filter(|l| !l.trim().is_empty() && !l.starts_with("CHROM"))
        .count();
    Some(rows)
}
