// src/pipelines/snippy_core.rs: Per-sample snippy runs followed by core alignment resolution

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::config::defs::{
    PipelineError, PipelineWarning, RunConfig, CORE_ALN, CORE_FULL_ALN, DONE_MARKER, SNIPPY_CORE_TAG,
    SNIPPY_MULTI_TAG, SNIPPY_TAG,
};
use crate::pipelines::batch::{audit_samples, execute_batch};
use crate::pipelines::core_alignment::{resolve_core_alignment, CoreTier};
use crate::utils::command::{check_tools, check_version, generate_cli, SystemRunner, ToolInvocation, ToolRunner};
use crate::utils::manifest::{missing_read_files, read_manifest, SampleEntry};
use crate::utils::script::RunnerScript;
use crate::utils::system::{check_cpu_request, detect_cores_and_load};


/// Everything the stage reports once it has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub tier: CoreTier,
    pub core_alignment: PathBuf,
    pub marker: PathBuf,
    pub batch_exit_code: Option<i32>,
    pub samples: usize,
    pub warnings: Vec<PipelineWarning>,
}


/// Asks snippy-multi for the per-sample commands and persists them as runme.sh.
///
/// # Arguments
///
/// * `runner` - Subprocess seam.
/// * `config` - Resolved run configuration.
///
/// # Returns
/// RunnerScript, rewritten with `--force` when requested.
pub async fn generate_runner_script<R: ToolRunner>(
    runner: &R,
    config: &RunConfig,
) -> Result<RunnerScript, PipelineError> {
    let program = runner.locate(SNIPPY_MULTI_TAG)?;
    let args = generate_cli(SNIPPY_MULTI_TAG, config)?;
    let invocation = ToolInvocation::new(program, args, &config.paths.out_dir);

    let run = runner.run(&invocation).await?;
    if !run.success() {
        return Err(PipelineError::ToolExecution {
            tool: SNIPPY_MULTI_TAG.to_string(),
            error: format!(
                "exited with status {:?}: {}",
                run.exit_code,
                String::from_utf8_lossy(&run.stderr).trim()
            ),
        });
    }

    let mut script = RunnerScript::new(config.runner_script(), run.stdout_lines());
    if script.sample_commands().is_empty() {
        return Err(PipelineError::ToolExecution {
            tool: SNIPPY_MULTI_TAG.to_string(),
            error: "produced no per-sample commands".to_string(),
        });
    }
    if config.args.force {
        script = script.with_force();
    }
    script.persist()?;
    info!(
        "Wrote {} with {} sample commands to {}",
        SNIPPY_MULTI_TAG,
        script.sample_commands().len(),
        script.path.display()
    );
    Ok(script)
}


/// Removes top-level merge outputs left by an earlier run, forced or not, so the resolver only
/// classifies what this batch produced. Per-sample directories are left to snippy's own
/// `--force` handling.
fn clear_stale_alignments(out_dir: &Path) -> Result<(), PipelineError> {
    for name in [CORE_ALN, CORE_FULL_ALN] {
        let path = out_dir.join(name);
        if path.is_file() {
            info!("Removing stale {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}


/// Writes the sentinel the upstream scheduler waits for. Only called once core.aln exists.
pub fn write_completion_marker(out_dir: &Path, report: &StageReport) -> std::io::Result<PathBuf> {
    let path = out_dir.join(DONE_MARKER);
    let mut writer = BufWriter::new(File::create(&path)?);
    writeln!(writer, "status=done")?;
    writeln!(writer, "tier={}", report.tier)?;
    writeln!(writer, "degraded={}", report.tier.is_degraded())?;
    match report.batch_exit_code {
        Some(code) => writeln!(writer, "batch_exit_code={}", code)?,
        None => writeln!(writer, "batch_exit_code=none")?,
    }
    writeln!(writer, "samples={}", report.samples)?;
    writeln!(writer, "warnings={}", report.warnings.len())?;
    writeln!(writer, "core_alignment={}", report.core_alignment.display())?;
    writeln!(writer, "finished={}", chrono::Local::now().to_rfc3339())?;
    writer.flush()?;
    Ok(path)
}


/// Runs the whole stage against an arbitrary runner.
///
/// # Arguments
///
/// * `runner` - Subprocess seam.
/// * `config` - Resolved run configuration.
///
/// # Returns
/// StageReport; the marker has been written when this returns Ok.
pub async fn run_stage<R: ToolRunner>(runner: &R, config: Arc<RunConfig>) -> Result<StageReport, PipelineError> {
    let out_dir = config.paths.out_dir.clone();
    let samples: Vec<SampleEntry> = read_manifest(&config.paths.manifest)?;
    info!("Manifest lists {} samples", samples.len());
    let mut warnings = missing_read_files(&samples, &out_dir);
    for warning in &warnings {
        warn!("{}", warning);
    }

    check_tools(runner, &[SNIPPY_MULTI_TAG, SNIPPY_TAG])?;
    if let Some(version) = check_version(runner, SNIPPY_TAG).await? {
        info!("Using {} {}", SNIPPY_TAG, version);
    }
    if runner.locate(SNIPPY_CORE_TAG).is_err() {
        warn!("{} not found; the merge step will fail and a fallback alignment will be used", SNIPPY_CORE_TAG);
    }

    let script = generate_runner_script(runner, &config).await?;
    clear_stale_alignments(&out_dir)?;

    let batch = execute_batch(runner, &script, &out_dir, config.args.jobs).await;
    warnings.extend(batch.warnings.iter().cloned());
    for warning in audit_samples(&out_dir, &samples) {
        if !warnings.contains(&warning) {
            warn!("{}", warning);
            warnings.push(warning);
        }
    }

    let first_sample = samples.first().map(|s| s.sample_id.as_str());
    let resolution = resolve_core_alignment(&out_dir, first_sample, batch.exit_code)?;
    if let Some(w) = resolution.warning.clone() {
        warnings.push(w);
    }

    let mut report = StageReport {
        tier: resolution.tier,
        core_alignment: resolution.path,
        marker: out_dir.join(DONE_MARKER),
        batch_exit_code: batch.exit_code,
        samples: samples.len(),
        warnings,
    };
    report.marker = write_completion_marker(&out_dir, &report)?;
    Ok(report)
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Snippy core\n-------------\n");

    let (physical_cores, cpu_load) = detect_cores_and_load().await;
    info!("Detected {} physical cores; CPU load {:.1}%", physical_cores, cpu_load);
    check_cpu_request(config.paths.cpus, config.args.jobs, physical_cores);

    let runner = SystemRunner::new(config.args.tool_dir.as_ref().map(|d| {
        crate::utils::paths::absolutize(Path::new(d), &config.cwd)
    }));
    let report = run_stage(&runner, config).await?;

    if report.tier.is_degraded() {
        warn!(
            "{} was produced by the {} fallback; treat downstream trees as unreliable",
            report.core_alignment.display(),
            report.tier
        );
    } else {
        info!("{} produced via {}", report.core_alignment.display(), report.tier);
    }
    info!(
        "{} samples, {} warnings; wrote {}",
        report.samples,
        report.warnings.len(),
        report.marker.display()
    );
    Ok(())
}
