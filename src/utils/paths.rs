// src/utils/paths.rs: Path resolution and parameter validation

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::cli::Arguments;
use crate::config::defs::{PipelineError, ResolvedPaths};


/// Parses the `--cpus` value. Only positive integers are accepted.
///
/// # Arguments
///
/// * `raw` - Value as typed on the command line.
///
/// # Returns
/// usize thread count handed to snippy.
pub fn parse_cpus(raw: &str) -> Result<usize, PipelineError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n)
            .map_err(|_| PipelineError::Configuration(format!("--cpus value {} is too large", n))),
        Ok(n) => Err(PipelineError::Configuration(format!(
            "--cpus must be a positive integer, got {}",
            n
        ))),
        Err(_) => Err(PipelineError::Configuration(format!(
            "--cpus must be a positive integer, got '{}'",
            raw
        ))),
    }
}


/// Joins a relative path onto `cwd`; absolute paths pass through.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}


fn canonical_existing(label: &str, raw: &str, cwd: &Path) -> Result<PathBuf, PipelineError> {
    let path = absolutize(Path::new(raw), cwd);
    if !path.exists() {
        return Err(PipelineError::Configuration(format!(
            "{} path does not exist: {}",
            label,
            path.display()
        )));
    }
    fs::canonicalize(&path).map_err(|e| {
        PipelineError::Configuration(format!("Cannot resolve {} path {}: {}", label, path.display(), e))
    })
}


/// Validates the run parameters and resolves all input/output paths to absolute,
/// canonical form. Every check runs before the output directory is created, so a
/// rejected invocation leaves the filesystem as it was.
///
/// # Arguments
///
/// * `args` - Parsed command-line arguments.
/// * `cwd` - Directory that relative paths are resolved against.
///
/// # Returns
/// ResolvedPaths with the output directory guaranteed to exist.
pub fn resolve_paths(args: &Arguments, cwd: &Path) -> Result<ResolvedPaths, PipelineError> {
    let cpus = parse_cpus(&args.cpus)?;
    if args.jobs == 0 {
        return Err(PipelineError::Configuration("--jobs must be at least 1".to_string()));
    }

    let manifest = canonical_existing("Manifest", &args.input, cwd)?;
    let reference = canonical_existing("Reference", &args.reference, cwd)?;
    if !manifest.is_file() {
        return Err(PipelineError::Configuration(format!(
            "Manifest is not a file: {}",
            manifest.display()
        )));
    }
    if !reference.is_file() {
        return Err(PipelineError::Configuration(format!(
            "Reference is not a file: {}",
            reference.display()
        )));
    }

    let out_dir = absolutize(Path::new(&args.out_dir), cwd);
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "Output path exists and is not a directory: {}",
            out_dir.display()
        )));
    }
    fs::create_dir_all(&out_dir)?;
    let out_dir = fs::canonicalize(&out_dir)?;

    debug!("Resolved manifest {:?}, reference {:?}, outdir {:?}", manifest, reference, out_dir);

    Ok(ResolvedPaths {
        manifest,
        reference,
        out_dir,
        cpus,
    })
}
