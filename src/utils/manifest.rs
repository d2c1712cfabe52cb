use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defs::{PipelineError, PipelineWarning};


/// One row of the sample manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEntry {
    pub sample_id: String,
    pub read_file_1: PathBuf,
    pub read_file_2: PathBuf,
}


/// Parses a tab-separated manifest (`sample_id`, `read_file_1`, `read_file_2`).
/// Blank lines and lines starting with `#` are skipped. Row order is preserved.
///
/// # Arguments
///
/// * `path` - Manifest file.
///
/// # Returns
/// Vec of SampleEntry in manifest order; never empty.
pub fn read_manifest(path: &Path) -> Result<Vec<SampleEntry>, PipelineError> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::InvalidManifest {
        path: path.to_path_buf(),
        reason: format!("cannot be read as UTF-8 text: {}", e),
    })?;
    parse_manifest(&content).map_err(|reason| PipelineError::InvalidManifest {
        path: path.to_path_buf(),
        reason,
    })
}


fn parse_manifest(content: &str) -> Result<Vec<SampleEntry>, String> {
    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').map(str::trim).collect();
        if fields.len() < 3 || fields[..3].iter().any(|f| f.is_empty()) {
            return Err(format!(
                "line {}: expected 3 tab-separated fields, found {} in '{}'",
                line_no + 1,
                fields.len(),
                line
            ));
        }
        let sample_id = fields[0].to_string();
        if !seen.insert(sample_id.clone()) {
            return Err(format!("line {}: duplicate sample_id '{}'", line_no + 1, sample_id));
        }
        entries.push(SampleEntry {
            sample_id,
            read_file_1: PathBuf::from(fields[1]),
            read_file_2: PathBuf::from(fields[2]),
        });
    }

    if entries.is_empty() {
        return Err("no samples listed".to_string());
    }
    Ok(entries)
}


/// Read files that do not exist as seen from `batch_dir`, where the per-sample
/// commands run. Relative paths are resolved against it.
///
/// # Returns
/// One SampleExecution warning per sample with at least one missing read file.
pub fn missing_read_files(entries: &[SampleEntry], batch_dir: &Path) -> Vec<PipelineWarning> {
    entries
        .iter()
        .filter_map(|entry| {
            let missing: Vec<String> = [&entry.read_file_1, &entry.read_file_2]
                .into_iter()
                .filter(|read| !batch_dir.join(read).is_file())
                .map(|read| read.display().to_string())
                .collect();
            if missing.is_empty() {
                return None;
            }
            Some(PipelineWarning::SampleExecution {
                sample_id: entry.sample_id.clone(),
                reason: format!(
                    "read file {} not found from {}; relative paths are resolved there",
                    missing.join(", "),
                    batch_dir.display()
                ),
            })
        })
        .collect()
}
