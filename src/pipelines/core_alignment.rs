// src/pipelines/core_alignment.rs: Guarantees a usable core.aln after the batch has run
//
// Evidence is gathered from the output tree into a plain snapshot, classified by a pure
// function, and only then applied to disk.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::defs::{
    PipelineError, PipelineWarning, CORE_ALN, CORE_FULL_ALN, PLACEHOLDER_ID, SNPS_ALIGNED_FA, UNKNOWN_BASE,
};
use crate::utils::fastx::summarize_alignment;
use crate::utils::file::write_fasta_record;


/// Which rule produced core.aln. Ordered by preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoreTier {
    /// snippy-core wrote core.aln itself.
    CoreAlignmentPresent,
    /// core.aln copied from core.full.aln.
    FullAlignment,
    /// core.aln copied from the first sample's snps.aligned.fa.
    FirstSample,
    /// Single `N` record synthesized.
    Placeholder,
}

impl CoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreTier::CoreAlignmentPresent => "core_alignment_present",
            CoreTier::FullAlignment => "full_alignment",
            CoreTier::FirstSample => "first_sample",
            CoreTier::Placeholder => "placeholder",
        }
    }

    /// Tiers that stand in for a real multi-sample alignment.
    pub fn is_degraded(&self) -> bool {
        matches!(self, CoreTier::FirstSample | CoreTier::Placeholder)
    }
}

impl fmt::Display for CoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// State of one candidate file on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactState {
    Missing,
    /// Present but empty or not parseable as FASTA with at least one symbol.
    Invalid(String),
    Usable,
}

impl ArtifactState {
    pub fn inspect(path: &Path) -> Self {
        if !path.exists() {
            return ArtifactState::Missing;
        }
        match summarize_alignment(path) {
            Ok(summary) if summary.is_usable() => ArtifactState::Usable,
            Ok(_) => ArtifactState::Invalid("no sequence records with symbols".to_string()),
            Err(e) => ArtifactState::Invalid(e.to_string()),
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ArtifactState::Usable)
    }
}


/// Snapshot of everything the resolver looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub core_alignment: ArtifactState,
    pub full_alignment: ArtifactState,
    /// First manifest sample id and the state of its snps.aligned.fa.
    pub first_sample: Option<(String, ArtifactState)>,
    /// Aggregate exit code of the batch; `None` if it never produced one.
    pub batch_exit_code: Option<i32>,
}

impl Evidence {
    /// Reads the output tree.
    pub fn gather(out_dir: &Path, first_sample_id: Option<&str>, batch_exit_code: Option<i32>) -> Self {
        let first_sample = first_sample_id.map(|id| {
            let state = ArtifactState::inspect(&first_sample_alignment(out_dir, id));
            (id.to_string(), state)
        });
        Evidence {
            core_alignment: ArtifactState::inspect(&out_dir.join(CORE_ALN)),
            full_alignment: ArtifactState::inspect(&out_dir.join(CORE_FULL_ALN)),
            first_sample,
            batch_exit_code,
        }
    }
}


pub fn first_sample_alignment(out_dir: &Path, sample_id: &str) -> PathBuf {
    out_dir.join(sample_id).join(SNPS_ALIGNED_FA)
}


/// Picks the tier. First match wins.
pub fn classify(evidence: &Evidence) -> CoreTier {
    if evidence.core_alignment.is_usable() {
        CoreTier::CoreAlignmentPresent
    } else if evidence.full_alignment.is_usable() {
        CoreTier::FullAlignment
    } else if evidence
        .first_sample
        .as_ref()
        .is_some_and(|(_, state)| state.is_usable())
    {
        CoreTier::FirstSample
    } else {
        CoreTier::Placeholder
    }
}


/// Operator-facing explanation for a degraded tier, `None` for genuine results.
pub fn degradation_warning(tier: CoreTier, evidence: &Evidence) -> Option<PipelineWarning> {
    let mut reason = match tier {
        CoreTier::CoreAlignmentPresent | CoreTier::FullAlignment => return None,
        CoreTier::FirstSample => {
            let id = evidence.first_sample.as_ref().map(|(id, _)| id.as_str()).unwrap_or("?");
            format!(
                "no {} was produced; using {}/{} from a single sample, not a multi-sample alignment",
                CORE_FULL_ALN, id, SNPS_ALIGNED_FA
            )
        }
        CoreTier::Placeholder => format!(
            "neither {} nor a first-sample {} was found; wrote a single '{}' record with no biological signal",
            CORE_FULL_ALN,
            SNPS_ALIGNED_FA,
            UNKNOWN_BASE as char
        ),
    };

    match evidence.batch_exit_code {
        Some(0) => {}
        Some(code) => reason.push_str(&format!(
            "; the batch exited with status {}, so the tool may have crashed rather than found zero diversity",
            code
        )),
        None => reason.push_str("; the batch never reported an exit status"),
    }

    Some(PipelineWarning::DegradedArtifact {
        tier: tier.to_string(),
        reason,
    })
}


/// Result of a resolver pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tier: CoreTier,
    pub path: PathBuf,
    pub warning: Option<PipelineWarning>,
}


/// Writes core.aln according to `tier`.
pub fn apply(tier: CoreTier, evidence: &Evidence, out_dir: &Path) -> Result<PathBuf, PipelineError> {
    let core_path = out_dir.join(CORE_ALN);
    match tier {
        CoreTier::CoreAlignmentPresent => {}
        CoreTier::FullAlignment => {
            fs::copy(out_dir.join(CORE_FULL_ALN), &core_path)?;
        }
        CoreTier::FirstSample => {
            let (id, _) = evidence.first_sample.as_ref().ok_or_else(|| {
                PipelineError::IOError("first-sample tier selected without a first sample".to_string())
            })?;
            fs::copy(first_sample_alignment(out_dir, id), &core_path)?;
        }
        CoreTier::Placeholder => write_placeholder(&core_path)?,
    }
    Ok(core_path)
}


fn write_placeholder(path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_fasta_record(&mut writer, PLACEHOLDER_ID, None, &[UNKNOWN_BASE])?;
    writer.flush()
}


/// Inspects the output tree, picks a tier and makes sure core.aln exists and parses.
///
/// # Arguments
///
/// * `out_dir` - Output directory of the batch.
/// * `first_sample_id` - sample_id of the first manifest row.
/// * `batch_exit_code` - Aggregate exit code of the batch, if any.
///
/// # Returns
/// Resolution naming the tier that fired.
pub fn resolve_core_alignment(
    out_dir: &Path,
    first_sample_id: Option<&str>,
    batch_exit_code: Option<i32>,
) -> Result<Resolution, PipelineError> {
    let evidence = Evidence::gather(out_dir, first_sample_id, batch_exit_code);
    debug!("Core alignment evidence: {:?}", evidence);

    if let ArtifactState::Invalid(reason) = &evidence.core_alignment {
        warn!("Ignoring existing {}: {}", CORE_ALN, reason);
    }
    if let ArtifactState::Invalid(reason) = &evidence.full_alignment {
        warn!("Ignoring {}: {}", CORE_FULL_ALN, reason);
    }

    let tier = classify(&evidence);
    let path = apply(tier, &evidence, out_dir)?;

    let summary = summarize_alignment(&path)
        .map_err(|e| PipelineError::IOError(format!("{} is unreadable after resolution: {}", path.display(), e)))?;
    if !summary.is_usable() {
        return Err(PipelineError::IOError(format!("{} has no sequence after resolution", path.display())));
    }
    debug!(
        "{} holds {} records (degenerate: {})",
        CORE_ALN,
        summary.records(),
        summary.is_degenerate()
    );

    let warning = degradation_warning(tier, &evidence);
    match &warning {
        Some(w) => warn!("{}", w),
        None => info!("Core alignment resolved via {}: {}", tier, path.display()),
    }

    Ok(Resolution { tier, path, warning })
}
