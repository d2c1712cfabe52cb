use std::path::Path;

use anyhow::{anyhow, Result};
use seq_io::fasta::Reader as FastaReader;

use crate::config::defs::UNKNOWN_BASE;


/// Shape of a multi-FASTA alignment file.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSummary {
    pub ids: Vec<String>,
    pub lengths: Vec<usize>,
    /// True when every record consists only of the unknown base.
    pub all_unknown: bool,
}

impl AlignmentSummary {
    pub fn records(&self) -> usize {
        self.ids.len()
    }

    /// At least one record holding at least one symbol.
    pub fn is_usable(&self) -> bool {
        self.lengths.iter().any(|&l| l > 0)
    }

    /// A single record of unknown bases carries no biological signal.
    pub fn is_degenerate(&self) -> bool {
        self.records() <= 1 && self.all_unknown
    }
}


/// Parses a FASTA file and summarizes its records.
///
/// # Arguments
///
/// * `path` - FASTA/alignment file.
///
/// # Returns
/// AlignmentSummary, or an error if the file is not parseable FASTA.
pub fn summarize_alignment(path: &Path) -> Result<AlignmentSummary> {
    let mut reader = FastaReader::from_path(path)
        .map_err(|e| anyhow!("Cannot open {}: {}", path.display(), e))?;

    let mut ids = Vec::new();
    let mut lengths = Vec::new();
    let mut all_unknown = true;

    for record in reader.records() {
        let record = record.map_err(|e| anyhow!("Invalid FASTA in {}: {}", path.display(), e))?;
        let (id, _) = parse_header(&record.head);
        let seq: Vec<u8> = record
            .seq
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if seq.is_empty() || seq.iter().any(|b| b.to_ascii_uppercase() != UNKNOWN_BASE) {
            all_unknown = false;
        }
        ids.push(id);
        lengths.push(seq.len());
    }

    if ids.is_empty() {
        all_unknown = false;
    }
    Ok(AlignmentSummary { ids, lengths, all_unknown })
}


/// Splits a FASTA header into id and optional description.
pub fn parse_header(head: &[u8]) -> (String, Option<String>) {
    let head_str = String::from_utf8_lossy(head);
    let head_str = head_str.trim_start_matches('>').trim();
    let mut parts = head_str.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or("").to_string();
    let desc = parts.next().map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    (id, desc)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fasta_file(content: &str) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        write!(tmp, "{}", content)?;
        tmp.flush()?;
        Ok(tmp)
    }

    #[test]
    fn test_summarize_multi_record() -> Result<()> {
        let tmp = fasta_file(">A sample\nACGT\nAC\n>B\nACGTAA\n")?;
        let summary = summarize_alignment(tmp.path())?;
        assert_eq!(summary.ids, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(summary.lengths, vec![6, 6]);
        assert!(summary.is_usable());
        assert!(!summary.is_degenerate());
        Ok(())
    }

    #[test]
    fn test_single_unknown_is_degenerate() -> Result<()> {
        let tmp = fasta_file(">placeholder\nN\n")?;
        let summary = summarize_alignment(tmp.path())?;
        assert_eq!(summary.records(), 1);
        assert!(summary.is_usable());
        assert!(summary.is_degenerate());
        Ok(())
    }

    #[test]
    fn test_empty_file_is_not_usable() -> Result<()> {
        let tmp = fasta_file("")?;
        let summary = summarize_alignment(tmp.path())?;
        assert_eq!(summary.records(), 0);
        assert!(!summary.is_usable());
        Ok(())
    }

    #[test]
    fn test_header_only_is_not_usable() -> Result<()> {
        let tmp = fasta_file(">A\n")?;
        let summary = summarize_alignment(tmp.path())?;
        assert!(!summary.is_usable());
        Ok(())
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"seq1 some desc"), ("seq1".to_string(), Some("some desc".to_string())));
        assert_eq!(parse_header(b">seq2"), ("seq2".to_string(), None));
    }
}
