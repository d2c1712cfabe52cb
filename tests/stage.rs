#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Result;
use snippy_core_stage::utils::fastx::summarize_alignment;
use tempfile::{tempdir, TempDir};

const FAKE_SNIPPY_MULTI: &str = r#"#!/usr/bin/env bash
manifest="$1"; shift
ref=""; cpus=1
while [ $# -gt 0 ]; do
  case "$1" in
    --ref) ref="$2"; shift 2;;
    --cpus) cpus="$2"; shift 2;;
    *) shift;;
  esac
done
ids=()
while IFS=$'\t' read -r id r1 r2; do
  [ -z "$id" ] && continue
  echo "snippy --outdir '$id' --R1 '$r1' --R2 '$r2' --ref '$ref' --cpus $cpus"
  ids+=("$id")
done < "$manifest"
echo "snippy-core --ref '${ids[0]}/ref.fa' ${ids[*]}"
"#;

const FAKE_SNIPPY: &str = r#"#!/usr/bin/env bash
if [ "$1" = "--version" ]; then echo "snippy 4.6.0"; exit 0; fi
force=0; outdir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --force) force=1; shift;;
    --outdir) outdir="$2"; shift 2;;
    *) shift;;
  esac
done
if [ -d "$outdir" ] && [ $force -eq 0 ]; then
  echo "Folder $outdir already exists. Use --force" >&2
  exit 1
fi
mkdir -p "$outdir"
printf ">%s force=%s\nACGTACGT\n" "$outdir" "$force" > "$outdir/snps.aligned.fa"
printf "CHROM\tPOS\tTYPE\n" > "$outdir/snps.tab"
"#;

// Zero variants across the cohort: the merge step aborts.
const FAKE_SNIPPY_CORE_FAILS: &str = "#!/usr/bin/env bash\necho 'No variant sites' >&2\nexit 1\n";

// Writes only the full alignment, leaving core.aln to the stage.
const FAKE_SNIPPY_CORE_FULL: &str = r#"#!/usr/bin/env bash
shift 2
: > core.full.aln
for d in "$@"; do cat "$d/snps.aligned.fa" >> core.full.aln; done
"#;


struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(snippy_core: Option<&str>) -> Result<Self> {
        let dir = tempdir()?;
        let tools = dir.path().join("tools");
        fs::create_dir(&tools)?;
        install(&tools, "snippy-multi", FAKE_SNIPPY_MULTI)?;
        install(&tools, "snippy", FAKE_SNIPPY)?;
        if let Some(body) = snippy_core {
            install(&tools, "snippy-core", body)?;
        }
        fs::write(dir.path().join("samples.tab"), "A\tA_R1.fq\tA_R2.fq\nB\tB_R1.fq\tB_R2.fq\n")?;
        fs::write(dir.path().join("ref.fa"), ">ref\nACGTACGT\n")?;
        Ok(Workspace { dir })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self) -> PathBuf {
        self.path().join("snippy")
    }

    fn run(&self, extra: &[&str]) -> Result<Output> {
        let tools = self.path().join("tools");
        let mut args: Vec<&str> = vec![
            "--input", "samples.tab",
            "--ref", "ref.fa",
            "--tool-dir", tools.to_str().unwrap_or("tools"),
        ];
        args.extend_from_slice(extra);
        Ok(Command::new(env!("CARGO_BIN_EXE_snippy-core-stage"))
            .args(&args)
            .current_dir(self.path())
            .output()?)
    }
}

fn install(dir: &Path, name: &str, body: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, body)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}


#[test]
fn test_zero_variants_uses_first_sample() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FAILS))?;
    let output = ws.run(&["--cpus", "2"])?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let out = ws.out();
    assert_eq!(fs::read(out.join("core.aln"))?, fs::read(out.join("A").join("snps.aligned.fa"))?);
    assert!(out.join("runme.sh").exists());

    let marker = fs::read_to_string(out.join("snippy_done.txt"))?;
    assert!(marker.contains("tier=first_sample"));
    assert!(marker.contains("batch_exit_code=1"));

    let log = String::from_utf8_lossy(&output.stderr);
    assert!(log.contains("Degraded core alignment (first_sample)"), "{}", log);
    Ok(())
}

#[test]
fn test_full_alignment_copied_exactly() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FULL))?;
    let output = ws.run(&[])?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let out = ws.out();
    assert_eq!(fs::read(out.join("core.aln"))?, fs::read(out.join("core.full.aln"))?);
    let summary = summarize_alignment(&out.join("core.aln"))?;
    assert_eq!(summary.records(), 2);
    assert!(fs::read_to_string(out.join("snippy_done.txt"))?.contains("tier=full_alignment"));
    Ok(())
}

#[test]
fn test_missing_merge_tool_still_yields_alignment() -> Result<()> {
    let ws = Workspace::new(None)?;
    let output = ws.run(&[])?;
    assert_eq!(output.status.code(), Some(0));

    let summary = summarize_alignment(&ws.out().join("core.aln"))?;
    assert!(summary.is_usable());
    assert!(ws.out().join("snippy_done.txt").exists());
    Ok(())
}

#[test]
fn test_invalid_cpus_exit_two_without_output() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FAILS))?;
    for bad in ["0", "-1", "abc"] {
        let output = ws.run(&["--cpus", bad])?;
        assert_eq!(output.status.code(), Some(2), "--cpus {}", bad);
        assert!(!ws.out().exists(), "--cpus {} created the output directory", bad);
    }
    Ok(())
}

#[test]
fn test_missing_variant_caller_exit_one() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FAILS))?;
    fs::remove_file(ws.path().join("tools").join("snippy-multi"))?;

    let output = ws.run(&[])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(!ws.out().join("snippy_done.txt").exists());
    assert!(!ws.out().join("core.aln").exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("snippy-multi"));
    Ok(())
}

#[test]
fn test_rerun_without_and_with_force() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FAILS))?;
    assert_eq!(ws.run(&[])?.status.code(), Some(0));
    let sample_fa = ws.out().join("A").join("snps.aligned.fa");
    let first = fs::read_to_string(&sample_fa)?;
    assert!(first.contains("force=0"));

    // Existing folders are refused by snippy; nothing is lost.
    assert_eq!(ws.run(&[])?.status.code(), Some(0));
    assert_eq!(fs::read_to_string(&sample_fa)?, first);
    let marker = fs::read_to_string(ws.out().join("snippy_done.txt"))?;
    assert!(marker.contains("tier=first_sample"), "{}", marker);
    assert!(marker.contains("degraded=true"));

    assert_eq!(ws.run(&["--force"])?.status.code(), Some(0));
    assert!(fs::read_to_string(&sample_fa)?.contains("force=1"));
    assert_eq!(fs::read(ws.out().join("core.aln"))?, fs::read(&sample_fa)?);
    Ok(())
}

#[test]
fn test_parallel_jobs_match_serial_result() -> Result<()> {
    let ws = Workspace::new(Some(FAKE_SNIPPY_CORE_FULL))?;
    let output = ws.run(&["--jobs", "2"])?;
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let out = ws.out();
    assert!(out.join("A").join("snps.aligned.fa").exists());
    assert!(out.join("B").join("snps.aligned.fa").exists());
    assert_eq!(fs::read(out.join("core.aln"))?, fs::read(out.join("core.full.aln"))?);
    Ok(())
}
