//! Recursive directory-pair traversal.
//!
//! The engine walks matching before/after subdirectory pairs depth-first,
//! compares every paired suffix at each level, and persists one record per
//! output directory. Children are recursed before the parent's own
//! comparison step, and suffixes are processed in sorted order so console
//! output and record iteration stay stable across runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use console::style;
use glob::Pattern;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::compare;
use crate::config::CompareConfig;
use crate::errors::Result;
use crate::lock::LockProvider;
use crate::magick::ImageTool;
use crate::record::{self, DirectoryRecord, ImagePairResult, ResultKind};
use crate::suffix;

/// Aggregate of every directory visited, keyed by its output directory.
pub type ComparisonMap = BTreeMap<PathBuf, DirectoryRecord>;

/// Per-directory tally printed after the suffix table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompareTotals {
    pub similar: usize,
    pub different: usize,
    pub missing: usize,
    pub errors: usize,
}

impl CompareTotals {
    fn count(&mut self, kind: ResultKind) {
        match kind {
            ResultKind::Similar => self.similar += 1,
            ResultKind::Different => self.different += 1,
            ResultKind::MissingBefore | ResultKind::MissingAfter => self.missing += 1,
            ResultKind::Error => self.errors += 1,
        }
    }
}

/// Drives a whole comparison run over two screenshot trees.
pub struct CompareEngine<'a> {
    tool: &'a dyn ImageTool,
    locks: &'a dyn LockProvider,
    config: CompareConfig,
}

impl<'a> CompareEngine<'a> {
    pub fn new(
        tool: &'a dyn ImageTool,
        locks: &'a dyn LockProvider,
        config: CompareConfig,
    ) -> Self {
        Self {
            tool,
            locks,
            config,
        }
    }

    /// Compare two directory trees, returning one record per output
    /// directory visited. Non-directory inputs yield an empty map with a
    /// diagnostic; per-directory problems are recorded and skipped, and
    /// only environment-level failures abort the traversal.
    pub fn compare_dirs(&self, before: &Path, after: &Path, outdir: &Path) -> Result<ComparisonMap> {
        let mut results = ComparisonMap::new();
        if !before.is_dir() || !after.is_dir() {
            warn!(
                before = %before.display(),
                after = %after.display(),
                "Two directories expected"
            );
            return Ok(results);
        }
        self.compare_level(before, after, outdir, &mut results)?;
        Ok(results)
    }

    fn compare_level(
        &self,
        before: &Path,
        after: &Path,
        outdir: &Path,
        results: &mut ComparisonMap,
    ) -> Result<()> {
        // Children first, so a parent record can assume its children are
        // already persisted.
        for child in immediate_subdirs(before) {
            let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let prefix = strip_run_id(name);
            match match_after_dir(after, prefix) {
                Some(paired) => {
                    self.compare_level(&child, &paired, &outdir.join(prefix), results)?;
                }
                None => {
                    info!(
                        dir = %child.display(),
                        prefix,
                        "No matching after directory, skipping"
                    );
                }
            }
        }

        println!(
            "\nComparing {} and {} in {}",
            before.display(),
            after.display(),
            outdir.display()
        );

        if let Err(err) = fs::create_dir_all(outdir) {
            warn!(%err, dir = %outdir.display(), "Error creating directory");
            return Ok(());
        }

        // Skip-on-contention: somebody else is already evaluating this
        // directory, and their record will be just as good.
        let Some(guard) = self.locks.try_acquire(outdir)? else {
            info!(dir = %outdir.display(), "Comparison already in progress");
            return Ok(());
        };

        if record::exists(outdir) && !self.config.overwrite {
            info!(dir = %outdir.display(), "Comparison already completed");
            if self.config.include_completed {
                if let Some(prior) = record::load(outdir)? {
                    results.insert(outdir.to_path_buf(), prior);
                }
            }
            return Ok(());
        }

        let mut suffixes: BTreeSet<String> = suffix::list_suffixes(before);
        suffixes.extend(suffix::list_suffixes(after));
        if suffixes.is_empty() {
            info!(dir = %before.display(), "No images in the directory");
            return Ok(());
        }

        let similar_dir = outdir.join("similar");
        if self.config.output_similar_composite {
            fs::create_dir_all(&similar_dir)?;
        }

        let width = suffixes.iter().map(|s| s.len()).max().unwrap_or(0);
        println!(
            "{:<width$} DIFFERING PIXELS (WITH FUZZ)",
            "SCREENSHOT SUFFIX",
            width = width
        );

        let mut dir_record: DirectoryRecord = BTreeMap::new();
        let mut totals = CompareTotals::default();

        for suffix_name in &suffixes {
            let before_file = resolve_suffix(before, suffix_name);
            let after_file = resolve_suffix(after, suffix_name);

            let result = match (before_file, after_file) {
                (None, _) => {
                    println!("{suffix_name} exists in after but not in before");
                    ImagePairResult::missing(ResultKind::MissingBefore)
                }
                (_, None) => {
                    println!("{suffix_name} exists in before but not in after");
                    ImagePairResult::missing(ResultKind::MissingAfter)
                }
                (Some(before_file), Some(after_file)) => {
                    let result = compare::compare_images(
                        self.tool,
                        &before_file,
                        &after_file,
                        outdir,
                        &similar_dir,
                        &self.config,
                    )?;
                    println!(
                        "{:<width$} {}",
                        suffix_name,
                        display_difference(&result),
                        width = width
                    );
                    result
                }
            };

            totals.count(result.kind);
            dir_record.insert(suffix_name.clone(), result);
        }

        println!(
            "{} similar, {} different, {} missing, {} errors",
            style(totals.similar).green(),
            style(totals.different).red(),
            style(totals.missing).yellow(),
            style(totals.errors).red()
        );

        record::save(outdir, &dir_record)?;
        drop(guard);

        results.insert(outdir.to_path_buf(), dir_record);
        Ok(())
    }
}

fn display_difference(result: &ImagePairResult) -> String {
    match result.kind {
        ResultKind::Error => "error".to_string(),
        _ => result
            .difference
            .map(|d| d.to_string())
            .unwrap_or_default(),
    }
}

/// Immediate subdirectories of `dir`, in filename order.
fn immediate_subdirs(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

/// Strip a trailing `-<run id>` (three or more digits) from a before
/// subdirectory name, leaving the prefix shared with its after twin.
fn strip_run_id(name: &str) -> &str {
    if let Some(pos) = name.rfind('-') {
        let digits = &name[pos + 1..];
        if digits.len() >= 3 && digits.bytes().all(|b| b.is_ascii_digit()) {
            return &name[..pos];
        }
    }
    name
}

/// Find the after-tree entry pairing with `prefix`.
///
/// Multiple matches take the lexicographically last one: the original
/// behavior amounts to "latest retry wins", and changing the tie-break
/// would silently re-pair historical comparisons.
fn match_after_dir(after: &Path, prefix: &str) -> Option<PathBuf> {
    let pattern = format!("{}*", Pattern::escape(&after.join(prefix).to_string_lossy()));
    let mut last = None;
    for entry in glob::glob(&pattern).ok()?.flatten() {
        last = Some(entry);
    }
    last.filter(|path| path.is_dir())
}

/// Resolve the concrete file in `dir` whose name ends in `-<suffix>` or
/// `_<suffix>`. First match wins.
fn resolve_suffix(dir: &Path, suffix_name: &str) -> Option<PathBuf> {
    let pattern = format!(
        "{}/*[-_]{}",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(suffix_name)
    );
    glob::glob(&pattern).ok()?.flatten().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_strip_requires_three_digits() {
        assert_eq!(strip_run_id("win-001"), "win");
        assert_eq!(strip_run_id("linux64-20240110"), "linux64");
        assert_eq!(strip_run_id("win-01"), "win-01");
        assert_eq!(strip_run_id("win-abc"), "win-abc");
        assert_eq!(strip_run_id("win"), "win");
        assert_eq!(strip_run_id("a-b-123"), "a-b");
    }

    #[test]
    fn run_id_strip_only_touches_the_tail() {
        assert_eq!(strip_run_id("001-win"), "001-win");
        assert_eq!(strip_run_id("win-123x"), "win-123x");
    }

    #[test]
    fn after_dir_match_takes_lexicographically_last() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("win-001")).unwrap();
        fs::create_dir(dir.path().join("win-002")).unwrap();
        fs::create_dir(dir.path().join("mac-001")).unwrap();

        let matched = match_after_dir(dir.path(), "win").unwrap();
        assert_eq!(matched.file_name().unwrap(), "win-002");
    }

    #[test]
    fn after_dir_match_skips_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("win-001")).unwrap();
        // Lexicographically later than win-001 but not a directory.
        fs::write(dir.path().join("win-999"), b"x").unwrap();

        assert!(match_after_dir(dir.path(), "win").is_none());
    }

    #[test]
    fn suffix_resolution_requires_a_delimiter_boundary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run_login.png"), b"x").unwrap();
        fs::write(dir.path().join("unrelated.png"), b"x").unwrap();

        let resolved = resolve_suffix(dir.path(), "login.png").unwrap();
        assert_eq!(resolved.file_name().unwrap(), "run_login.png");
        assert!(resolve_suffix(dir.path(), "missing.png").is_none());
    }

    #[test]
    fn totals_bucket_both_missing_kinds_together() {
        let mut totals = CompareTotals::default();
        totals.count(ResultKind::MissingBefore);
        totals.count(ResultKind::MissingAfter);
        totals.count(ResultKind::Similar);
        assert_eq!(totals.missing, 2);
        assert_eq!(totals.similar, 1);
    }
}
