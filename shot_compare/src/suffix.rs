//! Canonical screenshot suffix derivation.
//!
//! The before and after runs name their captures with different platform/run
//! prefixes (`win7-0912_tabs_normal.png` vs `win7-0913_tabs_normal.png`, or a
//! `before_`/`after_` marker stuck on by an earlier trim step). Stripping the
//! prefix yields the suffix used to pair captures across the two trees; the
//! suffix is the sole pairing mechanism, there is no content-based matching.

use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

/// Strip an optional leading `before_`/`after_` marker, then everything up to
/// and including the first `-` or `_` delimiter.
///
/// This rule is a load-bearing naming contract shared with historical
/// comparison records; changing it silently re-pairs old trees. A name with
/// no delimiter is returned unchanged.
///
/// ```
/// use shot_compare::suffix::suffix;
///
/// assert_eq!(suffix("img_login.png"), "login.png");
/// assert_eq!(suffix("before_win7_tabs.png"), "tabs.png");
/// assert_eq!(suffix("plain.png"), "plain.png");
/// ```
pub fn suffix(filename: &str) -> &str {
    for marker in ["before_", "after_"] {
        if let Some(rest) = filename.strip_prefix(marker) {
            if let Some(pos) = rest.find(['-', '_']) {
                return &rest[pos + 1..];
            }
        }
    }
    match filename.find(['-', '_']) {
        Some(pos) => &filename[pos + 1..],
        None => filename,
    }
}

/// Collect the suffix of every screenshot directly inside `dir`.
///
/// Non-recursive: the engine calls this once per directory level on both
/// trees and unions the sets, so captures missing on one side still show up
/// for classification.
pub fn list_suffixes(dir: &Path) -> BTreeSet<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            name.ends_with(".png").then(|| suffix(name).to_string())
        })
        .collect()
}
