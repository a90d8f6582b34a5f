//! Pairwise screenshot comparison.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::CompareConfig;
use crate::crop;
use crate::errors::Result;
use crate::magick::{DiffClass, ImageTool};
use crate::record::{ImagePairResult, ResultKind};
use crate::suffix;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Check the PNG signature without reading the rest of the file. The diff
/// tool is never handed a file that fails this check (CVE-2016-3714 class
/// of delegate bugs in image tooling).
pub fn is_png_file(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic) {
        Ok(()) => magic == PNG_MAGIC,
        Err(_) => false,
    }
}

/// Compare one before/after pair.
///
/// Both captures are chrome-cropped, handed to the diff tool, and any
/// composite artifact lands in `outdir` (or `similar_dir` for a similar
/// pair when similar composites were requested). Unusable inputs come back
/// as an `ERROR` classification; only environment-level failures (a diff
/// binary that cannot be found at all) propagate as errors.
pub fn compare_images(
    tool: &dyn ImageTool,
    before: &Path,
    after: &Path,
    outdir: &Path,
    similar_dir: &Path,
    config: &CompareConfig,
) -> Result<ImagePairResult> {
    if !is_png_file(before) || !is_png_file(after) {
        warn!(
            before = %before.display(),
            after = %after.display(),
            "No PNG magic number"
        );
        return Ok(ImagePairResult {
            kind: ResultKind::Error,
            difference: None,
            bounds: None,
        });
    }

    let before_trimmed = trim(tool, "before", before, outdir, config)?;
    let after_trimmed = trim(tool, "after", after, outdir, config)?;

    // The shorter of the two unprefixed names is their common subset, so
    // asymmetrically named runs converge on one artifact name.
    let before_name = basename(&before_trimmed);
    let after_name = basename(&after_trimmed);
    let before_unprefixed = suffix::suffix(&before_name);
    let after_unprefixed = suffix::suffix(&after_name);
    let outname = if after_unprefixed.len() > before_unprefixed.len() {
        before_unprefixed.to_string()
    } else {
        after_unprefixed.to_string()
    };
    let outpath = outdir.join(&outname);

    let outcome = tool.diff(&before_trimmed, &after_trimmed, config.fuzz_tolerance)?;

    let kind = match outcome.class {
        DiffClass::Similar => ResultKind::Similar,
        DiffClass::Different => ResultKind::Different,
        DiffClass::Error => ResultKind::Error,
    };

    if kind != ResultKind::Similar || config.output_similar_composite {
        write_composite(tool, &before_trimmed, &after_trimmed, &outpath);
    }

    if kind == ResultKind::Similar && config.output_similar_composite {
        // Keep the main output directory reserved for real differences.
        if let Err(err) = fs::rename(&outpath, similar_dir.join(&outname)) {
            warn!(%err, "Could not move similar composite");
        }
    }

    cleanup_trimmed(before, &before_trimmed);
    cleanup_trimmed(after, &after_trimmed);

    Ok(ImagePairResult {
        kind,
        difference: (outcome.differing_pixels >= 0).then_some(outcome.differing_pixels),
        bounds: if kind == ResultKind::Different {
            outcome.bounds
        } else {
            None
        },
    })
}

fn trim(
    tool: &dyn ImageTool,
    prefix: &str,
    image: &Path,
    outdir: &Path,
    config: &CompareConfig,
) -> Result<PathBuf> {
    let insets = crop::crop_insets(&image.to_string_lossy(), config.dppx);
    crop::crop_image(tool, prefix, image, outdir, insets)
}

fn write_composite(tool: &dyn ImageTool, before: &Path, after: &Path, outpath: &Path) {
    if let Err(err) = tool.composite(before, after, outpath) {
        warn!(%err, out = %outpath.display(), "Could not render composite");
        return;
    }
    // A two-frame animation reviews better than the static overlay, and the
    // overlay is already on disk if the upgrade fails.
    if let Err(err) = tool.animate(before, after, outpath) {
        debug!(%err, "Keeping static composite");
    }
}

/// Intermediate trimmed copies go away after the comparison; originals are
/// never deleted.
fn cleanup_trimmed(original: &Path, trimmed: &Path) {
    if trimmed != original && trimmed.exists() {
        if let Err(err) = fs::remove_file(trimmed) {
            warn!(%err, path = %trimmed.display(), "Could not remove trimmed intermediate");
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
