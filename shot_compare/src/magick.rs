//! External image tool invocation.
//!
//! The crate never does pixel math itself: classification, cropping and
//! composite rendering are delegated to ImageMagick (`compare`/`convert`),
//! with `apngasm` as an optional upgrade for animated composites. The
//! `ImageTool` trait keeps the comparator and engine testable without the
//! binaries installed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crop::CropInsets;
use crate::errors::{CompareError, Result};

/// Exit classification reported by the diff tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffClass {
    Similar,
    Different,
    /// Tool failure or unusable input, including post-crop dimension
    /// mismatches between the pair.
    Error,
}

/// Bounding box of differing pixels, inclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub top: u32,
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Outcome of one diff invocation.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub class: DiffClass,
    /// Differing pixel count after fuzz; negative when the tool reported
    /// no usable metric.
    pub differing_pixels: i64,
    /// Localization of the change, when the tool could provide one.
    pub bounds: Option<PixelBounds>,
}

/// Capability interface over the external image tooling.
pub trait ImageTool {
    /// Classify a pair and count differing pixels at the given fuzz
    /// percentage, localizing the change when supported.
    fn diff(&self, before: &Path, after: &Path, fuzz_percent: f64) -> Result<DiffOutcome>;

    /// Render a static composite overlay of the pair to `out`.
    fn composite(&self, before: &Path, after: &Path, out: &Path) -> Result<()>;

    /// Upgrade the composite at `out` to a two-frame animation of the
    /// pair. Callers treat failure as non-fatal and keep the static
    /// composite.
    fn animate(&self, before: &Path, after: &Path, out: &Path) -> Result<()>;

    /// Chop `insets` off the edges of `input`, writing the result to `out`.
    fn chop(&self, input: &Path, insets: CropInsets, out: &Path) -> Result<()>;
}

/// ImageMagick-backed implementation shelling out to `compare`/`convert`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageMagick;

/// Per-frame delay for animated composites, in ImageMagick ticks.
const ANIMATION_FRAME_DELAY: &str = "400";

impl ImageMagick {
    /// Verify the required binaries are reachable before any traversal
    /// starts. A missing binary invalidates every comparison, so this is
    /// checked once up front instead of per pair.
    pub fn ensure_available() -> Result<()> {
        for tool in ["compare", "convert"] {
            which::which(tool).map_err(|_| missing_tool(tool))?;
        }
        Ok(())
    }

    /// Stream the per-pixel difference of the pair as text and reduce the
    /// differing coordinates to a bounding box.
    fn locate_differences(
        &self,
        before: &Path,
        after: &Path,
        fuzz_percent: f64,
    ) -> Result<Option<PixelBounds>> {
        let output = run(
            Command::new("convert")
                .arg(before)
                .arg(after)
                .args(["-alpha", "off", "-compose", "difference", "-composite"])
                .args(["-depth", "8", "txt:-"]),
            "convert",
        )?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(bounds_from_pixel_stream(
            &String::from_utf8_lossy(&output.stdout),
            fuzz_percent,
        ))
    }
}

impl ImageTool for ImageMagick {
    fn diff(&self, before: &Path, after: &Path, fuzz_percent: f64) -> Result<DiffOutcome> {
        let fuzz = format!("{fuzz_percent}%");
        let output = run(
            Command::new("compare")
                .args(["-quiet", "-fuzz", fuzz.as_str(), "-metric", "AE"])
                .arg(before)
                .arg(after)
                .arg("null:"),
            "compare",
        )?;

        // `compare` prints the AE metric on stderr; exit 0 means within
        // tolerance, 1 means a real difference, anything else is a tool or
        // input failure.
        let metric = String::from_utf8_lossy(&output.stderr);
        let differing_pixels = metric
            .split_whitespace()
            .next()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value as i64)
            .unwrap_or(-1);

        let class = match output.status.code() {
            Some(0) => DiffClass::Similar,
            Some(1) => DiffClass::Different,
            _ => DiffClass::Error,
        };

        let bounds = if class == DiffClass::Different {
            match self.locate_differences(before, after, fuzz_percent) {
                Ok(bounds) => bounds,
                Err(err) => {
                    warn!(%err, "Could not localize differing pixels");
                    None
                }
            }
        } else {
            None
        };

        Ok(DiffOutcome {
            class,
            differing_pixels,
            bounds,
        })
    }

    fn composite(&self, before: &Path, after: &Path, out: &Path) -> Result<()> {
        // Matching pixels fade to transparent so the changed region pops.
        let output = run(
            Command::new("compare")
                .args(["-quiet", "-lowlight-color", "rgba(255,255,255,0)"])
                .arg(before)
                .arg(after)
                .arg(out),
            "compare",
        )?;

        // `compare` exits 1 for a differing pair even though the composite
        // was written; only a missing output file counts as failure.
        if out.is_file() {
            Ok(())
        } else {
            Err(CompareError::ToolFailed(format!(
                "compare produced no composite at {} (exit {:?})",
                out.display(),
                output.status.code()
            )))
        }
    }

    fn animate(&self, before: &Path, after: &Path, out: &Path) -> Result<()> {
        let mut animated = out.as_os_str().to_owned();
        animated.push(".animated");
        let animated = PathBuf::from(animated);

        let output = run(
            Command::new("apngasm")
                .args(["--force", "--delay", ANIMATION_FRAME_DELAY])
                .arg(out)
                .arg(before)
                .arg(after)
                .arg("--output")
                .arg(&animated),
            "apngasm",
        )?;
        if !output.status.success() {
            return Err(CompareError::ToolFailed(format!(
                "apngasm exited with {:?}",
                output.status.code()
            )));
        }

        // Remove-then-rename keeps Windows happy.
        fs::remove_file(out)?;
        fs::rename(&animated, out)?;
        Ok(())
    }

    fn chop(&self, input: &Path, insets: CropInsets, out: &Path) -> Result<()> {
        let top = format!("0x{}", insets.top);
        let bottom = format!("0x{}", insets.bottom);
        let right = format!("{}x0", insets.right);
        let left = format!("{}x0", insets.left);

        let output = run(
            Command::new("convert")
                .arg(input)
                .args(["-gravity", "North", "-chop", top.as_str()])
                .args(["-gravity", "South", "-chop", bottom.as_str()])
                .args(["-gravity", "East", "-chop", right.as_str()])
                .args(["-gravity", "West", "-chop", left.as_str()])
                .arg(out),
            "convert",
        )?;
        if !output.status.success() {
            // The comparison step classifies the pair as an error if the
            // trimmed file ends up unusable.
            warn!(
                input = %input.display(),
                code = ?output.status.code(),
                "convert -chop exited nonzero"
            );
        }
        Ok(())
    }
}

fn missing_tool(tool: &str) -> CompareError {
    CompareError::ToolNotFound(format!(
        "Ensure that ImageMagick is installed and on your PATH, specifically `{tool}`"
    ))
}

fn run(cmd: &mut Command, tool: &str) -> Result<Output> {
    debug!(command = ?cmd, "Invoking image tool");
    cmd.output().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => missing_tool(tool),
        _ => CompareError::Io(err),
    })
}

/// Parse ImageMagick's text pixel enumeration (`x,y: (r,g,b) #RRGGBB ...`)
/// and fold every pixel whose channel delta exceeds the fuzz fraction into
/// a min/max bounding box over both axes.
fn bounds_from_pixel_stream(stream: &str, fuzz_percent: f64) -> Option<PixelBounds> {
    let mut bounds: Option<PixelBounds> = None;

    for line in stream.lines() {
        let Some((coords, rest)) = line.split_once(':') else {
            continue;
        };
        let Some((x, y)) = parse_coords(coords) else {
            continue;
        };
        let Some(channels) = parse_channels(rest) else {
            continue;
        };
        if !exceeds_fuzz(&channels, fuzz_percent) {
            continue;
        }

        let b = bounds.get_or_insert(PixelBounds {
            top: y,
            left: x,
            right: x,
            bottom: y,
        });
        b.top = b.top.min(y);
        b.left = b.left.min(x);
        b.right = b.right.max(x);
        b.bottom = b.bottom.max(y);
    }

    bounds
}

fn parse_coords(field: &str) -> Option<(u32, u32)> {
    let (x, y) = field.trim().split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Channel values of one enumerated pixel as fractions of full scale.
/// The stream is requested at `-depth 8`, but percent-form values show up
/// in some ImageMagick builds and are handled too.
fn parse_channels(rest: &str) -> Option<Vec<f64>> {
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;

    let mut fractions = Vec::new();
    for value in rest[open + 1..close].split(',') {
        let value = value.trim();
        let fraction = if let Some(percent) = value.strip_suffix('%') {
            percent.trim().parse::<f64>().ok()? / 100.0
        } else {
            value.parse::<f64>().ok()? / 255.0
        };
        fractions.push(fraction);
    }
    Some(fractions)
}

/// A pixel differs when any color channel of the difference image exceeds
/// the fuzz fraction. Only the first three channels participate; a stray
/// alpha channel is always opaque in the difference image.
fn exceeds_fuzz(channels: &[f64], fuzz_percent: f64) -> bool {
    let threshold = fuzz_percent / 100.0;
    channels.iter().take(3).any(|&c| c > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "\
# ImageMagick pixel enumeration: 4,4,255,srgb
0,0: (0,0,0)  #000000  black
1,0: (0,0,0)  #000000  black
2,1: (255,0,0)  #FF0000  red
3,2: (128,128,128)  #808080  grey
1,3: (2,2,2)  #020202  near-black
";

    #[test]
    fn bounds_cover_min_max_of_differing_pixels() {
        let bounds = bounds_from_pixel_stream(STREAM, 3.0).unwrap();
        assert_eq!(
            bounds,
            PixelBounds {
                top: 1,
                left: 2,
                right: 3,
                bottom: 2
            }
        );
    }

    #[test]
    fn all_pixels_within_fuzz_yield_no_bounds() {
        let stream = "0,0: (1,1,1)  #010101  x\n1,1: (2,0,0)  #020000  y\n";
        assert!(bounds_from_pixel_stream(stream, 3.0).is_none());
    }

    #[test]
    fn fuzz_threshold_is_a_fraction_of_full_scale() {
        // 128/255 is just above 50%.
        let stream = "5,7: (128,0,0)  #800000  x\n";
        assert!(bounds_from_pixel_stream(stream, 50.0).is_some());
        assert!(bounds_from_pixel_stream(stream, 51.0).is_none());
    }

    #[test]
    fn percent_channels_are_understood() {
        let stream = "2,3: (100%, 0%, 0%)  #FF0000  red\n";
        let bounds = bounds_from_pixel_stream(stream, 3.0).unwrap();
        assert_eq!(bounds.left, 2);
        assert_eq!(bounds.top, 3);
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let stream = "1,1: (0,0,0,255)  #000000FF  black\n";
        assert!(bounds_from_pixel_stream(stream, 3.0).is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let stream = "garbage\n# comment\n9,9 (1,1,1)\n4,4: (255,255,255)  #FFFFFF  white\n";
        let bounds = bounds_from_pixel_stream(stream, 3.0).unwrap();
        assert_eq!(
            bounds,
            PixelBounds {
                top: 4,
                left: 4,
                right: 4,
                bottom: 4
            }
        );
    }
}
