//! Platform chrome crop heuristics.
//!
//! Raw captures include OS window decoration whose size depends on platform
//! and DPI. Comparing uncropped captures would flag every titlebar or
//! taskbar rendering change as an application regression, so each platform
//! fingerprint maps to fixed pixel insets that are chopped off both images
//! before diffing.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::magick::ImageTool;

/// Pixel insets to remove from each edge of a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropInsets {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl CropInsets {
    pub fn is_zero(&self) -> bool {
        *self == CropInsets::default()
    }
}

/// Compute the chrome insets for a capture at the given device pixel scale.
///
/// `image_path` is matched as a plain string: the platform fingerprint
/// usually sits in the run directory name (`linux64-20240110/...`), not the
/// basename. Pure function; unrecognized platforms and full-screen captures
/// get all-zero insets.
pub fn crop_insets(image_path: &str, dppx: f64) -> CropInsets {
    if image_path.contains("_fullScreen") {
        return CropInsets::default();
    }

    let scaled = |px: u32| (px as f64 * dppx) as u32;

    if image_path.contains("osx-10-6-") {
        let mut insets = CropInsets {
            top: scaled(22), // titlebar
            right: 0,
            bottom: 110,
            left: 0,
        };
        // Default window state is normal (e.g. devtools), which leaves
        // desktop icons and other windows visible on the right.
        if !image_path.contains("_maximized_") {
            insets.right = 316;
            insets.left = 4;
        }
        insets
    } else if image_path.contains("windows7-")
        || image_path.contains("windows8-64-")
        || image_path.contains("windowsxp-")
    {
        let taskbar = if image_path.contains("windowsxp-") { 30 } else { 40 };
        let mut insets = CropInsets {
            bottom: scaled(taskbar),
            ..Default::default()
        };
        if !image_path.contains("_maximized_") {
            if image_path.contains("windows8-64-") || image_path.contains("windowsxp-") {
                insets = CropInsets {
                    top: 4,
                    right: 316,
                    bottom: 156,
                    left: 4,
                };
            }
            // The Win7 machines default to maximized at their resolution,
            // so only explicitly `_normal_` windows carry extra chrome.
            if image_path.contains("windows7-") && image_path.contains("_normal_") {
                insets.right = 124;
                insets.bottom = 135;
            }
        }
        insets
    } else if image_path.contains("linux32-") || image_path.contains("linux64-") {
        CropInsets {
            top: scaled(24), // titlebar
            ..Default::default()
        }
    } else {
        CropInsets::default()
    }
}

/// Chop the chrome off `image`, writing `<prefix>_<basename>` into `outdir`.
///
/// Returns the original path untouched when there is nothing to remove, so
/// callers can tell intermediates from inputs when cleaning up.
pub fn crop_image(
    tool: &dyn ImageTool,
    prefix: &str,
    image: &Path,
    outdir: &Path,
    insets: CropInsets,
) -> Result<PathBuf> {
    if insets.is_zero() {
        return Ok(image.to_path_buf());
    }

    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let outpath = outdir.join(format!("{prefix}_{name}"));
    tool.chop(image, insets, &outpath)?;
    Ok(outpath)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_platform_gets_zero_insets() {
        assert!(crop_insets("somehost-001/img_tabs.png", 1.0).is_zero());
        assert!(crop_insets("", 2.0).is_zero());
    }

    #[test]
    fn fullscreen_capture_gets_zero_insets() {
        assert!(crop_insets("linux64-20240110/img_tabs_fullScreen.png", 1.0).is_zero());
    }

    #[test]
    fn linux_crops_titlebar_scaled_by_dppx() {
        let insets = crop_insets("linux64-20240110/img_tabs_normal.png", 1.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 24,
                right: 0,
                bottom: 0,
                left: 0
            }
        );

        let hidpi = crop_insets("linux32-20240110/img_tabs_normal.png", 2.0);
        assert_eq!(hidpi.top, 48);
    }

    #[test]
    fn osx_normal_window_crops_desktop_edges() {
        let insets = crop_insets("osx-10-6-20240110/img_tabs_normal.png", 1.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 22,
                right: 316,
                bottom: 110,
                left: 4
            }
        );
    }

    #[test]
    fn osx_maximized_keeps_only_titlebar_and_dock() {
        let insets = crop_insets("osx-10-6-20240110/img_tabs_maximized_x.png", 2.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 44,
                right: 0,
                bottom: 110,
                left: 0
            }
        );
    }

    #[test]
    fn windows7_normal_window_crops_extra_chrome() {
        let insets = crop_insets("windows7-20240110/img_tabs_normal_x.png", 1.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 0,
                right: 124,
                bottom: 135,
                left: 0
            }
        );
    }

    #[test]
    fn windows7_maximized_crops_only_taskbar() {
        let insets = crop_insets("windows7-20240110/img_tabs_maximized_x.png", 2.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 0,
                right: 0,
                bottom: 80,
                left: 0
            }
        );
    }

    #[test]
    fn windowsxp_normal_window_uses_fixed_insets() {
        let insets = crop_insets("windowsxp-20240110/img_tabs_normal_x.png", 1.0);
        assert_eq!(
            insets,
            CropInsets {
                top: 4,
                right: 316,
                bottom: 156,
                left: 4
            }
        );
    }

    #[test]
    fn crop_insets_is_pure() {
        let path = "windows8-64-20240110/img_tabs_normal_x.png";
        assert_eq!(crop_insets(path, 1.5), crop_insets(path, 1.5));
    }
}
