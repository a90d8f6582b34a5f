pub mod compare;
pub mod config;
pub mod crop;
pub mod engine;
pub mod errors;
pub mod lock;
pub mod logging;
pub mod magick;
pub mod record;
pub mod suffix;

pub use compare::{compare_images, is_png_file};
pub use config::CompareConfig;
pub use crop::{crop_image, crop_insets, CropInsets};
pub use engine::{CompareEngine, CompareTotals, ComparisonMap};
pub use errors::{CompareError, Result};
pub use lock::{FileLockProvider, LockGuard, LockProvider, MemoryLockProvider};
pub use magick::{DiffClass, DiffOutcome, ImageMagick, ImageTool, PixelBounds};
pub use record::{DirectoryRecord, ImagePairResult, ResultKind, RECORD_FILE};
