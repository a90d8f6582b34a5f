use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use shot_compare::logging::{self, LogConfig};
use shot_compare::{
    compare_images, CompareConfig, CompareEngine, FileLockProvider, ImageMagick,
};

#[derive(Parser)]
#[command(name = "shotcompare")]
#[command(version, about = "Compare screenshot files or directories for differences", long_about = None)]
struct Cli {
    /// Image file or directory of images from the before run.
    before: PathBuf,

    /// Image file or directory of images from the after run.
    after: PathBuf,

    /// Scale factor to use for cropping system UI.
    #[arg(long, default_value_t = 1.0)]
    dppx: f64,

    /// Directory to output JSON and composite images to.
    #[arg(short, long, value_name = "DIRECTORY")]
    output: Option<PathBuf>,

    /// Fuzz tolerance, in percent of color-channel slack.
    #[arg(long, value_name = "PERCENT", default_value_t = 3.0)]
    fuzz: f64,

    /// Output a composite image even when images are "similar".
    #[arg(long)]
    output_similar_composite: bool,

    /// Whether to overwrite an existing directory comparison.
    #[arg(long)]
    overwrite: bool,

    /// Merge already-completed directory records into the results.
    #[arg(long)]
    include_completed: bool,

    /// Write the full log stream to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init_logging(LogConfig {
        log_file: cli.log_file.clone(),
        ..Default::default()
    });

    // A missing binary invalidates every comparison, so fail up front with
    // an actionable message instead of per pair.
    ImageMagick::ensure_available()?;

    let config = CompareConfig::default()
        .with_dppx(cli.dppx)
        .with_fuzz_tolerance(cli.fuzz)
        .with_overwrite(cli.overwrite)
        .with_include_completed(cli.include_completed)
        .with_output_similar_composite(cli.output_similar_composite);

    let outdir = match cli.output {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Error creating directory: {}", dir.display()))?;
            dir
        }
        // The temp directory holds the records the caller came for, so it
        // is kept rather than cleaned up on exit.
        None => tempfile::tempdir()?.keep(),
    };

    let tool = ImageMagick;
    let locks = FileLockProvider;

    if cli.before.is_dir() && cli.after.is_dir() {
        let engine = CompareEngine::new(&tool, &locks, config);
        engine.compare_dirs(&cli.before, &cli.after, &outdir)?;
    } else if cli.before.is_file() && cli.after.is_file() {
        println!();
        let result = compare_images(&tool, &cli.before, &cli.after, &outdir, &outdir, &config)?;
        match result.difference {
            Some(difference) => println!("{} ({difference} differing pixels)", result.kind),
            None => println!("{}", result.kind),
        }
    } else {
        bail!("Two files or two directories expected");
    }

    println!("Image comparison results: {}", outdir.display());
    Ok(())
}
