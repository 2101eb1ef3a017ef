//! Baseline collection tool: runs pose estimation over a directory of
//! reference stills and writes the aggregated baseline snapshot.
//!
//! Usage: collect_baseline <stills_dir> [median|average]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use formcheck::baseline::{collect_baseline, AggregateMethod};
use formcheck::config::Config;
use formcheck::pose::{normalize, MoveNetEstimator, PoseEstimator};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

fn list_image_files(dir: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read stills dir {}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(stills_dir) = args.get(1) else {
        bail!("usage: collect_baseline <stills_dir> [median|average]");
    };
    let method: AggregateMethod = match args.get(2) {
        Some(s) => s.parse()?,
        None => AggregateMethod::default(),
    };

    let config = Config::load_or_default("formcheck.toml")?;
    eprintln!("Model: {}", config.server.model_path);
    let mut estimator = MoveNetEstimator::new(&config.server.model_path)?;

    let files = list_image_files(stills_dir)?;
    if files.is_empty() {
        bail!("no image files in {}", stills_dir);
    }

    let mut frames = Vec::new();
    for path in &files {
        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                eprintln!("Skipping {} (unreadable: {})", path.display(), e);
                continue;
            }
        };
        let det = estimator.detect(&image)?;
        let frame = normalize(&det);
        if frame.is_empty() {
            eprintln!("Skipping {} (no pose detected)", path.display());
            continue;
        }
        eprintln!("{}: {} joints", path.display(), frame.joint_count());
        frames.push(frame);
    }

    let baseline = collect_baseline(&frames, method)?;
    baseline.save(&config.server.baseline_path)?;
    eprintln!(
        "Baseline from {} of {} stills ({:?}) written to {}",
        baseline.sample_count,
        files.len(),
        method,
        config.server.baseline_path
    );
    Ok(())
}
