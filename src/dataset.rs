use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::bail_assert;

/// Collect and validate the image files under `dir`, sorted by name.
///
/// A malformed training set is fatal before any generation runs; the GA has
/// no meaningful work without one.
pub fn collect_images(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    bail_assert!(
        dir.is_dir(),
        "Dataset directory not found: `{}`",
        dir.display()
    );

    let mut paths = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read `{}`", dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if matches {
            // Unreadable files fail now rather than mid-run
            fs::metadata(&path)
                .with_context(|| format!("Unreadable image `{}`", path.display()))?;
            paths.push(path);
        }
    }

    bail_assert!(
        !paths.is_empty(),
        "No images with extensions {:?} found in `{}`",
        extensions,
        dir.display()
    );

    paths.sort();
    Ok(paths)
}

/// Deterministically split `paths` into train and test sets. The shuffle
/// comes from the caller's seeded RNG, so the partition is reproducible.
/// The train set always receives at least one image.
pub fn partition<R: Rng>(
    mut paths: Vec<PathBuf>,
    train_fraction: f64,
    rng: &mut R,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    bail_assert!(!paths.is_empty(), "Cannot partition an empty image set");

    paths.shuffle(rng);
    let split = ((paths.len() as f64 * train_fraction).round() as usize)
        .clamp(1, paths.len());
    let test = paths.split_off(split);
    info!(
        "Partitioned dataset: {} training / {} testing images",
        paths.len(),
        test.len()
    );
    Ok((paths, test))
}
