pub mod header;
pub mod jxl;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::ga::candidate::WeightVector;

/// Capability interface over the weighted codec build.
///
/// The production implementation patches predictor weights into the libjxl
/// source tree and shells out to `cjxl`/`djxl`; tests substitute in-memory
/// stubs. Applying weights mutates a shared compiled artifact, so one codec
/// instance must never serve two concurrent evaluations.
pub trait CandidateCodec {
    /// Persist `weights` into the live codec configuration and rebuild.
    fn apply_weights(&mut self, weights: &WeightVector) -> Result<()>;

    /// Read back the weights currently baked into the codec.
    fn active_weights(&self) -> Result<WeightVector>;

    /// Compress `input` to `output`, returning the compressed size in bytes.
    fn compress(&self, input: &Path, output: &Path) -> Result<u64>;

    fn decompress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Compress labelled image sets with whatever predictor the codec currently
/// carries, writing one CSV row per image. Used for the baseline pass and for
/// the post-GA held-out test pass. Per-image failures are logged and skipped.
///
/// Artifacts land under `<artifact_dir>/<label>/`; rows are
/// `set,image,size_bytes,mae`.
pub fn compress_dataset<C: CandidateCodec>(
    codec: &C,
    sets: &[(&str, &[PathBuf])],
    artifact_dir: &Path,
    report_path: &Path,
    measure_error: bool,
) -> Result<()> {
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(report_path)
        .with_context(|| format!("Failed to create report file `{}`", report_path.display()))?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["set", "image", "size_bytes", "mae"])?;

    for (label, paths) in sets {
        let set_dir = artifact_dir.join(label);
        fs::create_dir_all(&set_dir)?;

        for input in *paths {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let compressed = set_dir.join(format!("{}.jxl", stem));

            let size = match codec.compress(input, &compressed) {
                Ok(size) => size,
                Err(e) => {
                    warn!("Compression of `{}` failed: {:#}", name, e);
                    continue;
                }
            };

            let mae = if measure_error {
                let decompressed = set_dir.join(format!("dec_{}", name));
                codec
                    .decompress(&compressed, &decompressed)
                    .and_then(|_| mean_absolute_error(input, &decompressed))
                    .ok()
            } else {
                None
            };

            wtr.write_record([
                label.to_string(),
                name,
                size.to_string(),
                mae.map(|m| m.to_string()).unwrap_or_default(),
            ])?;
        }
    }
    wtr.flush()?;

    Ok(())
}

/// Mean absolute pixel error between two images, over RGB channels.
pub fn mean_absolute_error(a: &Path, b: &Path) -> Result<f64> {
    let img_a = image::open(a)
        .with_context(|| format!("Failed to open image `{}`", a.display()))?
        .to_rgb8();
    let img_b = image::open(b)
        .with_context(|| format!("Failed to open image `{}`", b.display()))?
        .to_rgb8();

    if img_a.dimensions() != img_b.dimensions() {
        bail!(
            "Image dimensions don't match: {:?} vs {:?}",
            img_a.dimensions(),
            img_b.dimensions()
        );
    }

    let total: f64 = img_a
        .as_raw()
        .iter()
        .zip(img_b.as_raw())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum();

    Ok(total / img_a.as_raw().len() as f64)
}
