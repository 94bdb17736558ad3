use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::ga::candidate::WeightVector;

use super::CandidateCodec;
use super::header::WeightedHeader;

/// Drives the external JPEG XL build: patches predictor weights into the
/// source tree, rebuilds `cjxl`/`djxl` with ninja, and shells out to them for
/// compression. One instance owns the build directory for the whole run.
pub struct JxlCodec {
    header: WeightedHeader,
    build_dir: PathBuf,
    cjxl: PathBuf,
    djxl: PathBuf,
    effort: u8,
}

impl JxlCodec {
    pub fn new(build_dir: PathBuf, context_header: PathBuf, effort: u8) -> Self {
        Self {
            header: WeightedHeader::new(context_header),
            cjxl: build_dir.join("tools/cjxl"),
            djxl: build_dir.join("tools/djxl"),
            build_dir,
            effort,
        }
    }

    /// Preflight: verify the header copies exist, switch to the weighted
    /// predictor, and make sure the tools build. Fatal on failure.
    pub fn setup_weighted(&self) -> Result<()> {
        self.header.ensure_versions_exist()?;
        self.header.use_weighted()?;
        self.rebuild()
    }

    /// Switch back to the stock predictor and rebuild, for baseline passes.
    pub fn setup_original(&self) -> Result<()> {
        self.header.ensure_versions_exist()?;
        self.header.use_original()?;
        self.rebuild()
    }

    fn rebuild(&self) -> Result<()> {
        info!("🔨 Rebuilding JPEG XL tools in `{}`", self.build_dir.display());
        let start = SystemTime::now();

        let output = Command::new("ninja")
            .args(["cjxl", "djxl"])
            .current_dir(&self.build_dir)
            .output()
            .with_context(|| format!("Failed to run ninja in `{}`", self.build_dir.display()))?;

        if !output.status.success() {
            bail!(
                "ninja build failed. Stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        // The header was rewritten just before this rebuild, so a correct
        // build must relink the encoder. A stale binary means the build
        // system missed the change.
        let mtime = fs::metadata(&self.cjxl)
            .with_context(|| format!("Encoder binary missing: `{}`", self.cjxl.display()))?
            .modified()?;
        if mtime < start {
            bail!(
                "Encoder binary `{}` was not refreshed by the rebuild",
                self.cjxl.display()
            );
        }

        debug!("Rebuild succeeded, binaries refreshed");
        Ok(())
    }
}

impl CandidateCodec for JxlCodec {
    fn apply_weights(&mut self, weights: &WeightVector) -> Result<()> {
        self.header.patch_weights(weights)?;
        self.rebuild()
    }

    fn active_weights(&self) -> Result<WeightVector> {
        self.header.read_weights()
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<u64> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let result = Command::new(&self.cjxl)
            .arg(input)
            .arg(output)
            .arg("--distance=0")
            .arg(format!("--effort={}", self.effort))
            .output()
            .with_context(|| format!("Failed to run `{}`", self.cjxl.display()))?;

        if !result.status.success() {
            bail!(
                "cjxl failed on `{}`: {}",
                input.display(),
                String::from_utf8_lossy(&result.stderr)
            );
        }

        Ok(fs::metadata(output)?.len())
    }

    fn decompress(&self, input: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let result = Command::new(&self.djxl)
            .arg(input)
            .arg(output)
            .output()
            .with_context(|| format!("Failed to run `{}`", self.djxl.display()))?;

        if !result.status.success() {
            bail!(
                "djxl failed on `{}`: {}",
                input.display(),
                String::from_utf8_lossy(&result.stderr)
            );
        }

        Ok(())
    }
}
