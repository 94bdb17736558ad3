use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info};

use crate::bail_assert;
use crate::ga::candidate::{NUM_PREDICTORS, WeightVector};

/// Matches `const uint32_t wN = 0x...;` weight constants in the predictor
/// header, capturing prefix, index, hex value, and trailer.
const WEIGHT_PATTERN: &str = r"^\s*(const\s+uint32_t\s+w(\d)\s*=\s*0x)([0-9a-fA-F]+)(\s*;.*)$";

/// Manages the live `context_predict.h` and its two pristine copies: the
/// stock JPEG XL predictor and the weighted W-OP8 variant. Candidate weights
/// are patched into the weighted variant in place.
pub struct WeightedHeader {
    live_path: PathBuf,
    original_copy: PathBuf,
    weighted_copy: PathBuf,
    pattern: Regex,
}

impl WeightedHeader {
    /// `live_path` is the header inside the libjxl source tree. The pristine
    /// copies are expected next to it as `context_predict_original.h` and
    /// `context_predict_wop8.h`.
    pub fn new(live_path: PathBuf) -> Self {
        let dir = live_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            original_copy: dir.join("context_predict_original.h"),
            weighted_copy: dir.join("context_predict_wop8.h"),
            live_path,
            pattern: Regex::new(WEIGHT_PATTERN).expect("weight pattern is valid"),
        }
    }

    /// Both pristine copies must exist before a run starts; there is no
    /// interactive bootstrap.
    pub fn ensure_versions_exist(&self) -> Result<()> {
        bail_assert!(
            self.live_path.exists(),
            "Context header not found: `{}`",
            self.live_path.display()
        );
        bail_assert!(
            self.original_copy.exists(),
            "Original predictor copy not found: `{}`. Save the stock context_predict.h there before running.",
            self.original_copy.display()
        );
        bail_assert!(
            self.weighted_copy.exists(),
            "W-OP8 predictor copy not found: `{}`. Save the weighted context_predict.h there before running.",
            self.weighted_copy.display()
        );
        Ok(())
    }

    /// Swap the stock predictor into the live tree (baseline passes).
    pub fn use_original(&self) -> Result<()> {
        fs::copy(&self.original_copy, &self.live_path).with_context(|| {
            format!(
                "Failed to switch to original predictor (`{}` -> `{}`)",
                self.original_copy.display(),
                self.live_path.display()
            )
        })?;
        info!("Switched to original JPEG XL predictor");
        Ok(())
    }

    /// Swap the weighted predictor into the live tree.
    pub fn use_weighted(&self) -> Result<()> {
        fs::copy(&self.weighted_copy, &self.live_path).with_context(|| {
            format!(
                "Failed to switch to weighted predictor (`{}` -> `{}`)",
                self.weighted_copy.display(),
                self.live_path.display()
            )
        })?;
        debug!("Switched to W-OP8 predictor");
        Ok(())
    }

    /// Rewrite the eight `wN` constants in the live header, then refresh the
    /// weighted copy so the change survives later version switches.
    pub fn patch_weights(&self, weights: &WeightVector) -> Result<()> {
        self.use_weighted()?;

        let contents = fs::read_to_string(&self.live_path)
            .with_context(|| format!("Failed to read `{}`", self.live_path.display()))?;

        let mut updated = 0;
        let mut out = String::with_capacity(contents.len());
        for line in contents.lines() {
            if let Some(caps) = self.pattern.captures(line) {
                let index: usize = caps[2].parse()?;
                if index < NUM_PREDICTORS {
                    out.push_str(&format!(
                        "{}{:x}{}",
                        &caps[1],
                        weights.genes()[index],
                        &caps[4]
                    ));
                    updated += 1;
                    out.push('\n');
                    continue;
                }
            }
            out.push_str(line);
            out.push('\n');
        }

        bail_assert!(
            updated == NUM_PREDICTORS,
            "Expected {} weight constants in `{}`, patched {}",
            NUM_PREDICTORS,
            self.live_path.display(),
            updated
        );

        fs::write(&self.live_path, &out)
            .with_context(|| format!("Failed to write `{}`", self.live_path.display()))?;
        fs::copy(&self.live_path, &self.weighted_copy)?;

        debug!("Patched weights {} into predictor header", weights);
        Ok(())
    }

    /// Parse the weights currently bound in the live header.
    pub fn read_weights(&self) -> Result<WeightVector> {
        let contents = fs::read_to_string(&self.live_path)
            .with_context(|| format!("Failed to read `{}`", self.live_path.display()))?;

        let mut genes = [None; NUM_PREDICTORS];
        for line in contents.lines() {
            if let Some(caps) = self.pattern.captures(line) {
                let index: usize = caps[2].parse()?;
                if index < NUM_PREDICTORS {
                    let value = u8::from_str_radix(&caps[3], 16)
                        .with_context(|| format!("Invalid weight hex `{}`", &caps[3]))?;
                    genes[index] = Some(value);
                }
            }
        }

        let mut out = [0u8; NUM_PREDICTORS];
        for (i, gene) in genes.into_iter().enumerate() {
            match gene {
                Some(v) => out[i] = v,
                None => bail!(
                    "Weight constant w{} missing from `{}`",
                    i,
                    self.live_path.display()
                ),
            }
        }

        Ok(WeightVector(out))
    }

    pub fn live_path(&self) -> &Path {
        &self.live_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HEADER: &str = "\
// modular predictor blend
namespace jxl {
const uint32_t w0 = 0xd;  // weighted average
const uint32_t w1 = 0x1;
const uint32_t w2 = 0x2;
const uint32_t w3 = 0x3;
const uint32_t w4 = 0x4;
const uint32_t w5 = 0x5;
const uint32_t w6 = 0x6;
const uint32_t w7 = 0xf;
const uint32_t kOther = 0xdead;
}  // namespace jxl
";

    fn fixture() -> (tempfile::TempDir, WeightedHeader) {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("context_predict.h");
        fs::write(&live, SAMPLE_HEADER).unwrap();
        fs::write(dir.path().join("context_predict_original.h"), SAMPLE_HEADER).unwrap();
        fs::write(dir.path().join("context_predict_wop8.h"), SAMPLE_HEADER).unwrap();
        (dir, WeightedHeader::new(live))
    }

    #[test]
    fn reads_weights_from_header() {
        let (_dir, header) = fixture();
        assert_eq!(
            header.read_weights().unwrap(),
            WeightVector([13, 1, 2, 3, 4, 5, 6, 15])
        );
    }

    #[test]
    fn patch_then_read_round_trips() {
        let (_dir, header) = fixture();
        let v = WeightVector([15, 0, 7, 3, 11, 2, 9, 1]);
        header.patch_weights(&v).unwrap();
        assert_eq!(header.read_weights().unwrap(), v);

        // The weighted copy was refreshed too
        let copy = fs::read_to_string(header.weighted_copy.clone()).unwrap();
        assert!(copy.contains("const uint32_t w0 = 0xf;"));
    }

    #[test]
    fn patch_preserves_unrelated_lines() {
        let (_dir, header) = fixture();
        header.patch_weights(&WeightVector([0; 8])).unwrap();
        let contents = fs::read_to_string(header.live_path()).unwrap();
        assert!(contents.contains("const uint32_t kOther = 0xdead;"));
        assert!(contents.contains("// weighted average"));
        assert!(contents.contains("namespace jxl {"));
    }

    #[test]
    fn patch_fails_on_missing_constants() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("context_predict.h");
        fs::write(&live, "const uint32_t w0 = 0x1;\n").unwrap();
        fs::write(dir.path().join("context_predict_original.h"), "").unwrap();
        fs::write(dir.path().join("context_predict_wop8.h"), "const uint32_t w0 = 0x1;\n")
            .unwrap();

        let header = WeightedHeader::new(live);
        assert!(header.patch_weights(&WeightVector([0; 8])).is_err());
    }

    #[test]
    fn missing_copies_fail_the_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("context_predict.h");
        fs::write(&live, SAMPLE_HEADER).unwrap();

        let header = WeightedHeader::new(live);
        assert!(header.ensure_versions_exist().is_err());
    }
}
