use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{self, CandidateCodec};

use super::candidate::WeightVector;

/// Per-image compression record for one candidate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageResult {
    pub image: String,
    pub size: u64,
    /// Mean absolute pixel error against the source, when measured
    pub mae: Option<f64>,
}

/// Outcome of evaluating one weight vector over the training set.
/// Created once per distinct vector, cached for the run, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Negative total compressed size; higher is better. `-inf` marks a
    /// candidate whose codec rebuild failed.
    pub fitness: f64,
    pub total_size: u64,
    /// Images dropped from the total because their compression failed
    pub skipped_images: usize,
    pub images: Vec<ImageResult>,
}

impl EvaluationResult {
    /// Sentinel result for a candidate that could not be built. Worst
    /// possible fitness, so it can never win selection.
    pub fn failed() -> Self {
        Self {
            fitness: f64::NEG_INFINITY,
            total_size: 0,
            skipped_images: 0,
            images: vec![],
        }
    }

    pub fn is_failure(&self) -> bool {
        self.fitness == f64::NEG_INFINITY
    }
}

/// Runs one candidate's weights over the fixed training set and aggregates
/// compressed sizes into a scalar fitness.
///
/// Owns the codec for the duration of the run: the rebuild target is an
/// exclusive resource, so evaluations are strictly sequential.
pub struct FitnessEvaluator<C> {
    codec: C,
    train_paths: Vec<PathBuf>,
    /// Per-candidate artifacts land under `<candidates_dir>/<tag>/`
    candidates_dir: PathBuf,
    measure_error: bool,
}

impl<C: CandidateCodec> FitnessEvaluator<C> {
    pub fn new(
        codec: C,
        train_paths: Vec<PathBuf>,
        candidates_dir: PathBuf,
        measure_error: bool,
    ) -> Self {
        Self {
            codec,
            train_paths,
            candidates_dir,
            measure_error,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }

    /// Evaluate one candidate. A weight-application or rebuild failure
    /// propagates as an error (the cache converts it to the sentinel result);
    /// a per-image compression failure only drops that image from the total.
    pub fn evaluate(&mut self, vector: &WeightVector) -> Result<EvaluationResult> {
        self.codec
            .apply_weights(vector)
            .with_context(|| format!("Failed to apply weights {}", vector))?;

        let candidate_dir = self.candidates_dir.join(vector.tag());
        fs::create_dir_all(&candidate_dir).with_context(|| {
            format!(
                "Failed to create candidate directory `{}`",
                candidate_dir.display()
            )
        })?;

        let mut total_size = 0u64;
        let mut skipped_images = 0;
        let mut images = Vec::with_capacity(self.train_paths.len());

        for input in &self.train_paths {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let compressed = candidate_dir.join(format!("{}.jxl", stem));

            let size = match self.codec.compress(input, &compressed) {
                Ok(size) => size,
                Err(e) => {
                    warn!("Compression of `{}` failed for {}: {:#}", name, vector, e);
                    skipped_images += 1;
                    continue;
                }
            };

            let mae = if self.measure_error {
                self.reconstruction_error(input, &compressed, &candidate_dir, &name)
            } else {
                None
            };

            total_size += size;
            images.push(ImageResult {
                image: name,
                size,
                mae,
            });
        }

        let fitness = -(total_size as f64);
        debug!(
            "Evaluated {}: total_size={} skipped={}",
            vector, total_size, skipped_images
        );

        Ok(EvaluationResult {
            fitness,
            total_size,
            skipped_images,
            images,
        })
    }

    fn reconstruction_error(
        &self,
        input: &PathBuf,
        compressed: &PathBuf,
        candidate_dir: &PathBuf,
        name: &str,
    ) -> Option<f64> {
        let decompressed = candidate_dir.join(format!("dec_{}", name));
        if let Err(e) = self.codec.decompress(compressed, &decompressed) {
            warn!("Decompression of `{}` failed: {:#}", name, e);
            return None;
        }
        match codec::mean_absolute_error(input, &decompressed) {
            Ok(mae) => Some(mae),
            Err(e) => {
                warn!("MAE for `{}` failed: {:#}", name, e);
                None
            }
        }
    }
}
