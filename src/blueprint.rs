use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::bail_assert;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Name used to key output directories and stat files
    pub run_name: String,
    pub out_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodecConfig {
    /// JPEG XL build directory containing `tools/cjxl` and `tools/djxl`
    pub build_dir: PathBuf,
    /// Live `context_predict.h` inside the libjxl source tree
    pub context_header: PathBuf,
    /// cjxl effort level (1-10), always paired with `--distance=0`
    #[serde(default = "default_effort")]
    pub effort: u8,
    /// Decompress each image and record mean absolute pixel error
    #[serde(default = "default_true")]
    pub measure_error: bool,
    /// Run a baseline pass with the unmodified predictor before the GA
    #[serde(default)]
    pub baseline: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Directory of source images to validate and partition
    pub image_dir: PathBuf,
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GaConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_elitism_count")]
    pub elitism_count: usize,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Seed for the run's RNG. A fixed seed makes the whole run reproducible.
    pub seed: Option<u64>,
    /// Flush newly evaluated candidates to the report every N generations
    #[serde(default = "default_report_every")]
    pub report_every: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blueprint {
    pub experiment: ExperimentConfig,
    pub codec: CodecConfig,
    pub dataset: DatasetConfig,
    pub ga: GaConfig,
}

impl Blueprint {
    /// Resolve every relative path against the project directory, so a run
    /// behaves the same no matter where the process was started. Absolute
    /// paths pass through untouched.
    pub fn anchor(&mut self, project_dir: &Path) {
        for path in [
            &mut self.experiment.out_dir,
            &mut self.codec.build_dir,
            &mut self.codec.context_header,
            &mut self.dataset.image_dir,
        ] {
            if path.is_relative() {
                *path = project_dir.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        bail_assert!(
            !self.experiment.run_name.is_empty(),
            "experiment.run_name must not be empty"
        );

        bail_assert!(
            self.codec.effort >= 1 && self.codec.effort <= 10,
            "codec.effort must be between 1 and 10"
        );

        bail_assert!(
            self.dataset.train_fraction > 0.0 && self.dataset.train_fraction <= 1.0,
            "dataset.train_fraction must be in (0, 1]"
        );
        bail_assert!(
            !self.dataset.extensions.is_empty(),
            "dataset.extensions must list at least one file extension"
        );

        bail_assert!(
            self.ga.population_size > 0,
            "ga.population_size must be at least 1"
        );
        bail_assert!(
            self.ga.generations > 0,
            "ga.generations must be at least 1"
        );
        bail_assert!(
            self.ga.mutation_rate >= 0.0 && self.ga.mutation_rate <= 1.0,
            "ga.mutation_rate must be between 0 and 1"
        );
        bail_assert!(
            self.ga.crossover_rate >= 0.0 && self.ga.crossover_rate <= 1.0,
            "ga.crossover_rate must be between 0 and 1"
        );
        bail_assert!(
            self.ga.elitism_count < self.ga.population_size,
            "ga.elitism_count must be less than ga.population_size"
        );
        bail_assert!(
            self.ga.tournament_size >= 1,
            "ga.tournament_size must be at least 1"
        );
        bail_assert!(
            self.ga.tournament_size <= self.ga.population_size,
            "ga.tournament_size must not exceed ga.population_size"
        );
        bail_assert!(
            self.ga.report_every >= 1,
            "ga.report_every must be at least 1"
        );

        Ok(())
    }
}

// Defaults match the original W-OP8 harness.

fn default_effort() -> u8 {
    7
}

fn default_true() -> bool {
    true
}

fn default_train_fraction() -> f64 {
    0.8
}

fn default_extensions() -> Vec<String> {
    ["png", "ppm", "pgm"].iter().map(|s| s.to_string()).collect()
}

fn default_population_size() -> usize {
    30
}

fn default_generations() -> usize {
    24
}

fn default_mutation_rate() -> f64 {
    0.05
}

fn default_crossover_rate() -> f64 {
    0.9
}

fn default_elitism_count() -> usize {
    2
}

fn default_tournament_size() -> usize {
    3
}

fn default_report_every() -> usize {
    3
}
