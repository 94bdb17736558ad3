use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use wopt::blueprint::GaConfig;
use wopt::codec::CandidateCodec;
use wopt::ga::candidate::WeightVector;
use wopt::ga::evaluator::{EvaluationResult, FitnessEvaluator};
use wopt::ga::optimizer::GeneticOptimizer;
use wopt::progress::NullProgress;
use wopt::report::{NullReport, ReportSink};

/// In-memory codec: "compressed size" of any image is the gene sum of the
/// applied weights, so fitness is exactly -(images * gene_sum).
struct StubCodec {
    active: Rc<RefCell<Option<WeightVector>>>,
    fail_apply_for: Option<WeightVector>,
}

impl StubCodec {
    fn new() -> (Self, Rc<RefCell<Option<WeightVector>>>) {
        let active = Rc::new(RefCell::new(None));
        (
            Self {
                active: active.clone(),
                fail_apply_for: None,
            },
            active,
        )
    }
}

impl CandidateCodec for StubCodec {
    fn apply_weights(&mut self, weights: &WeightVector) -> Result<()> {
        if self.fail_apply_for.as_ref() == Some(weights) {
            bail!("stub rebuild failure for {}", weights);
        }
        *self.active.borrow_mut() = Some(*weights);
        Ok(())
    }

    fn active_weights(&self) -> Result<WeightVector> {
        (*self.active.borrow()).context("no weights applied")
    }

    fn compress(&self, _input: &Path, _output: &Path) -> Result<u64> {
        let weights = self.active.borrow().context("no weights applied")?;
        Ok(weights.genes().iter().map(|&g| g as u64).sum())
    }

    fn decompress(&self, _input: &Path, _output: &Path) -> Result<()> {
        Ok(())
    }
}

/// Report sink that remembers every flushed vector, for dedup assertions.
#[derive(Clone, Default)]
struct RecordingReport {
    flushed: Rc<RefCell<Vec<WeightVector>>>,
}

impl ReportSink for RecordingReport {
    fn flush(&mut self, batch: &[(WeightVector, EvaluationResult)]) -> Result<()> {
        self.flushed
            .borrow_mut()
            .extend(batch.iter().map(|(v, _)| *v));
        Ok(())
    }
}

fn small_cfg(seed: u64) -> GaConfig {
    GaConfig {
        population_size: 4,
        generations: 2,
        mutation_rate: 0.0,
        crossover_rate: 1.0,
        elitism_count: 1,
        tournament_size: 2,
        seed: Some(seed),
        report_every: 3,
    }
}

fn build_optimizer(
    cfg: GaConfig,
    codec: StubCodec,
    stats_dir: &Path,
    report: Box<dyn ReportSink>,
) -> GeneticOptimizer<StubCodec> {
    let evaluator = FitnessEvaluator::new(
        codec,
        vec!["a.png".into()],
        stats_dir.join("candidates"),
        false,
    );
    GeneticOptimizer::new(
        "test".to_string(),
        cfg,
        evaluator,
        stats_dir.to_path_buf(),
        Box::new(NullProgress),
        report,
    )
    .unwrap()
}

#[test]
fn identical_seeds_produce_identical_runs() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let (codec_a, _) = StubCodec::new();
    let (codec_b, _) = StubCodec::new();
    let mut opt_a = build_optimizer(small_cfg(42), codec_a, dir_a.path(), Box::new(NullReport));
    let mut opt_b = build_optimizer(small_cfg(42), codec_b, dir_b.path(), Box::new(NullReport));

    let summary_a = opt_a.run().unwrap();
    let summary_b = opt_b.run().unwrap();

    assert_eq!(summary_a.best_weights, summary_b.best_weights);
    assert_eq!(summary_a.best_fitness, summary_b.best_fitness);

    let gens_a: Vec<Vec<WeightVector>> = opt_a
        .generation_records()
        .iter()
        .map(|g| g.candidates.iter().map(|c| c.weights).collect())
        .collect();
    let gens_b: Vec<Vec<WeightVector>> = opt_b
        .generation_records()
        .iter()
        .map(|g| g.candidates.iter().map(|c| c.weights).collect())
        .collect();
    assert_eq!(gens_a, gens_b);
}

#[test]
fn best_fitness_equals_minimum_evaluated_gene_sum() {
    let dir = tempfile::tempdir().unwrap();
    let (codec, _) = StubCodec::new();
    let mut opt = build_optimizer(small_cfg(42), codec, dir.path(), Box::new(NullReport));
    let summary = opt.run().unwrap();

    assert_eq!(opt.generation_records().len(), 2);
    for record in opt.generation_records() {
        assert_eq!(record.candidates.len(), 4);
    }

    let min_sum = opt
        .generation_records()
        .iter()
        .flat_map(|g| &g.candidates)
        .map(|c| c.weights.genes().iter().map(|&g| g as i64).sum::<i64>())
        .min()
        .unwrap();
    assert_eq!(summary.best_fitness, -(min_sum as f64));
    assert_eq!(summary.total_size, min_sum as u64);
}

#[test]
fn best_ever_fitness_is_monotonic_with_elitism() {
    let dir = tempfile::tempdir().unwrap();
    let (codec, _) = StubCodec::new();
    let cfg = GaConfig {
        population_size: 8,
        generations: 6,
        mutation_rate: 0.1,
        crossover_rate: 0.9,
        elitism_count: 2,
        tournament_size: 3,
        seed: Some(7),
        report_every: 2,
    };
    let mut opt = build_optimizer(cfg, codec, dir.path(), Box::new(NullReport));
    opt.run().unwrap();

    let mut best_so_far = f64::NEG_INFINITY;
    let mut per_generation_best = Vec::new();
    for record in opt.generation_records() {
        for c in &record.candidates {
            if c.fitness > best_so_far {
                best_so_far = c.fitness;
            }
        }
        per_generation_best.push(best_so_far);
    }
    assert!(per_generation_best.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn failed_candidate_gets_sentinel_and_never_wins() {
    // First run: find the first candidate the seed produces
    let dir = tempfile::tempdir().unwrap();
    let (codec, _) = StubCodec::new();
    let mut opt = build_optimizer(small_cfg(42), codec, dir.path(), Box::new(NullReport));
    opt.run().unwrap();
    let doomed = opt.generation_records()[0].candidates[0].weights;

    // Second run with the same seed, failing that candidate's rebuild
    let dir = tempfile::tempdir().unwrap();
    let (mut codec, _) = StubCodec::new();
    codec.fail_apply_for = Some(doomed);
    let mut opt = build_optimizer(small_cfg(42), codec, dir.path(), Box::new(NullReport));
    let summary = opt.run().unwrap();

    let record = &opt.generation_records()[0].candidates[0];
    assert_eq!(record.weights, doomed);
    assert_eq!(record.fitness, f64::NEG_INFINITY);

    assert_ne!(summary.best_weights, doomed);
    assert!(summary.best_fitness.is_finite());
    assert!(summary.failed_candidates >= 1);
}

#[test]
fn winning_weights_are_left_applied_on_the_codec() {
    let dir = tempfile::tempdir().unwrap();
    let (codec, active) = StubCodec::new();
    let mut opt = build_optimizer(small_cfg(42), codec, dir.path(), Box::new(NullReport));
    let summary = opt.run().unwrap();

    assert_eq!(*active.borrow(), Some(summary.best_weights));
}

#[test]
fn report_receives_each_vector_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let (codec, _) = StubCodec::new();
    let report = RecordingReport::default();
    let flushed = report.flushed.clone();

    let cfg = GaConfig {
        population_size: 6,
        generations: 5,
        mutation_rate: 0.05,
        crossover_rate: 0.9,
        elitism_count: 2,
        tournament_size: 2,
        seed: Some(99),
        report_every: 2,
    };
    let mut opt = build_optimizer(cfg, codec, dir.path(), Box::new(report));
    let summary = opt.run().unwrap();

    let flushed = flushed.borrow();
    let distinct: HashSet<_> = flushed.iter().collect();
    assert_eq!(flushed.len(), distinct.len());
    // Everything the cache evaluated reached the report exactly once
    assert_eq!(flushed.len(), summary.distinct_evaluations);
}

#[test]
fn snapshot_is_written_every_generation() {
    let dir = tempfile::tempdir().unwrap();
    let (codec, _) = StubCodec::new();
    let mut opt = build_optimizer(small_cfg(42), codec, dir.path(), Box::new(NullReport));
    let summary = opt.run().unwrap();

    let snapshot: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("test_ga_results.json")).unwrap())
            .unwrap();
    assert_eq!(snapshot["run_name"], "test");
    assert_eq!(snapshot["generations_completed"], 2);
    assert_eq!(snapshot["generation_results"].as_array().unwrap().len(), 2);

    let best: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("test_best_weights.json")).unwrap())
            .unwrap();
    assert_eq!(best["total_size"], summary.total_size);
}

#[test]
fn run_fails_when_every_candidate_fails() {
    struct AlwaysFailing;
    impl CandidateCodec for AlwaysFailing {
        fn apply_weights(&mut self, _weights: &WeightVector) -> Result<()> {
            bail!("rebuild always fails")
        }
        fn active_weights(&self) -> Result<WeightVector> {
            bail!("no weights applied")
        }
        fn compress(&self, _input: &Path, _output: &Path) -> Result<u64> {
            bail!("unreachable")
        }
        fn decompress(&self, _input: &Path, _output: &Path) -> Result<()> {
            bail!("unreachable")
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let evaluator = FitnessEvaluator::new(
        AlwaysFailing,
        vec!["a.png".into()],
        dir.path().join("candidates"),
        false,
    );
    let mut opt = GeneticOptimizer::new(
        "test".to_string(),
        small_cfg(42),
        evaluator,
        dir.path().to_path_buf(),
        Box::new(NullProgress),
        Box::new(NullReport),
    )
    .unwrap();

    assert!(opt.run().is_err());
}
