use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::blueprint::GaConfig;
use crate::codec::CandidateCodec;
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::report::ReportSink;

use super::cache::EvaluationCache;
use super::candidate::WeightVector;
use super::evaluator::FitnessEvaluator;
use super::population::Population;

/// One evaluated candidate inside a generation snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub weights: WeightVector,
    /// `null` in JSON for failed candidates (non-finite floats don't
    /// serialize)
    pub fitness: f64,
    pub total_size: u64,
}

/// Snapshot of one generation's evaluated candidates, appended per
/// generation and persisted for post-hoc audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub candidates: Vec<CandidateRecord>,
}

#[derive(Serialize)]
struct RunSnapshot<'a> {
    run_name: &'a str,
    generations_completed: usize,
    best_candidate: Option<WeightVector>,
    best_fitness: f64,
    generation_results: &'a [GenerationRecord],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub best_weights: WeightVector,
    pub best_fitness: f64,
    pub total_size: u64,
    pub distinct_evaluations: usize,
    pub failed_candidates: usize,
}

/// Drives the generation loop: evaluate through the cache, track the
/// best-ever candidate, advance the population, persist snapshots, and leave
/// the codec configured with the winning weights.
///
/// Strictly sequential. The codec's rebuild target is an exclusive resource,
/// so candidates are evaluated one at a time in population order.
pub struct GeneticOptimizer<C: CandidateCodec> {
    run_name: String,
    cfg: GaConfig,
    evaluator: FitnessEvaluator<C>,
    cache: EvaluationCache,
    rng: StdRng,
    stats_dir: PathBuf,
    progress: Box<dyn ProgressSink>,
    report: Box<dyn ReportSink>,
    generation_records: Vec<GenerationRecord>,
}

impl<C: CandidateCodec> GeneticOptimizer<C> {
    pub fn new(
        run_name: String,
        cfg: GaConfig,
        evaluator: FitnessEvaluator<C>,
        stats_dir: PathBuf,
        progress: Box<dyn ProgressSink>,
        report: Box<dyn ReportSink>,
    ) -> Result<Self> {
        fs::create_dir_all(&stats_dir).with_context(|| {
            format!("Failed to create stats directory `{}`", stats_dir.display())
        })?;

        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            run_name,
            cfg,
            evaluator,
            cache: EvaluationCache::new(),
            rng,
            stats_dir,
            progress,
            report,
            generation_records: Vec::with_capacity(cfg.generations),
        })
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        info!(
            "🧬 Starting GA run `{}`: population={} generations={}",
            self.run_name, self.cfg.population_size, self.cfg.generations
        );

        let mut population = Population::random(self.cfg.population_size, &mut self.rng);
        let mut best: Option<(WeightVector, f64)> = None;
        let mut failed_candidates = 0;
        let mut generation_times: Vec<Duration> = Vec::with_capacity(self.cfg.generations);

        for generation in 0..self.cfg.generations {
            let gen_start = Instant::now();
            let eta = estimate_remaining(&generation_times, self.cfg.generations - generation);

            let mut fitnesses = Vec::with_capacity(population.len());
            let mut candidates = Vec::with_capacity(population.len());

            for (ix, &candidate) in population.members().iter().enumerate() {
                let evaluator = &mut self.evaluator;
                let result = self
                    .cache
                    .get_or_compute(candidate, |v| evaluator.evaluate(v));

                if result.is_failure() {
                    failed_candidates += 1;
                }

                if best.is_none_or(|(_, f)| result.fitness > f) {
                    best = Some((candidate, result.fitness));
                    info!(
                        "🏆 New best: {} (fitness {})",
                        candidate, result.fitness
                    );
                }

                fitnesses.push(result.fitness);
                candidates.push(CandidateRecord {
                    weights: candidate,
                    fitness: result.fitness,
                    total_size: result.total_size,
                });

                self.progress.emit(&ProgressEvent {
                    phase: Phase::Evaluating,
                    generation,
                    total_generations: self.cfg.generations,
                    candidate: Some(ix),
                    best_weights: best.map(|(w, _)| w),
                    best_fitness: best.map(|(_, f)| f).unwrap_or(f64::NEG_INFINITY),
                    eta,
                });
            }

            self.generation_records.push(GenerationRecord {
                generation,
                candidates,
            });

            let last = generation == self.cfg.generations - 1;
            if generation % self.cfg.report_every == 0 || last {
                self.flush_report()?;
            }

            population = population.next_generation(&fitnesses, &self.cfg, &mut self.rng);
            self.persist_snapshot(generation + 1, &best)?;

            generation_times.push(gen_start.elapsed());
            let eta = estimate_remaining(&generation_times, self.cfg.generations - generation - 1);
            self.progress.emit(&ProgressEvent {
                phase: Phase::Advancing,
                generation,
                total_generations: self.cfg.generations,
                candidate: None,
                best_weights: best.map(|(w, _)| w),
                best_fitness: best.map(|(_, f)| f).unwrap_or(f64::NEG_INFINITY),
                eta,
            });
        }

        self.finalize(best, failed_candidates)
    }

    fn finalize(
        &mut self,
        best: Option<(WeightVector, f64)>,
        failed_candidates: usize,
    ) -> Result<RunSummary> {
        let Some((best_weights, best_fitness)) = best.filter(|(_, f)| f.is_finite()) else {
            bail!("No candidate survived evaluation; every codec rebuild failed");
        };

        // Leave the codec configured with the winning weights
        self.evaluator
            .codec_mut()
            .apply_weights(&best_weights)
            .context("Failed to re-apply best weights to the codec")?;

        let summary = RunSummary {
            best_weights,
            best_fitness,
            total_size: (-best_fitness) as u64,
            distinct_evaluations: self.cache.len(),
            failed_candidates,
        };

        let path = self
            .stats_dir
            .join(format!("{}_best_weights.json", self.run_name));
        fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        self.progress.emit(&ProgressEvent {
            phase: Phase::Finalizing,
            generation: self.cfg.generations,
            total_generations: self.cfg.generations,
            candidate: None,
            best_weights: Some(best_weights),
            best_fitness,
            eta: None,
        });

        if failed_candidates > 0 {
            warn!("{} candidate evaluations failed during the run", failed_candidates);
        }
        info!(
            "🏁 Run `{}` finished: best {} total_size={} ({} distinct evaluations)",
            self.run_name, best_weights, summary.total_size, summary.distinct_evaluations
        );

        Ok(summary)
    }

    fn flush_report(&mut self) -> Result<()> {
        let batch = self.cache.take_unreported();
        if !batch.is_empty() {
            self.report.flush(&batch)?;
        }
        Ok(())
    }

    fn persist_snapshot(
        &self,
        generations_completed: usize,
        best: &Option<(WeightVector, f64)>,
    ) -> Result<()> {
        let snapshot = RunSnapshot {
            run_name: &self.run_name,
            generations_completed,
            best_candidate: best.map(|(w, _)| w),
            best_fitness: best.map(|(_, f)| f).unwrap_or(f64::NEG_INFINITY),
            generation_results: &self.generation_records,
        };

        let path = self
            .stats_dir
            .join(format!("{}_ga_results.json", self.run_name));
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        Ok(())
    }

    pub fn evaluator(&self) -> &FitnessEvaluator<C> {
        &self.evaluator
    }

    pub fn generation_records(&self) -> &[GenerationRecord] {
        &self.generation_records
    }
}

fn estimate_remaining(times: &[Duration], generations_left: usize) -> Option<Duration> {
    if times.is_empty() {
        return None;
    }
    let avg = times.iter().sum::<Duration>() / times.len() as u32;
    Some(avg * generations_left as u32)
}
