use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::warn;

use super::candidate::WeightVector;
use super::evaluator::EvaluationResult;

/// Memoizes evaluation results by weight vector so each distinct candidate
/// pays the rebuild-and-compress cost at most once per run.
///
/// Also tracks which vectors have not yet been flushed to the report sink, so
/// repeated flushes never emit duplicate rows. No eviction; the cache lives
/// for one optimization run.
#[derive(Default)]
pub struct EvaluationCache {
    entries: HashMap<WeightVector, EvaluationResult>,
    /// Vectors evaluated since the last report flush, in evaluation order
    dirty: Vec<WeightVector>,
    reported: HashSet<WeightVector>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `vector`, computing it first on a miss.
    ///
    /// A failed computation is stored as the sentinel worst-fitness result so
    /// the candidate is never retried and never wins selection, but the run
    /// continues.
    pub fn get_or_compute<F>(&mut self, vector: WeightVector, compute: F) -> EvaluationResult
    where
        F: FnOnce(&WeightVector) -> Result<EvaluationResult>,
    {
        if let Some(result) = self.entries.get(&vector) {
            return result.clone();
        }

        let result = match compute(&vector) {
            Ok(result) => result,
            Err(e) => {
                warn!("Evaluation of {} failed: {:#}", vector, e);
                EvaluationResult::failed()
            }
        };

        self.entries.insert(vector, result.clone());
        self.dirty.push(vector);
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `vector` has already been handed to the report sink.
    pub fn is_reported(&self, vector: &WeightVector) -> bool {
        self.reported.contains(vector)
    }

    /// Drain the dirty set, returning the not-yet-reported results in
    /// evaluation order and marking them reported. A second call without new
    /// evaluations returns nothing.
    pub fn take_unreported(&mut self) -> Vec<(WeightVector, EvaluationResult)> {
        let mut batch = Vec::with_capacity(self.dirty.len());
        for vector in self.dirty.drain(..) {
            if self.reported.insert(vector) {
                let result = self.entries[&vector].clone();
                batch.push((vector, result));
            }
        }
        batch
    }
}
