use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of predictor weights in the W-OP8 blend.
pub const NUM_PREDICTORS: usize = 8;
/// Inclusive weight range. Each gene is one hex digit in the codec header.
pub const MIN_WEIGHT: u8 = 0;
pub const MAX_WEIGHT: u8 = 15;

/// One point in the search space: an ordered set of 8 predictor weights.
///
/// Derived `Eq`/`Hash` make this the evaluation cache key; two vectors with
/// equal genes are the same candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightVector(pub [u8; NUM_PREDICTORS]);

impl WeightVector {
    /// Draw a fresh candidate with uniform genes in `[MIN_WEIGHT, MAX_WEIGHT]`.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut genes = [0u8; NUM_PREDICTORS];
        for g in &mut genes {
            *g = rng.random_range(MIN_WEIGHT..=MAX_WEIGHT);
        }
        Self(genes)
    }

    pub fn genes(&self) -> &[u8; NUM_PREDICTORS] {
        &self.0
    }

    /// Uniform crossover: each gene position swaps between the two children
    /// with probability 0.5. With probability `1 - crossover_rate` the parents
    /// pass through unchanged.
    pub fn crossover<R: Rng>(
        parent1: &Self,
        parent2: &Self,
        crossover_rate: f64,
        rng: &mut R,
    ) -> (Self, Self) {
        let mut child1 = *parent1;
        let mut child2 = *parent2;

        if rng.random_range(0.0..1.0) < crossover_rate {
            let bern = Bernoulli::new(0.5).expect("0.5 is a valid probability");
            for i in 0..NUM_PREDICTORS {
                if bern.sample(rng) {
                    std::mem::swap(&mut child1.0[i], &mut child2.0[i]);
                }
            }
        }

        (child1, child2)
    }

    /// Replace each gene with a fresh uniform value with probability
    /// `mutation_rate`, independently per gene.
    pub fn mutate<R: Rng>(&mut self, mutation_rate: f64, rng: &mut R) {
        for g in &mut self.0 {
            if rng.random_range(0.0..1.0) < mutation_rate {
                *g = rng.random_range(MIN_WEIGHT..=MAX_WEIGHT);
            }
        }
    }

    /// Underscore-joined gene string, used for candidate artifact directories
    /// (`w3_0_15_...`).
    pub fn tag(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|g| g.to_string()).collect();
        format!("w{}", parts.join("_"))
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, g) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", g)?;
        }
        write!(f, "]")
    }
}
