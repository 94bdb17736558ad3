use rand::Rng;
use rand::seq::index;

use crate::blueprint::GaConfig;

use super::candidate::WeightVector;

/// One generation's candidates. Replaced wholesale on each advance; the next
/// generation is built fresh from elites and offspring.
#[derive(Clone, Debug)]
pub struct Population {
    members: Vec<WeightVector>,
}

impl Population {
    pub fn random<R: Rng>(size: usize, rng: &mut R) -> Self {
        let members = (0..size).map(|_| WeightVector::random(rng)).collect();
        Self { members }
    }

    pub fn members(&self) -> &[WeightVector] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Build the next generation from this one's fitness scores.
    ///
    /// Elites carry over unchanged, then offspring pairs fill the remaining
    /// slots. When a pair would overshoot the population size the second
    /// child is dropped. Fully deterministic given the RNG state.
    pub fn next_generation<R: Rng>(
        &self,
        fitnesses: &[f64],
        cfg: &GaConfig,
        rng: &mut R,
    ) -> Population {
        debug_assert_eq!(self.members.len(), fitnesses.len());

        let mut next = Vec::with_capacity(self.members.len());

        // Elitism: top candidates by fitness, stable on ties
        let mut ranked: Vec<usize> = (0..self.members.len()).collect();
        ranked.sort_by(|&a, &b| {
            fitnesses[b]
                .partial_cmp(&fitnesses[a])
                .expect("fitness values are never NaN")
        });
        next.extend(
            ranked
                .iter()
                .take(cfg.elitism_count)
                .map(|&ix| self.members[ix]),
        );

        while next.len() < self.members.len() {
            let parent1 = tournament_select(&self.members, fitnesses, cfg.tournament_size, rng);
            let parent2 = tournament_select(&self.members, fitnesses, cfg.tournament_size, rng);

            let (mut child1, mut child2) =
                WeightVector::crossover(&parent1, &parent2, cfg.crossover_rate, rng);
            child1.mutate(cfg.mutation_rate, rng);
            child2.mutate(cfg.mutation_rate, rng);

            next.push(child1);
            if next.len() < self.members.len() {
                next.push(child2);
            }
        }

        Population { members: next }
    }
}

/// Sample `tournament_size` distinct members uniformly without replacement and
/// return the fittest. Ties go to the first sampled.
fn tournament_select<R: Rng>(
    members: &[WeightVector],
    fitnesses: &[f64],
    tournament_size: usize,
    rng: &mut R,
) -> WeightVector {
    let sampled = index::sample(rng, members.len(), tournament_size);

    let mut best_ix = None;
    let mut best_fitness = f64::NEG_INFINITY;
    for ix in sampled {
        if best_ix.is_none() || fitnesses[ix] > best_fitness {
            best_ix = Some(ix);
            best_fitness = fitnesses[ix];
        }
    }

    members[best_ix.expect("tournament_size is at least 1")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn cfg(population_size: usize) -> GaConfig {
        GaConfig {
            population_size,
            generations: 10,
            mutation_rate: 0.05,
            crossover_rate: 0.9,
            elitism_count: 2,
            tournament_size: 3,
            seed: Some(42),
            report_every: 3,
        }
    }

    fn gene_sum(v: &WeightVector) -> f64 {
        v.genes().iter().map(|&g| g as f64).sum()
    }

    #[test]
    fn size_is_constant_across_generations() {
        for size in [4, 5, 7, 30] {
            let mut rng = StdRng::seed_from_u64(1);
            let cfg = cfg(size);
            let mut pop = Population::random(size, &mut rng);
            for _ in 0..5 {
                let fitnesses: Vec<f64> = pop.members().iter().map(|v| -gene_sum(v)).collect();
                pop = pop.next_generation(&fitnesses, &cfg, &mut rng);
                assert_eq!(pop.len(), size);
            }
        }
    }

    #[test]
    fn elites_survive_unchanged() {
        let mut rng = StdRng::seed_from_u64(2);
        let cfg = cfg(10);
        let pop = Population::random(10, &mut rng);
        let fitnesses: Vec<f64> = pop.members().iter().map(|v| -gene_sum(v)).collect();

        let mut ranked: Vec<usize> = (0..10).collect();
        ranked.sort_by(|&a, &b| fitnesses[b].partial_cmp(&fitnesses[a]).unwrap());

        let next = pop.next_generation(&fitnesses, &cfg, &mut rng);
        assert_eq!(next.members()[0], pop.members()[ranked[0]]);
        assert_eq!(next.members()[1], pop.members()[ranked[1]]);
    }

    #[test]
    fn advance_is_deterministic_for_equal_rng_state() {
        let cfg = cfg(9);
        let mut rng_a = StdRng::seed_from_u64(5);
        let mut rng_b = StdRng::seed_from_u64(5);

        let pop_a = Population::random(9, &mut rng_a);
        let pop_b = Population::random(9, &mut rng_b);
        assert_eq!(pop_a.members(), pop_b.members());

        let fitnesses: Vec<f64> = pop_a.members().iter().map(|v| -gene_sum(v)).collect();
        let next_a = pop_a.next_generation(&fitnesses, &cfg, &mut rng_a);
        let next_b = pop_b.next_generation(&fitnesses, &cfg, &mut rng_b);
        assert_eq!(next_a.members(), next_b.members());
    }

    #[test]
    fn tournament_prefers_fitter_members() {
        let mut rng = StdRng::seed_from_u64(8);
        let members: Vec<WeightVector> = (0..4).map(|_| WeightVector::random(&mut rng)).collect();
        // One member dominates; a full-size tournament must always pick it
        let fitnesses = vec![-100.0, -50.0, -1.0, -200.0];
        for _ in 0..50 {
            let winner = tournament_select(&members, &fitnesses, 4, &mut rng);
            assert_eq!(winner, members[2]);
        }
    }

    #[test]
    fn sentinel_fitness_never_wins_a_full_tournament() {
        let mut rng = StdRng::seed_from_u64(13);
        let members: Vec<WeightVector> = (0..3).map(|_| WeightVector::random(&mut rng)).collect();
        let fitnesses = vec![f64::NEG_INFINITY, -10.0, f64::NEG_INFINITY];
        for _ in 0..50 {
            let winner = tournament_select(&members, &fitnesses, 3, &mut rng);
            assert_eq!(winner, members[1]);
        }
    }
}
