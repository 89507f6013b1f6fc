//! Sampling engine: the seam between the learner and the Gibbs machinery.
//!
//! The learner only ever sees the [`SamplingEngine`] trait: given a compiled
//! graph and a weight vector, return sample-derived sufficient statistics.
//! That keeps the optimizer testable against a deterministic mock engine and
//! keeps any parallelism an implementation detail behind a synchronous call.
//!
//! [`GibbsSampler`] is the built-in engine. True-label variables for distinct
//! candidates are conditionally independent given the weights, so each
//! candidate's single-site conditional is the exact posterior and the chain
//! mixes in one step; the engine draws directly from it and parallelizes
//! across candidates with rayon. A fixed seed reproduces the same draws
//! regardless of thread count (each candidate gets a derived RNG stream).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::dependencies::Dependency;
use crate::error::ModelError;
use crate::graph::{FactorGraph, Weights};

/// Options for one sampling round.
#[derive(Debug, Clone, Copy)]
pub struct SampleOptions {
    /// Gibbs draws per candidate. Must be at least 1.
    pub samples_per_candidate: usize,
    pub seed: u64,
}

/// Empirical and model-expected factor activations from one sampling round,
/// averaged over candidates (and draws, where the activation depends on the
/// sampled label). Ephemeral: recomputed every epoch and consumed by the
/// weight update that follows.
#[derive(Debug, Clone)]
pub struct SufficientStats {
    pub acc_observed: Vec<f64>,
    pub acc_expected: Vec<f64>,
    pub prop_observed: Vec<f64>,
    pub prop_expected: Vec<f64>,
    pub prior_observed: Vec<f64>,
    pub prior_expected: Vec<f64>,
    pub dep_observed: Vec<f64>,
    pub dep_expected: Vec<f64>,
    /// Per-candidate visitation frequency of each class (row-major,
    /// `n * cardinality`), normalized over draws. Zero outside a candidate's
    /// declared range. Drives marginal inference and the Monte-Carlo
    /// accuracy estimate.
    class_visits: Vec<f64>,
    cardinality: usize,
}

impl SufficientStats {
    /// All-zero statistics with the given shape. Intended for mock engines
    /// in optimizer tests; a real engine fills every field.
    pub fn zeros(n_lfs: usize, cardinality: usize, n_candidates: usize, n_deps: usize) -> Self {
        SufficientStats {
            acc_observed: vec![0.0; n_lfs],
            acc_expected: vec![0.0; n_lfs],
            prop_observed: vec![0.0; n_lfs],
            prop_expected: vec![0.0; n_lfs],
            prior_observed: vec![0.0; cardinality],
            prior_expected: vec![0.0; cardinality],
            dep_observed: vec![0.0; n_deps],
            dep_expected: vec![0.0; n_deps],
            class_visits: vec![0.0; n_candidates * cardinality],
            cardinality,
        }
    }

    /// Visitation frequencies for one candidate, length = cardinality.
    pub fn visits(&self, candidate: usize) -> &[f64] {
        let start = candidate * self.cardinality;
        &self.class_visits[start..start + self.cardinality]
    }
}

/// The external-collaborator contract: one synchronous sampling round.
pub trait SamplingEngine {
    fn sample(
        &self,
        graph: &FactorGraph,
        weights: &Weights,
        options: &SampleOptions,
    ) -> Result<SufficientStats, ModelError>;
}

/// Built-in Gibbs sampling engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct GibbsSampler;

struct Accumulator {
    acc_observed: Vec<f64>,
    acc_expected: Vec<f64>,
    prop_observed: Vec<f64>,
    prop_expected: Vec<f64>,
    prior_observed: Vec<f64>,
    prior_expected: Vec<f64>,
    dep_observed: Vec<f64>,
    dep_expected: Vec<f64>,
    class_visits: Vec<f64>,
}

impl Accumulator {
    fn new(graph: &FactorGraph) -> Self {
        Accumulator {
            acc_observed: vec![0.0; graph.n_lfs()],
            acc_expected: vec![0.0; graph.n_lfs()],
            prop_observed: vec![0.0; graph.n_lfs()],
            prop_expected: vec![0.0; graph.n_lfs()],
            prior_observed: vec![0.0; graph.cardinality()],
            prior_expected: vec![0.0; graph.cardinality()],
            dep_observed: vec![0.0; graph.dependencies().len()],
            dep_expected: vec![0.0; graph.dependencies().len()],
            class_visits: vec![0.0; graph.n_candidates() * graph.cardinality()],
        }
    }

    fn merge(mut self, other: Accumulator) -> Accumulator {
        let pairs: [(&mut Vec<f64>, &Vec<f64>); 9] = [
            (&mut self.acc_observed, &other.acc_observed),
            (&mut self.acc_expected, &other.acc_expected),
            (&mut self.prop_observed, &other.prop_observed),
            (&mut self.prop_expected, &other.prop_expected),
            (&mut self.prior_observed, &other.prior_observed),
            (&mut self.prior_expected, &other.prior_expected),
            (&mut self.dep_observed, &other.dep_observed),
            (&mut self.dep_expected, &other.dep_expected),
            (&mut self.class_visits, &other.class_visits),
        ];
        for (lhs, rhs) in pairs {
            for (a, b) in lhs.iter_mut().zip(rhs) {
                *a += b;
            }
        }
        self
    }
}

impl SamplingEngine for GibbsSampler {
    fn sample(
        &self,
        graph: &FactorGraph,
        weights: &Weights,
        options: &SampleOptions,
    ) -> Result<SufficientStats, ModelError> {
        if options.samples_per_candidate == 0 {
            return Err(ModelError::Sampling(
                "samples_per_candidate must be at least 1".to_string(),
            ));
        }
        if weights.lf_accuracy.len() != graph.n_lfs() {
            return Err(ModelError::Sampling(format!(
                "weight vector covers {} LFs, graph has {}",
                weights.lf_accuracy.len(),
                graph.n_lfs()
            )));
        }

        let n = graph.n_candidates();
        let accum = (0..n)
            .into_par_iter()
            .fold(
                || Accumulator::new(graph),
                |mut accum, candidate| {
                    visit_candidate(graph, weights, options, candidate, &mut accum);
                    accum
                },
            )
            .reduce(|| Accumulator::new(graph), Accumulator::merge);

        let scale = 1.0 / n.max(1) as f64;
        let normalize = |mut values: Vec<f64>| {
            for value in &mut values {
                *value *= scale;
            }
            values
        };

        log::trace!(
            "sampling round complete: {} candidates x {} draws",
            n,
            options.samples_per_candidate
        );

        Ok(SufficientStats {
            acc_observed: normalize(accum.acc_observed),
            acc_expected: normalize(accum.acc_expected),
            prop_observed: normalize(accum.prop_observed),
            prop_expected: normalize(accum.prop_expected),
            prior_observed: normalize(accum.prior_observed),
            prior_expected: normalize(accum.prior_expected),
            dep_observed: normalize(accum.dep_observed),
            dep_expected: normalize(accum.dep_expected),
            class_visits: accum.class_visits,
            cardinality: graph.cardinality(),
        })
    }
}

/// Sample one candidate's latent label and fold its factor activations into
/// the accumulator.
fn visit_candidate(
    graph: &FactorGraph,
    weights: &Weights,
    options: &SampleOptions,
    candidate: usize,
    accum: &mut Accumulator,
) {
    let domain = graph.domain(candidate);
    let votes = graph.votes(candidate);
    let cardinality = graph.cardinality();
    let draws = options.samples_per_candidate;
    let draw_weight = 1.0 / draws as f64;

    // Posterior over the candidate's domain. Propensity and dependency
    // factors are constant in the latent label and drop out here.
    let posterior = conditional(graph, weights, candidate);

    let mut rng = candidate_rng(options.seed, candidate);
    for _ in 0..draws {
        let label = match graph.observed(candidate) {
            Some(gold) => gold,
            None => draw_label(domain, &posterior, &mut rng),
        };
        accum.class_visits[candidate * cardinality + (label - 1) as usize] += draw_weight;
        accum.prior_observed[(label - 1) as usize] += draw_weight;
        for &(lf, vote) in votes {
            let activation = if vote == label { 1.0 } else { -1.0 };
            accum.acc_observed[lf] += activation * draw_weight;
        }
    }

    // Label-independent empirical activations, once per candidate.
    for &(lf, _) in votes {
        accum.prop_observed[lf] += 1.0;
    }
    for (d, dep) in graph.dependencies().iter().enumerate() {
        let lhs_vote = vote_of(votes, dep.lhs);
        let rhs_vote = vote_of(votes, dep.rhs);
        accum.dep_observed[d] += dep.activation(lhs_vote, rhs_vote);
    }

    // Model-expected activations, closed form per factor.
    let kd = domain.len() as f64;
    for lf in 0..graph.n_lfs() {
        let wa = weights.lf_accuracy[lf];
        let wp = weights.lf_propensity[lf];
        let vote_mass = wp.exp() * (wa.exp() + (kd - 1.0) * (-wa).exp());
        let z = 1.0 + vote_mass;
        accum.prop_expected[lf] += vote_mass / z;
        accum.acc_expected[lf] += wp.exp() * (wa.exp() - (kd - 1.0) * (-wa).exp()) / z;
    }
    let prior_norm: f64 = domain
        .iter()
        .map(|&label| weights.class_prior[(label - 1) as usize].exp())
        .sum();
    for &label in domain {
        accum.prior_expected[(label - 1) as usize] +=
            weights.class_prior[(label - 1) as usize].exp() / prior_norm;
    }
    for (d, dep) in graph.dependencies().iter().enumerate() {
        accum.dep_expected[d] += expected_pair_activation(dep, weights, d, domain.len());
    }
}

/// Exact single-site conditional P(y | votes, weights), aligned with the
/// candidate's domain.
pub(crate) fn conditional(graph: &FactorGraph, weights: &Weights, candidate: usize) -> Vec<f64> {
    let domain = graph.domain(candidate);
    let votes = graph.votes(candidate);
    let mut scores: Vec<f64> = domain
        .iter()
        .map(|&label| {
            let mut score = weights.class_prior[(label - 1) as usize];
            for &(lf, vote) in votes {
                let wa = weights.lf_accuracy[lf];
                score += if vote == label { wa } else { -wa };
            }
            score
        })
        .collect();
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for score in &mut scores {
        *score = (*score - max).exp();
        total += *score;
    }
    for score in &mut scores {
        *score /= total;
    }
    scores
}

fn draw_label(domain: &[u32], posterior: &[f64], rng: &mut StdRng) -> u32 {
    let roll: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (&label, &p) in domain.iter().zip(posterior) {
        cumulative += p;
        if roll < cumulative {
            return label;
        }
    }
    // roll landed in the float slack past the last cumulative bin
    domain[domain.len() - 1]
}

fn candidate_rng(seed: u64, candidate: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (candidate as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn vote_of(votes: &[(usize, u32)], lf: usize) -> u32 {
    votes
        .binary_search_by_key(&lf, |&(j, _)| j)
        .map(|pos| votes[pos].1)
        .unwrap_or(0)
}

/// Expected activation of a dependency factor under the per-factor model:
/// exact joint enumeration of the two LFs' states (abstain / correct /
/// incorrect, with wrong-vote multiplicities) for a domain of `kd` labels.
fn expected_pair_activation(dep: &Dependency, weights: &Weights, index: usize, kd: usize) -> f64 {
    let kd = kd as f64;
    let w_dep = weights.dependency[index];

    // Unnormalized single-LF state masses given the true label: abstain,
    // correct vote, one particular incorrect vote.
    let masses = |lf: usize| -> [f64; 3] {
        let wa = weights.lf_accuracy[lf];
        let wp = weights.lf_propensity[lf];
        [1.0, (wp + wa).exp(), (wp - wa).exp()]
    };
    let lhs = masses(dep.lhs);
    let rhs = masses(dep.rhs);

    // Joint states encoded as sentinel votes: 0 abstain, 1 correct, 2/3
    // distinct incorrect values. Multiplicity counts the collapsed
    // incorrect-vote assignments.
    const ABSTAIN: usize = 0;
    const CORRECT: usize = 1;
    const WRONG: usize = 2;
    let cases: [(usize, u32, usize, u32, f64); 10] = [
        (ABSTAIN, 0, ABSTAIN, 0, 1.0),
        (ABSTAIN, 0, CORRECT, 1, 1.0),
        (ABSTAIN, 0, WRONG, 2, kd - 1.0),
        (CORRECT, 1, ABSTAIN, 0, 1.0),
        (CORRECT, 1, CORRECT, 1, 1.0),
        (CORRECT, 1, WRONG, 2, kd - 1.0),
        (WRONG, 2, ABSTAIN, 0, kd - 1.0),
        (WRONG, 2, CORRECT, 1, kd - 1.0),
        (WRONG, 2, WRONG, 2, kd - 1.0),                // same incorrect value
        (WRONG, 2, WRONG, 3, (kd - 1.0) * (kd - 2.0)), // different incorrect values
    ];

    let mut total = 0.0;
    let mut weighted = 0.0;
    for &(lhs_state, lhs_vote, rhs_state, rhs_vote, multiplicity) in &cases {
        if multiplicity <= 0.0 {
            continue;
        }
        let activation = dep.activation(lhs_vote, rhs_vote);
        let mass = lhs[lhs_state] * rhs[rhs_state] * (w_dep * activation).exp() * multiplicity;
        total += mass;
        weighted += mass * activation;
    }
    weighted / total
}
