//! The training loop: alternating sampling (E-step) and regularized
//! stochastic gradient ascent on the pseudo-log-likelihood (M-step).
//!
//! One `GenerativeModel` owns one training run's weights; concurrent runs
//! each allocate their own model. Training never fails on non-convergence;
//! it returns whatever weights result after the requested epoch count, and
//! convergence quality is the caller's property to check.

use ndarray::{Array1, Array2};

use crate::config::{RegType, TrainConfig};
use crate::error::ModelError;
use crate::graph::{FactorGraph, Weights};
use crate::sampler::{GibbsSampler, SampleOptions, SamplingEngine, SufficientStats};
use crate::stats::{propensity_coverage, weight_to_accuracy, LfStats};

/// A weight whose magnitude crosses this bound marks the run as numerically
/// unstable (regularization too weak for the data size). Training continues.
const WEIGHT_SANITY_BOUND: f64 = 15.0;

struct TrainedState {
    weights: Weights,
    coverage: Vec<f64>,
    supervised_fraction: Option<f64>,
    n_lfs: usize,
    cardinality: usize,
    uniform_domain: Option<usize>,
    has_dependencies: bool,
    mc_accuracy: Vec<f64>,
    diverged: bool,
}

/// Generative label model over noisy labeling-function votes.
pub struct GenerativeModel {
    config: TrainConfig,
    state: Option<TrainedState>,
}

impl GenerativeModel {
    pub fn new(config: TrainConfig) -> Self {
        GenerativeModel {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train with the built-in Gibbs engine.
    pub fn train(&mut self, graph: &FactorGraph) -> Result<(), ModelError> {
        self.train_with_engine(graph, &GibbsSampler)
    }

    /// Train against an arbitrary sampling engine.
    ///
    /// Per epoch: one synchronous engine call at the current weights, then a
    /// gradient step `w += rate * (observed - expected)` followed by the
    /// configured regularization. `epochs = 0` stores the seeded weights
    /// unchanged. Engine failures propagate fatally; there is no retry.
    pub fn train_with_engine<E: SamplingEngine>(
        &mut self,
        graph: &FactorGraph,
        engine: &E,
    ) -> Result<(), ModelError> {
        let cfg = &self.config;
        let n = graph.n_candidates();
        let mut weights = Weights::seeded(graph, cfg.init_acc_weight);
        // Strengths are quoted against gradients summed over candidates;
        // sufficient statistics are per-candidate means.
        let lambda = cfg.reg_param / n.max(1) as f64;
        let mut diverged = false;

        log::info!(
            "training on {} candidates, {} LFs, cardinality {} ({} epochs, reg {:?} {})",
            n,
            graph.n_lfs(),
            graph.cardinality(),
            cfg.epochs,
            cfg.reg_type,
            cfg.reg_param
        );

        for epoch in 0..cfg.epochs {
            let stats = engine.sample(
                graph,
                &weights,
                &SampleOptions {
                    samples_per_candidate: cfg.samples_per_candidate,
                    seed: cfg.seed.wrapping_add(epoch as u64),
                },
            )?;
            let rate = cfg.step_size * cfg.decay.powi(epoch as i32);

            ascend(
                &mut weights.lf_accuracy,
                &stats.acc_observed,
                &stats.acc_expected,
                graph.acc_prior_weights(),
                rate,
                cfg.reg_type,
                lambda,
            );
            ascend(
                &mut weights.lf_propensity,
                &stats.prop_observed,
                &stats.prop_expected,
                None,
                rate,
                cfg.reg_type,
                lambda,
            );
            ascend(
                &mut weights.class_prior,
                &stats.prior_observed,
                &stats.prior_expected,
                None,
                rate,
                cfg.reg_type,
                lambda,
            );
            ascend(
                &mut weights.dependency,
                &stats.dep_observed,
                &stats.dep_expected,
                None,
                rate,
                cfg.reg_type,
                lambda,
            );

            if !diverged && weights.max_magnitude() > WEIGHT_SANITY_BOUND {
                log::warn!(
                    "weight magnitude exceeded {} at epoch {}; regularization may be too \
                     weak for this data size and the result should be treated as unreliable",
                    WEIGHT_SANITY_BOUND,
                    epoch
                );
                diverged = true;
            }

            log::debug!(
                "epoch {} done (rate {:.5}, max |w| {:.3})",
                epoch,
                rate,
                weights.max_magnitude()
            );
        }

        // One sampling pass at the final weights backs the Monte-Carlo
        // accuracy estimate used when the closed-form transform is
        // ambiguous (scoped domains of mixed size, declared dependencies).
        let stats = engine.sample(
            graph,
            &weights,
            &SampleOptions {
                samples_per_candidate: cfg.samples_per_candidate,
                seed: cfg.seed.wrapping_add(cfg.epochs as u64),
            },
        )?;
        let mc_accuracy = monte_carlo_accuracy(graph, &weights, &stats);

        self.state = Some(TrainedState {
            coverage: graph.coverage().to_vec(),
            supervised_fraction: graph.supervised_fraction(),
            n_lfs: graph.n_lfs(),
            cardinality: graph.cardinality(),
            uniform_domain: graph.uniform_domain_size(),
            has_dependencies: !graph.dependencies().is_empty(),
            mc_accuracy,
            diverged,
            weights,
        });
        Ok(())
    }

    /// The learned weights, once training has run.
    pub fn weights(&self) -> Option<&Weights> {
        self.state.as_ref().map(|state| &state.weights)
    }

    /// Whether any weight crossed the sanity bound during training.
    pub fn weights_diverged(&self) -> bool {
        self.state
            .as_ref()
            .map(|state| state.diverged)
            .unwrap_or(false)
    }

    /// Per-LF accuracy/coverage diagnostics. When supervised labels were
    /// supplied, a trailing pseudo-LF row reports the supervised channel
    /// (accuracy 1.0, coverage = labeled fraction).
    pub fn learned_lf_stats(&self) -> Result<LfStats, ModelError> {
        let state = self.trained()?;
        let closed_form = !state.has_dependencies && state.uniform_domain.is_some();
        for lf in 0..state.n_lfs {
            // a large gap between these flags an under-trained propensity
            let implied = propensity_coverage(
                state.weights.lf_accuracy[lf],
                state.weights.lf_propensity[lf],
                state.uniform_domain.unwrap_or(state.cardinality),
            );
            log::debug!(
                "LF {}: model-implied coverage {:.3}, empirical {:.3}",
                lf,
                implied,
                state.coverage[lf]
            );
        }
        let mut accuracy: Vec<f64> = (0..state.n_lfs)
            .map(|lf| {
                if closed_form {
                    weight_to_accuracy(
                        state.weights.lf_accuracy[lf],
                        state.uniform_domain.unwrap_or(state.cardinality),
                    )
                } else {
                    state.mc_accuracy[lf]
                }
            })
            .collect();
        let mut coverage = state.coverage.clone();
        if let Some(fraction) = state.supervised_fraction {
            accuracy.push(1.0);
            coverage.push(fraction);
        }
        Ok(LfStats {
            accuracy: Array1::from_vec(accuracy),
            coverage: Array1::from_vec(coverage),
        })
    }

    /// Marginal label distributions with the built-in Gibbs engine.
    pub fn marginals(&self, graph: &FactorGraph) -> Result<Array2<f64>, ModelError> {
        self.marginals_with_engine(graph, &GibbsSampler)
    }

    /// Marginal label distribution per candidate of `graph` (training or
    /// held-out), shape `n x cardinality`. Rows sum to 1 and carry zero mass
    /// outside a candidate's declared range. Deterministic only up to
    /// sampling noise across seeds.
    pub fn marginals_with_engine<E: SamplingEngine>(
        &self,
        graph: &FactorGraph,
        engine: &E,
    ) -> Result<Array2<f64>, ModelError> {
        let state = self.trained()?;
        if graph.n_lfs() != state.n_lfs {
            return Err(ModelError::Configuration(format!(
                "graph has {} LFs, model was trained with {}",
                graph.n_lfs(),
                state.n_lfs
            )));
        }
        if graph.cardinality() != state.cardinality {
            return Err(ModelError::Configuration(format!(
                "graph cardinality {} differs from trained cardinality {}",
                graph.cardinality(),
                state.cardinality
            )));
        }
        if graph.dependencies().len() != state.weights.dependency.len() {
            return Err(ModelError::Configuration(format!(
                "graph declares {} dependencies, model was trained with {}",
                graph.dependencies().len(),
                state.weights.dependency.len()
            )));
        }

        let stats = engine.sample(
            graph,
            &state.weights,
            &SampleOptions {
                samples_per_candidate: self.config.inference_samples,
                seed: self.config.seed.wrapping_mul(0x5851_F42D_4C95_7F2D),
            },
        )?;

        let n = graph.n_candidates();
        let cardinality = graph.cardinality();
        let mut marginals = Array2::zeros((n, cardinality));
        for candidate in 0..n {
            let visits = stats.visits(candidate);
            let total: f64 = visits.iter().sum();
            if total <= 0.0 {
                return Err(ModelError::Sampling(format!(
                    "engine returned no visits for candidate {}",
                    candidate
                )));
            }
            for (class, &count) in visits.iter().enumerate() {
                marginals[(candidate, class)] = count / total;
            }
        }
        Ok(marginals)
    }

    fn trained(&self) -> Result<&TrainedState, ModelError> {
        self.state.as_ref().ok_or_else(|| {
            ModelError::Configuration("model has not been trained yet".to_string())
        })
    }
}

/// One regularized ascent step for a weight family.
///
/// L2 pulls toward the per-weight center (accuracy priors; zero elsewhere)
/// with an implicit proximal shrink, stable for arbitrarily large strengths.
/// L1 soft-thresholds toward zero, floored so a weight never crosses zero.
fn ascend(
    weights: &mut [f64],
    observed: &[f64],
    expected: &[f64],
    centers: Option<&[f64]>,
    rate: f64,
    reg_type: RegType,
    lambda: f64,
) {
    for (index, weight) in weights.iter_mut().enumerate() {
        let stepped = *weight + rate * (observed[index] - expected[index]);
        *weight = match reg_type {
            RegType::None => stepped,
            RegType::L2 => {
                let center = centers.map(|values| values[index]).unwrap_or(0.0);
                center + (stepped - center) / (1.0 + 2.0 * rate * lambda)
            }
            RegType::L1 => {
                let shrink = rate * lambda;
                stepped.signum() * (stepped.abs() - shrink).max(0.0)
            }
        };
    }
}

/// Agreement between each LF's votes and the sampled labels: the Monte-Carlo
/// estimate of P(vote = true label | vote), from the final sampling pass.
fn monte_carlo_accuracy(
    graph: &FactorGraph,
    weights: &Weights,
    stats: &SufficientStats,
) -> Vec<f64> {
    let mut agreement = vec![0.0f64; graph.n_lfs()];
    let mut votes = vec![0usize; graph.n_lfs()];
    for candidate in 0..graph.n_candidates() {
        let visits = stats.visits(candidate);
        for &(lf, vote) in graph.votes(candidate) {
            agreement[lf] += visits[(vote - 1) as usize];
            votes[lf] += 1;
        }
    }
    agreement
        .iter()
        .zip(&votes)
        .enumerate()
        .map(|(lf, (&hits, &count))| {
            if count == 0 {
                // no votes to score against; fall back to the weight transform
                weight_to_accuracy(weights.lf_accuracy[lf], graph.cardinality())
            } else {
                hits / count as f64
            }
        })
        .collect()
}
