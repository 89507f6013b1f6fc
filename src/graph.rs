//! Factor graph compilation.
//!
//! `FactorGraph::compile` turns a label matrix plus a `GraphSpec` into a
//! frozen problem description: one latent (or observed, when supervised)
//! true-label variable per candidate, and the factor vocabulary the learner
//! estimates weights for: per-LF accuracy, per-LF propensity, per-class
//! prior, and one factor per declared dependency pair. All input validation
//! lives here and fails fast; nothing is silently corrected.

use std::collections::HashMap;

use crate::dependencies::Dependency;
use crate::error::ModelError;
use crate::label_matrix::LabelMatrix;
use crate::stats::coverage_to_propensity;

/// Optional problem structure supplied alongside the label matrix.
#[derive(Debug, Clone, Default)]
pub struct GraphSpec {
    /// Declared pairwise LF-LF relations.
    pub dependencies: Vec<Dependency>,
    /// Gold labels, length n; 0 = unlabeled. Supervised candidates are
    /// clamped (observed) during sampling.
    pub supervised: Option<Vec<u32>>,
    /// Per-LF accuracy prior weights in log-odds form, length m. Used to
    /// seed accuracy weights and as the L2 anchor.
    pub acc_prior_weights: Option<Vec<f64>>,
    /// Per-candidate restriction of the admissible label domain, length n.
    pub candidate_ranges: Option<Vec<Vec<u32>>>,
}

/// A compiled factor graph: validated votes, per-candidate label domains,
/// and the factor vocabulary. Read-only after compilation.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    n: usize,
    m: usize,
    cardinality: usize,
    /// Non-abstaining votes per candidate, sorted by LF index.
    votes: Vec<Vec<(usize, u32)>>,
    /// Scoped label domains; `None` means every candidate ranges over the
    /// full `1..=cardinality`.
    domains: Option<Vec<Vec<u32>>>,
    full_domain: Vec<u32>,
    supervised: Option<Vec<u32>>,
    acc_prior_weights: Option<Vec<f64>>,
    dependencies: Vec<Dependency>,
    coverage: Vec<f64>,
}

impl FactorGraph {
    /// Compile and validate. See the module docs for the factor vocabulary.
    ///
    /// # Errors
    ///
    /// `ModelError::Configuration` on bad cardinality, out-of-range votes,
    /// malformed dependency pairs, shape mismatches, or votes/labels that
    /// fall outside a candidate's declared range.
    pub fn compile(
        labels: &LabelMatrix,
        cardinality: usize,
        spec: &GraphSpec,
    ) -> Result<FactorGraph, ModelError> {
        if cardinality < 2 {
            return Err(ModelError::Configuration(format!(
                "cardinality must be at least 2, got {}",
                cardinality
            )));
        }
        let n = labels.n_candidates();
        let m = labels.n_lfs();

        if labels.max_label() as usize > cardinality {
            return Err(ModelError::Configuration(format!(
                "label matrix contains vote {} outside 1..={}",
                labels.max_label(),
                cardinality
            )));
        }

        Self::check_dependencies(&spec.dependencies, m)?;

        if let Some(priors) = &spec.acc_prior_weights {
            if priors.len() != m {
                return Err(ModelError::Configuration(format!(
                    "expected {} accuracy prior weights, got {}",
                    m,
                    priors.len()
                )));
            }
        }

        if let Some(supervised) = &spec.supervised {
            if supervised.len() != n {
                return Err(ModelError::Configuration(format!(
                    "supervised label vector has length {}, label matrix has {} candidates",
                    supervised.len(),
                    n
                )));
            }
            for (i, &label) in supervised.iter().enumerate() {
                if label as usize > cardinality {
                    return Err(ModelError::Configuration(format!(
                        "supervised label {} for candidate {} outside 1..={}",
                        label, i, cardinality
                    )));
                }
            }
        }

        if let Some(ranges) = &spec.candidate_ranges {
            Self::check_ranges(labels, cardinality, ranges, spec.supervised.as_deref())?;
        }

        let coverage = labels.coverage();
        let votes = (0..n).map(|i| labels.row(i).to_vec()).collect();

        Ok(FactorGraph {
            n,
            m,
            cardinality,
            votes,
            domains: spec.candidate_ranges.clone(),
            full_domain: (1..=cardinality as u32).collect(),
            supervised: spec.supervised.clone(),
            acc_prior_weights: spec.acc_prior_weights.clone(),
            dependencies: spec.dependencies.clone(),
            coverage,
        })
    }

    fn check_dependencies(dependencies: &[Dependency], m: usize) -> Result<(), ModelError> {
        let mut seen: HashMap<(usize, usize), Dependency> = HashMap::new();
        for dep in dependencies {
            if dep.lhs >= m || dep.rhs >= m {
                return Err(ModelError::Configuration(format!(
                    "dependency ({}, {}) references an LF outside 0..{}",
                    dep.lhs, dep.rhs, m
                )));
            }
            if dep.lhs == dep.rhs {
                return Err(ModelError::Configuration(format!(
                    "dependency pair ({}, {}) is a self-pair",
                    dep.lhs, dep.rhs
                )));
            }
            if let Some(prev) = seen.insert((dep.lhs, dep.rhs), *dep) {
                return Err(ModelError::Configuration(format!(
                    "pair ({}, {}) declared as both {:?} and {:?}",
                    dep.lhs, dep.rhs, prev.kind, dep.kind
                )));
            }
        }
        Ok(())
    }

    fn check_ranges(
        labels: &LabelMatrix,
        cardinality: usize,
        ranges: &[Vec<u32>],
        supervised: Option<&[u32]>,
    ) -> Result<(), ModelError> {
        let n = labels.n_candidates();
        if ranges.len() != n {
            return Err(ModelError::Configuration(format!(
                "candidate_ranges has length {}, label matrix has {} candidates",
                ranges.len(),
                n
            )));
        }
        for (i, range) in ranges.iter().enumerate() {
            if range.is_empty() {
                return Err(ModelError::Configuration(format!(
                    "candidate {} has an empty label range",
                    i
                )));
            }
            let mut sorted = range.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != range.len() {
                return Err(ModelError::Configuration(format!(
                    "candidate {} has duplicate values in its label range",
                    i
                )));
            }
            for &label in range {
                if label == 0 || label as usize > cardinality {
                    return Err(ModelError::Configuration(format!(
                        "range value {} for candidate {} outside 1..={}",
                        label, i, cardinality
                    )));
                }
            }
            for &(lf, vote) in labels.row(i) {
                if !range.contains(&vote) {
                    return Err(ModelError::Configuration(format!(
                        "LF {} votes {} on candidate {}, outside its declared range",
                        lf, vote, i
                    )));
                }
            }
            if let Some(supervised) = supervised {
                let gold = supervised[i];
                if gold != 0 && !range.contains(&gold) {
                    return Err(ModelError::Configuration(format!(
                        "supervised label {} for candidate {} outside its declared range",
                        gold, i
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn n_candidates(&self) -> usize {
        self.n
    }

    pub fn n_lfs(&self) -> usize {
        self.m
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// Non-abstaining votes for one candidate, sorted by LF index.
    pub fn votes(&self, candidate: usize) -> &[(usize, u32)] {
        &self.votes[candidate]
    }

    /// The admissible label domain for one candidate.
    pub fn domain(&self, candidate: usize) -> &[u32] {
        match &self.domains {
            Some(ranges) => &ranges[candidate],
            None => &self.full_domain,
        }
    }

    /// The gold label clamped onto a candidate, if any.
    pub fn observed(&self, candidate: usize) -> Option<u32> {
        self.supervised
            .as_ref()
            .and_then(|labels| match labels[candidate] {
                0 => None,
                gold => Some(gold),
            })
    }

    pub fn has_supervised(&self) -> bool {
        self.supervised.is_some()
    }

    /// Fraction of candidates carrying a gold label, if any were supplied.
    pub fn supervised_fraction(&self) -> Option<f64> {
        self.supervised.as_ref().map(|labels| {
            let labeled = labels.iter().filter(|&&label| label != 0).count();
            labeled as f64 / self.n.max(1) as f64
        })
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn acc_prior_weights(&self) -> Option<&[f64]> {
        self.acc_prior_weights.as_deref()
    }

    /// Empirical per-LF non-abstention fraction.
    pub fn coverage(&self) -> &[f64] {
        &self.coverage
    }

    /// The shared domain size when every candidate ranges over a domain of
    /// the same size; `None` when domains are heterogeneous. Drives the
    /// closed-form accuracy recovery in the stats module.
    pub fn uniform_domain_size(&self) -> Option<usize> {
        match &self.domains {
            None => Some(self.cardinality),
            Some(ranges) => {
                let size = ranges.first().map(|range| range.len())?;
                if ranges.iter().all(|range| range.len() == size) {
                    Some(size)
                } else {
                    None
                }
            }
        }
    }
}

/// The learned parameter vector, one scalar per factor instance. Created
/// fresh per training run and read-only once training completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub lf_accuracy: Vec<f64>,
    pub lf_propensity: Vec<f64>,
    pub class_prior: Vec<f64>,
    pub dependency: Vec<f64>,
}

impl Weights {
    /// Seed weights for a training run: accuracies from the graph's priors
    /// when present, otherwise `init_acc_weight`; propensities chosen so the
    /// model-implied voting probability matches each LF's empirical
    /// coverage; class-prior and dependency weights zero.
    ///
    /// Zero-seeded propensities would overstate the vote probability of
    /// sparse LFs, and the resulting spurious accuracy gradient outlasts the
    /// step-size decay.
    pub fn seeded(graph: &FactorGraph, init_acc_weight: f64) -> Self {
        let lf_accuracy: Vec<f64> = match graph.acc_prior_weights() {
            Some(priors) => priors.to_vec(),
            None => vec![init_acc_weight; graph.n_lfs()],
        };
        let lf_propensity = lf_accuracy
            .iter()
            .zip(graph.coverage())
            .map(|(&wa, &cov)| coverage_to_propensity(cov, wa, graph.cardinality()))
            .collect();
        Weights {
            lf_accuracy,
            lf_propensity,
            class_prior: vec![0.0; graph.cardinality()],
            dependency: vec![0.0; graph.dependencies().len()],
        }
    }

    /// Largest weight magnitude across all factor families.
    pub fn max_magnitude(&self) -> f64 {
        self.lf_accuracy
            .iter()
            .chain(&self.lf_propensity)
            .chain(&self.class_prior)
            .chain(&self.dependency)
            .fold(0.0f64, |acc, &w| acc.max(w.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::DependencyKind;

    fn tiny_matrix() -> LabelMatrix {
        let mut l = LabelMatrix::new(3, 2);
        l.set(0, 0, 1);
        l.set(1, 1, 2);
        l.set(2, 0, 2);
        l
    }

    #[test]
    fn compile_minimal() {
        let graph = FactorGraph::compile(&tiny_matrix(), 2, &GraphSpec::default()).unwrap();
        assert_eq!(graph.n_candidates(), 3);
        assert_eq!(graph.n_lfs(), 2);
        assert_eq!(graph.domain(0), &[1, 2]);
        assert_eq!(graph.uniform_domain_size(), Some(2));
        assert!(graph.observed(0).is_none());
    }

    #[test]
    fn rejects_bad_cardinality() {
        let err = FactorGraph::compile(&tiny_matrix(), 1, &GraphSpec::default());
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn rejects_vote_above_cardinality() {
        let mut l = LabelMatrix::new(2, 1);
        l.set(0, 0, 5);
        let err = FactorGraph::compile(&l, 3, &GraphSpec::default());
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn rejects_conflicting_dependency_kinds() {
        let spec = GraphSpec {
            dependencies: vec![
                Dependency::new(0, 1, DependencyKind::Similar),
                Dependency::new(0, 1, DependencyKind::Exclusive),
            ],
            ..Default::default()
        };
        let err = FactorGraph::compile(&tiny_matrix(), 2, &spec);
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn rejects_vote_outside_declared_range() {
        // candidate 2 has a vote for class 2 but its range is {1}
        let spec = GraphSpec {
            candidate_ranges: Some(vec![vec![1, 2], vec![1, 2], vec![1]]),
            ..Default::default()
        };
        let err = FactorGraph::compile(&tiny_matrix(), 2, &spec);
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn seeded_weights_use_priors() {
        let spec = GraphSpec {
            acc_prior_weights: Some(vec![0.4, 0.9]),
            ..Default::default()
        };
        let graph = FactorGraph::compile(&tiny_matrix(), 2, &spec).unwrap();
        let weights = Weights::seeded(&graph, 1.0);
        assert_eq!(weights.lf_accuracy, vec![0.4, 0.9]);
        assert_eq!(weights.class_prior.len(), 2);
    }

    #[test]
    fn seeded_propensity_matches_empirical_coverage() {
        // LF 0 votes on 2 of 3 candidates, LF 1 on 1 of 3; the seeded
        // propensities must imply exactly those voting probabilities so a
        // sparse LF starts with no phantom accuracy gradient.
        let graph = FactorGraph::compile(&tiny_matrix(), 2, &GraphSpec::default()).unwrap();
        let weights = Weights::seeded(&graph, 1.0);
        for lf in 0..graph.n_lfs() {
            let implied = crate::stats::propensity_coverage(
                weights.lf_accuracy[lf],
                weights.lf_propensity[lf],
                graph.cardinality(),
            );
            assert!(
                (implied - graph.coverage()[lf]).abs() < 1e-9,
                "LF {}: implied {} vs empirical {}",
                lf,
                implied,
                graph.coverage()[lf]
            );
        }
    }
}
