//! Weight/probability transforms and the per-LF diagnostics table.

use ndarray::{Array1, Array2};

/// Convert a believed accuracy into a log-odds accuracy weight for a label
/// space of `cardinality` classes:
///
/// w = 0.5 * ln((cardinality - 1) * acc / (1 - acc))
///
/// Inverse of [`weight_to_accuracy`].
///
/// # Arguments
///
/// * `acc` - Believed accuracy, strictly between 0 and 1.
/// * `cardinality` - Number of classes (>= 2).
pub fn accuracy_to_weight(acc: f64, cardinality: usize) -> f64 {
    debug_assert!(acc > 0.0 && acc < 1.0, "accuracy must be in (0, 1)");
    0.5 * ((cardinality as f64 - 1.0) * acc / (1.0 - acc)).ln()
}

/// Recover an accuracy from a learned log-odds weight:
///
/// acc = 1 / (1 + (cardinality - 1) * e^(-2w))
///
/// Binary (cardinality 2) reduces to the plain logistic `1 / (1 + e^(-2w))`.
pub fn weight_to_accuracy(weight: f64, cardinality: usize) -> f64 {
    1.0 / (1.0 + (cardinality as f64 - 1.0) * (-2.0 * weight).exp())
}

/// Model-implied voting probability for an LF with accuracy weight `wa` and
/// propensity weight `wp` over a `cardinality`-class domain.
pub fn propensity_coverage(wa: f64, wp: f64, cardinality: usize) -> f64 {
    let vote_mass = wp.exp() * (wa.exp() + (cardinality as f64 - 1.0) * (-wa).exp());
    vote_mass / (1.0 + vote_mass)
}

/// Propensity weight that makes the model-implied voting probability match
/// an observed coverage, for an LF with accuracy weight `wa`. Inverse of
/// [`propensity_coverage`] in `wp`. Coverage is clamped away from 0 and 1 so
/// fully-dense and never-voting LFs stay finite.
pub fn coverage_to_propensity(coverage: f64, wa: f64, cardinality: usize) -> f64 {
    let cov = coverage.clamp(1e-3, 1.0 - 1e-3);
    (cov / (1.0 - cov)).ln() - (wa.exp() + (cardinality as f64 - 1.0) * (-wa).exp()).ln()
}

/// Per-LF diagnostics derived from a trained model. When supervised labels
/// were supplied, the last row is the pseudo-LF for the supervised channel
/// (accuracy 1.0, coverage = labeled fraction).
#[derive(Debug, Clone)]
pub struct LfStats {
    pub accuracy: Array1<f64>,
    pub coverage: Array1<f64>,
}

impl LfStats {
    pub fn len(&self) -> usize {
        self.accuracy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accuracy.is_empty()
    }
}

/// Reduce a marginals matrix to hard MAP labels (1-based class indices).
///
/// This is the bridge from the generative model's output to training labels
/// for a downstream model.
///
/// # Errors
///
/// Fails if the matrix has zero columns or a row contains a non-finite
/// probability.
pub fn map_labels(marginals: &Array2<f64>) -> anyhow::Result<Array1<u32>> {
    if marginals.ncols() == 0 {
        anyhow::bail!("marginals matrix has no classes");
    }
    let mut labels = Vec::with_capacity(marginals.nrows());
    for (i, row) in marginals.outer_iter().enumerate() {
        let mut best = 0usize;
        let mut best_p = f64::NEG_INFINITY;
        for (k, &p) in row.iter().enumerate() {
            if !p.is_finite() {
                anyhow::bail!("non-finite probability in marginals row {}", i);
            }
            if p > best_p {
                best_p = p;
                best = k;
            }
        }
        labels.push(best as u32 + 1);
    }
    Ok(Array1::from_vec(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn transform_round_trips() {
        for &cardinality in &[2usize, 4, 10] {
            for &acc in &[0.3, 0.5, 0.75, 0.9, 0.99] {
                let w = accuracy_to_weight(acc, cardinality);
                let back = weight_to_accuracy(w, cardinality);
                assert!(
                    (back - acc).abs() < 1e-12,
                    "round trip failed for acc={} k={}",
                    acc,
                    cardinality
                );
            }
        }
    }

    #[test]
    fn zero_weight_is_chance_accuracy() {
        assert!((weight_to_accuracy(0.0, 2) - 0.5).abs() < 1e-12);
        assert!((weight_to_accuracy(0.0, 4) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn coverage_monotone_in_propensity() {
        let low = propensity_coverage(1.0, -3.0, 4);
        let high = propensity_coverage(1.0, 1.0, 4);
        assert!(low < high);
        assert!(low > 0.0 && high < 1.0);
    }

    #[test]
    fn propensity_round_trips_through_coverage() {
        for &cardinality in &[2usize, 4] {
            for &wa in &[0.0, 0.8, 1.6] {
                for &cov in &[0.2, 0.5, 0.9] {
                    let wp = coverage_to_propensity(cov, wa, cardinality);
                    let back = propensity_coverage(wa, wp, cardinality);
                    assert!(
                        (back - cov).abs() < 1e-12,
                        "round trip failed for cov={} wa={} k={}",
                        cov,
                        wa,
                        cardinality
                    );
                }
            }
        }
    }

    #[test]
    fn map_labels_picks_argmax() {
        let marginals = arr2(&[[0.1, 0.7, 0.2], [0.6, 0.3, 0.1]]);
        let labels = map_labels(&marginals).unwrap();
        assert_eq!(labels.to_vec(), vec![2, 1]);
    }

    #[test]
    fn map_labels_rejects_nan() {
        let marginals = arr2(&[[f64::NAN, 0.5]]);
        assert!(map_labels(&marginals).is_err());
    }
}
