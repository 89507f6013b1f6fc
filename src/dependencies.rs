//! Pairwise LF-LF dependency declarations.
//!
//! Each declared pair becomes one weighted factor in the compiled graph.
//! The kinds form a closed set; the compiler branches structurally on the
//! kind, so new relations belong here rather than behind ad hoc flags.

use serde::{Deserialize, Serialize};

/// The modeled relationship between two labeling functions.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Penalizes simultaneous disagreeing votes.
    Exclusive,
    /// Rewards correlated non-abstention.
    Reinforcing,
    /// Models `lhs`'s abstention as explained by `rhs`'s vote.
    Fixing,
    /// Penalizes redundant agreement between near-duplicate LFs.
    Similar,
}

/// An ordered LF pair tagged with a relation kind.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub lhs: usize,
    pub rhs: usize,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(lhs: usize, rhs: usize, kind: DependencyKind) -> Self {
        Dependency { lhs, rhs, kind }
    }

    /// Factor activation for one candidate given the two observed votes
    /// (0 = abstain). Activations are independent of the latent label:
    /// dependency factors shape the generative model of the votes, not the
    /// per-candidate posterior.
    pub fn activation(&self, lhs_vote: u32, rhs_vote: u32) -> f64 {
        let both_vote = lhs_vote != 0 && rhs_vote != 0;
        match self.kind {
            DependencyKind::Exclusive => {
                if both_vote && lhs_vote != rhs_vote {
                    -1.0
                } else {
                    0.0
                }
            }
            DependencyKind::Reinforcing => {
                if both_vote {
                    1.0
                } else {
                    0.0
                }
            }
            DependencyKind::Fixing => {
                if lhs_vote == 0 && rhs_vote != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            DependencyKind::Similar => {
                if both_vote && lhs_vote == rhs_vote {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_fires_on_disagreement() {
        let dep = Dependency::new(0, 1, DependencyKind::Exclusive);
        assert_eq!(dep.activation(1, 2), -1.0);
        assert_eq!(dep.activation(1, 1), 0.0);
        assert_eq!(dep.activation(0, 2), 0.0);
    }

    #[test]
    fn reinforcing_fires_on_joint_votes() {
        let dep = Dependency::new(0, 1, DependencyKind::Reinforcing);
        assert_eq!(dep.activation(3, 1), 1.0);
        assert_eq!(dep.activation(3, 0), 0.0);
        assert_eq!(dep.activation(0, 0), 0.0);
    }

    #[test]
    fn fixing_is_ordered() {
        let dep = Dependency::new(0, 1, DependencyKind::Fixing);
        assert_eq!(dep.activation(0, 2), 1.0);
        assert_eq!(dep.activation(2, 0), 0.0);
        assert_eq!(dep.activation(0, 0), 0.0);
    }

    #[test]
    fn similar_fires_on_agreement() {
        let dep = Dependency::new(0, 1, DependencyKind::Similar);
        assert_eq!(dep.activation(2, 2), -1.0);
        assert_eq!(dep.activation(2, 3), 0.0);
        assert_eq!(dep.activation(0, 2), 0.0);
    }
}
