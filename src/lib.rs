//! labelmodel: a generative label model for programmatic weak supervision.
//!
//! Given a sparse matrix of noisy labeling-function (LF) votes, this crate
//! estimates each LF's reliability without ground truth and combines the
//! votes into per-candidate probabilistic labels. The pieces: a sparse
//! [`label_matrix::LabelMatrix`], declared LF-LF [`dependencies`], a
//! compiled [`graph::FactorGraph`], a Gibbs [`sampler`] behind a trait seam,
//! and the [`learner::GenerativeModel`] training loop with per-LF
//! diagnostics and marginal inference.
//!
//! The design favors small, testable modules; the sampling engine is a
//! synchronous collaborator so the optimizer can be exercised against a
//! deterministic mock.
pub mod config;
pub mod dependencies;
pub mod error;
pub mod graph;
pub mod label_matrix;
pub mod learner;
pub mod sampler;
pub mod stats;

pub use config::{RegType, TrainConfig};
pub use dependencies::{Dependency, DependencyKind};
pub use error::ModelError;
pub use graph::{FactorGraph, GraphSpec, Weights};
pub use label_matrix::LabelMatrix;
pub use learner::GenerativeModel;
pub use sampler::{GibbsSampler, SampleOptions, SamplingEngine, SufficientStats};
pub use stats::LfStats;
