use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Regularization applied to the weight update.
///
/// Strength `0.0` combined with `L1` or `L2` is equivalent to `None`; callers
/// may request zero-strength regularization to exercise the same code path.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegType {
    None,
    L1,
    L2,
}

impl FromStr for RegType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RegType::None),
            "l1" => Ok(RegType::L1),
            "l2" => Ok(RegType::L2),
            _ => Err(format!("Unknown regularization type: {}", s)),
        }
    }
}

/// Central configuration for a training run.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TrainConfig {
    /// Number of (sample, update) epochs. Zero returns the initial,
    /// prior-seeded weights unchanged.
    pub epochs: usize,
    /// Base step size for the gradient ascent.
    pub step_size: f64,
    /// Multiplicative per-epoch step decay.
    pub decay: f64,
    pub reg_type: RegType,
    /// Regularization strength, quoted against gradients summed over
    /// candidates (the learner rescales by 1/n internally).
    pub reg_param: f64,
    /// Gibbs draws per candidate per epoch.
    pub samples_per_candidate: usize,
    /// Gibbs draws per candidate when estimating marginals after training.
    pub inference_samples: usize,
    pub seed: u64,
    /// Initial accuracy weight for LFs without a supplied prior. The
    /// better-than-chance seed breaks the symmetry of the unsupervised
    /// likelihood; zero would leave training at a saddle point.
    pub init_acc_weight: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 100,
            step_size: 0.3,
            decay: 0.98,
            reg_type: RegType::None,
            reg_param: 0.0,
            samples_per_candidate: 5,
            inference_samples: 100,
            seed: 1234,
            init_acc_weight: 1.0,
        }
    }
}

impl TrainConfig {
    pub fn with_reg(mut self, reg_type: RegType, reg_param: f64) -> Self {
        self.reg_type = reg_type;
        self.reg_param = reg_param;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
