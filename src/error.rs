use std::error::Error;
use std::fmt;

/// Errors surfaced by graph compilation, training and inference.
#[derive(Debug)]
pub enum ModelError {
    /// Malformed or internally inconsistent input. Raised synchronously
    /// before any sampling begins; invalid votes or dependency pairs are
    /// never silently dropped.
    Configuration(String),
    /// The sampling engine failed. Fatal; the learner does not retry.
    Sampling(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            ModelError::Sampling(msg) => write!(f, "sampling error: {}", msg),
        }
    }
}

impl Error for ModelError {}
