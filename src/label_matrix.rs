//! Sparse container of labeling-function votes.
//!
//! Rows are candidates, columns are labeling functions. A stored value
//! `k >= 1` is a vote for class `k`; an absent entry means the LF abstains
//! on that candidate. Zero is never a stored class label.

use std::error::Error;
use std::fmt;

use ndarray::Array2;

/// Sparse `n x m` vote matrix, row-major over candidates.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelMatrix {
    n: usize,
    m: usize,
    /// Per candidate: `(lf_index, label)` pairs, sorted by LF index.
    rows: Vec<Vec<(usize, u32)>>,
}

impl LabelMatrix {
    /// Create an empty matrix where every LF abstains on every candidate.
    pub fn new(n: usize, m: usize) -> Self {
        LabelMatrix {
            n,
            m,
            rows: vec![Vec::new(); n],
        }
    }

    /// Build from a row-major dense buffer where 0 encodes abstention.
    pub fn from_shape_vec(shape: (usize, usize), data: Vec<u32>) -> Result<Self, ShapeError> {
        let (n, m) = shape;
        if data.len() != n * m {
            return Err(ShapeError {
                expected: n * m,
                actual: data.len(),
                what: "label buffer",
            });
        }
        let mut matrix = LabelMatrix::new(n, m);
        for (index, &label) in data.iter().enumerate() {
            if label != 0 {
                matrix.set(index / m, index % m, label);
            }
        }
        Ok(matrix)
    }

    /// Build from a dense array where 0 encodes abstention.
    pub fn from_dense(dense: &Array2<u32>) -> Self {
        let (n, m) = dense.dim();
        let mut matrix = LabelMatrix::new(n, m);
        for i in 0..n {
            for j in 0..m {
                let label = dense[(i, j)];
                if label != 0 {
                    matrix.set(i, j, label);
                }
            }
        }
        matrix
    }

    /// Record a vote. `label == 0` clears any existing vote (abstain).
    pub fn set(&mut self, candidate: usize, lf: usize, label: u32) {
        assert!(candidate < self.n, "candidate index out of bounds");
        assert!(lf < self.m, "LF index out of bounds");
        let row = &mut self.rows[candidate];
        match row.binary_search_by_key(&lf, |&(j, _)| j) {
            Ok(pos) => {
                if label == 0 {
                    row.remove(pos);
                } else {
                    row[pos].1 = label;
                }
            }
            Err(pos) => {
                if label != 0 {
                    row.insert(pos, (lf, label));
                }
            }
        }
    }

    /// The vote of LF `lf` on `candidate`; 0 means abstain.
    pub fn get(&self, candidate: usize, lf: usize) -> u32 {
        assert!(candidate < self.n, "candidate index out of bounds");
        assert!(lf < self.m, "LF index out of bounds");
        self.rows[candidate]
            .binary_search_by_key(&lf, |&(j, _)| j)
            .map(|pos| self.rows[candidate][pos].1)
            .unwrap_or(0)
    }

    pub fn n_candidates(&self) -> usize {
        self.n
    }

    pub fn n_lfs(&self) -> usize {
        self.m
    }

    /// Non-abstaining votes for one candidate, sorted by LF index.
    pub fn row(&self, candidate: usize) -> &[(usize, u32)] {
        assert!(candidate < self.n, "candidate index out of bounds");
        &self.rows[candidate]
    }

    /// Total number of non-abstaining votes.
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    /// Per-LF count of candidates with a vote.
    pub fn vote_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.m];
        for row in &self.rows {
            for &(lf, _) in row {
                counts[lf] += 1;
            }
        }
        counts
    }

    /// Per-LF fraction of candidates with a vote.
    pub fn coverage(&self) -> Vec<f64> {
        let n = self.n.max(1) as f64;
        self.vote_counts()
            .into_iter()
            .map(|count| count as f64 / n)
            .collect()
    }

    /// Largest stored class label, or 0 if the matrix is all abstains.
    pub fn max_label(&self) -> u32 {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|&(_, label)| label))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct ShapeError {
    pub expected: usize,
    pub actual: usize,
    pub what: &'static str,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} of length {}, got {}",
            self.what, self.expected, self.actual
        )
    }
}

impl Error for ShapeError {}
