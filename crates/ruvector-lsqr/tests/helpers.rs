//! Shared test helpers for the ruvector-lsqr integration test suite.
//!
//! Provides deterministic random problem generators, a dense reference
//! least-squares solver, a Cholesky factor usable as a perfect
//! preconditioner, and floating-point comparison utilities.

#![allow(dead_code)]

use ruvector_lsqr::types::{CsrMatrix, DenseMatrix};

// ---------------------------------------------------------------------------
// Random number generator (simple LCG for deterministic reproducibility)
// ---------------------------------------------------------------------------

/// A minimal linear congruential generator for deterministic test data.
///
/// Uses the Numerical Recipes LCG parameters. Not cryptographically secure,
/// but perfectly adequate for generating reproducible test matrices.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Create a new LCG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next u64 value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Generate a uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform f64 in [lo, hi).
    pub fn next_f64_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

// ---------------------------------------------------------------------------
// Problem generators
// ---------------------------------------------------------------------------

/// Random tall sparse matrix with full column rank.
///
/// Every column `j` gets a dominant entry `(j, j)` in `[2, 3)`, so the
/// leading `cols x cols` block is diagonally dominant; the remaining
/// entries are uniform in `[-1, 1)` with probability `density`.
pub fn random_tall_csr(rows: usize, cols: usize, density: f64, seed: u64) -> CsrMatrix<f64> {
    assert!(rows >= cols, "random_tall_csr needs rows >= cols");
    let mut rng = Lcg::new(seed);
    let mut entries: Vec<(usize, usize, f64)> = Vec::new();

    for i in 0..rows {
        for j in 0..cols {
            if i == j {
                entries.push((i, j, rng.next_f64_range(2.0, 3.0)));
            } else if rng.next_f64() < density {
                entries.push((i, j, rng.next_f64_range(-1.0, 1.0) / (cols as f64).sqrt()));
            }
        }
    }

    CsrMatrix::<f64>::from_coo(rows, cols, entries).expect("generator emits valid triplets")
}

/// Random dense matrix with the same structure as [`random_tall_csr`] at
/// full density.
pub fn random_tall_dense(rows: usize, cols: usize, seed: u64) -> DenseMatrix<f64> {
    let csr = random_tall_csr(rows, cols, 1.0, seed);
    let dense_rows = csr_to_rows(&csr);
    let flat: Vec<f64> = dense_rows.into_iter().flatten().collect();
    DenseMatrix::from_row_major(rows, cols, &flat).expect("shape matches")
}

/// Scale column `j` of `matrix` by `scales[j]`.
pub fn scale_columns(matrix: &CsrMatrix<f64>, scales: &[f64]) -> CsrMatrix<f64> {
    let mut out = matrix.clone();
    for (v, &j) in out.values.iter_mut().zip(&matrix.col_indices) {
        *v *= scales[j];
    }
    out
}

/// Generate a deterministic random vector of length `n`.
pub fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = Lcg::new(seed);
    (0..n).map(|_| rng.next_f64_range(-1.0, 1.0)).collect()
}

/// Expand a CSR matrix into row-major dense rows.
pub fn csr_to_rows(matrix: &CsrMatrix<f64>) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0f64; matrix.cols]; matrix.rows];
    for (i, row) in rows.iter_mut().enumerate() {
        for (j, &v) in matrix.row_entries(i) {
            row[j] += v;
        }
    }
    rows
}

/// `A x` for a row-major dense matrix.
pub fn matvec(rows: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    rows.iter()
        .map(|r| r.iter().zip(x).map(|(a, b)| a * b).sum())
        .collect()
}

/// Consistent right-hand side `b = A x_true`.
pub fn consistent_rhs(matrix: &CsrMatrix<f64>, x_true: &[f64]) -> Vec<f64> {
    matvec(&csr_to_rows(matrix), x_true)
}

// ---------------------------------------------------------------------------
// Dense reference least-squares solver
// ---------------------------------------------------------------------------

/// `A^T A` for a row-major dense matrix.
pub fn gram(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.first().map_or(0, Vec::len);
    let mut g = vec![vec![0.0f64; n]; n];
    for r in rows {
        for i in 0..n {
            for j in 0..n {
                g[i][j] += r[i] * r[j];
            }
        }
    }
    g
}

/// Solve the square system `M x = rhs` by Gaussian elimination with partial
/// pivoting.
///
/// # Panics
///
/// Panics if the matrix is singular.
pub fn dense_solve(m: &[Vec<f64>], rhs: &[f64]) -> Vec<f64> {
    let n = m.len();
    assert_eq!(rhs.len(), n, "rhs length must match matrix dimension");

    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .zip(rhs)
        .map(|(row, &b)| {
            let mut r = row.clone();
            r.push(b);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            if aug[row][col].abs() > max_val {
                max_val = aug[row][col].abs();
                max_row = row;
            }
        }
        assert!(max_val > 1e-15, "matrix is singular or near-singular");
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            for j in col..=n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum -= aug[i][j] * x[j];
        }
        x[i] = sum / aug[i][i];
    }
    x
}

/// Least-squares solution of `min ||A x - b||` via the normal equations.
///
/// Only suitable for small, well-conditioned reference problems.
pub fn least_squares(rows: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = rows.first().map_or(0, Vec::len);
    let mut atb = vec![0.0f64; n];
    for (r, &bi) in rows.iter().zip(b) {
        for j in 0..n {
            atb[j] += r[j] * bi;
        }
    }
    dense_solve(&gram(rows), &atb)
}

/// Upper Cholesky factor `R` with `R^T R = A^T A`.
///
/// `A R^{-1}` has orthonormal columns, so `R` is the ideal right
/// preconditioner for LSQR.
pub fn cholesky_upper(rows: &[Vec<f64>]) -> DenseMatrix<f64> {
    let g = gram(rows);
    let n = g.len();
    let mut r = DenseMatrix::<f64>::zeros(n, n);
    for j in 0..n {
        let mut d = g[j][j];
        for k in 0..j {
            d -= r.get(k, j) * r.get(k, j);
        }
        assert!(d > 0.0, "A^T A is not positive definite");
        let rjj = d.sqrt();
        r.set(j, j, rjj);
        for i in (j + 1)..n {
            let mut s = g[j][i];
            for k in 0..j {
                s -= r.get(k, j) * r.get(k, i);
            }
            r.set(j, i, s / rjj);
        }
    }
    r
}

// ---------------------------------------------------------------------------
// Floating-point comparison utilities
// ---------------------------------------------------------------------------

/// Compute the L2 norm of a vector.
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Compute the L2 distance between two vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter()
        .zip(b.iter())
        .map(|(&ai, &bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}

/// Compute the relative error ||approx - exact|| / ||exact||.
///
/// Returns absolute error if the exact solution has zero norm.
pub fn relative_error(approx: &[f64], exact: &[f64]) -> f64 {
    let exact_norm = l2_norm(exact);
    let error = l2_distance(approx, exact);
    if exact_norm > 1e-15 {
        error / exact_norm
    } else {
        error
    }
}

/// Relative residual `||b - A x|| / ||b||` for a dense row-major matrix.
pub fn relative_residual(rows: &[Vec<f64>], x: &[f64], b: &[f64]) -> f64 {
    let ax = matvec(rows, x);
    let r: Vec<f64> = b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect();
    l2_norm(&r) / l2_norm(b)
}
