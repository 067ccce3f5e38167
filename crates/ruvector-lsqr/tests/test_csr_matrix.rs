//! Integration tests for the operator storage types.
//!
//! Tests cover COO construction, forward and transposed `gemv`, explicit
//! transpose, casting into narrow element types, and parity between the CSR
//! and dense layouts.

mod helpers;

use approx::assert_relative_eq;
use half::{bf16, f16};
use ruvector_lsqr::error::{SolverError, ValidationError};
use ruvector_lsqr::types::{CsrMatrix, DenseMatrix, Op};

use helpers::{csr_to_rows, random_tall_csr, random_vector};

/// Non-symmetric 3x3 test matrix.
///
/// ```text
///  A = [ 1  2  0 ]
///      [ 0  3  0 ]
///      [ 3  0  4 ]
/// ```
fn asym_3x3() -> CsrMatrix<f64> {
    CsrMatrix::<f64>::from_coo(
        3,
        3,
        vec![(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0), (2, 0, 3.0), (2, 2, 4.0)],
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn test_csr_from_coo_layout() {
    // Entries deliberately out of order.
    let mat = CsrMatrix::<f64>::from_coo(
        3,
        4,
        vec![(2, 3, 5.0), (0, 1, 1.0), (1, 0, 2.0), (0, 0, 4.0), (2, 1, -1.0)],
    )
    .unwrap();

    assert_eq!(mat.rows, 3);
    assert_eq!(mat.cols, 4);
    assert_eq!(mat.nnz(), 5);
    assert_eq!(mat.row_ptr, vec![0, 2, 3, 5]);
    assert_eq!(mat.col_indices, vec![0, 1, 0, 1, 3]);
    assert_eq!(mat.values, vec![4.0, 1.0, 2.0, -1.0, 5.0]);
    assert_eq!(mat.row_degree(0), 2);
    assert_eq!(mat.row_degree(1), 1);

    let row2: Vec<(usize, f64)> = mat.row_entries(2).map(|(c, &v)| (c, v)).collect();
    assert_eq!(row2, vec![(1, -1.0), (3, 5.0)]);
}

#[test]
fn test_csr_duplicates_merged() {
    let mat = CsrMatrix::<f64>::from_coo(
        2,
        2,
        vec![(0, 0, 1.0), (1, 1, 2.0), (0, 0, 0.5), (1, 1, -2.0)],
    )
    .unwrap();

    // Cancelled duplicates stay as explicit zeros.
    assert_eq!(mat.nnz(), 2);
    assert_relative_eq!(mat.values[0], 1.5);
    assert_relative_eq!(mat.values[1], 0.0);
}

#[test]
fn test_csr_from_coo_rejects_bad_coordinates() {
    let col = CsrMatrix::<f64>::from_coo(2, 2, vec![(0, 2, 1.0)]).unwrap_err();
    assert!(
        matches!(
            col,
            SolverError::InvalidInput(ValidationError::IndexOutOfBounds {
                index: 2,
                row: 0,
                cols: 2
            })
        ),
        "got {col:?}"
    );

    let row = CsrMatrix::<f64>::from_coo(2, 2, vec![(5, 0, 1.0)]).unwrap_err();
    assert!(
        matches!(row, SolverError::InvalidInput(ValidationError::DimensionMismatch(_))),
        "got {row:?}"
    );
}

#[test]
fn test_csr_empty() {
    let mat = CsrMatrix::<f64>::from_coo(3, 2, Vec::<(usize, usize, f64)>::new()).unwrap();
    assert_eq!(mat.nnz(), 0);
    assert_eq!(mat.row_ptr, vec![0, 0, 0, 0]);

    let mut y = vec![7.0f64; 3];
    mat.gemv(Op::NoTrans, 1.0, &[1.0, 2.0], 0.0, &mut y);
    for &v in &y {
        assert_relative_eq!(v, 0.0);
    }

    let at = mat.transpose();
    assert_eq!((at.rows, at.cols), (2, 3));
    assert_eq!(at.row_ptr, vec![0, 0, 0]);
}

// ---------------------------------------------------------------------------
// gemv
// ---------------------------------------------------------------------------

#[test]
fn test_csr_gemv_forward() {
    let mat = asym_3x3();
    let x = vec![1.0, 2.0, 3.0];
    let mut y = vec![0.0f64; 3];
    mat.gemv(Op::NoTrans, 1.0, &x, 0.0, &mut y);

    // [1 + 4, 6, 3 + 12]
    assert_relative_eq!(y[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(y[1], 6.0, epsilon = 1e-12);
    assert_relative_eq!(y[2], 15.0, epsilon = 1e-12);
}

#[test]
fn test_csr_gemv_transposed() {
    let mat = asym_3x3();
    let x = vec![1.0, 2.0, 3.0];
    let mut y = vec![0.0f64; 3];
    mat.gemv(Op::Trans, 1.0, &x, 0.0, &mut y);

    // A^T x = [1 + 9, 2 + 6, 12]
    assert_relative_eq!(y[0], 10.0, epsilon = 1e-12);
    assert_relative_eq!(y[1], 8.0, epsilon = 1e-12);
    assert_relative_eq!(y[2], 12.0, epsilon = 1e-12);
}

#[test]
fn test_csr_gemv_alpha_beta() {
    let mat = asym_3x3();
    let x = vec![1.0, 2.0, 3.0];
    let mut y = vec![1.0, -1.0, 2.0];
    mat.gemv(Op::NoTrans, 2.0, &x, -0.5, &mut y);

    // 2 * [5, 6, 15] - 0.5 * [1, -1, 2]
    assert_relative_eq!(y[0], 9.5, epsilon = 1e-12);
    assert_relative_eq!(y[1], 12.5, epsilon = 1e-12);
    assert_relative_eq!(y[2], 29.0, epsilon = 1e-12);

    // beta = 0 overwrites even non-finite destinations.
    let mut y = vec![f64::NAN; 3];
    mat.gemv(Op::Trans, 1.0, &x, 0.0, &mut y);
    assert!(y.iter().all(|v| v.is_finite()));
}

#[test]
fn test_csr_rectangular_adjoint_identity() {
    // <A x, y> == <x, A^T y> for a tall matrix.
    let a = random_tall_csr(25, 8, 0.4, 17);
    let x = random_vector(8, 18);
    let y = random_vector(25, 19);

    let mut ax = vec![0.0f64; 25];
    a.gemv(Op::NoTrans, 1.0, &x, 0.0, &mut ax);
    let mut aty = vec![0.0f64; 8];
    a.gemv(Op::Trans, 1.0, &y, 0.0, &mut aty);

    let lhs: f64 = ax.iter().zip(&y).map(|(p, q)| p * q).sum();
    let rhs: f64 = x.iter().zip(&aty).map(|(p, q)| p * q).sum();
    assert_relative_eq!(lhs, rhs, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Transpose
// ---------------------------------------------------------------------------

#[test]
fn test_csr_transpose() {
    let mat = asym_3x3();
    let at = mat.transpose();
    assert_eq!(at.nnz(), 5);

    // Explicit transpose agrees with the transposed product.
    let x = vec![0.5, -1.0, 2.0];
    let mut via_op = vec![0.0f64; 3];
    let mut via_at = vec![0.0f64; 3];
    mat.gemv(Op::Trans, 1.0, &x, 0.0, &mut via_op);
    at.gemv(Op::NoTrans, 1.0, &x, 0.0, &mut via_at);
    for i in 0..3 {
        assert_relative_eq!(via_op[i], via_at[i], epsilon = 1e-12);
    }

    // Transposing twice recovers the original layout.
    assert_eq!(at.transpose(), mat);
}

#[test]
fn test_csr_identity() {
    for n in [1, 5, 20] {
        let identity = CsrMatrix::<f64>::identity(n);
        assert_eq!(identity.nnz(), n);

        let x: Vec<f64> = (0..n).map(|i| (i as f64 + 1.0) * 0.7).collect();
        let mut y = vec![0.0f64; n];
        identity.gemv(Op::NoTrans, 1.0, &x, 0.0, &mut y);
        for i in 0..n {
            assert_relative_eq!(y[i], x[i], epsilon = 1e-12);
        }
    }
}

// ---------------------------------------------------------------------------
// Precision and column norms
// ---------------------------------------------------------------------------

#[test]
fn test_csr_cast_to_narrow_types() {
    let mat = CsrMatrix::<f64>::from_coo(2, 2, vec![(0, 0, 1.0 / 3.0), (1, 1, 1000.25)]).unwrap();

    let single: CsrMatrix<f32> = mat.cast();
    assert_eq!(single.values[0], (1.0f64 / 3.0) as f32);

    let half: CsrMatrix<f16> = mat.cast();
    assert_eq!(half.values[1], f16::from_f64(1000.25));
    // fp16 has an 11-bit significand: 1000.25 is not representable.
    assert!((half.values[1].to_f64() - 1000.25).abs() > 0.0);

    let brain: CsrMatrix<bf16> = mat.cast();
    assert_eq!(brain.row_ptr, mat.row_ptr);
    assert_relative_eq!(brain.values[0].to_f64(), 1.0 / 3.0, epsilon = 1e-2);
}

#[test]
fn test_csr_column_norms() {
    // Columns: [3, 0, 4], [0, 0, 0], [0, 5, 12]
    let mat = CsrMatrix::<f64>::from_coo(
        3,
        3,
        vec![(0, 0, 3.0), (2, 0, 4.0), (1, 2, 5.0), (2, 2, 12.0)],
    )
    .unwrap();
    let norms = mat.column_norms();
    assert_relative_eq!(norms[0], 5.0);
    assert_relative_eq!(norms[1], 0.0);
    assert_relative_eq!(norms[2], 13.0);
}

// ---------------------------------------------------------------------------
// Dense parity
// ---------------------------------------------------------------------------

#[test]
fn test_dense_matches_csr() {
    let csr = random_tall_csr(12, 5, 0.5, 29);
    let rows = csr_to_rows(&csr);
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let dense = DenseMatrix::<f64>::from_row_major(12, 5, &flat).unwrap();

    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            assert_eq!(dense.get(i, j), v);
        }
    }
    assert_eq!(dense.column(1).len(), 12);
    assert_eq!(dense.nnz(), 12 * 5);

    let x = random_vector(5, 30);
    let mut y_csr = vec![1.0f64; 12];
    let mut y_dense = vec![1.0f64; 12];
    csr.gemv(Op::NoTrans, 1.5, &x, 0.5, &mut y_csr);
    dense.gemv(Op::NoTrans, 1.5, &x, 0.5, &mut y_dense);
    for i in 0..12 {
        assert_relative_eq!(y_csr[i], y_dense[i], epsilon = 1e-12);
    }

    let z = random_vector(12, 31);
    let mut t_csr = vec![0.0f64; 5];
    let mut t_dense = vec![0.0f64; 5];
    csr.gemv(Op::Trans, 1.0, &z, 0.0, &mut t_csr);
    dense.gemv(Op::Trans, 1.0, &z, 0.0, &mut t_dense);
    for j in 0..5 {
        assert_relative_eq!(t_csr[j], t_dense[j], epsilon = 1e-12);
    }

    let norms_csr = csr.column_norms();
    let norms_dense = dense.column_norms();
    for j in 0..5 {
        assert_relative_eq!(norms_csr[j], norms_dense[j], epsilon = 1e-12);
    }
}

#[test]
fn test_dense_from_row_major_rejects_wrong_length() {
    let err = DenseMatrix::<f64>::from_row_major(2, 3, &[1.0; 5]).unwrap_err();
    assert!(matches!(
        err,
        SolverError::InvalidInput(ValidationError::DimensionMismatch(_))
    ));
}
