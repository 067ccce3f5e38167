//! Integration tests for the Golub-Kahan recurrence driven step by step.
//!
//! On a well-conditioned tall operator the bidiagonal entries must stay
//! bounded away from zero for the first `min(rows, cols)` steps, and the
//! Lanczos vectors must stay normalized after every step.

mod helpers;

use approx::assert_relative_eq;
use ruvector_lsqr::operator::LinearOperator;
use ruvector_lsqr::precision::{Precision, PrecisionConfig};
use ruvector_lsqr::preconditioner::IdentityPreconditioner;
use ruvector_lsqr::step;
use ruvector_lsqr::vector::Vector;
use ruvector_lsqr::workspace::Workspace;

use helpers::{random_tall_csr, random_vector};

const MIN_NORM: f64 = 1e-2;

fn assert_step_is_sound(ws: &Workspace, step_index: usize) {
    assert!(ws.alpha > MIN_NORM, "alpha = {} at step {step_index}", ws.alpha);
    assert!(ws.beta > MIN_NORM, "beta = {} at step {step_index}", ws.beta);
    assert_relative_eq!(ws.u().norm2(), 1.0, epsilon = 1e-10);
    assert_relative_eq!(ws.v().norm2(), 1.0, epsilon = 1e-10);
}

#[test]
fn test_bidiagonal_entries_stay_bounded() {
    let (rows, cols) = (30, 10);
    let p = IdentityPreconditioner::new(Precision::Double);

    for seed in [101, 102, 103] {
        let a: LinearOperator = random_tall_csr(rows, cols, 0.3, seed).into();
        let b = Vector::from_f64(Precision::Double, &random_vector(rows, seed + 1));
        let mut ws = Workspace::new(&a, PrecisionConfig::default()).unwrap();
        let mut sol = Vector::zeros(Precision::Double, cols);

        // Initialization is the first of the min(rows, cols) steps; the
        // v-space is exhausted after the last one.
        step::initialize(&mut ws, &a, &p, &b).unwrap();
        assert_step_is_sound(&ws, 1);
        for iteration in 1..rows.min(cols) {
            step::step_1(&mut ws, &a, &p, iteration).unwrap();
            assert_step_is_sound(&ws, iteration + 1);
            step::step_2(&mut ws, &p, &mut sol, iteration).unwrap();
        }
        assert!(sol.is_finite());
    }
}

#[test]
fn test_bidiagonal_entries_with_single_internal_products() {
    let (rows, cols) = (30, 10);
    let p = IdentityPreconditioner::new(Precision::Double);
    let precision = PrecisionConfig {
        internal: Precision::Single,
        ..PrecisionConfig::default()
    };

    let a: LinearOperator = random_tall_csr(rows, cols, 0.3, 101).into();
    let b = Vector::from_f64(Precision::Double, &random_vector(rows, 102));
    let mut ws = Workspace::new(&a, precision).unwrap();
    let mut sol = Vector::zeros(Precision::Double, cols);

    step::initialize(&mut ws, &a, &p, &b).unwrap();
    assert_step_is_sound(&ws, 1);
    for iteration in 1..rows.min(cols) {
        step::step_1(&mut ws, &a, &p, iteration).unwrap();
        assert_step_is_sound(&ws, iteration + 1);
        step::step_2(&mut ws, &p, &mut sol, iteration).unwrap();
    }
}
