#![allow(non_snake_case)]

//! Symmetric matrix square roots.
//!
//! Covariances produced by the adaptive process noise update are symmetric but need not be
//! positive semi-definite. The principal square root of an indefinite symmetric matrix is
//! complex: for `S = W.diag(l).W'` it is `W.diag(sqrt(l)).W'` and every negative `l` contributes
//! a purely imaginary `sqrt(l)`. [`real_sqrt`] explicitly projects onto the real component, so
//! negative eigenvalues contribute zero.

use nalgebra as na;
use na::{DMatrix, SymmetricEigen};

/// (M + M')/2, exactly symmetric.
pub fn symmetrize(M: &DMatrix<f64>) -> DMatrix<f64> {
    (M + M.transpose()) * 0.5
}

/// The real component of the principal square root of the symmetric part of `M`.
///
/// Returns the root and the smallest eigenvalue of `M`. A negative smallest eigenvalue
/// means the imaginary component was discarded.
pub fn real_sqrt(M: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    if M.is_empty() {
        return (M.clone(), 0.);
    }
    let mut eigen = SymmetricEigen::new(symmetrize(M));
    let min = smallest(&eigen);
    // Real part of sqrt(l) is zero for l < 0
    eigen.eigenvalues = eigen.eigenvalues.map(|l| l.max(0.).sqrt());
    (eigen.recompose(), min)
}

/// Clamp the eigenvalues of the symmetric part of `M` at zero.
pub fn clip_psd(M: &DMatrix<f64>) -> DMatrix<f64> {
    if M.is_empty() {
        return M.clone();
    }
    let mut eigen = SymmetricEigen::new(symmetrize(M));
    eigen.eigenvalues = eigen.eigenvalues.map(|l| l.max(0.));
    symmetrize(&eigen.recompose())
}

/// Smallest eigenvalue of the symmetric part of `M`.
pub fn min_eigenvalue(M: &DMatrix<f64>) -> f64 {
    if M.is_empty() {
        return 0.;
    }
    smallest(&SymmetricEigen::new(symmetrize(M)))
}

/// Eigenvalues of `M` below this limit are negative beyond rounding error.
pub fn negative_limit(M: &DMatrix<f64>) -> f64 {
    let scale = M.iter().fold(0., |m: f64, v| m.max(v.abs()));
    -(scale * M.nrows() as f64 * f64::EPSILON)
}

fn smallest(eigen: &SymmetricEigen<f64, na::Dynamic>) -> f64 {
    eigen.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min)
}
