//! Reciprocal condition numbers.
//!
//! Every inversion and linear solve in the estimators is preceded by a condition check.

use nalgebra as na;
use na::{DVector, Dynamic, LU};

use crate::error::EstimateError;

/* Reciprocal condition number of a triangular factor from its diagonal dv.
 *
 * The largest absolute diagonal element stands in for the norm of the factor and the smallest
 * for the norm of its inverse, so rcond = min|d| / max|d| and 0 <= rcond <= 1.
 *
 * Singular, empty and infinite factors give 0. A NaN element gives -1.
 */
pub fn rcond_vec(dv: &DVector<f64>) -> f64 {
    // Special case an empty matrix
    if dv.is_empty() {
        return 0.;
    }
    let mut mind = dv[0].abs();
    let mut maxd = mind;

    for d in dv.iter() {
        if d.is_nan() {
            return -1.;
        }
        let d = d.abs();
        if d < mind {
            mind = d;
        }
        if d > maxd {
            maxd = d;
        }
    }

    let rcond = mind / maxd;
    if rcond.is_nan() {
        // 0/0 or inf/inf
        0.
    } else {
        rcond
    }
}

/// Estimate the reciprocal condition number of a matrix from the U factor of its LU decomposition.
pub fn rcond_lu(lu: &LU<f64, Dynamic, Dynamic>) -> f64 {
    rcond_vec(&lu.u().diagonal())
}

/// Accept `rcond` only above `limit`, a NaN never passes.
pub fn check_rcond(rcond: f64, limit: f64, what: &'static str) -> Result<f64, EstimateError> {
    if rcond > limit {
        Ok(rcond)
    } else {
        Err(EstimateError::SingularOperator { what, rcond })
    }
}
