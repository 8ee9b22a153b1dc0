#![allow(non_snake_case)]

//! Stochastic ensemble Kalman analysis.
//!
//! The perturbed observation update is applied as a right multiplication of the forecast ensemble,
//! `A = Ap.X` with `X = I + S'.inv(C).D'`, `S = Hx.(Ap - mean)` and `C = S.S' + (N-1).Cee`.
//! The Kalman gain is never formed; `inv(C).D'` is a linear solve against an LU factorisation of `C`.
//! Each analysed member is a linear combination of the forecast members.

use nalgebra as na;
use na::DMatrix;

use crate::error::EstimateError;
use crate::estimators::adaptive::Innovation;
use crate::estimators::ensemble;
use crate::linalg::rcond;
use crate::models::LinearObserveModel;

/// Analysis step.
///
/// `innov.Y` are the innovations `D' = D - Hx.Ap` of the perturbed observations `D`.
pub fn analyse(Ap: &DMatrix<f64>, innov: &Innovation, obs: &LinearObserveModel, rcond_limit: f64) -> Result<DMatrix<f64>, EstimateError> {
    let members = Ap.ncols();
    if innov.Y.ncols() != members || innov.Y.nrows() != obs.observation_dim() || obs.state_dim() != Ap.nrows() {
        return Err(EstimateError::Dimension(format!(
            "innovations are {}x{} for a {}x{} ensemble and {}x{} observation model",
            innov.Y.nrows(), innov.Y.ncols(), Ap.nrows(), members, obs.Hx.nrows(), obs.Hx.ncols())));
    }

    let S = &obs.Hx * ensemble::perturbations(Ap);
    let C = &S * S.transpose() + &innov.Cee * (members as f64 - 1.);

    let lu = C.lu();
    rcond::check_rcond(rcond::rcond_lu(&lu), rcond_limit, "innovation covariance")?;
    let CI_D = lu.solve(&innov.Y).ok_or(EstimateError::SingularOperator { what: "innovation covariance", rcond: 0. })?;

    let X = DMatrix::<f64>::identity(members, members) + S.transpose() * CI_D;
    Ok(Ap * X)
}
