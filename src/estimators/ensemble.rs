#![allow(non_snake_case)]

//! Ensemble statistics.
//!
//! Sample mean, perturbations and sample covariance of an ensemble stored one member per column.
//! The same statistics serve the forecast ensemble, the deterministic forecast, the perturbed observations
//! and the analysed ensemble.

use nalgebra as na;
use na::{DMatrix, DVector};
use rand_core::RngCore;

use crate::error::EstimateError;
use crate::linalg::sqrt;
use crate::models::{EnsembleState, KalmanState};
use crate::noise::{CorrelatedNoise, ProcessNoisePolicy};

/// Arithmetic mean of the members (columns).
pub fn mean(A: &DMatrix<f64>) -> DVector<f64> {
    A.column_mean()
}

/// Members less the ensemble mean.
pub fn perturbations(A: &DMatrix<f64>) -> DMatrix<f64> {
    let x = mean(A);
    let mut XX = A.clone();
    for j in 0..XX.ncols() {
        let mut c = XX.column_mut(j);
        c -= &x;
    }
    XX
}

/// Sample covariance, normalised by members - 1.
///
/// The result is symmetrised and therefore exactly symmetric. It is singular when members <= dimension.
pub fn covariance(A: &DMatrix<f64>) -> DMatrix<f64> {
    let XX = perturbations(A);
    let scale = (A.ncols().max(2) - 1) as f64;
    sqrt::symmetrize(&(&XX * XX.transpose())) / scale
}

impl EnsembleState {
    /// Ensemble of `members` samples drawn from the Kalman state `init`.
    pub fn new_perturbed(init: &KalmanState, members: usize, rng: &mut dyn RngCore) -> Result<EnsembleState, EstimateError> {
        if init.X.nrows() != init.dim() || init.X.ncols() != init.dim() {
            return Err(EstimateError::Dimension(format!(
                "initial covariance is {}x{}, state is {}",
                init.X.nrows(), init.X.ncols(), init.dim())));
        }
        let noise = CorrelatedNoise { Q: init.X.clone() };
        let mut A = noise.sampler(ProcessNoisePolicy::Reject, "initial covariance")?.sample(members, rng);
        for j in 0..members {
            let mut c = A.column_mut(j);
            c += &init.x;
        }
        Ok(EnsembleState { A })
    }

    pub fn mean(&self) -> DVector<f64> {
        mean(&self.A)
    }

    pub fn covariance(&self) -> DMatrix<f64> {
        covariance(&self.A)
    }

    /// Mean and covariance of the ensemble.
    pub fn kalman_state(&self) -> KalmanState {
        KalmanState {
            x: self.mean(),
            X: self.covariance(),
        }
    }
}

impl KalmanState {
    /// Half width of the `sigmas` standard deviation band of each state component.
    pub fn bounds(&self, sigmas: f64) -> DVector<f64> {
        self.X.diagonal().map(|v| sigmas * v.max(0.).sqrt())
    }
}
