#![allow(non_snake_case)]

//! Ensemble estimation models.
//!
//! State representations are modeled as structs.
//! The prediction model is a caller supplied ODE, the observation model is linear.

use nalgebra as na;
use na::{DMatrix, DVector};

/// Kalman State.
///
/// Linear representation as a state vector and the state covariance (symmetric positive semi-definite) matrix.
/// Used to initialise an ensemble and to report the statistics of an analysed ensemble.
#[derive(PartialEq, Clone, Debug)]
pub struct KalmanState {
    /// State vector
    pub x: DVector<f64>,
    /// State covariance matrix (symmetric positive semi-definite)
    pub X: DMatrix<f64>,
}

impl KalmanState {
    pub fn new_zero(d: usize) -> KalmanState {
        KalmanState {
            x: DVector::zeros(d),
            X: DMatrix::zeros(d, d),
        }
    }

    pub fn dim(&self) -> usize {
        self.x.nrows()
    }
}

/// Ensemble State.
///
/// Monte Carlo representation of the state distribution. Each column of `A` is an ensemble member.
#[derive(PartialEq, Clone, Debug)]
pub struct EnsembleState {
    /// Ensemble, state dimension x number of members
    pub A: DMatrix<f64>,
}

impl EnsembleState {
    pub fn dim(&self) -> usize {
        self.A.nrows()
    }

    pub fn members(&self) -> usize {
        self.A.ncols()
    }
}

/// Linear observation model.
///
/// Observation is represented by an observation matrix.
#[derive(PartialEq, Clone, Debug)]
pub struct LinearObserveModel {
    /// Observation matrix
    pub Hx: DMatrix<f64>,
}

impl LinearObserveModel {
    /// Every state component observed directly.
    pub fn identity(d: usize) -> LinearObserveModel {
        LinearObserveModel {
            Hx: DMatrix::identity(d, d),
        }
    }

    pub fn state_dim(&self) -> usize {
        self.Hx.ncols()
    }

    pub fn observation_dim(&self) -> usize {
        self.Hx.nrows()
    }
}

/// Functional prediction model.
///
/// Prediction is represented by the continuous time dynamics `dx/dt = f(t, x, q)` with fixed parameters `q`.
/// The function is shared between the threads integrating ensemble members.
pub struct FunctionPredictModel<F, Q> {
    /// State derivative
    pub f: F,
    /// Fixed model parameters
    pub q: Q,
}

impl<F, Q> FunctionPredictModel<F, Q>
    where
        F: Fn(f64, &DVector<f64>, &Q) -> DVector<f64> + Sync,
        Q: Sync,
{
    pub fn new(f: F, q: Q) -> Self {
        FunctionPredictModel { f, q }
    }

    pub fn derivative(&self, t: f64, x: &DVector<f64>) -> DVector<f64> {
        (self.f)(t, x, &self.q)
    }
}
