#![allow(non_snake_case)]

//! Adaptive process noise estimation.
//!
//! The process noise covariance `V` is recalibrated every observation from the innovations. The spread of the
//! innovations exceeds what the deterministic forecast spread and the observation noise explain by the process
//! noise seen through the observation operator. That excess is mapped back onto state space by a distribution
//! matrix `Gamma` and blended into `V` by exponential smoothing.
//!
//! `V` is an explicit input and output of each update, so the estimator can be exercised with any fixed `V`.
//! The raw estimate is not constrained to be positive semi-definite. What happens to a `V` with negative
//! eigenvalues is decided by the [`ProcessNoisePolicy`]; the default keeps it unchanged.

use nalgebra as na;
use na::{DMatrix, DVector};
use rand_core::RngCore;

use crate::error::EstimateError;
use crate::estimators::ensemble;
use crate::estimators::forecast::Forecast;
use crate::linalg::{rcond, sqrt};
use crate::models::LinearObserveModel;
use crate::noise::{CorrelatedNoise, ProcessNoisePolicy};

/// Perturbed observation innovations of a forecast ensemble.
#[derive(Clone, Debug)]
pub struct Innovation {
    /// Innovations of the perturbed observations, `d - Hx.Ap + E`
    pub Y: DMatrix<f64>,
    /// Observation perturbations, one column per member
    pub E: DMatrix<f64>,
    /// Sample covariance of `E`
    pub Cee: DMatrix<f64>,
}

/// Result of a process noise update.
#[derive(Clone, Debug)]
pub struct ProcessNoiseUpdate {
    /// Smoothed process noise covariance
    pub V: CorrelatedNoise,
    /// Raw process noise estimate of this step
    pub Q_hat: DMatrix<f64>,
    /// Distribution matrix, state dimension x observation dimension
    pub Gamma: DMatrix<f64>,
}

/// Exponentially smoothed process noise estimator.
#[derive(Clone, Debug)]
pub struct ProcessNoiseEstimator {
    /// Forgetting factor in [0,1], close to 1 adapts slowly
    pub alpha: f64,
    /// Distribution weight in [0,1], 1 distributes through the observation operator only
    pub beta: f64,
    pub policy: ProcessNoisePolicy,
    /// Minimum reciprocal condition number of inverted matrices
    pub rcond_limit: f64,
}

/// Perturb the observation `d` for each member of the stochastic forecast `Ap`.
pub fn perturb_observations(
    Ap: &DMatrix<f64>,
    obs: &LinearObserveModel,
    noise: &CorrelatedNoise,
    d: &DVector<f64>,
    rng: &mut dyn RngCore,
) -> Result<Innovation, EstimateError> {
    check_observation(Ap, obs, noise, d)?;
    let E = noise.sampler(ProcessNoisePolicy::Reject, "observation noise")?.sample(Ap.ncols(), rng);
    Ok(innovation(Ap, obs, d, E))
}

/// Innovations of the forecast `Ap` for given observation perturbations `E`.
pub fn innovation(Ap: &DMatrix<f64>, obs: &LinearObserveModel, d: &DVector<f64>, E: DMatrix<f64>) -> Innovation {
    let mut Y = &E - &obs.Hx * Ap;
    for j in 0..Y.ncols() {
        let mut c = Y.column_mut(j);
        c += d;
    }
    let Cee = ensemble::covariance(&E);
    Innovation { Y, E, Cee }
}

/// Distribution matrix
///
/// Gamma = [(1-beta).inv(Hx.P.Hx').Hx.P.(I - Hx'.Hx) + beta.Hx]'
pub fn distribution_matrix(Hx: &DMatrix<f64>, P: &DMatrix<f64>, beta: f64, rcond_limit: f64) -> Result<DMatrix<f64>, EstimateError> {
    let n = Hx.ncols();
    let HP = Hx * P;
    let HPHt = &HP * Hx.transpose();

    let lu = HPHt.lu();
    rcond::check_rcond(rcond::rcond_lu(&lu), rcond_limit, "Hx.P.Hx'")?;
    let HPHt_I = lu.try_inverse().ok_or(EstimateError::SingularOperator { what: "Hx.P.Hx'", rcond: 0. })?;

    let unobserved = DMatrix::<f64>::identity(n, n) - Hx.transpose() * Hx;
    let G = HPHt_I * HP * unobserved * (1. - beta) + Hx * beta;
    Ok(G.transpose())
}

impl ProcessNoiseEstimator {
    pub fn new(alpha: f64, beta: f64) -> ProcessNoiseEstimator {
        ProcessNoiseEstimator {
            alpha,
            beta,
            policy: ProcessNoisePolicy::default(),
            rcond_limit: 1e-14,
        }
    }

    /// Update the process noise covariance `V` from a forecast and its innovations.
    ///
    /// Q_hat = Gamma.(S - Hx.P*.Hx' - R).Gamma', V <- alpha.V + (1-alpha).Q_hat
    /// where S is the innovation covariance and P* the covariance of the deterministic forecast.
    pub fn update(
        &self,
        V: &CorrelatedNoise,
        forecast: &Forecast,
        innov: &Innovation,
        obs: &LinearObserveModel,
        noise: &CorrelatedNoise,
    ) -> Result<ProcessNoiseUpdate, EstimateError> {
        let Hx = &obs.Hx;
        if V.dim() != Hx.ncols() {
            return Err(EstimateError::Dimension(format!(
                "process noise is {}x{}, observation model has {} states", V.Q.nrows(), V.Q.ncols(), Hx.ncols())));
        }

        let P = ensemble::covariance(&forecast.Ap);
        let P_star = ensemble::covariance(&forecast.A_star);
        let Gamma = distribution_matrix(Hx, &P, self.beta, self.rcond_limit)?;

        let S = ensemble::covariance(&innov.Y);
        let excess = S - Hx * P_star * Hx.transpose() - &noise.Q;
        let Q_hat = sqrt::symmetrize(&(&Gamma * excess * Gamma.transpose()));

        let smoothed = &V.Q * self.alpha + &Q_hat * (1. - self.alpha);
        let V = self.apply_policy(smoothed)?;
        Ok(ProcessNoiseUpdate { V, Q_hat, Gamma })
    }

    fn apply_policy(&self, Q: DMatrix<f64>) -> Result<CorrelatedNoise, EstimateError> {
        let min_eigenvalue = sqrt::min_eigenvalue(&Q);
        if min_eigenvalue >= sqrt::negative_limit(&Q) {
            return Ok(CorrelatedNoise { Q });
        }
        match self.policy {
            ProcessNoisePolicy::Unclipped => {
                log::debug!("process noise not PSD, smallest eigenvalue {:e}", min_eigenvalue);
                Ok(CorrelatedNoise { Q })
            }
            ProcessNoisePolicy::Clip => {
                log::warn!("process noise clipped, smallest eigenvalue {:e}", min_eigenvalue);
                Ok(CorrelatedNoise { Q: sqrt::clip_psd(&Q) })
            }
            ProcessNoisePolicy::Reject => Err(EstimateError::NonPositiveCovariance {
                what: "process noise",
                min_eigenvalue,
            }),
        }
    }
}

fn check_observation(Ap: &DMatrix<f64>, obs: &LinearObserveModel, noise: &CorrelatedNoise, d: &DVector<f64>) -> Result<(), EstimateError> {
    if obs.state_dim() != Ap.nrows() {
        return Err(EstimateError::Dimension(format!(
            "observation model has {} states, ensemble has {}", obs.state_dim(), Ap.nrows())));
    }
    if d.nrows() != obs.observation_dim() || noise.dim() != obs.observation_dim() {
        return Err(EstimateError::Dimension(format!(
            "observation has {} elements and noise {}, observation model has {}",
            d.nrows(), noise.dim(), obs.observation_dim())));
    }
    Ok(())
}
