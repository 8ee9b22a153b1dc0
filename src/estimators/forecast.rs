#![allow(non_snake_case)]

//! Ensemble forecast.
//!
//! Each member is advanced over an observation interval by integrating the dynamics. Members do not
//! interact, so with the `parallel` feature the integrations run on the rayon thread pool. Process noise
//! is added after all members have been integrated, drawing from the single random source in member order.
//! A forecast is therefore identical for a given seed whether or not it was computed in parallel.

use nalgebra as na;
use na::{DMatrix, DVector};
use rand_core::RngCore;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::EstimateError;
use crate::models::{EnsembleState, FunctionPredictModel};
use crate::noise::{CorrelatedNoise, ProcessNoisePolicy};
use crate::ode::{self, OdeSettings};

/// Forecast ensembles.
#[derive(Clone, Debug)]
pub struct Forecast {
    /// Deterministic forecast, members integrated without process noise
    pub A_star: DMatrix<f64>,
    /// Stochastic forecast, deterministic forecast plus process noise
    pub Ap: DMatrix<f64>,
}

/// Integrate every member of `ensemble` from `t0` to `t1`.
///
/// Any member failing to integrate, including dynamics returning a derivative of the wrong dimension,
/// fails the whole forecast; the lowest failing member is reported.
pub fn integrate_members<F, Q>(
    ensemble: &EnsembleState,
    model: &FunctionPredictModel<F, Q>,
    t0: f64,
    t1: f64,
    settings: &OdeSettings,
    parallel: bool,
) -> Result<DMatrix<f64>, EstimateError>
    where
        F: Fn(f64, &DVector<f64>, &Q) -> DVector<f64> + Sync,
        Q: Sync,
{
    let members: Vec<DVector<f64>> = (0..ensemble.members())
        .map(|j| ensemble.A.column(j).into_owned())
        .collect();

    let integrate = |(j, x): (usize, &DVector<f64>)| {
        ode::integrate(t0, t1, x, |t, y| model.derivative(t, y), settings)
            .map(|sol| sol.y)
            .map_err(|source| EstimateError::IntegrationFailure { member: j, source })
    };

    #[cfg(feature = "parallel")]
    let integrated: Vec<Result<DVector<f64>, EstimateError>> = if parallel {
        members.par_iter().enumerate().map(integrate).collect()
    } else {
        members.iter().enumerate().map(integrate).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let integrated: Vec<Result<DVector<f64>, EstimateError>> = {
        let _ = parallel;
        members.iter().enumerate().map(integrate).collect()
    };

    let columns = integrated.into_iter().collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Ok(DMatrix::zeros(ensemble.dim(), 0));
    }
    Ok(DMatrix::from_columns(&columns))
}

/// Forecast step.
///
/// Deterministic forecast of each member followed by additive process noise with covariance `V`.
pub fn forecast<F, Q>(
    ensemble: &EnsembleState,
    model: &FunctionPredictModel<F, Q>,
    t0: f64,
    t1: f64,
    V: &CorrelatedNoise,
    settings: &OdeSettings,
    policy: ProcessNoisePolicy,
    parallel: bool,
    rng: &mut dyn RngCore,
) -> Result<Forecast, EstimateError>
    where
        F: Fn(f64, &DVector<f64>, &Q) -> DVector<f64> + Sync,
        Q: Sync,
{
    if V.dim() != ensemble.dim() {
        return Err(EstimateError::Dimension(format!(
            "process noise is {}x{}, state is {}", V.Q.nrows(), V.Q.ncols(), ensemble.dim())));
    }
    let A_star = integrate_members(ensemble, model, t0, t1, settings, parallel)?;

    let sampler = V.sampler(policy, "process noise")?;
    let Ap = &A_star + sampler.sample(ensemble.members(), rng);

    Ok(Forecast { A_star, Ap })
}
