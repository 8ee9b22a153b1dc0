#![allow(non_snake_case)]

//! Adaptive ensemble Kalman filter driver.
//!
//! A run is a fixed sequence of phases. The ensemble is initialised once, then for each observation after
//! the first it is forecast, the process noise is re-estimated, the observation is analysed and the result
//! recorded. Every step consumes the analysed ensemble and process noise of the previous step.
//! Any failure terminates the run and is reported with the step at which it occurred.

use std::fmt;

use nalgebra as na;
use na::{DMatrix, DVector};
use rand_core::RngCore;

use crate::config::FilterConfig;
use crate::error::{ConfigError, EstimateError, FilterError};
use crate::estimators::{adaptive, analysis, forecast};
use crate::estimators::adaptive::ProcessNoiseEstimator;
use crate::models::{EnsembleState, FunctionPredictModel, KalmanState, LinearObserveModel};
use crate::noise::CorrelatedNoise;

/// Phases of a filter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    Initializing,
    Forecasting,
    Analyzing,
    Recording,
    Done,
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterPhase::Initializing => "initializing",
            FilterPhase::Forecasting => "forecasting",
            FilterPhase::Analyzing => "analyzing",
            FilterPhase::Recording => "recording",
            FilterPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Output of a filter run, one entry per time step.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Time grid (echoed)
    pub times: Vec<f64>,
    /// Observations (echoed)
    pub observations: Vec<DVector<f64>>,
    /// Filtered mean, steps x state dimension
    pub mean: DMatrix<f64>,
    /// Ensemble covariance of each step
    pub covariance: Vec<DMatrix<f64>>,
    /// Half width of the bounds around the mean, steps x state dimension
    pub bounds: DMatrix<f64>,
    /// Analysed ensemble of each step
    pub ensembles: Vec<DMatrix<f64>>,
    /// Process noise covariance after each step
    pub process_noise: Vec<DMatrix<f64>>,
}

impl Trajectory {
    fn with_capacity(steps: usize, d: usize) -> Trajectory {
        Trajectory {
            times: Vec::with_capacity(steps),
            observations: Vec::with_capacity(steps),
            mean: DMatrix::zeros(steps, d),
            covariance: Vec::with_capacity(steps),
            bounds: DMatrix::zeros(steps, d),
            ensembles: Vec::with_capacity(steps),
            process_noise: Vec::with_capacity(steps),
        }
    }

    fn record(&mut self, k: usize, state: &KalmanState, bounds: &DVector<f64>, A: &DMatrix<f64>, V: &CorrelatedNoise) {
        self.mean.row_mut(k).copy_from(&state.x.transpose());
        self.bounds.row_mut(k).copy_from(&bounds.transpose());
        self.covariance.push(state.X.clone());
        self.ensembles.push(A.clone());
        self.process_noise.push(V.Q.clone());
    }

    pub fn steps(&self) -> usize {
        self.mean.nrows()
    }

    /// Lower bounds, steps x state dimension.
    pub fn lower(&self) -> DMatrix<f64> {
        &self.mean - &self.bounds
    }

    /// Upper bounds, steps x state dimension.
    pub fn upper(&self) -> DMatrix<f64> {
        &self.mean + &self.bounds
    }

    /// Fraction of (step, component) pairs of `truth` (steps x state dimension) inside the bounds.
    ///
    /// `None` when `truth` does not have the shape of the mean trajectory.
    pub fn coverage(&self, truth: &DMatrix<f64>) -> Option<f64> {
        if truth.shape() != self.mean.shape() {
            return None;
        }
        if truth.is_empty() {
            return Some(1.);
        }
        let inside = truth.iter().zip(self.mean.iter().zip(self.bounds.iter()))
            .filter(|(t, (m, b))| (*t - *m).abs() <= **b)
            .count();
        Some(inside as f64 / truth.len() as f64)
    }
}

/// Ensemble Kalman filter with adaptive process noise.
pub struct AdaptiveEnsembleFilter<F, Q> {
    pub config: FilterConfig,
    pub model: FunctionPredictModel<F, Q>,
    pub obs: LinearObserveModel,
    /// Observation noise
    pub noise: CorrelatedNoise,
}

impl<F, Q> AdaptiveEnsembleFilter<F, Q>
    where
        F: Fn(f64, &DVector<f64>, &Q) -> DVector<f64> + Sync,
        Q: Sync,
{
    pub fn new(config: FilterConfig, model: FunctionPredictModel<F, Q>, obs: LinearObserveModel, noise: CorrelatedNoise) -> Result<Self, ConfigError> {
        config.validate()?;
        if noise.Q.nrows() != obs.observation_dim() || noise.Q.ncols() != obs.observation_dim() {
            return Err(ConfigError::Dimension(format!(
                "observation noise is {}x{}, observation model has {} observations",
                noise.Q.nrows(), noise.Q.ncols(), obs.observation_dim())));
        }
        Ok(AdaptiveEnsembleFilter { config, model, obs, noise })
    }

    fn estimator(&self) -> ProcessNoiseEstimator {
        ProcessNoiseEstimator {
            alpha: self.config.alpha,
            beta: self.config.beta,
            policy: self.config.process_noise_policy,
            rcond_limit: self.config.rcond_limit,
        }
    }

    /// Filter the `observations` made at `times`.
    ///
    /// The first observation time is the time of the initial state `init`; the first observation is not assimilated.
    /// `process_noise` seeds the adaptively estimated process noise covariance.
    pub fn run(
        &self,
        init: &KalmanState,
        process_noise: &CorrelatedNoise,
        times: &[f64],
        observations: &[DVector<f64>],
        rng: &mut dyn RngCore,
    ) -> Result<Trajectory, FilterError> {
        self.check_inputs(init, process_noise, times, observations)?;
        let steps = times.len();
        let members = self.config.ensemble_size;
        log::info!("adaptive EnKF: {} steps, {} states, {} observations, {} members",
            steps, init.dim(), self.obs.observation_dim(), members);

        let mut phase = FilterPhase::Initializing;
        log::trace!("step 1 {}", phase);
        let mut trajectory = Trajectory::with_capacity(steps, init.dim());
        trajectory.times.extend_from_slice(times);
        trajectory.observations.extend_from_slice(observations);

        let mut ensemble = EnsembleState::new_perturbed(init, members, rng)
            .map_err(|source| FilterError::Step { step: 1, phase, source })?;
        let mut V = process_noise.clone();
        trajectory.record(0, init, &init.bounds(self.config.bound_sigmas), &ensemble.A, &V);

        let estimator = self.estimator();
        for k in 1..steps {
            let step = k + 1;
            let fail = |phase: FilterPhase| move |source: EstimateError| {
                log::error!("estimation failed at step {} while {}: {}", step, phase, source);
                FilterError::Step { step, phase, source }
            };

            phase = FilterPhase::Forecasting;
            log::trace!("step {} {}", step, phase);
            let fc = forecast::forecast(
                &ensemble, &self.model, times[k - 1], times[k], &V,
                &self.config.ode, self.config.process_noise_policy, self.config.parallel_forecast, rng)
                .map_err(fail(phase))?;

            phase = FilterPhase::Analyzing;
            log::trace!("step {} {}", step, phase);
            let innov = adaptive::perturb_observations(&fc.Ap, &self.obs, &self.noise, &observations[k], rng)
                .map_err(fail(phase))?;
            let update = estimator.update(&V, &fc, &innov, &self.obs, &self.noise)
                .map_err(fail(phase))?;
            V = update.V;
            ensemble.A = analysis::analyse(&fc.Ap, &innov, &self.obs, self.config.rcond_limit)
                .map_err(fail(phase))?;

            phase = FilterPhase::Recording;
            log::trace!("step {} {}", step, phase);
            let state = ensemble.kalman_state();
            log::debug!("step {}: t={} innovation spread {:.6e}, trace(V) {:.6e}",
                step, times[k], innovation_spread(&innov.Y), V.Q.trace());
            trajectory.record(k, &state, &state.bounds(self.config.bound_sigmas), &ensemble.A, &V);
        }

        phase = FilterPhase::Done;
        log::trace!("{}", phase);
        log::info!("adaptive EnKF: completed {} steps", steps);
        Ok(trajectory)
    }

    fn check_inputs(&self, init: &KalmanState, process_noise: &CorrelatedNoise, times: &[f64], observations: &[DVector<f64>]) -> Result<(), ConfigError> {
        let d = init.dim();
        if d != self.obs.state_dim() {
            return Err(ConfigError::Dimension(format!(
                "initial state has {} elements, observation model has {} states", d, self.obs.state_dim())));
        }
        if init.X.shape() != (d, d) {
            return Err(ConfigError::Dimension(format!(
                "initial covariance is {}x{}, state has {} elements", init.X.nrows(), init.X.ncols(), d)));
        }
        if process_noise.Q.shape() != (d, d) {
            return Err(ConfigError::Dimension(format!(
                "process noise is {}x{}, state has {} elements", process_noise.Q.nrows(), process_noise.Q.ncols(), d)));
        }
        if times.is_empty() {
            return Err(ConfigError::TimeGrid("no time points".to_string()));
        }
        if times.len() != observations.len() {
            return Err(ConfigError::TimeGrid(format!(
                "{} time points for {} observations", times.len(), observations.len())));
        }
        if let Some(k) = observations.iter().position(|z| z.nrows() != self.obs.observation_dim()) {
            return Err(ConfigError::Dimension(format!(
                "observation {} has {} elements, observation model has {}",
                k + 1, observations[k].nrows(), self.obs.observation_dim())));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(ConfigError::TimeGrid("non-finite time point".to_string()));
        }
        Ok(())
    }
}

/// Root mean square of the innovations.
fn innovation_spread(Y: &DMatrix<f64>) -> f64 {
    if Y.is_empty() {
        0.
    } else {
        (Y.norm_squared() / Y.len() as f64).sqrt()
    }
}
