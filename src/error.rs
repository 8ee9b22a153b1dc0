//! Error types.
//!
//! Component operations return [`EstimateError`]. The filter driver wraps these with the
//! time step and phase at which estimation could not continue.

use thiserror::Error;

use crate::filter::FilterPhase;
use crate::ode::OdeError;

/// Failure of a single forecast, estimation or analysis operation.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// A matrix that must be inverted (or solved against) is singular or ill-conditioned.
    #[error("{what} is singular or ill-conditioned (rcond {rcond:e})")]
    SingularOperator { what: &'static str, rcond: f64 },

    /// The dynamics integration of an ensemble member failed.
    #[error("integration of ensemble member {member} failed: {source}")]
    IntegrationFailure {
        member: usize,
        #[source]
        source: OdeError,
    },

    /// A covariance has a negative eigenvalue and the policy rejects it.
    #[error("{what} not PSD, smallest eigenvalue {min_eigenvalue:e}")]
    NonPositiveCovariance {
        what: &'static str,
        min_eigenvalue: f64,
    },

    #[error("dimension mismatch: {0}")]
    Dimension(String),
}

/// Invalid filter construction or run inputs.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ensemble size {0} is less than 2")]
    EnsembleSize(usize),

    #[error("{name} = {value} is outside [0, 1]")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} = {value} must be positive")]
    NotPositive { name: &'static str, value: f64 },

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("time grid: {0}")]
    TimeGrid(String),
}

/// Failure of a filter run.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter configuration: {0}")]
    Config(#[from] ConfigError),

    /// Estimation could not continue at time step `step` (1-based).
    #[error("estimation failed at step {step} while {phase}: {source}")]
    Step {
        step: usize,
        phase: FilterPhase,
        #[source]
        source: EstimateError,
    },
}

impl FilterError {
    /// The 1-based time step at which the run terminated, if it got that far.
    pub fn step(&self) -> Option<usize> {
        match self {
            FilterError::Config(_) => None,
            FilterError::Step { step, .. } => Some(*step),
        }
    }
}
