//! Filter configuration.

use crate::error::ConfigError;
use crate::noise::ProcessNoisePolicy;
use crate::ode::OdeSettings;

/// Construction time configuration of an [`AdaptiveEnsembleFilter`](crate::filter::AdaptiveEnsembleFilter).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Number of ensemble members, at least 2
    pub ensemble_size: usize,
    /// Process noise forgetting factor in [0,1]
    pub alpha: f64,
    /// Process noise distribution weight in [0,1]
    pub beta: f64,
    pub process_noise_policy: ProcessNoisePolicy,
    /// Integrate members on the rayon thread pool (requires the `parallel` feature)
    pub parallel_forecast: bool,
    /// Minimum reciprocal condition number of inverted or solved matrices
    pub rcond_limit: f64,
    /// Width of the reported bounds in standard deviations
    pub bound_sigmas: f64,
    pub ode: OdeSettings,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            ensemble_size: 50,
            alpha: 0.95,
            beta: 0.5,
            process_noise_policy: ProcessNoisePolicy::Unclipped,
            parallel_forecast: true,
            rcond_limit: 1e-14,
            bound_sigmas: 3.,
            ode: OdeSettings::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ensemble_size < 2 {
            return Err(ConfigError::EnsembleSize(self.ensemble_size));
        }
        unit_range("alpha", self.alpha)?;
        unit_range("beta", self.beta)?;
        positive("rcond_limit", self.rcond_limit)?;
        positive("bound_sigmas", self.bound_sigmas)?;
        positive("ode.abs_tol", self.ode.abs_tol)?;
        positive("ode.rel_tol", self.ode.rel_tol)?;
        positive("ode.min_step", self.ode.min_step)?;
        Ok(())
    }
}

fn unit_range(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0. ..=1.).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0. {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
