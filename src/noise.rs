#![allow(non_snake_case)]

//! Ensemble noise models.
//!
//! Linear Noise models are represented as structs.
//! Gaussian perturbations for ensemble members and perturbed observations are drawn with a [`NoiseSampler`].

use nalgebra as na;
use na::{DMatrix, DVector};
use rand_core::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::EstimateError;
use crate::linalg::sqrt;

/// Additive noise.
///
/// Noise represented as the noise variance vector.
#[derive(PartialEq, Clone, Debug)]
pub struct UncorrelatedNoise {
    /// Noise variance
    pub q: DVector<f64>,
}

/// Additive noise.
///
/// Noise represented as the noise covariance matrix.
/// The adaptively estimated process noise covariance is symmetric but may be indefinite.
#[derive(PartialEq, Clone, Debug)]
pub struct CorrelatedNoise {
    /// Noise covariance
    pub Q: DMatrix<f64>,
}

/// Treatment of a process noise covariance that acquires negative eigenvalues.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ProcessNoisePolicy {
    /// Keep the covariance as estimated, perturbations use the real part of its square root.
    Unclipped,
    /// Clamp negative eigenvalues of the estimated covariance to zero.
    Clip,
    /// Fail with [`EstimateError::NonPositiveCovariance`].
    Reject,
}

impl Default for ProcessNoisePolicy {
    fn default() -> Self {
        ProcessNoisePolicy::Unclipped
    }
}

impl CorrelatedNoise {
    pub fn new_zero(d: usize) -> CorrelatedNoise {
        CorrelatedNoise {
            Q: DMatrix::zeros(d, d),
        }
    }

    /// Creates a CorrelatedNoise from an UncorrelatedNoise.
    pub fn from_uncorrelated(uncorrelated: &UncorrelatedNoise) -> Self {
        CorrelatedNoise {
            Q: DMatrix::from_diagonal(&uncorrelated.q),
        }
    }

    pub fn dim(&self) -> usize {
        self.Q.nrows()
    }

    /// A sampler drawing zero mean Gaussian perturbations with this covariance.
    ///
    /// The real part of the covariance's square root is used. Under [`ProcessNoisePolicy::Reject`]
    /// an indefinite covariance is an error.
    pub fn sampler(&self, policy: ProcessNoisePolicy, what: &'static str) -> Result<NoiseSampler, EstimateError> {
        let (root, min_eigenvalue) = sqrt::real_sqrt(&self.Q);
        let indefinite = min_eigenvalue < sqrt::negative_limit(&self.Q);
        if indefinite {
            if policy == ProcessNoisePolicy::Reject {
                return Err(EstimateError::NonPositiveCovariance { what, min_eigenvalue });
            }
            log::warn!("{} not PSD (smallest eigenvalue {:e}), sampling with the real part of its square root", what, min_eigenvalue);
        }
        Ok(NoiseSampler { root, min_eigenvalue })
    }
}

/// Draws Gaussian perturbations as `sqrt(Q).z` with `z` standard normal.
#[derive(Clone, Debug)]
pub struct NoiseSampler {
    root: DMatrix<f64>,
    min_eigenvalue: f64,
}

impl NoiseSampler {
    /// The (real) square root of the covariance.
    pub fn root(&self) -> &DMatrix<f64> {
        &self.root
    }

    /// Smallest eigenvalue of the covariance, negative when the square root lost its imaginary part.
    pub fn min_eigenvalue(&self) -> f64 {
        self.min_eigenvalue
    }

    /// `k` independent samples, column stacked into a dim x k matrix.
    ///
    /// Standard normal draws are made column by column so each sample consumes consecutive draws from `rng`.
    pub fn sample(&self, k: usize, rng: &mut dyn RngCore) -> DMatrix<f64> {
        let d = self.root.ncols();
        let mut Z: DMatrix<f64> = DMatrix::zeros(d, k);
        for j in 0..k {
            for i in 0..d {
                Z[(i, j)] = StandardNormal.sample(rng);
            }
        }
        &self.root * Z
    }
}
