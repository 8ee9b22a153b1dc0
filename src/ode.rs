//! Adaptive step ODE integration.
//!
//! Ensemble members are advanced between observation times with the Dormand-Prince 5(4)
//! embedded Runge-Kutta pair. The 5th order solution is propagated, the embedded 4th order
//! solution provides the local error estimate. The last stage is evaluated at the end point of
//! the step so it is reused as the first stage of the next step (FSAL).

use nalgebra as na;
use na::DVector;
use thiserror::Error;

/// Errors from ODE integration.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum OdeError {
    /// Step error or state became non-finite (NaN / Inf).
    #[error("step error or state is not finite")]
    StepNotFinite,
    /// Exceeded maximum number of steps.
    #[error("maximum number of steps exceeded")]
    MaxStepsExceeded,
    /// The derivative has a different dimension to the state.
    #[error("derivative has dimension {found}, state has {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Settings for adaptive step-size control.
#[derive(Debug, Clone, PartialEq)]
pub struct OdeSettings {
    /// Absolute error tolerance.
    pub abs_tol: f64,
    /// Relative error tolerance.
    pub rel_tol: f64,
    /// Safety factor for step-size controller.
    pub safety: f64,
    /// Minimum step-size decrease factor.
    pub min_factor: f64,
    /// Maximum step-size increase factor.
    pub max_factor: f64,
    /// Steps this small are accepted whatever their error.
    pub min_step: f64,
    /// Maximum number of steps before returning [`OdeError::MaxStepsExceeded`].
    pub max_steps: usize,
}

impl Default for OdeSettings {
    fn default() -> Self {
        OdeSettings {
            abs_tol: 1e-8,
            rel_tol: 1e-8,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
            min_step: 1e-10,
            max_steps: 100_000,
        }
    }
}

/// Result of an adaptive integration.
#[derive(Debug, Clone)]
pub struct Solution {
    /// State at the end of the interval.
    pub y: DVector<f64>,
    /// Total derivative evaluations.
    pub evals: usize,
    /// Accepted steps.
    pub accepted: usize,
    /// Rejected steps.
    pub rejected: usize,
}

// Dormand-Prince tableau
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0, 0.0],
    [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
];
// Difference of the 5th and 4th order weights
const BERR: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];
const ORDER: f64 = 5.0;

/// Integrate `dy/dt = f(t, y)` from `t0` to `tf` starting at `y0`.
pub fn integrate<F>(t0: f64, tf: f64, y0: &DVector<f64>, mut f: F, settings: &OdeSettings) -> Result<Solution, OdeError>
    where
        F: FnMut(f64, &DVector<f64>) -> DVector<f64>,
{
    let mut y = y0.clone();
    if tf == t0 {
        return Ok(Solution { y, evals: 0, accepted: 0, rejected: 0 });
    }
    if !is_finite(&y) {
        return Err(OdeError::StepNotFinite);
    }

    let tdir = if tf > t0 { 1.0 } else { -1.0 };
    let mut t = t0;
    let mut evals = 0;
    let mut accepted = 0;
    let mut rejected = 0;

    let mut k1 = f(t, &y);
    evals += 1;
    check_dim(&k1, y.nrows())?;
    if !is_finite(&k1) {
        return Err(OdeError::StepNotFinite);
    }
    let mut h = initial_step(t0, tf, &y, &k1, &mut f, settings, &mut evals)? * tdir;

    loop {
        if accepted + rejected >= settings.max_steps {
            return Err(OdeError::MaxStepsExceeded);
        }
        // Clamp step to not overshoot the end
        let last = (t + h - tf) * tdir >= 0.0;
        if last {
            h = tf - t;
        }

        let mut k: Vec<DVector<f64>> = Vec::with_capacity(7);
        k.push(k1.clone());
        for s in 1..7 {
            let mut ys = y.clone();
            for (j, kj) in k.iter().enumerate() {
                let a = A[s][j];
                if a != 0.0 {
                    ys.axpy(a * h, kj, 1.0);
                }
            }
            let ks = f(t + C[s] * h, &ys);
            evals += 1;
            check_dim(&ks, y.nrows())?;
            k.push(ks);
        }

        // The 7th stage weights are the 5th order solution weights
        let mut ynew = y.clone();
        for (j, kj) in k.iter().take(6).enumerate() {
            let b = A[6][j];
            if b != 0.0 {
                ynew.axpy(b * h, kj, 1.0);
            }
        }
        let mut yerr = DVector::zeros(y.len());
        for (j, kj) in k.iter().enumerate() {
            if BERR[j] != 0.0 {
                yerr.axpy(BERR[j] * h, kj, 1.0);
            }
        }

        let enorm = error_norm(&yerr, &y, &ynew, settings);
        if !enorm.is_finite() || !is_finite(&ynew) {
            return Err(OdeError::StepNotFinite);
        }

        let factor = if enorm == 0.0 {
            settings.max_factor
        } else {
            (settings.safety * enorm.powf(-1.0 / ORDER)).max(settings.min_factor).min(settings.max_factor)
        };

        if enorm <= 1.0 || h.abs() <= settings.min_step {
            accepted += 1;
            y = ynew;
            if last {
                return Ok(Solution { y, evals, accepted, rejected });
            }
            t += h;
            k1 = k.swap_remove(6);
            h *= factor;
        } else {
            rejected += 1;
            h *= factor.min(1.0);
        }
        if h.abs() < settings.min_step {
            h = settings.min_step * tdir;
        }
    }
}

/// Initial step size (magnitude), Hairer, Norsett & Wanner, "Solving ODEs I", II.4.
fn initial_step<F>(t0: f64, tf: f64, y0: &DVector<f64>, f0: &DVector<f64>, f: &mut F, settings: &OdeSettings, evals: &mut usize) -> Result<f64, OdeError>
    where
        F: FnMut(f64, &DVector<f64>) -> DVector<f64>,
{
    let span = (tf - t0).abs();
    let tdir = if tf > t0 { 1.0 } else { -1.0 };
    let d0 = scaled_norm(y0, y0, settings);
    let d1 = scaled_norm(f0, y0, settings);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let h0 = h0.min(span);

    let mut y1 = y0.clone();
    y1.axpy(h0 * tdir, f0, 1.0);
    let f1 = f(t0 + h0 * tdir, &y1);
    *evals += 1;
    check_dim(&f1, y0.nrows())?;
    let d2 = scaled_norm(&(f1 - f0), y0, settings) / h0;

    let dmax = d1.max(d2);
    let h1 = if !dmax.is_finite() {
        h0
    } else if dmax <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / dmax).powf(1.0 / ORDER)
    };
    Ok((100.0 * h0).min(h1).min(span).max(settings.min_step))
}

fn check_dim(dy: &DVector<f64>, expected: usize) -> Result<(), OdeError> {
    if dy.nrows() == expected {
        Ok(())
    } else {
        Err(OdeError::DimensionMismatch { expected, found: dy.nrows() })
    }
}

fn scaled_norm(v: &DVector<f64>, y: &DVector<f64>, settings: &OdeSettings) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().zip(y.iter())
        .map(|(vi, yi)| {
            let sc = settings.abs_tol + settings.rel_tol * yi.abs();
            (vi / sc).powi(2)
        })
        .sum();
    (sum / v.len() as f64).sqrt()
}

fn error_norm(yerr: &DVector<f64>, y: &DVector<f64>, ynew: &DVector<f64>, settings: &OdeSettings) -> f64 {
    if yerr.is_empty() {
        return 0.0;
    }
    let sum: f64 = yerr.iter().zip(y.iter().zip(ynew.iter()))
        .map(|(e, (a, b))| {
            let sc = settings.abs_tol + settings.rel_tol * a.abs().max(b.abs());
            (e / sc).powi(2)
        })
        .sum();
    (sum / yerr.len() as f64).sqrt()
}

fn is_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}
