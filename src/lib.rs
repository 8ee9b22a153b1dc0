//! Adaptive ensemble Kalman filtering.
//!
//! Sequential state estimation for a nonlinear dynamical system, an ODE `dx/dt = f(t, x, q)`, observed through
//! noisy linear measurements. An ensemble of state samples represents the state distribution. Between
//! observations each member is integrated through the dynamics and perturbed by process noise; at each
//! observation the ensemble is corrected by a stochastic (perturbed observation) Kalman update.
//!
//! The process noise covariance is not a fixed tuning parameter. It is re-estimated online from the
//! innovations: the innovation spread not explained by the deterministic forecast spread and the observation
//! noise is attributed to process noise, distributed onto the state and blended into the running estimate.
//!
//! State representations and models are defined by structs in [`models`] and [`noise`].
//! The steps of the filter are in [`estimators`] and are driven over a time grid by [`filter`].
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use rand::SeedableRng;
//! use adaptive_enkf::config::FilterConfig;
//! use adaptive_enkf::filter::AdaptiveEnsembleFilter;
//! use adaptive_enkf::models::{FunctionPredictModel, KalmanState, LinearObserveModel};
//! use adaptive_enkf::noise::CorrelatedNoise;
//!
//! let decay = FunctionPredictModel::new(|_t: f64, x: &DVector<f64>, rate: &f64| x * -*rate, 1.0);
//! let filter = AdaptiveEnsembleFilter::new(
//!     FilterConfig::default(),
//!     decay,
//!     LinearObserveModel::identity(1),
//!     CorrelatedNoise { Q: DMatrix::from_element(1, 1, 0.05) },
//! ).unwrap();
//!
//! let init = KalmanState { x: DVector::from_element(1, 1.0), X: DMatrix::from_element(1, 1, 0.1) };
//! let v0 = CorrelatedNoise { Q: DMatrix::from_element(1, 1, 0.01) };
//! let times = [0.0, 0.1, 0.2];
//! let observations = [DVector::from_element(1, 1.0), DVector::from_element(1, 0.9), DVector::from_element(1, 0.8)];
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//!
//! let trajectory = filter.run(&init, &v0, &times, &observations, &mut rng).unwrap();
//! assert_eq!(trajectory.steps(), 3);
//! assert_eq!(trajectory.mean[(0, 0)], 1.0);
//! ```
//!
//! # Licensing
//!
//! The copyright notice is that of the MIT license.
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction,
//! including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software,
//! and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NON INFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY,
//! WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

pub mod config;
pub mod error;
pub mod estimators;
pub mod filter;
pub mod linalg;
pub mod models;
pub mod noise;
pub mod ode;
