#![allow(non_snake_case)]

//! Adaptive ensemble Kalman filter tracking the Lorenz-63 system.
//!
//! Only the first two components are observed. The filter model uses a perturbed rho,
//! the mismatch is absorbed by the estimated process noise.

use na::{DMatrix, DVector};
use nalgebra as na;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use adaptive_enkf::config::FilterConfig;
use adaptive_enkf::filter::AdaptiveEnsembleFilter;
use adaptive_enkf::models::{FunctionPredictModel, KalmanState, LinearObserveModel};
use adaptive_enkf::noise::CorrelatedNoise;
use adaptive_enkf::ode::{self, OdeSettings};

struct Lorenz {
    sigma: f64,
    rho: f64,
    beta: f64,
}

fn lorenz(_t: f64, x: &DVector<f64>, p: &Lorenz) -> DVector<f64> {
    DVector::from_vec(vec![
        p.sigma * (x[1] - x[0]),
        x[0] * (p.rho - x[2]) - x[1],
        x[0] * x[1] - p.beta * x[2],
    ])
}

fn main() {
    env_logger::init();
    let mut rng = rand::rngs::StdRng::seed_from_u64(63);

    let truth_params = Lorenz { sigma: 10., rho: 28., beta: 8. / 3. };
    let dt = 0.05;
    let steps = 200;
    let times: Vec<f64> = (0..steps).map(|k| k as f64 * dt).collect();

    // Simulate the truth
    let mut truth = DMatrix::zeros(steps, 3);
    let mut x = DVector::from_vec(vec![1., 1., 20.]);
    for k in 0..steps {
        if k > 0 {
            x = ode::integrate(times[k - 1], times[k], &x, |t, y| lorenz(t, y, &truth_params), &OdeSettings::default())
                .unwrap().y;
        }
        truth.row_mut(k).copy_from(&x.transpose());
    }

    // Observe x and y
    let Hx = DMatrix::from_row_slice(2, 3, &[1., 0., 0., 0., 1., 0.]);
    let observe_noise = 1.;
    let noise = Normal::new(0., f64::sqrt(observe_noise)).unwrap();
    let observations: Vec<DVector<f64>> = (0..steps)
        .map(|k| (&Hx * truth.row(k).transpose()).map(|z| z + noise.sample(&mut rng)))
        .collect();

    let model = FunctionPredictModel::new(lorenz, Lorenz { sigma: 10., rho: 27., beta: 8. / 3. });
    let config = FilterConfig { ensemble_size: 40, alpha: 0.9, ..FilterConfig::default() };
    let filter = AdaptiveEnsembleFilter::new(
        config,
        model,
        LinearObserveModel { Hx },
        CorrelatedNoise { Q: DMatrix::identity(2, 2) * observe_noise },
    ).unwrap();

    let init = KalmanState { x: DVector::from_vec(vec![0., 0., 25.]), X: DMatrix::identity(3, 3) * 4. };
    let process_noise = CorrelatedNoise { Q: DMatrix::identity(3, 3) * 0.1 };

    let trajectory = filter.run(&init, &process_noise, &times, &observations, &mut rng).unwrap();
    for k in (0..steps).step_by(20) {
        println!("t {:5.2} truth {:8.3} {:8.3} {:8.3} x {:8.3} {:8.3} {:8.3} trace(V) {:.3}",
            times[k], truth[(k, 0)], truth[(k, 1)], truth[(k, 2)],
            trajectory.mean[(k, 0)], trajectory.mean[(k, 1)], trajectory.mean[(k, 2)],
            trajectory.process_noise[k].trace());
    }
    let rmse = ((&trajectory.mean - &truth).norm_squared() / truth.len() as f64).sqrt();
    println!("rmse {:.3}, truth inside bounds {:.0}%", rmse, 100. * trajectory.coverage(&truth).unwrap());
}
