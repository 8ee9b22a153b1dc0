//! Operation of the adaptive ensemble Kalman filter in a simple example.
//!
//! One state decaying exponentially, observed directly with noise.

use na::{DMatrix, DVector};
use nalgebra as na;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use adaptive_enkf::config::FilterConfig;
use adaptive_enkf::filter::AdaptiveEnsembleFilter;
use adaptive_enkf::models::{FunctionPredictModel, KalmanState, LinearObserveModel};
use adaptive_enkf::noise::CorrelatedNoise;

fn main() {
    env_logger::init();
    // We need random numbers, seeded so runs repeat
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);

    // dx/dt = -rate.x
    let model = FunctionPredictModel::new(|_t: f64, x: &DVector<f64>, rate: &f64| x * -*rate, 1.);
    let observe_noise = 0.05;
    let filter = AdaptiveEnsembleFilter::new(
        FilterConfig::default(),
        model,
        LinearObserveModel::identity(1),
        CorrelatedNoise { Q: DMatrix::from_element(1, 1, observe_noise) },
    ).unwrap();

    // Observations of the true decay every 0.1 time units
    let times: Vec<f64> = (0..20).map(|k| k as f64 * 0.1).collect();
    let noise = Normal::new(0., f64::sqrt(observe_noise)).unwrap();
    let truth: Vec<f64> = times.iter().map(|t| (-t).exp()).collect();
    let observations: Vec<DVector<f64>> = truth.iter()
        .map(|x| DVector::from_element(1, x + noise.sample(&mut rng)))
        .collect();

    // Initially at 1 with some uncertainty
    let init = KalmanState { x: DVector::from_element(1, 1.), X: DMatrix::from_element(1, 1, 0.1) };
    let process_noise = CorrelatedNoise { Q: DMatrix::from_element(1, 1, 0.01) };

    let trajectory = filter.run(&init, &process_noise, &times, &observations, &mut rng).unwrap();
    for k in 0..trajectory.steps() {
        println!("t {:.1} truth {:.3} z {:.3} x {:.3} +- {:.3} V {:.2e}",
            times[k], truth[k], observations[k][0],
            trajectory.mean[(k, 0)], trajectory.bounds[(k, 0)], trajectory.process_noise[k][(0, 0)]);
    }
    let truth = DMatrix::from_column_slice(truth.len(), 1, &truth);
    println!("truth inside bounds {:.0}%", 100. * trajectory.coverage(&truth).unwrap());
}
