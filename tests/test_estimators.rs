#![allow(non_snake_case)]

//! Test the numerical operations of the filter steps in isolation.
//!
//! The forecast, the adaptive process noise update and the analysis are each exercised with fixed inputs.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

use adaptive_enkf::error::EstimateError;
use adaptive_enkf::estimators::{adaptive, analysis, ensemble, forecast};
use adaptive_enkf::estimators::adaptive::ProcessNoiseEstimator;
use adaptive_enkf::estimators::forecast::Forecast;
use adaptive_enkf::models::{EnsembleState, FunctionPredictModel, KalmanState, LinearObserveModel};
use adaptive_enkf::noise::{CorrelatedNoise, ProcessNoisePolicy};
use adaptive_enkf::ode::{OdeError, OdeSettings};

const RCOND_LIMIT: f64 = 1e-14;

fn scalar(v: f64) -> DMatrix<f64> {
    DMatrix::from_element(1, 1, v)
}

fn row(values: &[f64]) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, values.len(), values)
}

fn decay(_t: f64, x: &DVector<f64>, rate: &f64) -> DVector<f64> {
    x * -*rate
}

#[test]
fn test_distribution_matrix() {
    let P = DMatrix::from_row_slice(2, 2, &[2., 1., 1., 3.]);
    let Hx = row(&[1., 0.]);

    let G = adaptive::distribution_matrix(&Hx, &P, 1., RCOND_LIMIT).unwrap();
    assert_relative_eq!(G, Hx.transpose());

    // inv(Hx.P.Hx').Hx.P.(I - Hx'.Hx) = [0, 0.5]
    let G = adaptive::distribution_matrix(&Hx, &P, 0., RCOND_LIMIT).unwrap();
    assert_relative_eq!(G, DMatrix::from_column_slice(2, 1, &[0., 0.5]), epsilon = 1e-14);

    let G = adaptive::distribution_matrix(&Hx, &P, 0.5, RCOND_LIMIT).unwrap();
    assert_relative_eq!(G, DMatrix::from_column_slice(2, 1, &[0.5, 0.25]), epsilon = 1e-14);

    // Fully observed, nothing to distribute
    let G = adaptive::distribution_matrix(&DMatrix::identity(2, 2), &P, 0., RCOND_LIMIT).unwrap();
    assert_relative_eq!(G, DMatrix::zeros(2, 2), epsilon = 1e-14);
}

#[test]
fn test_distribution_matrix_singular() {
    let P = DMatrix::from_row_slice(2, 2, &[2., 1., 1., 3.]);

    let unobservable = DMatrix::zeros(1, 2);
    match adaptive::distribution_matrix(&unobservable, &P, 0.5, RCOND_LIMIT) {
        Err(EstimateError::SingularOperator { .. }) => {}
        other => panic!("expected SingularOperator, got {:?}", other),
    }

    let duplicated = DMatrix::from_row_slice(2, 2, &[1., 0., 1., 0.]);
    assert!(adaptive::distribution_matrix(&duplicated, &P, 0.5, RCOND_LIMIT).is_err());
}

/// Scalar forecast whose statistics are easily computed by hand.
///
/// var(Ap) = 4, var(A*) = var_star, Y = 2 - Ap + E = [2.5, -0.5, -2] with var 5.25, var(E) = 0.25
fn scalar_forecast(A_star: &[f64]) -> (Forecast, adaptive::Innovation) {
    let fc = Forecast {
        A_star: row(A_star),
        Ap: row(&[0., 2., 4.]),
    };
    let obs = LinearObserveModel::identity(1);
    let innov = adaptive::innovation(&fc.Ap, &obs, &DVector::from_element(1, 2.), row(&[0.5, -0.5, 0.]));
    (fc, innov)
}

#[test]
fn test_innovation() {
    let (_fc, innov) = scalar_forecast(&[1., 2., 3.]);
    assert_relative_eq!(innov.Y, row(&[2.5, -0.5, -2.]));
    assert_relative_eq!(innov.Cee, scalar(0.25));
}

#[test]
fn test_process_noise_update() {
    let (fc, innov) = scalar_forecast(&[1., 2., 3.]);
    let obs = LinearObserveModel::identity(1);
    let R = CorrelatedNoise { Q: scalar(0.25) };
    let V = CorrelatedNoise { Q: scalar(1.) };

    let est = ProcessNoiseEstimator::new(0.75, 1.);
    let update = est.update(&V, &fc, &innov, &obs, &R).unwrap();
    // Q_hat = 5.25 - 1 - 0.25
    assert_relative_eq!(update.Q_hat, scalar(4.), epsilon = 1e-12);
    assert_relative_eq!(update.Gamma, scalar(1.));
    assert_relative_eq!(update.V.Q, scalar(1.75), epsilon = 1e-12);

    // No forgetting keeps V, full forgetting replaces it
    let update = ProcessNoiseEstimator::new(1., 1.).update(&V, &fc, &innov, &obs, &R).unwrap();
    assert_relative_eq!(update.V.Q, V.Q);
    let update = ProcessNoiseEstimator::new(0., 1.).update(&V, &fc, &innov, &obs, &R).unwrap();
    assert_relative_eq!(update.V.Q, scalar(4.), epsilon = 1e-12);
}

#[test]
fn test_process_noise_policy() {
    // var(A*) = 9 so Q_hat = 5.25 - 9 - 0.25 = -4 and V = 0.5 - 2 = -1.5
    let (fc, innov) = scalar_forecast(&[-1., 2., 5.]);
    let obs = LinearObserveModel::identity(1);
    let R = CorrelatedNoise { Q: scalar(0.25) };
    let V = CorrelatedNoise { Q: scalar(1.) };
    let mut est = ProcessNoiseEstimator::new(0.5, 1.);

    let update = est.update(&V, &fc, &innov, &obs, &R).unwrap();
    assert_relative_eq!(update.Q_hat, scalar(-4.), epsilon = 1e-12);
    assert_relative_eq!(update.V.Q, scalar(-1.5), epsilon = 1e-12);

    est.policy = ProcessNoisePolicy::Clip;
    let update = est.update(&V, &fc, &innov, &obs, &R).unwrap();
    assert_abs_diff_eq!(update.V.Q, scalar(0.), epsilon = 1e-12);

    est.policy = ProcessNoisePolicy::Reject;
    match est.update(&V, &fc, &innov, &obs, &R) {
        Err(EstimateError::NonPositiveCovariance { min_eigenvalue, .. }) => assert_relative_eq!(min_eigenvalue, -1.5, epsilon = 1e-12),
        other => panic!("expected NonPositiveCovariance, got {:?}", other.map(|u| u.V)),
    }
}

#[test]
fn test_process_noise_symmetric() {
    let mut rng = StdRng::seed_from_u64(23);
    let spread = CorrelatedNoise { Q: DMatrix::from_row_slice(3, 3, &[1., 0.2, 0., 0.2, 2., 0.3, 0., 0.3, 0.5]) };
    let sampler = spread.sampler(ProcessNoisePolicy::Reject, "spread").unwrap();
    let A_star = sampler.sample(20, &mut rng);
    let Ap = &A_star + sampler.sample(20, &mut rng) * 0.3;
    let fc = Forecast { A_star, Ap };

    let obs = LinearObserveModel { Hx: DMatrix::from_row_slice(2, 3, &[1., 0., 0., 0., 0., 1.]) };
    let R = CorrelatedNoise { Q: DMatrix::identity(2, 2) * 0.1 };
    let innov = adaptive::perturb_observations(&fc.Ap, &obs, &R, &DVector::from_vec(vec![0.1, -0.2]), &mut rng).unwrap();
    let V = CorrelatedNoise { Q: DMatrix::identity(3, 3) * 0.01 };

    let update = ProcessNoiseEstimator::new(0.9, 0.3).update(&V, &fc, &innov, &obs, &R).unwrap();
    assert_eq!(update.Gamma.shape(), (3, 2));
    assert_eq!(update.Q_hat, update.Q_hat.transpose());
    assert_eq!(update.V.Q, update.V.Q.transpose());
}

#[test]
fn test_analysis_unobservable() {
    let mut rng = StdRng::seed_from_u64(29);
    let Ap = DMatrix::from_row_slice(2, 4, &[1., 2., 3., 4., -1., 0., 2., 1.]);
    let obs = LinearObserveModel { Hx: DMatrix::zeros(1, 2) };
    let R = CorrelatedNoise { Q: scalar(0.5) };
    let innov = adaptive::perturb_observations(&Ap, &obs, &R, &DVector::from_element(1, 10.), &mut rng).unwrap();

    let A = analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT).unwrap();
    assert_relative_eq!(A, Ap, epsilon = 1e-12);
}

#[test]
fn test_analysis_noise_free_collapse() {
    let mut rng = StdRng::seed_from_u64(31);
    let spread = CorrelatedNoise { Q: DMatrix::from_row_slice(2, 2, &[1., 0.3, 0.3, 0.5]) };
    let Ap = spread.sampler(ProcessNoisePolicy::Reject, "spread").unwrap().sample(6, &mut rng);
    let obs = LinearObserveModel::identity(2);
    let R = CorrelatedNoise::new_zero(2);

    // Observing exactly the forecast mean collapses the ensemble onto it
    let d = ensemble::mean(&Ap);
    let innov = adaptive::perturb_observations(&Ap, &obs, &R, &d, &mut rng).unwrap();
    assert_eq!(innov.E, DMatrix::zeros(2, 6));
    let A = analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT).unwrap();
    for j in 0..A.ncols() {
        assert_relative_eq!(A.column(j).into_owned(), d, epsilon = 1e-9);
    }

    // Any other observation is taken as the truth
    let d = DVector::from_vec(vec![3., -2.]);
    let innov = adaptive::perturb_observations(&Ap, &obs, &R, &d, &mut rng).unwrap();
    let A = analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT).unwrap();
    assert_abs_diff_eq!(ensemble::covariance(&A), DMatrix::zeros(2, 2), epsilon = 1e-9);
    assert_relative_eq!(ensemble::mean(&A), d, epsilon = 1e-9);
}

#[test]
fn test_analysis_precise_observation() {
    let mut rng = StdRng::seed_from_u64(37);
    let Ap = CorrelatedNoise { Q: scalar(1.) }.sampler(ProcessNoisePolicy::Reject, "spread").unwrap().sample(50, &mut rng);
    let obs = LinearObserveModel::identity(1);
    let d = DVector::from_element(1, 2.);

    let mut previous = f64::INFINITY;
    for r in &[1., 1e-2, 1e-4, 1e-8] {
        let R = CorrelatedNoise { Q: scalar(*r) };
        let innov = adaptive::perturb_observations(&Ap, &obs, &R, &d, &mut rng).unwrap();
        let A = analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT).unwrap();
        let error = (ensemble::mean(&A)[0] - d[0]).abs();
        assert!(error < previous.max(1e-3), "error {} for R {}", error, r);
        previous = error;
    }
    assert!(previous < 1e-3);
}

#[test]
fn test_analysis_kalman_gain() {
    // Forecast variance 1, observation variance 1: the mean moves half way to the observation
    let mut rng = StdRng::seed_from_u64(41);
    let Ap = CorrelatedNoise { Q: scalar(1.) }.sampler(ProcessNoisePolicy::Reject, "spread").unwrap().sample(4000, &mut rng);
    let obs = LinearObserveModel::identity(1);
    let R = CorrelatedNoise { Q: scalar(1.) };
    let d = DVector::from_element(1, 4.);

    let prior = ensemble::mean(&Ap)[0];
    let innov = adaptive::perturb_observations(&Ap, &obs, &R, &d, &mut rng).unwrap();
    let A = analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT).unwrap();

    let gain = (ensemble::mean(&A)[0] - prior) / (d[0] - prior);
    assert_abs_diff_eq!(gain, 0.5, epsilon = 0.05);
    assert_abs_diff_eq!(ensemble::covariance(&A)[(0, 0)], 0.5, epsilon = 0.08);
}

#[test]
fn test_analysis_singular() {
    // The observed component has no spread and there is no observation noise
    let Ap = DMatrix::from_row_slice(2, 3, &[1., 1., 1., 0., 1., 2.]);
    let obs = LinearObserveModel { Hx: row(&[1., 0.]) };
    let innov = adaptive::innovation(&Ap, &obs, &DVector::from_element(1, 2.), DMatrix::zeros(1, 3));

    match analysis::analyse(&Ap, &innov, &obs, RCOND_LIMIT) {
        Err(EstimateError::SingularOperator { what, .. }) => assert_eq!(what, "innovation covariance"),
        other => panic!("expected SingularOperator, got {:?}", other),
    }
}

#[test]
fn test_forecast_deterministic() {
    let mut rng = StdRng::seed_from_u64(43);
    let init = KalmanState { x: DVector::from_vec(vec![1., 2.]), X: DMatrix::identity(2, 2) * 0.1 };
    let ens = EnsembleState::new_perturbed(&init, 8, &mut rng).unwrap();
    let model = FunctionPredictModel::new(decay, 0.5);
    let V = CorrelatedNoise::new_zero(2);

    let fc = forecast::forecast(&ens, &model, 0., 2., &V, &OdeSettings::default(), ProcessNoisePolicy::Unclipped, true, &mut rng).unwrap();
    assert_relative_eq!(fc.A_star, &ens.A * (-1.0f64).exp(), max_relative = 1e-7);
    assert_eq!(fc.Ap, fc.A_star);

    let serial = forecast::integrate_members(&ens, &model, 0., 2., &OdeSettings::default(), false).unwrap();
    assert_eq!(serial, fc.A_star);
}

#[test]
fn test_forecast_process_noise() {
    let mut rng = StdRng::seed_from_u64(47);
    let ens = EnsembleState { A: DMatrix::from_element(2, 5000, 1.) };
    let model = FunctionPredictModel::new(decay, 0.);
    let V = CorrelatedNoise { Q: DMatrix::from_row_slice(2, 2, &[0.2, 0.05, 0.05, 0.1]) };

    let fc = forecast::forecast(&ens, &model, 0., 1., &V, &OdeSettings::default(), ProcessNoisePolicy::Unclipped, true, &mut rng).unwrap();
    assert_relative_eq!(fc.A_star, ens.A);
    assert_abs_diff_eq!(ensemble::covariance(&fc.Ap), V.Q, epsilon = 0.02);
    assert_eq!(ensemble::covariance(&fc.A_star), DMatrix::zeros(2, 2));
}

#[test]
fn test_forecast_integration_failure() {
    let mut rng = StdRng::seed_from_u64(53);
    let ens = EnsembleState { A: row(&[0., 1., 2., 3., 4.]) };
    let exploding = FunctionPredictModel::new(
        |_t: f64, x: &DVector<f64>, limit: &f64| if x[0] > *limit { x * f64::NAN } else { -x },
        1.5,
    );
    let V = CorrelatedNoise::new_zero(1);

    match forecast::forecast(&ens, &exploding, 0., 1., &V, &OdeSettings::default(), ProcessNoisePolicy::Unclipped, true, &mut rng) {
        Err(EstimateError::IntegrationFailure { member, .. }) => assert_eq!(member, 2),
        other => panic!("expected IntegrationFailure, got {:?}", other.map(|fc| fc.Ap)),
    }
}

#[test]
fn test_forecast_derivative_dimension() {
    let mut rng = StdRng::seed_from_u64(59);
    let ens = EnsembleState { A: DMatrix::from_row_slice(2, 3, &[1., 2., 3., 4., 5., 6.]) };
    let wrong = FunctionPredictModel::new(|_t: f64, _x: &DVector<f64>, _q: &()| DVector::from_element(3, 1.0), ());
    let V = CorrelatedNoise::new_zero(2);

    for parallel in &[true, false] {
        match forecast::forecast(&ens, &wrong, 0., 1., &V, &OdeSettings::default(), ProcessNoisePolicy::Unclipped, *parallel, &mut rng) {
            Err(EstimateError::IntegrationFailure { member, source }) => {
                assert_eq!(member, 0);
                assert_eq!(source, OdeError::DimensionMismatch { expected: 2, found: 3 });
            }
            other => panic!("expected IntegrationFailure, got {:?}", other.map(|fc| fc.Ap)),
        }
    }
}
