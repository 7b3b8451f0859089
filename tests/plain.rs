use hypermc::reduce::ThreadReducer;
use hypermc::{estimate, integrate, Error, IntegrationRequest, DEFAULT_SEED};

use assert_approx_eq::assert_approx_eq;

/// $\left( \frac{\sqrt{\pi}}{2} \mathrm{erf}(1) \right)^3$
const GAUSSIAN_UNIT_CUBE: f64 = 0.416_538_385_886_638;

fn assert_within_error(integral: f64, target: f64, standard_error: f64) {
    assert!(
        (integral - target).abs() < 5.0 * standard_error,
        "{} is not within 5 standard errors ({}) of {}",
        integral,
        standard_error,
        target
    );
}

#[test]
fn gaussian_unit_cube() {
    for &workers in &[1, 8] {
        let report = estimate(0.0, 1.0, 3, 1_000_000, workers, DEFAULT_SEED).unwrap();
        let result = report.result();

        assert_eq!(report.workers(), workers);
        assert_eq!(result.volume(), 1.0);
        assert_within_error(result.integral(), GAUSSIAN_UNIT_CUBE, result.standard_error());
        assert_approx_eq!(result.integral(), 0.4165, 1e-3);
    }
}

#[test]
fn gaussian_unit_cube_ten_million_samples() {
    for &workers in &[1, 8] {
        let report = estimate(0.0, 1.0, 3, 10_000_000, workers, DEFAULT_SEED).unwrap();
        let result = report.result();

        assert_within_error(result.integral(), GAUSSIAN_UNIT_CUBE, result.standard_error());
    }
}

#[test]
fn reproducible_for_same_seed_and_workers() {
    let first = estimate(-1.0, 2.0, 4, 50_001, 6, 42).unwrap();
    let second = estimate(-1.0, 2.0, 4, 50_001, 6, 42).unwrap();

    // bit for bit
    assert_eq!(first.result(), second.result());

    let other_seed = estimate(-1.0, 2.0, 4, 50_001, 6, 43).unwrap();
    assert_ne!(first.result().integral(), other_seed.result().integral());
}

#[test]
fn consistent_across_worker_counts() {
    let results = [1, 3, 8, 13]
        .iter()
        .map(|&workers| *estimate(0.0, 1.0, 3, 200_000, workers, DEFAULT_SEED).unwrap().result())
        .collect::<Vec<_>>();

    for pair in results.windows(2) {
        let error = pair[0].standard_error().hypot(pair[1].standard_error());
        assert!((pair[0].integral() - pair[1].integral()).abs() < 5.0 * error);
    }

    for result in &results {
        assert_within_error(result.integral(), GAUSSIAN_UNIT_CUBE, result.standard_error());
    }
}

#[test]
fn standard_error_scales_with_inverse_square_root() {
    const K: u64 = 16;

    let ratios = (0..5)
        .map(|seed| {
            let small = estimate(0.0, 1.0, 3, 10_000, 4, seed).unwrap();
            let large = estimate(0.0, 1.0, 3, 10_000 * K, 4, seed).unwrap();
            small.result().standard_error() / large.result().standard_error()
        })
        .collect::<Vec<_>>();

    let mean_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;

    // sqrt(16) = 4
    assert!(
        (3.6..4.4).contains(&mean_ratio),
        "mean ratio of standard errors: {}",
        mean_ratio
    );
}

#[test]
fn fewer_samples_than_workers() {
    let report = estimate(0.0, 1.0, 3, 3, 8, DEFAULT_SEED).unwrap();
    let result = report.result();

    assert_eq!(report.workers(), 8);
    assert!(result.integral() > 0.0);
    assert!(result.integral() <= 1.0);
    assert!(result.variance() >= 0.0);

    // the five idle workers do not change the result of the three busy ones
    let busy = estimate(0.0, 1.0, 3, 3, 3, DEFAULT_SEED).unwrap();
    assert_eq!(result, busy.result());
}

#[test]
fn invalid_arguments() {
    assert!(matches!(
        estimate(1.0, 0.0, 3, 100, 2, DEFAULT_SEED),
        Err(Error::InvalidBounds { .. })
    ));
    // the volume of this hypercube overflows
    assert!(matches!(
        estimate(-1e10, 1e10, 40, 100, 2, DEFAULT_SEED),
        Err(Error::InvalidBounds { .. })
    ));
    assert!(matches!(
        estimate(0.0, 1.0, 0, 100, 2, DEFAULT_SEED),
        Err(Error::InvalidDimension)
    ));
    assert!(matches!(
        estimate(0.0, 1.0, 3, 0, 2, DEFAULT_SEED),
        Err(Error::InvalidSampleCount)
    ));
    assert!(matches!(
        estimate(0.0, 1.0, 3, 100, 0, DEFAULT_SEED),
        Err(Error::InvalidWorkerCount(_))
    ));
}

#[test]
fn constant_integrand() {
    let request = IntegrationRequest::new(-1.0, 1.0, 2, 12_345).unwrap();
    let mut reducer = ThreadReducer::new(4).unwrap();
    let report = integrate(&request, &|_: &[f64]| 1.0, &mut reducer).unwrap();
    let result = report.result();

    assert_eq!(result.volume(), 4.0);
    assert_eq!(result.integral(), 4.0);
    assert_eq!(result.variance(), 0.0);
    assert_eq!(result.standard_error(), 0.0);
}

#[test]
fn linear_integrand() {
    // int_0^2 dx int_0^2 dy (x + y) = 8
    let request = IntegrationRequest::new(0.0, 2.0, 2, 100_000).unwrap();
    let mut reducer = ThreadReducer::new(3).unwrap();
    let report = integrate(&request, &|x: &[f64]| x[0] + x[1], &mut reducer).unwrap();
    let result = report.result();

    assert_within_error(result.integral(), 8.0, result.standard_error());

    // Var(x + y) = 2 * 4/12
    assert_approx_eq!(result.variance(), 2.0 / 3.0, 0.02);
}

#[test]
fn panicking_integrand_fails_the_integration() {
    let request = IntegrationRequest::new(0.0, 1.0, 1, 100).unwrap();
    let mut reducer = ThreadReducer::new(2).unwrap();
    let result = integrate(
        &request,
        &|_: &[f64]| -> f64 { panic!("integrand exploded") },
        &mut reducer,
    );

    match result {
        Err(Error::WorkerFailure { worker, reason }) => {
            assert_eq!(worker, 0);
            assert!(reason.contains("integrand exploded"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
