//! Noise sampling primitives for detector simulation.
//!
//! Provides the small set of random draws every stage of the exposure
//! simulation is built from:
//! - Seeded RNG construction (explicit seed or a fresh one from the thread RNG)
//! - Contract-checked Poisson sampling for photon and dark-current arrivals
//! - Gaussian sampling with non-finite sigma rejection
//! - Whole-array Poisson draws for per-frame electron counts
//!
//! # Contract
//!
//! Poisson rates and Gaussian widths must be finite and non-negative. A
//! negative rate always means a sign error upstream (background minus signal,
//! a flipped gain), so these helpers panic instead of clipping.

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

/// Build a [`StdRng`] from an explicit seed, or from fresh thread entropy.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| rand::rng().next_u64());
    StdRng::seed_from_u64(seed)
}

/// Draw one Poisson variate with mean `lambda`.
///
/// `lambda == 0` returns exactly zero (the distribution is degenerate there
/// and `rand_distr` refuses to construct it). Rates beyond what `rand_distr`
/// can sample (about 1.8e19) use the Gaussian limit `N(λ, √λ)`, rounded.
///
/// # Panics
/// If `lambda` is negative, NaN or infinite.
pub fn poisson_sample<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> f64 {
    assert!(
        lambda.is_finite() && lambda >= 0.0,
        "Poisson rate must be finite and non-negative, got {lambda}"
    );

    if lambda == 0.0 {
        return 0.0;
    }

    match Poisson::new(lambda) {
        Ok(poisson) => poisson.sample(rng),
        Err(_) => normal_sample(lambda, lambda.sqrt(), rng).round(),
    }
}

/// Draw one Gaussian variate.
///
/// # Panics
/// If `std_dev` is negative or non-finite.
pub fn normal_sample<R: Rng + ?Sized>(mean: f64, std_dev: f64, rng: &mut R) -> f64 {
    assert!(
        std_dev.is_finite() && std_dev >= 0.0,
        "Gaussian width must be finite and non-negative, got {std_dev}"
    );

    Normal::new(mean, std_dev)
        .expect("width validated as finite and non-negative")
        .sample(rng)
}

/// Replace every mean in `means` with a Poisson draw of that mean.
///
/// Draws are taken in row-major order from the supplied generator so a seeded
/// generator reproduces the same frame.
pub fn poisson_array<R: Rng + ?Sized>(means: ArrayView2<f64>, rng: &mut R) -> Array2<f64> {
    means.map(|&lambda| poisson_sample(lambda, rng))
}
