//! Least-squares polynomial fitting.
//!
//! Coefficients are ordered highest degree first, the same convention used by
//! most astronomy tooling, so a degree-2 fit returns `[a, b, c]` for
//! `a·x² + b·x + c`.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolyFitError {
    #[error("x and y must have the same length ({0} vs {1})")]
    MismatchedLengths(usize, usize),
    #[error("Need at least {needed} points for a degree {degree} fit, got {got}")]
    InsufficientPoints {
        degree: usize,
        needed: usize,
        got: usize,
    },
    #[error("Least squares solve failed: {0}")]
    SolveFailed(String),
}

/// Fit a polynomial of the given degree to `(x, y)` in the least-squares sense.
///
/// The abscissae are centred and scaled internally before the Vandermonde
/// system is solved, then the coefficients are mapped back, so large column
/// indices (thousands of pixels) do not wreck the conditioning.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>, PolyFitError> {
    if x.len() != y.len() {
        return Err(PolyFitError::MismatchedLengths(x.len(), y.len()));
    }
    let ncoeff = degree + 1;
    if x.len() < ncoeff {
        return Err(PolyFitError::InsufficientPoints {
            degree,
            needed: ncoeff,
            got: x.len(),
        });
    }

    let n = x.len();
    let mean = x.iter().sum::<f64>() / n as f64;
    let scale = x
        .iter()
        .map(|v| (v - mean).abs())
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);

    // Columns ordered highest power first
    let vander = DMatrix::from_fn(n, ncoeff, |row, col| {
        let u = (x[row] - mean) / scale;
        u.powi((degree - col) as i32)
    });
    let rhs = DVector::from_column_slice(y);

    let svd = vander.svd(true, true);
    let scaled = svd
        .solve(&rhs, 1e-14)
        .map_err(|e| PolyFitError::SolveFailed(e.to_string()))?;

    // p(x) = q((x - mean) / scale); expand q back into powers of x
    let mut coeffs = vec![0.0; ncoeff];
    for (col, &q) in scaled.iter().enumerate() {
        let power = degree - col;
        // q * ((x - mean)/scale)^power, binomial expansion
        let factor = q / scale.powi(power as i32);
        for k in 0..=power {
            let term = factor * binomial(power, k) * (-mean).powi((power - k) as i32);
            coeffs[degree - k] += term;
        }
    }

    Ok(coeffs)
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Evaluate a polynomial (highest degree first) at `x` using Horner's method.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}
