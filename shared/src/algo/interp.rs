//! One-dimensional linear interpolation.
//!
//! Tables are checked once with [`validate_table`] when they are built.
//! Lookups ([`interp_or`], [`interp_clamped`]) never fail on the query
//! value: queries below/above the tabulated range return the supplied fill
//! values (or the edge samples). This matches how tabulated spectra are
//! sampled across a detector where most pixels fall outside coverage.
//!
//! Lookups use a binary search over the abscissae, so they are O(log n).

use thiserror::Error;

/// Errors that can occur during interpolation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

/// Check that `xs`/`ys` form a usable interpolation table.
///
/// # Errors
/// * `InterpError::MismatchedLengths` - xs and ys have different lengths
/// * `InterpError::InsufficientData` - Less than 2 data points provided
/// * `InterpError::UnsortedData` - xs array is not strictly ascending
pub fn validate_table(xs: &[f64], ys: &[f64]) -> Result<(), InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }

    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    if xs.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(InterpError::UnsortedData);
    }

    Ok(())
}

/// Locate `x` inside a validated table and blend the neighbouring samples.
///
/// Caller guarantees `xs[0] <= x <= xs[n-1]`.
fn blend(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let idx = match xs.binary_search_by(|sample| sample.total_cmp(&x)) {
        Ok(exact_idx) => return ys[exact_idx],
        Err(insert_idx) => insert_idx,
    };

    let i1 = idx - 1;
    let i2 = idx;

    let t = (x - xs[i1]) / (xs[i2] - xs[i1]);
    ys[i1] + t * (ys[i2] - ys[i1])
}

/// Linear interpolation returning `left`/`right` outside the tabulated range.
///
/// Does not validate the table; call [`validate_table`] once when the table
/// is constructed and use this in hot loops. A NaN query returns `left`.
pub fn interp_or(x: f64, xs: &[f64], ys: &[f64], left: f64, right: f64) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());

    match (xs.first(), xs.last()) {
        (Some(&lo), Some(&hi)) => {
            if !(x >= lo) {
                left
            } else if x > hi {
                right
            } else if xs.len() == 1 {
                ys[0]
            } else {
                blend(x, xs, ys)
            }
        }
        _ => left,
    }
}

/// Linear interpolation that holds the edge samples beyond the table.
pub fn interp_clamped(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    match (ys.first(), ys.last()) {
        (Some(&first), Some(&last)) => interp_or(x, xs, ys, first, last),
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabulated_samples_are_returned_exactly() {
        let wavelength = [0.9, 1.4, 2.1, 2.8];
        let throughput = [0.12, 0.31, 0.44, 0.27];
        for (w, t) in wavelength.iter().zip(&throughput) {
            assert_eq!(interp_or(*w, &wavelength, &throughput, 0.0, 0.0), *t);
        }
    }

    #[test]
    fn test_midpoints_blend_neighbours() {
        let wavelength = [1.0, 2.0, 4.0];
        let response = [2.0, 6.0, 0.0];
        assert_eq!(interp_clamped(1.25, &wavelength, &response), 3.0);
        assert_eq!(interp_clamped(3.0, &wavelength, &response), 3.0);
    }

    #[test]
    fn test_table_validation() {
        assert_eq!(
            validate_table(&[1.0, 2.0, 3.0], &[10.0, 20.0]),
            Err(InterpError::MismatchedLengths)
        );
        assert_eq!(
            validate_table(&[1.0], &[10.0]),
            Err(InterpError::InsufficientData)
        );
        assert_eq!(
            validate_table(&[2.0, 1.0, 3.0], &[20.0, 10.0, 30.0]),
            Err(InterpError::UnsortedData)
        );
        assert_eq!(
            validate_table(&[1.0, 1.0, 3.0], &[20.0, 10.0, 30.0]),
            Err(InterpError::UnsortedData)
        );
    }

    #[test]
    fn test_interp_or_fills_outside_range() {
        let xs = vec![1.0, 2.0, 3.0];
        let ys = vec![10.0, 20.0, 30.0];
        assert_eq!(interp_or(0.0, &xs, &ys, 0.0, 0.0), 0.0);
        assert_eq!(interp_or(4.0, &xs, &ys, 0.0, -1.0), -1.0);
        assert_eq!(interp_or(2.5, &xs, &ys, 0.0, 0.0), 25.0);
        assert_eq!(interp_or(3.0, &xs, &ys, 0.0, 0.0), 30.0);
        assert_eq!(interp_or(f64::NAN, &xs, &ys, 7.0, 0.0), 7.0);
    }

    #[test]
    fn test_interp_clamped_holds_edges() {
        let xs = vec![0.0, 1.0];
        let ys = vec![0.25, 0.75];
        assert_eq!(interp_clamped(-3.0, &xs, &ys), 0.25);
        assert_eq!(interp_clamped(9.0, &xs, &ys), 0.75);
        assert_eq!(interp_clamped(0.5, &xs, &ys), 0.5);
    }
}
