//! Trapezoidal integration of tabulated profiles

/// Integrate uniformly sampled values with unit spacing.
///
/// Equivalent to the composite trapezoid rule with `dx = 1`, which is how
/// tabulated profiles sampled once per pixel are normalised. Fewer than two
/// samples integrate to zero.
pub fn trapz_unit(samples: &[f64]) -> f64 {
    samples.windows(2).map(|w| 0.5 * (w[0] + w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trapz_unit_matches_sampled_function() {
        // (0+1)/2 + (1+4)/2 + (4+9)/2 = 9.5
        let samples = [0.0, 1.0, 4.0, 9.0];
        assert_relative_eq!(trapz_unit(&samples), 9.5, epsilon = 1e-12);
        assert_eq!(trapz_unit(&[3.0]), 0.0);
        assert_eq!(trapz_unit(&[]), 0.0);
    }

    #[test]
    fn test_symmetric_profile_area() {
        let profile = [0.0, 0.5, 1.0, 0.5, 0.0];
        assert_relative_eq!(trapz_unit(&profile), 2.0, epsilon = 1e-12);
    }
}
