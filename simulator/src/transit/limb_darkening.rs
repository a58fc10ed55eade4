//! Stellar limb darkening laws.
//!
//! Intensities are relative to the disk centre and expressed in terms of
//! `μ = cos θ = √(1 − r²)`, with `r` the projected radius in stellar radii.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TransitError;

/// Smallest μ used by laws that diverge at the limb.
const MU_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimbDarkeningLaw {
    Uniform,
    Linear,
    Quadratic,
    #[serde(rename = "squareroot")]
    SquareRoot,
    Logarithmic,
    Exponential,
    /// Four-parameter law
    Nonlinear,
}

impl LimbDarkeningLaw {
    pub fn coefficient_count(&self) -> usize {
        match self {
            LimbDarkeningLaw::Uniform => 0,
            LimbDarkeningLaw::Linear => 1,
            LimbDarkeningLaw::Quadratic
            | LimbDarkeningLaw::SquareRoot
            | LimbDarkeningLaw::Logarithmic
            | LimbDarkeningLaw::Exponential => 2,
            LimbDarkeningLaw::Nonlinear => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LimbDarkeningLaw::Uniform => "uniform",
            LimbDarkeningLaw::Linear => "linear",
            LimbDarkeningLaw::Quadratic => "quadratic",
            LimbDarkeningLaw::SquareRoot => "squareroot",
            LimbDarkeningLaw::Logarithmic => "logarithmic",
            LimbDarkeningLaw::Exponential => "exponential",
            LimbDarkeningLaw::Nonlinear => "nonlinear",
        }
    }

    /// Relative intensity at projected radius `r` (0 at centre, 1 at the limb).
    ///
    /// `u` must hold [`coefficient_count`](Self::coefficient_count) values.
    pub fn intensity(&self, r: f64, u: &[f64]) -> f64 {
        let mu = (1.0 - r * r).max(0.0).sqrt();
        match self {
            LimbDarkeningLaw::Uniform => 1.0,
            LimbDarkeningLaw::Linear => 1.0 - u[0] * (1.0 - mu),
            LimbDarkeningLaw::Quadratic => {
                1.0 - u[0] * (1.0 - mu) - u[1] * (1.0 - mu) * (1.0 - mu)
            }
            LimbDarkeningLaw::SquareRoot => 1.0 - u[0] * (1.0 - mu) - u[1] * (1.0 - mu.sqrt()),
            LimbDarkeningLaw::Logarithmic => {
                let mu = mu.max(MU_FLOOR);
                1.0 - u[0] * (1.0 - mu) - u[1] * mu * mu.ln()
            }
            LimbDarkeningLaw::Exponential => {
                let mu = mu.max(MU_FLOOR);
                1.0 - u[0] * (1.0 - mu) - u[1] / (1.0 - mu.exp())
            }
            LimbDarkeningLaw::Nonlinear => {
                1.0 - u
                    .iter()
                    .enumerate()
                    .map(|(n, c)| c * (1.0 - mu.powf((n + 1) as f64 / 2.0)))
                    .sum::<f64>()
            }
        }
    }
}

impl fmt::Display for LimbDarkeningLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LimbDarkeningLaw {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(LimbDarkeningLaw::Uniform),
            "linear" => Ok(LimbDarkeningLaw::Linear),
            "quadratic" => Ok(LimbDarkeningLaw::Quadratic),
            "squareroot" | "square-root" => Ok(LimbDarkeningLaw::SquareRoot),
            "logarithmic" => Ok(LimbDarkeningLaw::Logarithmic),
            "exponential" => Ok(LimbDarkeningLaw::Exponential),
            "nonlinear" | "4-parameter" => Ok(LimbDarkeningLaw::Nonlinear),
            other => Err(TransitError::UnsupportedProfile(other.to_string())),
        }
    }
}
