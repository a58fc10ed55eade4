//! Transit light curve by direct integration over the stellar disk.
//!
//! The disk is split into concentric annuli. For a planet of radius `p` at
//! projected separation `z`, an annulus of radius `r` loses the arc
//!
//! ```text
//! θ(r) = 2π                                    if r ≤ p − z
//!      = 2·acos((r² + z² − p²) / (2·r·z))     if |z − p| < r < z + p
//!      = 0                                     otherwise
//! ```
//!
//! and the blocked flux is `∫ I(r)·θ(r)·r dr` over the overlap region,
//! normalised by the unobscured `∫ I(r)·2π·r dr`. Works for every
//! [`LimbDarkeningLaw`](super::LimbDarkeningLaw) without law-specific algebra.

use std::f64::consts::PI;

use super::orbit::sky_separation;
use super::{LightCurveModel, TransitError, TransitParams};

/// Default number of radial integration steps.
pub const DEFAULT_ANNULI: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericalTransitModel {
    annuli: usize,
}

impl Default for NumericalTransitModel {
    fn default() -> Self {
        Self {
            annuli: DEFAULT_ANNULI,
        }
    }
}

impl NumericalTransitModel {
    pub fn with_annuli(annuli: usize) -> Self {
        Self {
            annuli: annuli.max(8),
        }
    }

    /// Midpoint-rule integral of `f(r)·r` over `[lo, hi]`.
    fn radial_integral<F: Fn(f64) -> f64>(&self, lo: f64, hi: f64, f: F) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let dr = (hi - lo) / self.annuli as f64;
        (0..self.annuli)
            .map(|k| {
                let r = lo + (k as f64 + 0.5) * dr;
                f(r) * r
            })
            .sum::<f64>()
            * dr
    }

    /// Relative flux for a single projected separation.
    pub fn flux_at_separation(&self, params: &TransitParams, z: f64, total: f64) -> f64 {
        let p = params.rp;
        if p <= 0.0 || z >= 1.0 + p {
            return 1.0;
        }

        let lo = (z - p).max(0.0);
        let hi = (z + p).min(1.0);
        let blocked = self.radial_integral(lo, hi, |r| {
            params.limb_dark.intensity(r, &params.u) * covered_arc(r, z, p)
        });

        (1.0 - blocked / total).clamp(0.0, 1.0)
    }

    /// Unobscured disk-integrated intensity.
    fn total_intensity(&self, params: &TransitParams) -> f64 {
        self.radial_integral(0.0, 1.0, |r| {
            params.limb_dark.intensity(r, &params.u) * 2.0 * PI
        })
    }
}

fn covered_arc(r: f64, z: f64, p: f64) -> f64 {
    if r <= p - z {
        2.0 * PI
    } else if r <= z - p || r >= z + p {
        0.0
    } else {
        let cos_half = ((r * r + z * z - p * p) / (2.0 * r * z)).clamp(-1.0, 1.0);
        2.0 * cos_half.acos()
    }
}

impl LightCurveModel for NumericalTransitModel {
    fn light_curve(&self, params: &TransitParams, time: &[f64]) -> Result<Vec<f64>, TransitError> {
        params.validate()?;

        let total = self.total_intensity(params);
        let separations = sky_separation(params, time);
        Ok(separations
            .into_iter()
            .map(|z| self.flux_at_separation(params, z, total))
            .collect())
    }
}
