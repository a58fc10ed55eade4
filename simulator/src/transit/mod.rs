//! Transit light-curve models.
//!
//! A [`LightCurveModel`] turns a set of [`TransitParams`] and a time axis into
//! a relative flux multiplier (1.0 out of transit). The light-curve generator
//! only depends on the trait; [`NumericalTransitModel`] is the built-in
//! implementation.
//!
//! Angles in [`TransitParams`] are degrees, distances are stellar radii and
//! times share whatever unit the time axis uses.

pub mod limb_darkening;
pub mod numerical;
pub mod orbit;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use limb_darkening::LimbDarkeningLaw;
pub use numerical::NumericalTransitModel;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitError {
    #[error("Unsupported limb darkening profile '{0}'")]
    UnsupportedProfile(String),

    #[error("Limb darkening law {law} takes {expected} coefficient(s), got {got}")]
    CoefficientCount {
        law: LimbDarkeningLaw,
        expected: usize,
        got: usize,
    },

    #[error("Invalid orbital parameter {name}: {value}")]
    InvalidOrbit { name: &'static str, value: f64 },
}

/// Orbital and limb-darkening parameters of one transit evaluation.
///
/// The light-curve generator overwrites `limb_dark`, `u` and `rp` per pixel,
/// so every worker owns its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitParams {
    /// Time of inferior conjunction (mid-transit)
    pub t0: f64,
    /// Orbital period
    pub per: f64,
    /// Planet radius in stellar radii
    pub rp: f64,
    /// Semi-major axis in stellar radii
    pub a: f64,
    /// Orbital inclination in degrees
    pub inc: f64,
    /// Eccentricity
    pub ecc: f64,
    /// Argument of periastron in degrees
    pub w: f64,
    pub limb_dark: LimbDarkeningLaw,
    /// Limb darkening coefficients for `limb_dark`
    pub u: Vec<f64>,
}

impl TransitParams {
    /// Circular orbit with a uniform stellar disk.
    pub fn circular(t0: f64, per: f64, rp: f64, a: f64, inc: f64) -> Self {
        Self {
            t0,
            per,
            rp,
            a,
            inc,
            ecc: 0.0,
            w: 90.0,
            limb_dark: LimbDarkeningLaw::Uniform,
            u: Vec::new(),
        }
    }

    /// Check orbital ranges and the coefficient count of the limb darkening law.
    pub fn validate(&self) -> Result<(), TransitError> {
        let checks: [(&'static str, f64, bool); 5] = [
            ("per", self.per, self.per > 0.0),
            ("a", self.a, self.a > 0.0),
            ("ecc", self.ecc, (0.0..1.0).contains(&self.ecc)),
            ("rp", self.rp, self.rp >= 0.0 && self.rp.is_finite()),
            ("inc", self.inc, self.inc.is_finite()),
        ];
        for (name, value, ok) in checks {
            if !ok {
                return Err(TransitError::InvalidOrbit { name, value });
            }
        }

        let expected = self.limb_dark.coefficient_count();
        if self.u.len() != expected {
            return Err(TransitError::CoefficientCount {
                law: self.limb_dark,
                expected,
                got: self.u.len(),
            });
        }
        Ok(())
    }
}

/// Evaluates relative stellar flux during a planetary transit.
pub trait LightCurveModel: Send + Sync {
    /// Relative flux at each entry of `time`.
    fn light_curve(&self, params: &TransitParams, time: &[f64]) -> Result<Vec<f64>, TransitError>;
}
