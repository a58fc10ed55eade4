//! Cross-dispersion point spread function weighting.
//!
//! The trace is not a line: flux from a given wavelength spreads across rows
//! following an empirical line-spread profile. A pixel's share of the flux is
//! looked up from its distance to the trace centre.
//!
//! # Wing extension
//!
//! The measured profile is only 64 samples wide, which would make bright
//! targets stop abruptly at the edge of the trace. With a non-zero `extend`
//! the profile is padded on both sides with `extend` synthetic samples that
//! ramp linearly from zero up to `50 × min(profile)`, each drawn from a
//! half-normal distribution so the taper looks like noise rather than a
//! ruler. The synthesis happens once, at construction, from a caller-supplied
//! generator.

use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::algo::{interp_clamped, trapz_unit, validate_table};
use shared::image_proc::normal_sample;

use crate::error::{SimError, SimResult};

/// Measured cross-dispersion line-spread profile, one sample per pixel.
#[rustfmt::skip]
pub const LINE_SPREAD_PROFILE: [f64; 64] = [
    7.701976722368496E-008, 1.540395344473699E-007, 3.080790688947398E-007, 6.161581377894797E-007,
    1.232316275578959E-006, 2.464632551157919E-006, 4.929265102315838E-006, 9.714837387708730E-006,
    5.671904909021475E-006, 4.548023730510664E-006, 1.022713226439542E-005, 6.886893882507295E-006,
    8.177790144225927E-006, 1.357109057534278E-005, 8.916710340478584E-006, 1.239566539967818E-005,
    2.781745489985332E-005, 2.509716449416999E-005, 2.631011432652208E-005, 4.830151269574756E-005,
    5.380108778450451E-005, 7.547263667725956E-005, 1.022118883162726E-004, 1.420077972523748E-004,
    2.362241206079752E-004, 3.385566380821325E-004, 5.477043893594158E-004, 6.696818098559376E-004,
    5.493319867611035E-004, 4.720754680409556E-004, 2.991750642213908E-004, 3.058475983204190E-004,
    3.109660592775787E-004, 2.226914950899106E-004, 2.979418360802288E-004, 3.397708704659941E-004,
    2.990017218531538E-004, 2.758223087866440E-004, 3.294162992516503E-004, 2.381257536346881E-004,
    3.407167609725814E-004, 5.361983993812380E-004, 6.230353641937803E-004, 6.140843798414508E-004,
    5.070604643273580E-004, 3.306009460586345E-004, 2.371751859966409E-004, 1.155928608405077E-004,
    6.370671124544813E-005, 7.242587988226523E-005, 3.417951946560471E-005, 2.799611461752616E-005,
    3.403609616187131E-005, 1.659919620922157E-005, 1.873137450902895E-005, 1.825263581423098E-005,
    9.144579730557822E-006, 8.962197003747896E-006, 9.059127708432868E-006, 5.408733372069818E-006,
    7.623564329893584E-006, 7.990429056435600E-006, 4.048852234816991E-006, 6.761537376720472E-006,
];

/// Wing amplitude at the profile edge, in units of the profile minimum.
const WING_SCALE: f64 = 50.0;

/// Normalised cross-dispersion profile, sampled from the centre outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossDispersionPsf {
    extend: usize,
    /// Profile value at integer distances 0, 1, 2, ... from the centre
    half_profile: Vec<f64>,
    /// Distances matching `half_profile`
    distances: Vec<f64>,
}

impl CrossDispersionPsf {
    /// Build the weighting function, synthesising `extend` wing samples per side.
    pub fn new<R: Rng + ?Sized>(extend: usize, rng: &mut R) -> Self {
        let profile = if extend > 0 {
            add_wings(&LINE_SPREAD_PROFILE, extend, rng)
        } else {
            LINE_SPREAD_PROFILE.to_vec()
        };

        // Unit area under the profile
        let area = trapz_unit(&profile);
        let psf: Vec<f64> = profile.iter().map(|v| v / area).collect();

        let centre = psf.len() / 2;
        let half_profile = psf[centre..].to_vec();
        let distances = (0..half_profile.len()).map(|d| d as f64).collect();

        Self {
            extend,
            half_profile,
            distances,
        }
    }

    /// Check a profile restored from storage: one sample per integer
    /// distance, `extend` wing samples beyond the measured half profile, and
    /// finite non-negative weights.
    pub fn validate(&self) -> SimResult<()> {
        validate_table(&self.distances, &self.half_profile)?;
        let expected = LINE_SPREAD_PROFILE.len() / 2 + self.extend;
        if self.half_profile.len() != expected {
            return Err(SimError::shape(
                "PSF half profile",
                &[expected],
                &[self.half_profile.len()],
            ));
        }
        if let Some(bad) = self
            .half_profile
            .iter()
            .find(|w| !(w.is_finite() && **w >= 0.0))
        {
            return Err(SimError::Configuration(format!(
                "PSF weight must be finite and non-negative, got {bad}"
            )));
        }
        Ok(())
    }

    /// Number of synthetic wing samples added on each side.
    pub fn extend(&self) -> usize {
        self.extend
    }

    /// Flux fraction at `distance` pixels from the trace centre.
    ///
    /// Distances beyond the tabulated half-profile hold the last sample.
    pub fn weight(&self, distance: f64) -> f64 {
        interp_clamped(distance, &self.distances, &self.half_profile)
    }

    /// The normalised half profile, centre first.
    pub fn half_profile(&self) -> &[f64] {
        &self.half_profile
    }
}

fn add_wings<R: Rng + ?Sized>(profile: &[f64], pts: usize, rng: &mut R) -> Vec<f64> {
    let floor = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let ramp: Vec<f64> = (0..pts)
        .map(|k| floor * (k as f64 / pts as f64) * WING_SCALE)
        .collect();

    let mut out = Vec::with_capacity(profile.len() + 2 * pts);
    out.extend(ramp.iter().map(|&w| normal_sample(w, w, rng).abs()));
    out.extend_from_slice(profile);
    out.extend(ramp.iter().rev().map(|&w| normal_sample(w, w, rng).abs()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shared::image_proc::seeded_rng;

    #[test]
    fn test_profile_without_wings_has_unit_area() {
        let mut rng = seeded_rng(Some(1));
        let psf = CrossDispersionPsf::new(0, &mut rng);
        assert_eq!(psf.half_profile().len(), 32);

        let full_area = trapz_unit(&LINE_SPREAD_PROFILE);
        assert_relative_eq!(
            psf.weight(0.0),
            LINE_SPREAD_PROFILE[32] / full_area,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_weights_are_fractions() {
        let mut rng = seeded_rng(Some(2));
        let psf = CrossDispersionPsf::new(25, &mut rng);
        for d in 0..200 {
            let w = psf.weight(d as f64 * 0.5);
            assert!((0.0..=1.0).contains(&w), "weight {w} at {d}");
        }
    }

    #[test]
    fn test_wings_extend_the_profile() {
        let mut rng = seeded_rng(Some(3));
        let psf = CrossDispersionPsf::new(25, &mut rng);
        // 64 + 2 * 25 samples, split at the centre
        assert_eq!(psf.half_profile().len(), 57);
        assert_eq!(psf.extend(), 25);

        // Outermost wing sample starts the ramp at zero
        assert_eq!(*psf.half_profile().last().unwrap(), 0.0);
    }

    #[test]
    fn test_wing_synthesis_is_reproducible() {
        let a = CrossDispersionPsf::new(10, &mut seeded_rng(Some(9)));
        let b = CrossDispersionPsf::new(10, &mut seeded_rng(Some(9)));
        let c = CrossDispersionPsf::new(10, &mut seeded_rng(Some(10)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_restored_profile_is_checked() {
        let psf = CrossDispersionPsf::new(4, &mut seeded_rng(Some(5)));
        psf.validate().unwrap();

        let mut truncated = psf.clone();
        truncated.half_profile.pop();
        truncated.distances.pop();
        assert!(matches!(
            truncated.validate(),
            Err(SimError::ShapeMismatch { .. })
        ));

        let mut negative = psf.clone();
        negative.half_profile[3] = -1.0;
        assert!(matches!(negative.validate(), Err(SimError::Configuration(_))));

        let mut empty = psf;
        empty.half_profile.clear();
        empty.distances.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_weight_interpolates_between_samples() {
        let psf = CrossDispersionPsf::new(0, &mut seeded_rng(Some(4)));
        let h = psf.half_profile();
        assert_relative_eq!(psf.weight(1.5), 0.5 * (h[1] + h[2]), max_relative = 1e-12);
        assert_eq!(psf.weight(1000.0), *h.last().unwrap());
    }
}
