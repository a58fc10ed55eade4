//! Keplerian sky-projected separation between planet and star.

use std::f64::consts::PI;

use super::TransitParams;

/// Separation reported while the planet is behind the star.
pub const OCCULTED_SEPARATION: f64 = 100.0;

const KEPLER_TOLERANCE: f64 = 1e-12;
const KEPLER_MAX_ITER: usize = 50;

/// Solve Kepler's equation `E − e·sin E = M` for the eccentric anomaly.
pub fn eccentric_anomaly(mean_anomaly: f64, ecc: f64) -> f64 {
    let m = mean_anomaly.rem_euclid(2.0 * PI);
    let mut e_anom = if ecc < 0.8 { m } else { PI };
    for _ in 0..KEPLER_MAX_ITER {
        let delta = (e_anom - ecc * e_anom.sin() - m) / (1.0 - ecc * e_anom.cos());
        e_anom -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            break;
        }
    }
    e_anom
}

/// Time of periastron passage implied by the mid-transit time.
pub fn time_of_periastron(params: &TransitParams) -> f64 {
    let ecc = params.ecc;
    let f_transit = PI / 2.0 - params.w.to_radians();
    let e_anom = 2.0 * (((1.0 - ecc) / (1.0 + ecc)).sqrt() * (f_transit / 2.0).tan()).atan();
    let m_anom = e_anom - ecc * e_anom.sin();
    params.t0 - params.per * m_anom / (2.0 * PI)
}

/// Projected centre-to-centre separation at each time, in stellar radii.
///
/// Times when the planet is on the far side of its orbit return
/// [`OCCULTED_SEPARATION`], so only primary transits dim the star.
pub fn sky_separation(params: &TransitParams, time: &[f64]) -> Vec<f64> {
    let tp = time_of_periastron(params);
    let ecc = params.ecc;
    let omega = params.w.to_radians();
    let sin_inc = params.inc.to_radians().sin();

    time.iter()
        .map(|&t| {
            let m_anom = 2.0 * PI * (t - tp) / params.per;
            let e_anom = eccentric_anomaly(m_anom, ecc);
            let true_anom = 2.0
                * ((1.0 + ecc).sqrt() * (e_anom / 2.0).sin())
                    .atan2((1.0 - ecc).sqrt() * (e_anom / 2.0).cos());
            let radius = params.a * (1.0 - ecc * e_anom.cos());

            let phase = (omega + true_anom).sin();
            if phase <= 0.0 {
                OCCULTED_SEPARATION
            } else {
                radius * (1.0 - phase * phase * sin_inc * sin_inc).max(0.0).sqrt()
            }
        })
        .collect()
}
