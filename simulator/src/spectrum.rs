//! Tabulated spectra consumed by the light-curve generator.
//!
//! All wavelengths are in microns. Tables are validated once on construction
//! (equal lengths, strictly increasing wavelengths) so per-pixel lookups can
//! use the unchecked interpolation path.

use serde::{Deserialize, Serialize};
use shared::algo::{interp_clamped, interp_or, validate_table};
use std::path::Path;

use crate::error::{SimError, SimResult};

/// ADU to mJy conversion of the grism throughput tables.
pub const ADU_TO_MJY: f64 = 7.586031e-05;
/// mJy to erg s⁻¹ cm⁻² Å⁻¹ conversion of the grism throughput tables.
pub const MJY_TO_ERG: f64 = 2.680489e-15;

/// Stellar flux density sampled on a wavelength grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StellarSpectrum {
    wavelength_um: Vec<f64>,
    flux: Vec<f64>,
}

impl StellarSpectrum {
    pub fn new(wavelength_um: Vec<f64>, flux: Vec<f64>) -> SimResult<Self> {
        let spectrum = Self {
            wavelength_um,
            flux,
        };
        spectrum.validate()?;
        Ok(spectrum)
    }

    /// Re-check the table, e.g. after deserialising.
    pub fn validate(&self) -> SimResult<()> {
        validate_table(&self.wavelength_um, &self.flux)?;
        Ok(())
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelength_um
    }

    pub fn fluxes(&self) -> &[f64] {
        &self.flux
    }

    /// Shortest tabulated wavelength.
    pub fn min_wavelength(&self) -> f64 {
        self.wavelength_um[0]
    }

    /// Flux at `wavelength_um`, zero outside the tabulated range.
    pub fn flux_at(&self, wavelength_um: f64) -> f64 {
        interp_or(wavelength_um, &self.wavelength_um, &self.flux, 0.0, 0.0)
    }
}

/// Planet transmission spectrum as transit depth `(Rp/R*)²` per wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetSpectrum {
    wavelength_um: Vec<f64>,
    transit_depth: Vec<f64>,
}

impl PlanetSpectrum {
    pub fn new(wavelength_um: Vec<f64>, transit_depth: Vec<f64>) -> SimResult<Self> {
        let spectrum = Self {
            wavelength_um,
            transit_depth,
        };
        spectrum.validate()?;
        Ok(spectrum)
    }

    pub fn validate(&self) -> SimResult<()> {
        validate_table(&self.wavelength_um, &self.transit_depth)?;
        if let Some(bad) = self.transit_depth.iter().find(|d| !(**d >= 0.0)) {
            return Err(SimError::Configuration(format!(
                "transit depth must be non-negative, got {bad}"
            )));
        }
        Ok(())
    }

    /// A wavelength-independent transit depth over `[lo, hi]`.
    pub fn flat(lo_um: f64, hi_um: f64, depth: f64) -> SimResult<Self> {
        Self::new(vec![lo_um, hi_um], vec![depth, depth])
    }

    /// Transit depth at `wavelength_um`, holding the edge values beyond the table.
    pub fn depth_at(&self, wavelength_um: f64) -> f64 {
        interp_clamped(wavelength_um, &self.wavelength_um, &self.transit_depth)
    }

    /// Planet-to-star radius ratio at `wavelength_um`.
    pub fn radius_ratio_at(&self, wavelength_um: f64) -> f64 {
        self.depth_at(wavelength_um).sqrt()
    }
}

/// Detector spectral response of one order, in flux units per ADU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralResponse {
    wavelength_um: Vec<f64>,
    response: Vec<f64>,
}

impl SpectralResponse {
    pub fn new(wavelength_um: Vec<f64>, response: Vec<f64>) -> SimResult<Self> {
        let table = Self {
            wavelength_um,
            response,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> SimResult<()> {
        validate_table(&self.wavelength_um, &self.response)?;
        Ok(())
    }

    /// Build from a raw grism throughput table (wavelength, ADU-based counts).
    pub fn from_throughput(wavelength_um: Vec<f64>, throughput: Vec<f64>) -> SimResult<Self> {
        let response = throughput
            .into_iter()
            .map(|t| t * ADU_TO_MJY * MJY_TO_ERG)
            .collect();
        Self::new(wavelength_um, response)
    }

    /// Read a whitespace-separated two-column throughput file.
    ///
    /// Lines starting with `#` and blank lines are skipped.
    pub fn load_throughput(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let (wave, thru) = parse_two_columns(&text).map_err(|e| {
            SimError::Configuration(format!("{}: {e}", path.display()))
        })?;
        Self::from_throughput(wave, thru)
    }

    /// Response at `wavelength_um`, holding edge values beyond the table.
    pub fn at(&self, wavelength_um: f64) -> f64 {
        interp_clamped(wavelength_um, &self.wavelength_um, &self.response)
    }

    /// Response for every wavelength, divided by a per-order correction.
    pub fn sample(&self, wavelengths_um: &[f64], divisor: f64) -> Vec<f64> {
        wavelengths_um
            .iter()
            .map(|&w| self.at(w) / divisor)
            .collect()
    }
}

fn parse_two_columns(text: &str) -> Result<(Vec<f64>, Vec<f64>), String> {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.split_whitespace();
        let (Some(a), Some(b)) = (cols.next(), cols.next()) else {
            return Err(format!("line {}: expected two columns", lineno + 1));
        };
        let a: f64 = a
            .parse()
            .map_err(|_| format!("line {}: invalid number '{a}'", lineno + 1))?;
        let b: f64 = b
            .parse()
            .map_err(|_| format!("line {}: invalid number '{b}'", lineno + 1))?;
        xs.push(a);
        ys.push(b);
    }
    Ok((xs, ys))
}
