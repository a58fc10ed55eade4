//! Run configuration.
//!
//! A [`SimulationConfig`] is loaded once at start-up, from JSON or from
//! defaults, and handed by reference to every stage that needs it. Nothing
//! mutates it afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchOptions, FailurePolicy, DEFAULT_WORKERS};
use crate::error::{SimError, SimResult};
use crate::noise::NoiseParams;
use crate::postprocess::DEFAULT_PEDESTAL_OFFSET;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Signal-to-noise ratio of the stellar baseline per frame
    pub snr: f64,
    /// Half width of the illuminated trace, pixels
    pub trace_radius: f64,
    /// Synthetic PSF wing samples added on each side
    pub psf_extend: usize,
    /// Mean level of unilluminated pixels
    pub noise_floor: f64,
    /// Light-curve worker threads
    pub workers: usize,
    /// Spectral response divisor of each order, order 1 first
    pub response_divisors: Vec<f64>,
    pub failure_policy: FailurePolicy,
    /// Base seed for per-pixel noise; `None` for fresh entropy
    pub pixel_seed: Option<u64>,
    /// Seed for PSF wing synthesis
    pub psf_seed: Option<u64>,
    pub show_progress: bool,
    /// Detector noise amplitudes used for dark ramps
    pub noise: NoiseParams,
    pub pedestal_offset: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            snr: 700.0,
            trace_radius: 50.0,
            psf_extend: 25,
            noise_floor: 2.0,
            workers: DEFAULT_WORKERS,
            response_divisors: vec![1.0, 50.0],
            failure_policy: FailurePolicy::default(),
            pixel_seed: None,
            psf_seed: None,
            show_progress: false,
            noise: NoiseParams::default(),
            pedestal_offset: DEFAULT_PEDESTAL_OFFSET,
        }
    }
}

impl SimulationConfig {
    /// Read and validate a JSON configuration; missing fields take defaults.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> SimResult<()> {
        let bad = |what: &str, value: f64| {
            Err(SimError::Configuration(format!("invalid {what}: {value}")))
        };
        if !(self.snr.is_finite() && self.snr > 0.0) {
            return bad("snr", self.snr);
        }
        if !(self.trace_radius.is_finite() && self.trace_radius >= 0.0) {
            return bad("trace_radius", self.trace_radius);
        }
        if !self.noise_floor.is_finite() {
            return bad("noise_floor", self.noise_floor);
        }
        if self.workers == 0 {
            return Err(SimError::Configuration("workers must be at least 1".into()));
        }
        if let Some(&d) = self
            .response_divisors
            .iter()
            .find(|&&d| !(d.is_finite() && d != 0.0))
        {
            return Err(SimError::Configuration(format!(
                "response divisors must be finite and non-zero, got {d}"
            )));
        }
        Ok(())
    }

    /// Response divisor for `order` (1-based), 1 for orders without one.
    pub fn response_divisor(&self, order: usize) -> f64 {
        order
            .checked_sub(1)
            .and_then(|k| self.response_divisors.get(k))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            workers: self.workers,
            policy: self.failure_policy,
            seed: self.pixel_seed,
            show_progress: self.show_progress,
        }
    }
}
