//! Exposure geometry and timing.
//!
//! An exposure is `nints` integrations of `nresets + ngrps` frames each. Reset
//! frames are clocked (they take time) but are not part of the delivered data,
//! so the time axis carries exactly `nints × ngrps` entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SimError, SimResult};

/// Number of detector columns read in every supported subarray.
pub const DETECTOR_COLUMNS: usize = 2048;

/// Detector readout windows supported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subarray {
    #[serde(rename = "SUBSTRIP96")]
    Substrip96,
    #[serde(rename = "SUBSTRIP256")]
    Substrip256,
    #[serde(rename = "FULL")]
    Full,
}

impl Subarray {
    /// Rows read out in this subarray.
    pub fn rows(&self) -> usize {
        match self {
            Subarray::Substrip96 => 96,
            Subarray::Substrip256 => 256,
            Subarray::Full => 2048,
        }
    }

    pub fn columns(&self) -> usize {
        DETECTOR_COLUMNS
    }

    /// Time to read one frame, in seconds.
    pub fn frame_time(&self) -> f64 {
        match self {
            Subarray::Substrip96 => 2.213,
            Subarray::Substrip256 => 5.491,
            Subarray::Full => 10.737,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Subarray::Substrip96 => "SUBSTRIP96",
            Subarray::Substrip256 => "SUBSTRIP256",
            Subarray::Full => "FULL",
        }
    }
}

impl fmt::Display for Subarray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subarray {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBSTRIP96" | "96" => Ok(Subarray::Substrip96),
            "SUBSTRIP256" | "256" => Ok(Subarray::Substrip256),
            "FULL" | "2048" => Ok(Subarray::Full),
            other => Err(SimError::Configuration(format!(
                "unsupported subarray '{other}', expected SUBSTRIP96, SUBSTRIP256 or FULL"
            ))),
        }
    }
}

/// Calculate the time of every retained frame in the exposure.
///
/// Each integration clocks `nresets + ngrps` frames spaced by the subarray
/// frame time; the next integration starts one frame time after the last frame
/// of the previous one. The first `nresets` frames of every integration are
/// resets and are dropped from the returned axis.
///
/// # Example
/// ```
/// use soss_simulator::exposure::{get_frame_times, Subarray};
///
/// let t = get_frame_times(Subarray::Substrip256, 2, 3, 0.0, 1);
/// assert_eq!(t.len(), 6);
/// assert!((t[2] - t[0] - 3.0 * 5.491).abs() < 1e-9);
/// ```
pub fn get_frame_times(
    subarray: Subarray,
    ngrps: usize,
    nints: usize,
    t0: f64,
    nresets: usize,
) -> Vec<f64> {
    let ft = subarray.frame_time();
    let frames_per_int = nresets + ngrps;

    let mut time_axis = Vec::with_capacity(nints * ngrps);
    let mut t = t0;
    for _ in 0..nints {
        let times: Vec<f64> = (0..frames_per_int).map(|k| t + k as f64 * ft).collect();
        if let Some(last) = times.last() {
            t = last + ft;
        }
        time_axis.extend_from_slice(&times[nresets.min(times.len())..]);
    }

    time_axis
}

/// Readout configuration and time axis of one simulated exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub subarray: Subarray,
    pub nrows: usize,
    pub ncols: usize,
    /// Groups per integration
    pub ngrps: usize,
    /// Integrations
    pub nints: usize,
    /// Reset frames per integration
    pub nresets: usize,
    /// Seconds per frame
    pub frame_time: f64,
    /// Time of every retained frame
    pub time: Vec<f64>,
}

impl Exposure {
    /// Build an exposure with one reset frame per integration.
    pub fn new(subarray: Subarray, ngrps: usize, nints: usize, t0: f64) -> Self {
        Self::with_resets(subarray, ngrps, nints, t0, 1)
    }

    pub fn with_resets(
        subarray: Subarray,
        ngrps: usize,
        nints: usize,
        t0: f64,
        nresets: usize,
    ) -> Self {
        Self {
            subarray,
            nrows: subarray.rows(),
            ncols: subarray.columns(),
            ngrps,
            nints,
            nresets,
            frame_time: subarray.frame_time(),
            time: get_frame_times(subarray, ngrps, nints, t0, nresets),
        }
    }

    /// Override the spatial extent, keeping the subarray's timing.
    ///
    /// Lets tests and quick-look runs simulate a small window of a subarray.
    pub fn with_window(mut self, nrows: usize, ncols: usize) -> Self {
        self.nrows = nrows;
        self.ncols = ncols;
        self
    }

    pub fn nframes(&self) -> usize {
        self.time.len()
    }

    pub fn npixels(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Shape of the exposure cube: `[frames, rows, cols]`.
    pub fn cube_shape(&self) -> (usize, usize, usize) {
        (self.nframes(), self.nrows, self.ncols)
    }

    /// Check the time axis invariant.
    pub fn validate(&self) -> SimResult<()> {
        let expected = self.nints * self.ngrps;
        if self.time.len() != expected {
            return Err(SimError::shape(
                "exposure time axis",
                &[expected],
                &[self.time.len()],
            ));
        }
        Ok(())
    }
}
