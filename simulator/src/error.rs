//! Error taxonomy for the exposure simulation.

use shared::algo::{InterpError, PolyFitError};
use thiserror::Error;

use crate::transit::TransitError;

/// Top-level error returned by simulation stages.
#[derive(Error, Debug)]
pub enum SimError {
    /// Unsupported subarray, order, profile or otherwise invalid setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two arrays that must align do not. Never broadcast silently.
    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// One or more pixels failed light-curve evaluation.
    #[error("{failed} pixel(s) of order {order} failed light curve evaluation; first: pixel {first_pixel}: {first_reason}")]
    WorkerEvaluation {
        order: usize,
        failed: usize,
        first_pixel: usize,
        first_reason: String,
    },

    #[error("Transit model error: {0}")]
    Transit(#[from] TransitError),

    #[error("Interpolation error: {0}")]
    Interp(#[from] InterpError),

    #[error("Polynomial fit error: {0}")]
    PolyFit(#[from] PolyFitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], found: &[usize]) -> Self {
        SimError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
