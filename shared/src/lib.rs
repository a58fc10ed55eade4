//! Shared numerical components for the exposure simulator.
//!
//! Nothing in here knows about spectrographs or detectors; these are the
//! interpolation, fitting, integration and sampling building blocks the
//! simulator crate composes.

pub mod algo;
pub mod image_proc;
