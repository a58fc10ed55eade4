//! Image-level noise utilities

pub mod noise;

pub use noise::{normal_sample, poisson_array, poisson_sample, seeded_rng};
