//! Validation of parsed rows into samples.

pub mod validator;

pub use validator::{InvalidSample, SampleValidator, ValidationOutcome, MAX_REPORTED_ERRORS};
