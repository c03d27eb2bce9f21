//! Index Calculator.
//!
//! Pollution indices are produced by an [`IndexStrategy`] chosen once per
//! process: [`MockIndexStrategy`] for development or [`RemoteIndexStrategy`]
//! for a deployed model. [`IndexCalculator`] is the entry point used by the
//! services and adds cancellation on top of the strategy.

pub mod calculator;
pub mod error;
pub mod index;
pub mod mock;
pub mod remote;
pub mod strategy;

pub use calculator::IndexCalculator;
pub use error::CalculatorError;
pub use index::{score_sample, IndexResult};
pub use mock::MockIndexStrategy;
pub use remote::RemoteIndexStrategy;
pub use strategy::{HealthStatus, IndexStrategy, ServiceHealth};
