//! Repository implementations.
//!
//! - `local`: In-memory implementation for tests, development and single-instance use
pub mod local;

pub use local::LocalRepository;
