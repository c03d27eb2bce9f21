pub mod analysis;
pub mod macros;
pub mod prediction;
pub mod report;
pub mod sample;
pub mod time;

pub use analysis::*;
pub use prediction::*;
pub use report::*;
pub use sample::*;
pub use time::*;
