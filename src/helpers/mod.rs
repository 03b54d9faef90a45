//! Helper Utilities
//!
//! Platform directories and logging setup.

mod fs;
mod logging;

pub use fs::*;
pub use logging::*;
