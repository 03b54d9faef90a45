//! Connection Model
//!
//! Registered connection entries, their transport kinds, and the status
//! values the manager publishes for them.

mod entry;
mod status;

pub use entry::*;
pub use status::*;
