//! Record storage for the authority.
//!
//! Records live in memory for the lifetime of the process.

mod records;

pub use records::*;
