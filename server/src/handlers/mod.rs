//! Request handlers.

mod records;

pub use records::*;
