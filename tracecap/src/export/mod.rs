//! Capture export
//!
//! The only export is a human-readable console dump: one line per record,
//! decoded by tag. It is not a stable format.

pub mod dump;

pub use dump::{write_dump, write_record};
