//! Identifiers and errors shared across the engine
//!
//! - `types`: thread, blob and loop id newtypes
//! - `errors`: fatal usage errors and dump I/O errors

pub mod errors;
pub mod types;

pub use types::{BlobId, LoopId, ThreadId};

pub use errors::{DumpError, UsageError};
