//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep the three kinds of identifiers the engine hands
//! out (thread ids, blob ids, loop ids) from being mixed up.

use std::fmt;

/// OS thread ID
///
/// Resolved with `gettid` on Linux. Stored in ThreadBounds headers to
/// attribute each flushed segment to its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Data blob ID
///
/// Issued from a single process-wide counter and never reused, even across
/// `init`/`deinit` cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(pub u64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob#{}", self.0)
    }
}

/// For-loop ID
///
/// Per-thread counter assigned by `for_loop_begin`. Zero is also what a
/// disabled `for_loop_begin` returns, so a loop id is only meaningful while
/// capture is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loop#{}", self.0)
    }
}

impl From<LoopId> for u64 {
    fn from(id: LoopId) -> Self {
        u64::from(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId(4242).to_string(), "TID:4242");
    }

    #[test]
    fn test_blob_ids_order_by_issue() {
        assert!(BlobId(3) < BlobId(4));
        assert_eq!(BlobId(9).to_string(), "Blob#9");
    }

    #[test]
    fn test_loop_id_widening() {
        let wide: u64 = LoopId(17).into();
        assert_eq!(wide, 17);
        assert_eq!(LoopId::default(), LoopId(0));
    }
}
