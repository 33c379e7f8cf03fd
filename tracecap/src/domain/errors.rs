//! Error types for tracecap
//!
//! Usage errors are raised as panics through [`fatal`]; only the dump returns a `Result`.

use super::types::ThreadId;
use thiserror::Error;

/// Misuse of the instrumentation API by the instrumented program
///
/// These are never returned from a public recording call: the engine checks
/// for them at thread-end and frame boundaries and raises them as a panic,
/// because a trace recorded past this point is corrupt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Thread {thread} reached a boundary with {depth} unended function(s)")]
    UnbalancedFunctions { thread: ThreadId, depth: u64 },

    #[error("Thread {thread} reached a boundary with {depth} unended for loop(s)")]
    UnbalancedLoops { thread: ThreadId, depth: u64 },

    #[error("Frame has to be called from the main thread ({main}), called from {thread}")]
    FrameOffMainThread { thread: ThreadId, main: ThreadId },
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Log and raise a usage error
///
/// # Panics
/// Always.
#[cold]
#[track_caller]
pub fn fatal(err: UsageError) -> ! {
    log::error!("{err}");
    panic!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_functions_display() {
        let err = UsageError::UnbalancedFunctions { thread: ThreadId(12), depth: 2 };
        assert_eq!(err.to_string(), "Thread TID:12 reached a boundary with 2 unended function(s)");
    }

    #[test]
    fn test_frame_off_main_thread_display() {
        let err = UsageError::FrameOffMainThread { thread: ThreadId(7), main: ThreadId(1) };
        assert!(err.to_string().contains("main thread (TID:1)"));
        assert!(err.to_string().contains("TID:7"));
    }

    #[test]
    #[should_panic(expected = "unended for loop")]
    fn test_fatal_panics_with_message() {
        fatal(UsageError::UnbalancedLoops { thread: ThreadId(3), depth: 1 });
    }
}
