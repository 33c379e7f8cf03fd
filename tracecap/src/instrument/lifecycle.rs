//! Capture lifecycle
//!
//! ```text
//! init() ──▶ want_capturing(true, _) ──▶ ... frame() ... ──▶ want_capturing(false, _)
//!        ──▶ take_captures() / write_captures() ──▶ deinit()
//! ```

use std::io::{self, Write};

use super::{state, with_recorder};
use crate::domain::DumpError;
use crate::engine::{current_thread_id, Abilities};
use crate::export::write_dump;
use crate::trace_data::CaptureLog;

/// Reset the capture state and make the calling thread the main thread
///
/// Capture starts off. Calling `init` again without `deinit` starts a fresh
/// session and discards everything recorded so far.
pub fn init() {
    let thread = current_thread_id();
    with_recorder(|recorder| state().init(recorder, thread));
}

/// Stop capturing and drain every registered thread into the merged log
pub fn deinit() {
    state().deinit();
}

/// Request capture on or off, now (`instant`) or at the next frame
pub fn want_capturing(enable: bool, instant: bool) {
    state().want_capturing(enable, instant);
}

/// Whether the engine is initialized and capturing
#[must_use]
pub fn is_capturing() -> bool {
    state().capture_allowed()
}

/// CPU abilities detected by the last `init`
#[must_use]
pub fn abilities() -> Abilities {
    state().abilities()
}

/// Whether the calling thread is the one that called `init`
#[must_use]
pub fn is_main_thread() -> bool {
    let state = state();
    state.is_initialized() && state.is_main_thread(current_thread_id())
}

/// Move every record out of the merged log
///
/// Only what has been flushed is included; switch capture off (or end the
/// recording threads) first to drain the recorders.
#[must_use]
pub fn take_captures() -> CaptureLog {
    CaptureLog::new(state().take_events())
}

/// Drain the merged log to stdout; returns the number of lines written
///
/// # Errors
/// Returns [`DumpError::Io`] if stdout cannot be written.
pub fn write_captures() -> Result<usize, DumpError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    write_captures_to(&mut out)
}

/// Drain the merged log to `writer`; returns the number of lines written
///
/// # Errors
/// Returns [`DumpError::Io`] if the writer fails.
pub fn write_captures_to<W: Write>(writer: &mut W) -> Result<usize, DumpError> {
    write_dump(&take_captures(), writer)
}
