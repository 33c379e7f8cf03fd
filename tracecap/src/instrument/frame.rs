//! Frame boundaries
//!
//! A frame marks one iteration of the host's main loop and may only be
//! recorded from the main thread. It is also where a deferred capture toggle
//! takes effect.

use std::sync::Arc;
use tracecap_common::FrameEvent;

use super::{state, with_recorder};
use crate::domain::errors::fatal;
use crate::domain::{ThreadId, UsageError};
use crate::engine::{current_thread_id, CaptureState, Resolution, ThreadRecorder};

pub(crate) fn record_frame(
    recorder: &Arc<ThreadRecorder>,
    state: &CaptureState,
    thread: ThreadId,
    resolution: Resolution,
) -> Result<(), UsageError> {
    if !state.is_initialized() {
        return Ok(());
    }
    let main = state.main_thread_id();
    if thread != main {
        return Err(UsageError::FrameOffMainThread { thread, main });
    }

    // Broadcasting locks every recorder, ours included, so sync before locking.
    state.sync_capture_at_frame();
    if !recorder.is_capturing() {
        return Ok(());
    }

    let mut buffer = recorder.lock();
    if !recorder.is_capturing() {
        return Ok(());
    }
    buffer.check_balanced()?;
    let event = buffer.append::<FrameEvent>(state);
    event.frame_num = state.next_frame();
    event.timestamp = resolution.now();
    Ok(())
}

fn frame_with(resolution: Resolution) {
    let thread = current_thread_id();
    if let Some(Err(err)) = with_recorder(|recorder| record_frame(recorder, state(), thread, resolution)) {
        fatal(err);
    }
}

/// Mark a frame boundary
///
/// # Panics
/// When called off the main thread, or with functions or loops still open on it.
#[inline]
pub fn frame() {
    frame_with(Resolution::Low);
}

/// High resolution [`frame`]
///
/// # Panics
/// As [`frame`].
#[inline]
pub fn hr_frame() {
    frame_with(Resolution::High);
}
