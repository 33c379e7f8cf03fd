//! Thread boundaries
//!
//! `thread_begin` resolves the OS thread id, registers the thread's recorder
//! so capture broadcasts reach it and, if capture is on, records ThreadBegin.
//! `thread_end` records ThreadEnd, flushes, unregisters and checks that every
//! function and loop opened on the thread was closed.

use std::sync::Arc;
use tracecap_common::{ThreadBeginEvent, ThreadEndEvent};

use super::{state, with_recorder};
use crate::domain::errors::fatal;
use crate::domain::UsageError;
use crate::engine::{current_thread_id, CaptureState, Resolution, ThreadRecorder};

pub(crate) fn begin_thread(recorder: &Arc<ThreadRecorder>, state: &CaptureState, resolution: Resolution) {
    recorder.lock().set_thread_id(current_thread_id());
    state.add_thread(recorder);
    let mut buffer = recorder.lock();
    if recorder.is_capturing() {
        buffer.append::<ThreadBeginEvent>(state).timestamp = resolution.now();
    }
}

pub(crate) fn end_thread(
    recorder: &Arc<ThreadRecorder>,
    state: &CaptureState,
    resolution: Resolution,
) -> Result<(), UsageError> {
    let balance = {
        let mut buffer = recorder.lock();
        let capturing = recorder.is_capturing();
        if capturing {
            buffer.append::<ThreadEndEvent>(state).timestamp = resolution.now();
        }
        buffer.flush(state);
        if capturing {
            buffer.check_balanced()
        } else {
            Ok(())
        }
    };
    state.remove_thread(recorder);
    recorder.set_capturing(false);
    balance
}

fn thread_begin_with(resolution: Resolution) {
    with_recorder(|recorder| begin_thread(recorder, state(), resolution));
}

fn thread_end_with(resolution: Resolution) {
    if let Some(Err(err)) = with_recorder(|recorder| end_thread(recorder, state(), resolution)) {
        fatal(err);
    }
}

#[inline]
pub fn thread_begin() {
    thread_begin_with(Resolution::Low);
}

/// # Panics
/// If a function or loop opened on this thread is still open.
#[inline]
pub fn thread_end() {
    thread_end_with(Resolution::Low);
}

#[inline]
pub fn hr_thread_begin() {
    thread_begin_with(Resolution::High);
}

/// # Panics
/// If a function or loop opened on this thread is still open.
#[inline]
pub fn hr_thread_end() {
    thread_end_with(Resolution::High);
}

/// Ends the thread when dropped
#[must_use = "the thread ends as soon as the scope is dropped"]
pub struct ThreadScope {
    resolution: Resolution,
}

impl ThreadScope {
    pub fn new(resolution: Resolution) -> Self {
        thread_begin_with(resolution);
        Self { resolution }
    }
}

impl Drop for ThreadScope {
    fn drop(&mut self) {
        // Avoid a double panic while unwinding from an instrumented failure.
        if std::thread::panicking() {
            with_recorder(|recorder| {
                let _ = end_thread(recorder, state(), self.resolution);
            });
            return;
        }
        thread_end_with(self.resolution);
    }
}

#[inline]
pub fn thread() -> ThreadScope {
    ThreadScope::new(Resolution::Low)
}

#[inline]
pub fn hr_thread() -> ThreadScope {
    ThreadScope::new(Resolution::High)
}
