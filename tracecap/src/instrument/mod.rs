//! Instrumentation API
//!
//! Every public recording call follows the same shape: fetch the calling
//! thread's recorder, test its capture flag (the only cost while capture is
//! off) and, if set, append one record built from a timestamp and the
//! caller's arguments.
//!
//! The process-wide [`CaptureState`] and the thread-local recorders live here.
//! Each submodule keeps the record-building step in a `write_*` function that
//! takes the buffer and state explicitly so it can be exercised on an
//! isolated state.
//!
//! ## Submodules
//!
//! - `lifecycle`: init/deinit, capture toggling, draining
//! - `thread`: thread begin/end and [`ThreadScope`]
//! - `frame`: main loop frame boundaries
//! - `function`: function begin/end, [`FunctionScope`], `function_scope!`
//! - `arguments`: typed function arguments
//! - `for_loop`: loop and iteration scopes
//! - `memory`: allocation tracking
//! - `data`: data blobs and callstacks

pub mod arguments;
pub mod data;
pub mod for_loop;
pub mod frame;
pub mod function;
pub mod lifecycle;
pub mod memory;
pub mod thread;

use std::sync::Arc;

use crate::engine::{CaptureState, RecorderBuffer, ThreadRecorder};

pub use arguments::{bool_arg, flags_arg, float_arg, int_arg, int_arg_with_base, ptr_arg, FlagBits, Float, Integral};
pub use data::{callstack, data};
pub use for_loop::{
    for_loop, for_loop_begin, for_loop_end, for_loop_iter, for_loop_iter_begin, for_loop_iter_end, hr_for_loop,
    hr_for_loop_begin, hr_for_loop_end, hr_for_loop_iter, hr_for_loop_iter_begin, hr_for_loop_iter_end, ForLoopIterScope,
    ForLoopScope,
};
pub use frame::{frame, hr_frame};
pub use function::{function, function_begin, function_end, hr_function, hr_function_begin, hr_function_end, FunctionScope};
pub use lifecycle::{
    abilities, deinit, init, is_capturing, is_main_thread, take_captures, want_capturing, write_captures,
    write_captures_to,
};
pub use memory::{hr_mem_alloc, hr_mem_free, hr_memory, mem_alloc, mem_free, memory, MemoryScope};
pub use thread::{hr_thread, hr_thread_begin, hr_thread_end, thread, thread_begin, thread_end, ThreadScope};

static STATE: CaptureState = CaptureState::new();

thread_local! {
    static RECORDER: Arc<ThreadRecorder> = Arc::new(ThreadRecorder::new());
}

/// The process-wide capture state
#[must_use]
pub fn state() -> &'static CaptureState {
    &STATE
}

/// Run `f` with the calling thread's recorder
///
/// Returns `None` while the thread-local is being torn down.
pub(crate) fn with_recorder<R>(f: impl FnOnce(&Arc<ThreadRecorder>) -> R) -> Option<R> {
    RECORDER.try_with(f).ok()
}

/// Append through the calling thread's recorder if it is capturing
///
/// The flag is checked again under the buffer lock so nothing is appended
/// after a concurrent capture-off drained this recorder.
#[inline]
pub(crate) fn record<R>(f: impl FnOnce(&mut RecorderBuffer, &CaptureState) -> R) -> Option<R> {
    RECORDER
        .try_with(|recorder| {
            if !recorder.is_capturing() {
                return None;
            }
            let mut buffer = recorder.lock();
            recorder.is_capturing().then(|| f(&mut buffer, &STATE))
        })
        .ok()
        .flatten()
}

/// Erase a pointer to the address recorded for it
#[inline]
pub(crate) fn address_of<T: ?Sized>(ptr: *const T) -> u64 {
    ptr.cast::<()>() as usize as u64
}
