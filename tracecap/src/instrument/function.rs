//! Function tracing
//!
//! `function_begin(id)` / `function_end()` bracket a function body. The id is
//! opaque to the engine, usually an address unique to the function; the
//! [`function_scope!`](crate::function_scope) macro supplies one per call site.

use tracecap_common::{FunctionBeginEvent, FunctionEndEvent};

use super::record;
use crate::engine::{CaptureState, RecorderBuffer, Resolution};

pub(crate) fn write_function_begin(
    buffer: &mut RecorderBuffer,
    state: &CaptureState,
    function: u64,
    resolution: Resolution,
) {
    let event = buffer.append::<FunctionBeginEvent>(state);
    event.function = function;
    event.timestamp = resolution.now();
    buffer.enter_function();
}

pub(crate) fn write_function_end(buffer: &mut RecorderBuffer, state: &CaptureState, resolution: Resolution) {
    buffer.append::<FunctionEndEvent>(state).timestamp = resolution.now();
    buffer.exit_function();
}

#[inline]
pub fn function_begin(function: u64) {
    record(|buffer, state| write_function_begin(buffer, state, function, Resolution::Low));
}

#[inline]
pub fn function_end() {
    record(|buffer, state| write_function_end(buffer, state, Resolution::Low));
}

#[inline]
pub fn hr_function_begin(function: u64) {
    record(|buffer, state| write_function_begin(buffer, state, function, Resolution::High));
}

#[inline]
pub fn hr_function_end() {
    record(|buffer, state| write_function_end(buffer, state, Resolution::High));
}

/// Ends the function when dropped
#[must_use = "the function ends as soon as the scope is dropped"]
pub struct FunctionScope {
    resolution: Resolution,
}

impl FunctionScope {
    pub fn new(function: u64, resolution: Resolution) -> Self {
        record(|buffer, state| write_function_begin(buffer, state, function, resolution));
        Self { resolution }
    }
}

impl Drop for FunctionScope {
    fn drop(&mut self) {
        let resolution = self.resolution;
        record(|buffer, state| write_function_end(buffer, state, resolution));
    }
}

#[inline]
pub fn function(function: u64) -> FunctionScope {
    FunctionScope::new(function, Resolution::Low)
}

#[inline]
pub fn hr_function(function: u64) -> FunctionScope {
    FunctionScope::new(function, Resolution::High)
}

/// Open a [`FunctionScope`] identified by the call site
///
/// Expands to a scope whose id is the address of a static private to the
/// expansion, so every call site gets a distinct, stable id.
///
/// ```ignore
/// fn work() {
///     let _scope = tracecap::function_scope!();
///     // ...
/// }
/// ```
///
/// `function_scope!(hr)` uses the high resolution clock.
#[macro_export]
macro_rules! function_scope {
    () => {{
        static SITE: u8 = 0;
        $crate::function(::core::ptr::addr_of!(SITE) as usize as u64)
    }};
    (hr) => {{
        static SITE: u8 = 0;
        $crate::hr_function(::core::ptr::addr_of!(SITE) as usize as u64)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ThreadRecorder;
    use crate::domain::ThreadId;

    #[test]
    fn test_begin_and_end_track_depth() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        let mut buffer = recorder.lock();

        write_function_begin(&mut buffer, &state, 0xdead, Resolution::Low);
        write_function_begin(&mut buffer, &state, 0xbeef, Resolution::High);
        assert_eq!(buffer.function_depth(), 2);
        write_function_end(&mut buffer, &state, Resolution::High);
        write_function_end(&mut buffer, &state, Resolution::Low);
        assert_eq!(buffer.function_depth(), 0);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_begin_record_contents() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        {
            let mut buffer = recorder.lock();
            buffer.set_thread_id(ThreadId(4));
            write_function_begin(&mut buffer, &state, 0x1234, Resolution::High);
            buffer.flush(&state);
        }

        let events = state.take_events();
        let begin = events[1].read::<FunctionBeginEvent>().unwrap();
        assert_eq!(begin.function, 0x1234);
        assert!(begin.timestamp.is_high_res());
    }

    #[test]
    fn test_end_without_begin_saturates() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        let mut buffer = recorder.lock();

        write_function_end(&mut buffer, &state, Resolution::Low);
        assert_eq!(buffer.function_depth(), 0);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_scope_is_noop_without_capture() {
        // This thread never registered, so its recorder is not capturing.
        let _scope = crate::function_scope!();
        assert_eq!(super::super::with_recorder(|recorder| recorder.lock().len()), Some(0));
    }

    #[test]
    fn test_call_sites_get_distinct_ids() {
        fn site_a() -> u64 {
            static SITE: u8 = 0;
            core::ptr::addr_of!(SITE) as usize as u64
        }
        fn site_b() -> u64 {
            static SITE: u8 = 0;
            core::ptr::addr_of!(SITE) as usize as u64
        }
        assert_ne!(site_a(), site_b());
        assert_eq!(site_a(), site_a());
    }
}
