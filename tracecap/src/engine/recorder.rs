//! Per-thread recording buffer
//!
//! Each OS thread owns one [`ThreadRecorder`]: a dense inline array of
//! [`RECORDER_CAPACITY`] event slots, a write cursor, nesting-depth counters
//! and the thread's capture flag. Appending never allocates; when the array
//! is full the next append first flushes it into the merged log of the
//! [`CaptureState`].
//!
//! ## Sharing
//!
//! The capture flag is an atomic because any thread may flip it (instant
//! capture toggles, frame-boundary propagation). The buffer sits behind its
//! own mutex so that a forced flush from another thread (`deinit`, instant
//! capture off) can drain it; the owning thread is the only other user, so
//! the lock is uncontended on the recording path. This is a third lock next to
//! the log and registry locks of [`CaptureState`]: the buffer is not
//! single-writer, since a forced flush writes its cursor from another thread.
//!
//! Depth counters only move while the flag is set, so they are reset whenever
//! the flag goes from off to on. Scopes still open at that point end at depth
//! zero, which saturates.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use tracecap_common::{Event, EventPayload};

use super::state::CaptureState;
use crate::domain::{LoopId, ThreadId, UsageError};

/// Number of records a thread buffers before flushing
pub const RECORDER_CAPACITY: usize = 128;

/// Cursor value signalling a full buffer (high bit of the 8-bit cursor)
const CURSOR_OVERFLOW: u8 = 0x80;

const _: () = assert!(RECORDER_CAPACITY == CURSOR_OVERFLOW as usize);

/// A thread's recorder: capture flag plus guarded buffer
pub struct ThreadRecorder {
    capture: AtomicBool,
    buffer: Mutex<RecorderBuffer>,
}

impl ThreadRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self { capture: AtomicBool::new(false), buffer: parking_lot::const_mutex(RecorderBuffer::new()) }
    }

    /// The single branch every instrumentation call pays when capture is off
    #[inline]
    pub fn is_capturing(&self) -> bool {
        self.capture.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_capturing(&self, capture: bool) {
        self.capture.store(capture, Ordering::Relaxed);
    }

    /// Set the flag, clearing the depth counters if it was off
    ///
    /// Begin/end pairs that straddled an off period leave no trace in the
    /// counters once capture resumes.
    pub fn resume_capturing(&self) {
        let mut buffer = self.buffer.lock();
        if !self.capture.swap(true, Ordering::Relaxed) {
            buffer.reset_depths();
        }
    }

    /// Lock the buffer for appending or flushing
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, RecorderBuffer> {
        self.buffer.lock()
    }
}

impl Default for ThreadRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffered records and per-thread bookkeeping
pub struct RecorderBuffer {
    thread_id: ThreadId,
    function_depth: u64,
    loop_depth: u64,
    next_loop_id: u32,
    /// Next free slot; `CURSOR_OVERFLOW` once all slots are used
    cursor: u8,
    events: [Event; RECORDER_CAPACITY],
}

impl RecorderBuffer {
    const fn new() -> Self {
        Self {
            thread_id: ThreadId(0),
            function_depth: 0,
            loop_depth: 0,
            next_loop_id: 0,
            cursor: 0,
            events: [Event::EMPTY; RECORDER_CAPACITY],
        }
    }

    /// Claim the next slot as a `T`, flushing into `sink` first if the buffer is full
    #[inline]
    pub fn append<T: EventPayload>(&mut self, sink: &CaptureState) -> &mut T {
        if self.cursor & CURSOR_OVERFLOW != 0 {
            self.flush(sink);
        }
        let index = usize::from(self.cursor);
        self.cursor += 1;
        self.events[index].write::<T>()
    }

    /// Push buffered records into `sink` behind a ThreadBounds header
    ///
    /// An empty buffer pushes nothing.
    pub fn flush(&mut self, sink: &CaptureState) {
        if self.cursor == 0 {
            return;
        }
        sink.push_events(&self.events[..self.len()], self.thread_id);
        self.cursor = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.cursor)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn set_thread_id(&mut self, thread_id: ThreadId) {
        self.thread_id = thread_id;
    }

    #[must_use]
    pub fn function_depth(&self) -> u64 {
        self.function_depth
    }

    #[must_use]
    pub fn loop_depth(&self) -> u64 {
        self.loop_depth
    }

    pub fn reset_depths(&mut self) {
        self.function_depth = 0;
        self.loop_depth = 0;
    }

    pub fn enter_function(&mut self) {
        self.function_depth += 1;
    }

    /// Saturates at zero: an end whose begin was recorded before capture was on
    /// is not an error
    pub fn exit_function(&mut self) {
        self.function_depth = self.function_depth.saturating_sub(1);
    }

    /// Open a loop scope and hand out its id
    pub fn open_loop(&mut self) -> LoopId {
        let id = LoopId(self.next_loop_id);
        self.next_loop_id = self.next_loop_id.wrapping_add(1);
        self.loop_depth += 1;
        id
    }

    pub fn close_loop(&mut self) {
        self.loop_depth = self.loop_depth.saturating_sub(1);
    }

    /// Check that every function and loop scope opened on this thread was closed
    ///
    /// # Errors
    /// Returns the first unbalanced counter found, functions before loops.
    pub fn check_balanced(&self) -> Result<(), UsageError> {
        if self.function_depth != 0 {
            return Err(UsageError::UnbalancedFunctions {
                thread: self.thread_id,
                depth: self.function_depth,
            });
        }
        if self.loop_depth != 0 {
            return Err(UsageError::UnbalancedLoops { thread: self.thread_id, depth: self.loop_depth });
        }
        Ok(())
    }
}

/// OS id of the calling thread
#[cfg(target_os = "linux")]
#[allow(unsafe_code, clippy::cast_sign_loss)]
#[must_use]
pub fn current_thread_id() -> ThreadId {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    ThreadId(tid as u64)
}

/// Process-unique id of the calling thread (no `gettid` on this platform)
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_thread_id() -> ThreadId {
    use std::sync::atomic::AtomicU64;

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    ThreadId(ID.with(|id| *id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracecap_common::{FunctionEndEvent, ThreadBoundsEvent, ThreadEndEvent};

    fn recorder_on(thread: u64) -> ThreadRecorder {
        let recorder = ThreadRecorder::new();
        recorder.lock().set_thread_id(ThreadId(thread));
        recorder
    }

    #[test]
    fn test_resume_clears_depths_only_from_off() {
        let recorder = recorder_on(1);
        recorder.resume_capturing();
        recorder.lock().enter_function();
        let _id = recorder.lock().open_loop();

        // Already on: open scopes are kept.
        recorder.resume_capturing();
        assert_eq!(recorder.lock().function_depth(), 1);
        assert_eq!(recorder.lock().loop_depth(), 1);

        recorder.set_capturing(false);
        recorder.resume_capturing();
        assert!(recorder.is_capturing());
        assert_eq!(recorder.lock().function_depth(), 0);
        assert!(recorder.lock().check_balanced().is_ok());
    }

    #[test]
    fn test_append_stays_in_buffer_until_full() {
        let state = CaptureState::new();
        let recorder = recorder_on(1);
        let mut buffer = recorder.lock();

        for _ in 0..RECORDER_CAPACITY {
            buffer.append::<FunctionEndEvent>(&state);
        }
        assert_eq!(buffer.len(), RECORDER_CAPACITY);
        assert_eq!(state.event_count(), 0);

        // The 129th append flushes the full buffer first.
        buffer.append::<FunctionEndEvent>(&state);
        assert_eq!(buffer.len(), 1);
        assert_eq!(state.event_count(), RECORDER_CAPACITY + 1);
    }

    #[test]
    fn test_flush_frames_records_with_thread_bounds() {
        let state = CaptureState::new();
        let recorder = recorder_on(77);
        let mut buffer = recorder.lock();

        buffer.append::<FunctionEndEvent>(&state);
        buffer.append::<ThreadEndEvent>(&state);
        buffer.flush(&state);
        assert!(buffer.is_empty());

        let events = state.take_events();
        assert_eq!(events.len(), 3);
        let bounds = events[0].read::<ThreadBoundsEvent>().unwrap();
        assert_eq!(bounds.thread_id, 77);
        assert_eq!(bounds.length, 2);
        assert!(events[1].read::<FunctionEndEvent>().is_some());
        assert!(events[2].read::<ThreadEndEvent>().is_some());
    }

    #[test]
    fn test_flush_of_empty_buffer_is_noop() {
        let state = CaptureState::new();
        let recorder = recorder_on(3);
        recorder.lock().flush(&state);
        assert_eq!(state.event_count(), 0);
    }

    #[test]
    fn test_buffer_framing_for_many_appends() {
        let state = CaptureState::new();
        let recorder = recorder_on(5);
        let total = 3 * RECORDER_CAPACITY + 17;
        {
            let mut buffer = recorder.lock();
            for _ in 0..total {
                buffer.append::<FunctionEndEvent>(&state);
            }
            buffer.flush(&state);
        }

        let events = state.take_events();
        let mut index = 0;
        let mut headers = 0;
        let mut recorded = 0;
        while index < events.len() {
            let bounds = events[index].read::<ThreadBoundsEvent>().expect("segment header");
            let length = usize::try_from(bounds.length).unwrap();
            assert!(length <= RECORDER_CAPACITY);
            for event in &events[index + 1..index + 1 + length] {
                assert!(event.read::<FunctionEndEvent>().is_some());
            }
            headers += 1;
            recorded += length;
            index += length + 1;
        }
        assert_eq!(headers, total.div_ceil(RECORDER_CAPACITY));
        assert_eq!(recorded, total);
    }

    #[test]
    fn test_depth_tracking() {
        let recorder = recorder_on(9);
        let mut buffer = recorder.lock();
        assert!(buffer.check_balanced().is_ok());

        buffer.enter_function();
        buffer.enter_function();
        buffer.exit_function();
        assert_eq!(
            buffer.check_balanced(),
            Err(UsageError::UnbalancedFunctions { thread: ThreadId(9), depth: 1 })
        );
        buffer.exit_function();
        buffer.exit_function();
        assert_eq!(buffer.function_depth(), 0);

        let first = buffer.open_loop();
        let second = buffer.open_loop();
        assert_ne!(first, second);
        assert_eq!(
            buffer.check_balanced(),
            Err(UsageError::UnbalancedLoops { thread: ThreadId(9), depth: 2 })
        );
        buffer.close_loop();
        buffer.close_loop();
        assert!(buffer.check_balanced().is_ok());
    }

    #[test]
    fn test_capture_flag() {
        let recorder = ThreadRecorder::default();
        assert!(!recorder.is_capturing());
        recorder.set_capturing(true);
        assert!(recorder.is_capturing());
    }

    #[test]
    fn test_thread_ids_differ_between_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, current_thread_id());
    }
}
