//! Loop tracing
//!
//! `for_loop_begin` hands out a per-thread [`LoopId`] that the matching end
//! and every iteration record carry. While capture is off the id is
//! `LoopId::default()` and nothing is recorded.

use tracecap_common::{ForLoopBeginEvent, ForLoopEndEvent, ForLoopIterBeginEvent, ForLoopIterEndEvent};

use super::arguments::Integral;
use super::record;
use crate::domain::LoopId;
use crate::engine::{CaptureState, RecorderBuffer, Resolution};

pub(crate) fn write_loop_begin(buffer: &mut RecorderBuffer, state: &CaptureState, resolution: Resolution) -> LoopId {
    let id = buffer.open_loop();
    let event = buffer.append::<ForLoopBeginEvent>(state);
    event.id = id.0;
    event.timestamp = resolution.now();
    id
}

pub(crate) fn write_loop_end(buffer: &mut RecorderBuffer, state: &CaptureState, id: LoopId, resolution: Resolution) {
    let event = buffer.append::<ForLoopEndEvent>(state);
    event.id = id.0;
    event.timestamp = resolution.now();
    buffer.close_loop();
}

pub(crate) fn write_iter_begin<T: Integral>(
    buffer: &mut RecorderBuffer,
    state: &CaptureState,
    id: LoopId,
    index: T,
    resolution: Resolution,
) {
    let event = buffer.append::<ForLoopIterBeginEvent>(state);
    event.size = T::SIZE;
    event.signed = u8::from(T::SIGNED);
    event.id = id.0;
    event.timestamp = resolution.now();
    event.index = index.to_raw();
}

pub(crate) fn write_iter_end(buffer: &mut RecorderBuffer, state: &CaptureState, id: LoopId, resolution: Resolution) {
    let event = buffer.append::<ForLoopIterEndEvent>(state);
    event.id = id.0;
    event.timestamp = resolution.now();
}

#[inline]
#[must_use]
pub fn for_loop_begin() -> LoopId {
    record(|buffer, state| write_loop_begin(buffer, state, Resolution::Low)).unwrap_or_default()
}

#[inline]
pub fn for_loop_end(id: LoopId) {
    record(|buffer, state| write_loop_end(buffer, state, id, Resolution::Low));
}

#[inline]
#[must_use]
pub fn hr_for_loop_begin() -> LoopId {
    record(|buffer, state| write_loop_begin(buffer, state, Resolution::High)).unwrap_or_default()
}

#[inline]
pub fn hr_for_loop_end(id: LoopId) {
    record(|buffer, state| write_loop_end(buffer, state, id, Resolution::High));
}

#[inline]
pub fn for_loop_iter_begin<T: Integral>(id: LoopId, index: T) {
    record(|buffer, state| write_iter_begin(buffer, state, id, index, Resolution::Low));
}

#[inline]
pub fn for_loop_iter_end(id: LoopId) {
    record(|buffer, state| write_iter_end(buffer, state, id, Resolution::Low));
}

#[inline]
pub fn hr_for_loop_iter_begin<T: Integral>(id: LoopId, index: T) {
    record(|buffer, state| write_iter_begin(buffer, state, id, index, Resolution::High));
}

#[inline]
pub fn hr_for_loop_iter_end(id: LoopId) {
    record(|buffer, state| write_iter_end(buffer, state, id, Resolution::High));
}

/// Ends the loop when dropped
#[must_use = "the loop ends as soon as the scope is dropped"]
pub struct ForLoopScope {
    id: LoopId,
    resolution: Resolution,
}

impl ForLoopScope {
    pub fn new(resolution: Resolution) -> Self {
        let id = record(|buffer, state| write_loop_begin(buffer, state, resolution)).unwrap_or_default();
        Self { id, resolution }
    }

    /// Id to pass to the iterations of this loop
    #[must_use]
    pub fn id(&self) -> LoopId {
        self.id
    }

    /// Open an iteration of this loop
    pub fn iteration<T: Integral>(&self, index: T) -> ForLoopIterScope {
        ForLoopIterScope::new(self.id, index, self.resolution)
    }
}

impl Drop for ForLoopScope {
    fn drop(&mut self) {
        let (id, resolution) = (self.id, self.resolution);
        record(|buffer, state| write_loop_end(buffer, state, id, resolution));
    }
}

/// Ends the iteration when dropped
#[must_use = "the iteration ends as soon as the scope is dropped"]
pub struct ForLoopIterScope {
    id: LoopId,
    resolution: Resolution,
}

impl ForLoopIterScope {
    pub fn new<T: Integral>(id: LoopId, index: T, resolution: Resolution) -> Self {
        record(|buffer, state| write_iter_begin(buffer, state, id, index, resolution));
        Self { id, resolution }
    }
}

impl Drop for ForLoopIterScope {
    fn drop(&mut self) {
        let (id, resolution) = (self.id, self.resolution);
        record(|buffer, state| write_iter_end(buffer, state, id, resolution));
    }
}

#[inline]
pub fn for_loop() -> ForLoopScope {
    ForLoopScope::new(Resolution::Low)
}

#[inline]
pub fn hr_for_loop() -> ForLoopScope {
    ForLoopScope::new(Resolution::High)
}

#[inline]
pub fn for_loop_iter<T: Integral>(id: LoopId, index: T) -> ForLoopIterScope {
    ForLoopIterScope::new(id, index, Resolution::Low)
}

#[inline]
pub fn hr_for_loop_iter<T: Integral>(id: LoopId, index: T) -> ForLoopIterScope {
    ForLoopIterScope::new(id, index, Resolution::High)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThreadId;
    use crate::engine::ThreadRecorder;

    #[test]
    fn test_loop_records_and_depth() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        {
            let mut buffer = recorder.lock();
            buffer.set_thread_id(ThreadId(2));

            let outer = write_loop_begin(&mut buffer, &state, Resolution::Low);
            let inner = write_loop_begin(&mut buffer, &state, Resolution::High);
            assert_ne!(outer, inner);
            assert_eq!(buffer.loop_depth(), 2);

            write_iter_begin(&mut buffer, &state, inner, 7u16, Resolution::High);
            write_iter_end(&mut buffer, &state, inner, Resolution::High);
            write_loop_end(&mut buffer, &state, inner, Resolution::High);
            write_loop_end(&mut buffer, &state, outer, Resolution::Low);
            assert!(buffer.check_balanced().is_ok());
            buffer.flush(&state);
        }

        let events = state.take_events();
        assert_eq!(events.len(), 7);
        let iter = events[3].read::<ForLoopIterBeginEvent>().unwrap();
        assert_eq!(iter.size, 2);
        assert_eq!(iter.id, events[2].read::<ForLoopBeginEvent>().unwrap().id);
        assert_eq!(u16::from_ne_bytes([iter.index[0], iter.index[1]]), 7);
        assert!(iter.timestamp.is_high_res());
    }

    #[test]
    fn test_signed_index_decodes_negative() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        {
            let mut buffer = recorder.lock();
            buffer.set_thread_id(ThreadId(3));
            let id = write_loop_begin(&mut buffer, &state, Resolution::Low);
            write_iter_begin(&mut buffer, &state, id, -1i32, Resolution::Low);
            write_iter_begin(&mut buffer, &state, id, u32::MAX, Resolution::Low);
            buffer.flush(&state);
        }

        let decoded = crate::trace_data::CaptureLog::new(state.take_events()).decode();
        let indices: Vec<_> = decoded
            .thread_records(ThreadId(3))
            .filter_map(|record| match record {
                crate::trace_data::Record::ForLoopIterBegin { index, .. } => Some(index.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(indices, ["-1", "4294967295"]);
    }

    #[test]
    fn test_disabled_loop_returns_default_id() {
        // The test thread's recorder is never registered, so capture is off.
        assert_eq!(for_loop_begin(), LoopId::default());
        let scope = hr_for_loop();
        assert_eq!(scope.id(), LoopId::default());
        let _iter = scope.iteration(3u8);
    }
}
