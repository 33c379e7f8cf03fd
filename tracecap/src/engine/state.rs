//! Process-wide capture state
//!
//! [`CaptureState`] owns the merged event log, the registry of live
//! recorders and the capture state machine:
//!
//! ```text
//! Uninitialized ──init──▶ Initialized(idle) ⇄ Initialized(capturing) ──deinit──▶ Uninitialized
//! ```
//!
//! Transitions into or out of "capturing" happen either instantly
//! ([`CaptureState::want_capturing`] with `instant`) or at the next frame
//! boundary ([`CaptureState::sync_capture_at_frame`]).
//!
//! ## Locks
//!
//! Two independent locks: one for the merged log (held for one bulk copy per
//! flush), one for the registry (held for insert, erase and broadcast). When
//! both are needed the order is registry → recorder buffer → log.

use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracecap_common::{Event, ThreadBoundsEvent};

use super::cpu::{self, Abilities};
use super::recorder::ThreadRecorder;
use crate::domain::{BlobId, ThreadId};

pub struct CaptureState {
    initialized: AtomicBool,
    capturing: AtomicBool,
    capture_requested: AtomicBool,
    abilities: AtomicU32,
    invariant_clock_frequency: AtomicU64,
    main_thread_id: AtomicU64,
    current_frame: AtomicU64,
    /// Never reset, so blob ids stay unique for the life of the process
    next_blob_id: AtomicU64,
    events: Mutex<Vec<Event>>,
    threads: Mutex<Vec<Arc<ThreadRecorder>>>,
}

impl CaptureState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
            capture_requested: AtomicBool::new(false),
            abilities: AtomicU32::new(0),
            invariant_clock_frequency: AtomicU64::new(0),
            main_thread_id: AtomicU64::new(0),
            current_frame: AtomicU64::new(0),
            next_blob_id: AtomicU64::new(0),
            events: parking_lot::const_mutex(Vec::new()),
            threads: parking_lot::const_mutex(Vec::new()),
        }
    }

    /// Reset every field, probe the CPU and register `main` as the main thread
    ///
    /// Recorders registered by a previous session are dropped from the
    /// registry with their capture flag cleared.
    pub fn init(&self, main: &Arc<ThreadRecorder>, main_id: ThreadId) {
        self.initialized.store(false, Ordering::Relaxed);
        self.capturing.store(false, Ordering::Relaxed);
        self.capture_requested.store(false, Ordering::Relaxed);
        self.current_frame.store(0, Ordering::Relaxed);
        self.events.lock().clear();

        let abilities = cpu::detect_abilities();
        let frequency = if abilities.contains(Abilities::INVARIANT_CPU_CLOCK) {
            cpu::invariant_clock_frequency().unwrap_or_else(|err| {
                debug!("Invariant clock frequency unavailable: {err:#}");
                0
            })
        } else {
            warn!("No invariant CPU clock detected, high resolution timestamps are best effort");
            0
        };
        self.abilities.store(abilities.bits(), Ordering::Relaxed);
        self.invariant_clock_frequency.store(frequency, Ordering::Relaxed);

        main.lock().set_thread_id(main_id);
        {
            let mut threads = self.threads.lock();
            for recorder in threads.iter() {
                recorder.set_capturing(false);
            }
            threads.clear();
            threads.push(Arc::clone(main));
        }
        main.set_capturing(false);
        self.main_thread_id.store(main_id.0, Ordering::Relaxed);
        self.initialized.store(true, Ordering::Release);

        info!("Capture initialized: main thread {main_id}, abilities {abilities}, clock {frequency} Hz");
    }

    /// Stop capturing, drain every registered recorder and mark the state uninitialized
    ///
    /// Recorders stay registered; only their buffered content is drained.
    pub fn deinit(&self) {
        self.initialized.store(false, Ordering::Release);
        self.capturing.store(false, Ordering::Relaxed);
        self.broadcast(false);
        info!("Capture deinitialized: {} events in log", self.event_count());
    }

    /// Register a recorder and snapshot the current capture permission into it
    pub fn add_thread(&self, recorder: &Arc<ThreadRecorder>) {
        let mut threads = self.threads.lock();
        if !threads.iter().any(|known| Arc::ptr_eq(known, recorder)) {
            threads.push(Arc::clone(recorder));
        }
        if self.capture_allowed() {
            recorder.resume_capturing();
        } else {
            recorder.set_capturing(false);
        }
        debug!("Registered recorder ({} live)", threads.len());
    }

    pub fn remove_thread(&self, recorder: &Arc<ThreadRecorder>) {
        let mut threads = self.threads.lock();
        threads.retain(|known| !Arc::ptr_eq(known, recorder));
        debug!("Unregistered recorder ({} live)", threads.len());
    }

    /// Append a ThreadBounds header and `events` to the merged log
    ///
    /// The only way records enter the log. Called by the owning thread's
    /// flush, or by a forced flush holding that recorder's buffer lock.
    pub fn push_events(&self, events: &[Event], thread: ThreadId) {
        let mut header = Event::EMPTY;
        let bounds = header.write::<ThreadBoundsEvent>();
        bounds.thread_id = thread.0;
        bounds.length = events.len() as u64;

        {
            let mut log = self.events.lock();
            log.reserve(events.len() + 1);
            log.push(header);
            log.extend_from_slice(events);
        }
        trace!("Flushed {} events from {thread}", events.len());
    }

    /// Request capture on or off
    ///
    /// With `instant`, the change is applied to every registered recorder
    /// right away (and turning capture off drains them); otherwise it takes
    /// effect at the next frame boundary.
    pub fn want_capturing(&self, enable: bool, instant: bool) {
        self.capture_requested.store(enable, Ordering::Relaxed);
        if instant {
            self.capturing.store(enable, Ordering::Relaxed);
            let allowed = self.capture_allowed();
            self.broadcast(allowed);
            debug!("Capture switched {} instantly", if allowed { "on" } else { "off" });
        } else {
            debug!("Capture {} requested for next frame", if enable { "on" } else { "off" });
        }
    }

    /// Apply a pending capture request; returns whether the state changed
    pub fn sync_capture_at_frame(&self) -> bool {
        let requested = self.capture_requested.load(Ordering::Relaxed);
        if self.capturing.swap(requested, Ordering::Relaxed) == requested {
            return false;
        }
        self.broadcast(self.capture_allowed());
        debug!("Capture switched {} at frame boundary", if requested { "on" } else { "off" });
        true
    }

    /// Set every registered recorder's flag; when turning off, drain them too
    ///
    /// All flags are cleared before any buffer is drained, so a recorder that
    /// takes its lock after its drain sees the flag off and appends nothing.
    fn broadcast(&self, capture: bool) {
        let threads = self.threads.lock();
        if capture {
            for recorder in threads.iter() {
                recorder.resume_capturing();
            }
        } else {
            for recorder in threads.iter() {
                recorder.set_capturing(false);
            }
            for recorder in threads.iter() {
                recorder.lock().flush(self);
            }
            debug!("Force-flushed {} recorders", threads.len());
        }
    }

    /// Allocate the next blob id (strictly increasing, shared by all threads)
    pub fn new_blob_id(&self) -> BlobId {
        BlobId(self.next_blob_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next frame number
    pub fn next_frame(&self) -> u64 {
        self.current_frame.fetch_add(1, Ordering::Relaxed)
    }

    /// Move the merged log out, leaving it empty
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    #[must_use]
    pub fn capture_allowed(&self) -> bool {
        self.is_initialized() && self.is_capturing()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capture_requested(&self) -> bool {
        self.capture_requested.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn abilities(&self) -> Abilities {
        Abilities::from_bits(self.abilities.load(Ordering::Relaxed))
    }

    /// Cycle counter frequency in Hz, 0 when unknown
    #[must_use]
    pub fn invariant_clock_frequency(&self) -> u64 {
        self.invariant_clock_frequency.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn main_thread_id(&self) -> ThreadId {
        ThreadId(self.main_thread_id.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn is_main_thread(&self, thread: ThreadId) -> bool {
        self.main_thread_id() == thread
    }

    /// Frame number the next frame record will carry
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        self.current_frame.load(Ordering::Relaxed)
    }

    /// Records in the merged log, ThreadBounds headers included
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn registered_threads(&self) -> usize {
        self.threads.lock().len()
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracecap_common::FunctionEndEvent;

    fn initialized_state() -> (CaptureState, Arc<ThreadRecorder>) {
        let state = CaptureState::new();
        let main = Arc::new(ThreadRecorder::new());
        state.init(&main, ThreadId(1));
        (state, main)
    }

    #[test]
    fn test_init_registers_main_thread() {
        let (state, main) = initialized_state();
        assert!(state.is_initialized());
        assert!(!state.is_capturing());
        assert_eq!(state.main_thread_id(), ThreadId(1));
        assert!(state.is_main_thread(ThreadId(1)));
        assert_eq!(state.registered_threads(), 1);
        assert!(!main.is_capturing());
    }

    #[test]
    fn test_instant_capture_broadcasts() {
        let (state, main) = initialized_state();
        let worker = Arc::new(ThreadRecorder::new());
        state.add_thread(&worker);
        assert!(!worker.is_capturing());

        state.want_capturing(true, true);
        assert!(state.is_capturing());
        assert!(main.is_capturing());
        assert!(worker.is_capturing());

        state.want_capturing(false, true);
        assert!(!main.is_capturing());
        assert!(!worker.is_capturing());
    }

    #[test]
    fn test_capture_on_resets_stale_depths() {
        let (state, main) = initialized_state();
        let worker = Arc::new(ThreadRecorder::new());
        state.add_thread(&worker);

        state.want_capturing(true, true);
        main.lock().enter_function();
        let _id = worker.lock().open_loop();
        state.want_capturing(false, true);

        // Deferred turn-on through a frame boundary.
        state.want_capturing(true, false);
        assert!(state.sync_capture_at_frame());
        assert!(main.lock().check_balanced().is_ok());
        assert!(worker.lock().check_balanced().is_ok());
    }

    #[test]
    fn test_instant_capture_off_drains_recorders() {
        let (state, main) = initialized_state();
        state.want_capturing(true, true);
        main.lock().append::<FunctionEndEvent>(&state);
        assert_eq!(state.event_count(), 0);

        state.want_capturing(false, true);
        assert!(main.lock().is_empty());
        assert_eq!(state.event_count(), 2);
    }

    #[test]
    fn test_deferred_capture_waits_for_frame() {
        let (state, main) = initialized_state();
        state.want_capturing(true, false);
        assert!(state.capture_requested());
        assert!(!state.is_capturing());
        assert!(!main.is_capturing());

        assert!(state.sync_capture_at_frame());
        assert!(state.is_capturing());
        assert!(main.is_capturing());
        assert!(!state.sync_capture_at_frame());
    }

    #[test]
    fn test_add_thread_snapshots_capture_flag() {
        let (state, _main) = initialized_state();
        state.want_capturing(true, true);

        let worker = Arc::new(ThreadRecorder::new());
        state.add_thread(&worker);
        state.add_thread(&worker);
        assert!(worker.is_capturing());
        assert_eq!(state.registered_threads(), 2);

        state.remove_thread(&worker);
        assert_eq!(state.registered_threads(), 1);
    }

    #[test]
    fn test_capture_flag_requires_initialization() {
        let state = CaptureState::new();
        let worker = Arc::new(ThreadRecorder::new());
        state.want_capturing(true, true);
        state.add_thread(&worker);
        assert!(!worker.is_capturing());
    }

    #[test]
    fn test_deinit_drains_and_disables() {
        let (state, main) = initialized_state();
        state.want_capturing(true, true);
        main.lock().append::<FunctionEndEvent>(&state);

        state.deinit();
        assert!(!state.is_initialized());
        assert!(!main.is_capturing());
        assert_eq!(state.event_count(), 2);
        assert_eq!(state.registered_threads(), 1);
    }

    #[test]
    fn test_blob_ids_are_unique_across_threads() {
        let state = Arc::new(CaptureState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    (0..500).map(|_| state.new_blob_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Issuance order on one thread is strictly increasing.
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            all.extend(ids);
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 8 * 500);
    }

    #[test]
    fn test_reinit_keeps_blob_counter() {
        let (state, main) = initialized_state();
        let before = state.new_blob_id();
        state.deinit();
        state.init(&main, ThreadId(1));
        assert!(state.new_blob_id() > before);
    }
}
