//! # tracecap - In-Process Instrumentation Capture Engine
//!
//! tracecap records a trace of a host program's execution (function entry and
//! exit, loop iterations, thread lifetimes, frame boundaries, allocations and
//! typed arguments) into an in-memory log, with a single branch per call while
//! capture is off.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Instrumented Program                       │
//! │     function_begin / int_arg / for_loop_iter / mem_alloc ...    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ one append per call (if capturing)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              ThreadRecorder (one per OS thread)                 │
//! │  • 128 inline 32-byte record slots + cursor                     │
//! │  • function / loop depth counters, atomic capture flag          │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ flush: buffer full, thread end, capture off
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    CaptureState (process-wide)                  │
//! │  • merged log: [ThreadBounds T, n] + n records, ...             │
//! │  • recorder registry, capture state machine, blob id counter    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ take_captures / write_captures
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        CaptureLog ──decode──▶ Records + blobs ──▶ dump          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`engine`]: timestamp sources, CPU ability probing, the per-thread
//!   recorder and the process-wide capture state
//! - [`instrument`]: the public recording calls, their scope guards and the
//!   capture lifecycle (`init`, `want_capturing`, `frame`, `deinit`)
//! - [`trace_data`]: drained capture log, segment walking and decoding
//! - [`export`]: human-readable dump of a capture
//! - [`domain`]: identifier newtypes and error types
//! - [`cli`]: arguments of the `tracecap` reference binary
//!
//! The record layouts themselves live in the `tracecap-common` crate.
//!
//! ## Typical Usage
//!
//! ```no_run
//! tracecap::init();
//! tracecap::want_capturing(true, true);
//!
//! {
//!     let _scope = tracecap::function_scope!();
//!     tracecap::int_arg(0, 10);
//! }
//! tracecap::frame();
//!
//! tracecap::want_capturing(false, true);
//! let log = tracecap::take_captures().decode();
//! assert_eq!(log.count(tracecap::EventType::Frame), 1);
//! tracecap::deinit();
//! ```
//!
//! ## Key Concepts
//!
//! - **Capture flag**: per-thread atomic mirror of "initialized and
//!   capturing"; the only thing checked while capture is off
//! - **Flush**: copying a recorder's records into the merged log behind a
//!   ThreadBounds header
//! - **Frame**: main-thread marker of one main loop iteration, where deferred
//!   capture toggles take effect
//! - **Usage errors**: unbalanced scopes at a thread end or frame, or a frame
//!   off the main thread; these panic
//! - **Blob**: arbitrary bytes stored as a DataHeader plus 32-byte sections

pub mod cli;
pub mod domain;
pub mod engine;
pub mod export;
pub mod instrument;
pub mod trace_data;

pub use domain::{BlobId, DumpError, LoopId, ThreadId, UsageError};
pub use engine::{current_thread_id, Abilities, Resolution};
pub use instrument::*;
pub use trace_data::{CaptureLog, DecodedLog, FloatValue, IntValue, Record};
pub use tracecap_common::{EventTimestamp, EventType, TimestampSource};
