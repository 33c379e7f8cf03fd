//! Capture engine core
//!
//! - `timestamp`: low and high resolution clock readings
//! - `cpu`: invariant clock and sampling capability probing
//! - `recorder`: per-thread fixed-size recording buffer
//! - `state`: merged log, recorder registry and capture state machine

pub mod cpu;
pub mod recorder;
pub mod state;
pub mod timestamp;

// Re-export common types
pub use cpu::Abilities;
pub use recorder::{current_thread_id, RecorderBuffer, ThreadRecorder, RECORDER_CAPACITY};
pub use state::CaptureState;
pub use timestamp::{capture_high_res, capture_low_res, Resolution};
