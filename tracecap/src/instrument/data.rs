//! Data blobs and callstacks
//!
//! A blob is one DataHeader (blob id + byte size) followed by untagged
//! DataSection records holding the bytes in `DATA_CHUNK_SIZE` chunks, the
//! last one zero padded. A callstack is a blob of frame addresses followed by
//! a Callstack record pointing at it.

use tracecap_common::{data_section_count, CallstackEvent, DataHeaderEvent, DataSectionEvent};

use super::record;
use crate::domain::BlobId;
use crate::engine::{CaptureState, RecorderBuffer};

pub(crate) fn write_blob(
    buffer: &mut RecorderBuffer,
    state: &CaptureState,
    size: usize,
    mut bytes: impl Iterator<Item = u8>,
) -> BlobId {
    let id = state.new_blob_id();
    let header = buffer.append::<DataHeaderEvent>(state);
    header.size = size as u64;
    header.id = id.0;

    for _ in 0..data_section_count(size as u64) {
        let section = buffer.append::<DataSectionEvent>(state);
        for (slot, byte) in section.bytes.iter_mut().zip(bytes.by_ref()) {
            *slot = byte;
        }
    }
    id
}

pub(crate) fn write_callstack(buffer: &mut RecorderBuffer, state: &CaptureState, frames: &[usize]) -> BlobId {
    let size = std::mem::size_of_val(frames);
    let id = write_blob(buffer, state, size, frames.iter().flat_map(|frame| frame.to_ne_bytes()));
    let event = buffer.append::<CallstackEvent>(state);
    event.data_id = id.0;
    event.num_entries = frames.len() as u64;
    id
}

/// Record `bytes` as a blob; `None` while capture is off
#[inline]
pub fn data(bytes: &[u8]) -> Option<BlobId> {
    record(|buffer, state| write_blob(buffer, state, bytes.len(), bytes.iter().copied()))
}

/// Record caller-supplied return addresses, innermost first
#[inline]
pub fn callstack(frames: &[usize]) -> Option<BlobId> {
    record(|buffer, state| write_callstack(buffer, state, frames))
}
