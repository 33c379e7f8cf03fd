//! Console dump of a drained capture
//!
//! Line shapes, one per record:
//!
//! ```text
//! Thread Bounds TID:4242, length: 3
//! Function Begin 0x55d1c0a0, time: 1200, type: LR
//!     Argument 0 = 10
//! Function End, time: 1350, type: LR
//! Data Blob#0, size: 40
//!     Section Blob#0 00112233...
//! ```

use std::io::Write;

use crate::domain::DumpError;
use crate::trace_data::{CaptureLog, Record};

/// Write `log` to `writer`; returns the number of lines written
///
/// # Errors
/// Returns [`DumpError::Io`] if the writer fails.
pub fn write_dump<W: Write>(log: &CaptureLog, writer: &mut W) -> Result<usize, DumpError> {
    let decoded = log.decode();
    let mut lines = 0;
    for segment in &decoded.segments {
        writeln!(writer, "Thread Bounds {}, length: {}", segment.thread, segment.records.len())?;
        lines += 1;
        for record in &segment.records {
            write_record(writer, record)?;
            lines += 1;
        }
    }
    writer.flush()?;
    Ok(lines)
}

/// Write one record as a single line
///
/// # Errors
/// Returns [`DumpError::Io`] if the writer fails.
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<(), DumpError> {
    match record {
        Record::ThreadBegin { timestamp } => writeln!(writer, "Thread Begin, {timestamp}")?,
        Record::ThreadEnd { timestamp } => writeln!(writer, "Thread End, {timestamp}")?,
        Record::Frame { number, timestamp } => writeln!(writer, "Frame {number}, {timestamp}")?,
        Record::FunctionBegin { function, timestamp } => {
            writeln!(writer, "Function Begin {function:#x}, {timestamp}")?;
        }
        Record::FunctionEnd { timestamp } => writeln!(writer, "Function End, {timestamp}")?,
        Record::Callstack { blob, entries } => writeln!(writer, "Callstack {blob}, entries: {entries}")?,
        Record::BoolArgument { offset, value } => writeln!(writer, "    Argument {offset} = {value}")?,
        Record::IntArgument { offset, value } => writeln!(writer, "    Argument {offset} = {value}")?,
        Record::FloatArgument { offset, value } => writeln!(writer, "    Argument {offset} = {value}")?,
        Record::FlagsArgument { offset, flags_type, bits, .. } => {
            writeln!(writer, "    Argument {offset} = {bits:#x} (flags {flags_type:#018x})")?;
        }
        Record::PtrArgument { offset, address } => writeln!(writer, "    Argument {offset} = {address:#x}")?,
        Record::ForLoopBegin { id, timestamp } => writeln!(writer, "For Loop Begin, id: {}, {timestamp}", id.0)?,
        Record::ForLoopEnd { id, timestamp } => writeln!(writer, "For Loop End, id: {}, {timestamp}", id.0)?,
        Record::ForLoopIterBegin { id, index, timestamp } => {
            writeln!(writer, "For Loop Iter Begin {index}, id: {}, {timestamp}", id.0)?;
        }
        Record::ForLoopIterEnd { id, timestamp } => {
            writeln!(writer, "For Loop Iter End, id: {}, {timestamp}", id.0)?;
        }
        Record::MemAlloc { address, size, timestamp } => {
            writeln!(writer, "Mem Alloc {address:#x}, size: {size}, {timestamp}")?;
        }
        Record::MemFree { address, timestamp } => writeln!(writer, "Mem Free {address:#x}, {timestamp}")?,
        Record::DataHeader { blob, size } => writeln!(writer, "Data {blob}, size: {size}")?,
        Record::DataSection { blob, bytes } => {
            write!(writer, "    Section {blob} ")?;
            for byte in bytes {
                write!(writer, "{byte:02x}")?;
            }
            writeln!(writer)?;
        }
        Record::Unknown { tag } => writeln!(writer, "Unknown event {tag}")?,
    }
    Ok(())
}
