//! Drained capture data
//!
//! [`CaptureLog`] owns the raw records taken out of the merged log. It can be
//! walked segment by segment (each ThreadBounds header and the records it
//! frames) or decoded into owned [`Record`]s with data blobs reassembled.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracecap_common::{
    data_section_count, BoolArgumentEvent, CallstackEvent, DataHeaderEvent, DataSectionEvent, Event, EventTimestamp,
    EventType, FlagsArgumentEvent, FloatArgumentEvent, ForLoopBeginEvent, ForLoopEndEvent, ForLoopIterBeginEvent,
    ForLoopIterEndEvent, FrameEvent, FunctionBeginEvent, FunctionEndEvent, IntArgumentEvent, MemAllocEvent,
    MemFreeEvent, PtrArgumentEvent, ThreadBeginEvent, ThreadBoundsEvent, ThreadEndEvent, DATA_CHUNK_SIZE,
    MAX_INDEX_SIZE,
};

use crate::domain::{BlobId, LoopId, ThreadId};

/// Records drained from the merged log, in log order
#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    events: Vec<Event>,
}

/// One ThreadBounds header and the records it frames
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub thread: ThreadId,
    pub events: &'a [Event],
}

impl CaptureLog {
    #[must_use]
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Raw records, ThreadBounds headers included
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Walk the log segment by segment
    ///
    /// Stops at the first slot that is not a ThreadBounds header where one is
    /// expected; a header claiming more records than remain is clamped.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        let mut rest = self.events.as_slice();
        std::iter::from_fn(move || {
            let (header, tail) = rest.split_first()?;
            let bounds = header.read::<ThreadBoundsEvent>()?;
            let length = usize::try_from(bounds.length).unwrap_or(usize::MAX).min(tail.len());
            let (events, next) = tail.split_at(length);
            rest = next;
            Some(Segment { thread: ThreadId(bounds.thread_id), events })
        })
    }

    /// Decode every record and reassemble data blobs
    #[must_use]
    pub fn decode(&self) -> DecodedLog {
        let mut decoder = Decoder::default();
        let segments = self
            .segments()
            .map(|segment| DecodedSegment {
                thread: segment.thread,
                records: segment.events.iter().map(|event| decoder.decode(segment.thread, event)).collect(),
            })
            .collect();
        DecodedLog { segments, blobs: decoder.finish() }
    }
}

/// A decoded integer argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntValue {
    pub signed: bool,
    /// Byte width of the original type
    pub size: u8,
    /// Display base requested by the caller
    pub base: u8,
    raw: [u8; MAX_INDEX_SIZE],
}

impl IntValue {
    #[must_use]
    pub fn from_raw(raw: [u8; MAX_INDEX_SIZE], size: u8, signed: bool, base: u8) -> Self {
        Self { signed, size: size.min(16), base, raw }
    }

    /// The value zero-extended to 128 bits
    #[must_use]
    pub fn as_u128(&self) -> u128 {
        let width = usize::from(self.size);
        let mut bytes = [0u8; MAX_INDEX_SIZE];
        if cfg!(target_endian = "little") {
            bytes[..width].copy_from_slice(&self.raw[..width]);
        } else {
            bytes[MAX_INDEX_SIZE - width..].copy_from_slice(&self.raw[..width]);
        }
        u128::from_ne_bytes(bytes)
    }

    /// The value sign-extended to 128 bits
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn as_i128(&self) -> i128 {
        if self.size == 0 {
            return 0;
        }
        let shift = 128 - u32::from(self.size) * 8;
        ((self.as_u128() << shift) as i128) >> shift
    }
}

impl fmt::Display for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed && self.base == 10 {
            return write!(f, "{}", self.as_i128());
        }
        let value = self.as_u128();
        match self.base {
            2 => write!(f, "0b{value:b}"),
            8 => write!(f, "0o{value:o}"),
            16 => write!(f, "0x{value:x}"),
            _ => write!(f, "{value}"),
        }
    }
}

/// A decoded float argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatValue {
    F32(f32),
    F64(f64),
    /// Size tag other than 4 or 8
    Unknown(u8),
}

impl fmt::Display for FloatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatValue::F32(value) => write!(f, "{value}"),
            FloatValue::F64(value) => write!(f, "{value}"),
            FloatValue::Unknown(size) => write!(f, "<{size}-byte float>"),
        }
    }
}

/// One decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    ThreadBegin { timestamp: EventTimestamp },
    ThreadEnd { timestamp: EventTimestamp },
    Frame { number: u64, timestamp: EventTimestamp },
    FunctionBegin { function: u64, timestamp: EventTimestamp },
    FunctionEnd { timestamp: EventTimestamp },
    Callstack { blob: BlobId, entries: u64 },
    BoolArgument { offset: u8, value: bool },
    IntArgument { offset: u8, value: IntValue },
    FloatArgument { offset: u8, value: FloatValue },
    FlagsArgument { offset: u8, flags_type: u64, size: u8, bits: u128 },
    PtrArgument { offset: u8, address: u64 },
    ForLoopBegin { id: LoopId, timestamp: EventTimestamp },
    ForLoopEnd { id: LoopId, timestamp: EventTimestamp },
    ForLoopIterBegin { id: LoopId, index: IntValue, timestamp: EventTimestamp },
    ForLoopIterEnd { id: LoopId, timestamp: EventTimestamp },
    MemAlloc { address: u64, size: u64, timestamp: EventTimestamp },
    MemFree { address: u64, timestamp: EventTimestamp },
    DataHeader { blob: BlobId, size: u64 },
    /// Continuation bytes of a blob, padding stripped
    DataSection { blob: BlobId, bytes: Vec<u8> },
    /// A tag this build does not know (or a ThreadBounds inside a segment)
    Unknown { tag: u8 },
}

impl Record {
    /// Tag of the record, `None` for data sections
    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        Some(match self {
            Record::ThreadBegin { .. } => EventType::ThreadBegin,
            Record::ThreadEnd { .. } => EventType::ThreadEnd,
            Record::Frame { .. } => EventType::Frame,
            Record::FunctionBegin { .. } => EventType::FunctionBegin,
            Record::FunctionEnd { .. } => EventType::FunctionEnd,
            Record::Callstack { .. } => EventType::Callstack,
            Record::BoolArgument { .. } => EventType::BoolArgument,
            Record::IntArgument { .. } => EventType::IntArgument,
            Record::FloatArgument { .. } => EventType::FloatArgument,
            Record::FlagsArgument { .. } => EventType::FlagsArgument,
            Record::PtrArgument { .. } => EventType::PtrArgument,
            Record::ForLoopBegin { .. } => EventType::ForLoopBegin,
            Record::ForLoopEnd { .. } => EventType::ForLoopEnd,
            Record::ForLoopIterBegin { .. } => EventType::ForLoopIterBegin,
            Record::ForLoopIterEnd { .. } => EventType::ForLoopIterEnd,
            Record::MemAlloc { .. } => EventType::MemAlloc,
            Record::MemFree { .. } => EventType::MemFree,
            Record::DataHeader { .. } => EventType::DataHeader,
            Record::DataSection { .. } => return None,
            Record::Unknown { tag } => return EventType::from_tag(*tag),
        })
    }
}

/// Decoded records of one segment
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    pub thread: ThreadId,
    pub records: Vec<Record>,
}

/// A fully decoded capture
#[derive(Debug, Clone, Default)]
pub struct DecodedLog {
    pub segments: Vec<DecodedSegment>,
    /// Reassembled blobs; a blob whose sections were cut off is kept truncated
    pub blobs: BTreeMap<BlobId, Vec<u8>>,
}

impl DecodedLog {
    /// Every record with the thread it belongs to, in log order
    pub fn records(&self) -> impl Iterator<Item = (ThreadId, &Record)> {
        self.segments
            .iter()
            .flat_map(|segment| segment.records.iter().map(move |record| (segment.thread, record)))
    }

    /// Records of one thread, in the order that thread recorded them
    pub fn thread_records(&self, thread: ThreadId) -> impl Iterator<Item = &Record> {
        self.records().filter(move |(owner, _)| *owner == thread).map(|(_, record)| record)
    }

    #[must_use]
    pub fn count(&self, kind: EventType) -> usize {
        self.records().filter(|(_, record)| record.event_type() == Some(kind)).count()
    }

    #[must_use]
    pub fn blob(&self, id: BlobId) -> Option<&[u8]> {
        self.blobs.get(&id).map(Vec::as_slice)
    }
}

/// A blob whose sections are still arriving
struct PendingBlob {
    id: BlobId,
    remaining_bytes: u64,
    remaining_sections: u64,
    bytes: Vec<u8>,
}

/// Carries per-thread blob reassembly across segments
#[derive(Default)]
struct Decoder {
    pending: HashMap<ThreadId, PendingBlob>,
    blobs: BTreeMap<BlobId, Vec<u8>>,
}

impl Decoder {
    /// Blobs cut off by the end of the capture are kept with what arrived
    fn finish(mut self) -> BTreeMap<BlobId, Vec<u8>> {
        for (_, pending) in self.pending.drain() {
            self.blobs.insert(pending.id, pending.bytes);
        }
        self.blobs
    }

    fn decode(&mut self, thread: ThreadId, event: &Event) -> Record {
        // Sections are untagged: while a blob is open every slot belongs to it.
        if self.pending.contains_key(&thread) {
            return self.decode_section(thread, event);
        }
        let record = decode_tagged(event).unwrap_or(Record::Unknown { tag: event.tag() });
        if let Record::DataHeader { blob, size } = &record {
            self.open_blob(thread, *blob, *size);
        }
        record
    }

    fn open_blob(&mut self, thread: ThreadId, id: BlobId, size: u64) {
        let sections = data_section_count(size);
        if sections == 0 {
            self.blobs.insert(id, Vec::new());
            return;
        }
        let capacity = usize::try_from(size).unwrap_or(0);
        self.pending.insert(
            thread,
            PendingBlob { id, remaining_bytes: size, remaining_sections: sections, bytes: Vec::with_capacity(capacity) },
        );
    }

    fn decode_section(&mut self, thread: ThreadId, event: &Event) -> Record {
        let Some(pending) = self.pending.get_mut(&thread) else {
            return Record::Unknown { tag: event.tag() };
        };
        let bytes = event.read::<DataSectionEvent>().map_or(&[][..], |section| &section.bytes[..]);
        let take = usize::try_from(pending.remaining_bytes).map_or(DATA_CHUNK_SIZE, |left| left.min(DATA_CHUNK_SIZE));
        let chunk = bytes[..take].to_vec();
        pending.bytes.extend_from_slice(&chunk);
        pending.remaining_bytes -= take as u64;
        pending.remaining_sections -= 1;

        let id = pending.id;
        if pending.remaining_sections == 0 {
            if let Some(done) = self.pending.remove(&thread) {
                self.blobs.insert(done.id, done.bytes);
            }
        }
        Record::DataSection { blob: id, bytes: chunk }
    }
}

fn decode_tagged(event: &Event) -> Option<Record> {
    let record = match event.kind()? {
        EventType::ThreadBegin => Record::ThreadBegin { timestamp: event.read::<ThreadBeginEvent>()?.timestamp },
        EventType::ThreadEnd => Record::ThreadEnd { timestamp: event.read::<ThreadEndEvent>()?.timestamp },
        EventType::Frame => {
            let frame = event.read::<FrameEvent>()?;
            Record::Frame { number: frame.frame_num, timestamp: frame.timestamp }
        }
        EventType::FunctionBegin => {
            let begin = event.read::<FunctionBeginEvent>()?;
            Record::FunctionBegin { function: begin.function, timestamp: begin.timestamp }
        }
        EventType::FunctionEnd => Record::FunctionEnd { timestamp: event.read::<FunctionEndEvent>()?.timestamp },
        EventType::Callstack => {
            let stack = event.read::<CallstackEvent>()?;
            Record::Callstack { blob: BlobId(stack.data_id), entries: stack.num_entries }
        }
        EventType::BoolArgument => {
            let arg = event.read::<BoolArgumentEvent>()?;
            Record::BoolArgument { offset: arg.offset, value: arg.value != 0 }
        }
        EventType::IntArgument => {
            let arg = event.read::<IntArgumentEvent>()?;
            Record::IntArgument {
                offset: arg.offset,
                value: IntValue::from_raw(arg.data, arg.size, arg.signed != 0, arg.base),
            }
        }
        EventType::FloatArgument => {
            let arg = event.read::<FloatArgumentEvent>()?;
            let value = match arg.size {
                4 => FloatValue::F32(f32::from_ne_bytes([arg.data[0], arg.data[1], arg.data[2], arg.data[3]])),
                8 => FloatValue::F64(f64::from_ne_bytes(arg.data)),
                size => FloatValue::Unknown(size),
            };
            Record::FloatArgument { offset: arg.offset, value }
        }
        EventType::FlagsArgument => {
            let arg = event.read::<FlagsArgumentEvent>()?;
            Record::FlagsArgument {
                offset: arg.offset,
                flags_type: arg.flags_type,
                size: arg.size,
                bits: u128::from_ne_bytes(arg.bits),
            }
        }
        EventType::PtrArgument => {
            let arg = event.read::<PtrArgumentEvent>()?;
            Record::PtrArgument { offset: arg.offset, address: arg.address }
        }
        EventType::ForLoopBegin => {
            let begin = event.read::<ForLoopBeginEvent>()?;
            Record::ForLoopBegin { id: LoopId(begin.id), timestamp: begin.timestamp }
        }
        EventType::ForLoopEnd => {
            let end = event.read::<ForLoopEndEvent>()?;
            Record::ForLoopEnd { id: LoopId(end.id), timestamp: end.timestamp }
        }
        EventType::ForLoopIterBegin => {
            let iter = event.read::<ForLoopIterBeginEvent>()?;
            Record::ForLoopIterBegin {
                id: LoopId(iter.id),
                index: IntValue::from_raw(iter.index, iter.size, iter.signed != 0, 10),
                timestamp: iter.timestamp,
            }
        }
        EventType::ForLoopIterEnd => {
            let end = event.read::<ForLoopIterEndEvent>()?;
            Record::ForLoopIterEnd { id: LoopId(end.id), timestamp: end.timestamp }
        }
        EventType::MemAlloc => {
            let alloc = event.read::<MemAllocEvent>()?;
            Record::MemAlloc { address: alloc.address, size: alloc.size, timestamp: alloc.timestamp }
        }
        EventType::MemFree => {
            let free = event.read::<MemFreeEvent>()?;
            Record::MemFree { address: free.address, timestamp: free.timestamp }
        }
        EventType::DataHeader => {
            let header = event.read::<DataHeaderEvent>()?;
            Record::DataHeader { blob: BlobId(header.id), size: header.size }
        }
        EventType::Unknown | EventType::ThreadBounds => return None,
    };
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Integral;
    use tracecap_common::TimestampSource;

    fn segment(thread: u64, records: &[Event]) -> Vec<Event> {
        let mut header = Event::EMPTY;
        let bounds = header.write::<ThreadBoundsEvent>();
        bounds.thread_id = thread;
        bounds.length = records.len() as u64;
        let mut out = vec![header];
        out.extend_from_slice(records);
        out
    }

    fn function_end(time: u64) -> Event {
        let mut event = Event::EMPTY;
        event.write::<FunctionEndEvent>().timestamp = EventTimestamp::new(time, TimestampSource::WallClock);
        event
    }

    fn data_header(id: u64, size: u64) -> Event {
        let mut event = Event::EMPTY;
        let header = event.write::<DataHeaderEvent>();
        header.id = id;
        header.size = size;
        event
    }

    fn data_section(fill: u8) -> Event {
        let mut event = Event::EMPTY;
        // A section whose first byte looks like a FunctionEnd tag.
        event.write::<DataSectionEvent>().bytes = [fill; DATA_CHUNK_SIZE];
        event
    }

    #[test]
    fn test_segments_follow_thread_bounds() {
        let mut events = segment(1, &[function_end(1), function_end(2)]);
        events.extend(segment(2, &[function_end(3)]));
        let log = CaptureLog::new(events);

        let segments: Vec<_> = log.segments().collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].thread, ThreadId(1));
        assert_eq!(segments[0].events.len(), 2);
        assert_eq!(segments[1].thread, ThreadId(2));
        assert_eq!(segments[1].events.len(), 1);
    }

    #[test]
    fn test_segments_stop_at_garbage() {
        let mut events = segment(1, &[function_end(1)]);
        events.push(function_end(2));
        let log = CaptureLog::new(events);
        assert_eq!(log.segments().count(), 1);
    }

    #[test]
    fn test_truncated_segment_is_clamped() {
        let mut events = segment(1, &[function_end(1), function_end(2)]);
        events.pop();
        let log = CaptureLog::new(events);
        let segments: Vec<_> = log.segments().collect();
        assert_eq!(segments[0].events.len(), 1);
    }

    #[test]
    fn test_blob_reassembled_across_segments() {
        let tag = EventType::FunctionEnd.tag();
        let mut events = segment(7, &[data_header(3, 40), data_section(tag)]);
        events.extend(segment(8, &[function_end(5)]));
        events.extend(segment(7, &[data_section(0xab), function_end(6)]));
        let decoded = CaptureLog::new(events).decode();

        let blob = decoded.blob(BlobId(3)).unwrap();
        assert_eq!(blob.len(), 40);
        assert!(blob[..32].iter().all(|&b| b == tag));
        assert!(blob[32..].iter().all(|&b| b == 0xab));

        let thread7: Vec<_> = decoded.thread_records(ThreadId(7)).collect();
        assert_eq!(thread7.len(), 4);
        assert!(matches!(thread7[1], Record::DataSection { bytes, .. } if bytes.len() == 32));
        assert!(matches!(thread7[2], Record::DataSection { bytes, .. } if bytes.len() == 8));
        assert_eq!(thread7[3].event_type(), Some(EventType::FunctionEnd));
        assert_eq!(decoded.count(EventType::FunctionEnd), 2);
    }

    #[test]
    fn test_cut_off_blob_is_kept() {
        let events = segment(1, &[data_header(9, 100), data_section(1)]);
        let decoded = CaptureLog::new(events).decode();
        assert_eq!(decoded.blob(BlobId(9)).map(<[u8]>::len), Some(32));
    }

    #[test]
    fn test_int_value_sign_extension() {
        let value = IntValue::from_raw((-5i16).to_raw(), 2, true, 10);
        assert_eq!(value.as_i128(), -5);
        assert_eq!(value.as_u128(), 0xfffb);
        assert_eq!(value.to_string(), "-5");

        let hex = IntValue::from_raw(255u32.to_raw(), 4, false, 16);
        assert_eq!(hex.to_string(), "0xff");
    }
}
