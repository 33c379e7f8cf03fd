//! # Event Record Format
//!
//! Defines the fixed-size tagged record that every instrumentation call writes
//! into a per-thread recorder, and the concrete payload layouts selected by the
//! record's tag byte. All payload types use `#[repr(C)]` with explicit padding
//! so that a payload can be written and read in place inside an [`Event`] slot.
//!
//! ## Layout Rules
//!
//! - Every record is exactly [`EVENT_SIZE`] (32) bytes, aligned to 8 bytes.
//! - Byte 0 is the tag ([`EventType`]); the remaining 31 bytes are payload.
//! - Data sections ([`DataSectionEvent`]) are the one exception: they carry no
//!   tag and use all 32 bytes for blob content. They only ever appear directly
//!   after a [`DataHeaderEvent`] of the same thread.
//! - Every payload is checked at compile time to fit the slot.
//!
//! ## Key Types
//!
//! - [`Event`] - The 32-byte slot stored in recorders and in the merged log
//! - [`EventType`] - Tag byte selecting the concrete payload
//! - [`EventTimestamp`] - 63-bit magnitude plus a 1-bit clock source
//! - [`EventPayload`] - Marker for types that may be reinterpreted in a slot

#![cfg_attr(not(test), no_std)]

use core::cmp::Ordering;
use core::fmt;
use core::mem::{align_of, size_of};

// ============================================================================
// Sizes
// ============================================================================

/// Size in bytes of one record slot
pub const EVENT_SIZE: usize = 32;

/// Bytes available to a tagged payload after the tag byte
pub const EVENT_PAYLOAD_SIZE: usize = EVENT_SIZE - 1;

/// Bytes of blob content carried by each [`DataSectionEvent`]
///
/// Sections are untagged, so a blob of `n` bytes occupies one header plus
/// `n.div_ceil(DATA_CHUNK_SIZE)` sections.
pub const DATA_CHUNK_SIZE: usize = EVENT_SIZE;

/// Maximum raw bytes stored for a for-loop index
pub const MAX_INDEX_SIZE: usize = 16;

/// Number of data sections needed to hold `size` bytes of blob content
#[must_use]
pub const fn data_section_count(size: u64) -> u64 {
    size.div_ceil(DATA_CHUNK_SIZE as u64)
}

// ============================================================================
// Timestamps
// ============================================================================

/// Clock that produced an [`EventTimestamp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampSource {
    /// Coarse monotonic clock, nanosecond ticks
    WallClock,
    /// Invariant CPU cycle counter
    InvariantCycles,
}

/// A 63-bit time magnitude and a 1-bit source discriminator
///
/// **Bit layout**: bits 0..63 hold the magnitude, bit 63 is `0` for
/// [`TimestampSource::WallClock`] and `1` for
/// [`TimestampSource::InvariantCycles`].
///
/// Magnitudes from different sources are not comparable, so `PartialOrd`
/// returns `None` across sources.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventTimestamp(u64);

impl EventTimestamp {
    /// Largest magnitude representable in 63 bits
    pub const MAX_TIME: u64 = (1 << 63) - 1;

    const SOURCE_BIT: u64 = 1 << 63;

    /// Pack a magnitude and a source. Magnitudes wider than 63 bits are truncated.
    #[must_use]
    pub const fn new(time: u64, source: TimestampSource) -> Self {
        let time = time & Self::MAX_TIME;
        match source {
            TimestampSource::WallClock => Self(time),
            TimestampSource::InvariantCycles => Self(time | Self::SOURCE_BIT),
        }
    }

    /// The 63-bit magnitude
    #[must_use]
    pub const fn time(self) -> u64 {
        self.0 & Self::MAX_TIME
    }

    /// The discriminator bit (0 = wall clock, 1 = cycle counter)
    #[must_use]
    pub const fn discriminator(self) -> u8 {
        (self.0 >> 63) as u8
    }

    #[must_use]
    pub const fn source(self) -> TimestampSource {
        if self.0 & Self::SOURCE_BIT == 0 {
            TimestampSource::WallClock
        } else {
            TimestampSource::InvariantCycles
        }
    }

    #[must_use]
    pub const fn is_high_res(self) -> bool {
        self.0 & Self::SOURCE_BIT != 0
    }

    /// Ticks elapsed since `earlier`, or `None` when the sources differ or
    /// `earlier` is later than `self`.
    #[must_use]
    pub fn ticks_since(self, earlier: Self) -> Option<u64> {
        if self.source() != earlier.source() {
            return None;
        }
        self.time().checked_sub(earlier.time())
    }

    /// Raw 64-bit representation
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl PartialOrd for EventTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.source() == other.source() {
            Some(self.time().cmp(&other.time()))
        } else {
            None
        }
    }
}

impl fmt::Debug for EventTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTimestamp")
            .field("time", &self.time())
            .field("source", &self.source())
            .finish()
    }
}

impl fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_high_res() { "HR" } else { "LR" };
        write!(f, "time: {}, type: {kind}", self.time())
    }
}

// ============================================================================
// Event Tags
// ============================================================================

/// Tag byte stored at offset 0 of every tagged record
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Unknown = 0,
    /// Framing header: the next `length` records belong to `thread_id`
    ThreadBounds,
    ThreadBegin,
    ThreadEnd,
    Frame,
    FunctionBegin,
    FunctionEnd,
    Callstack,
    BoolArgument,
    IntArgument,
    FloatArgument,
    FlagsArgument,
    PtrArgument,
    ForLoopBegin,
    ForLoopEnd,
    ForLoopIterBegin,
    ForLoopIterEnd,
    MemAlloc,
    MemFree,
    DataHeader,
}

impl EventType {
    /// Every tag in discriminant order
    pub const ALL: [EventType; 20] = [
        EventType::Unknown,
        EventType::ThreadBounds,
        EventType::ThreadBegin,
        EventType::ThreadEnd,
        EventType::Frame,
        EventType::FunctionBegin,
        EventType::FunctionEnd,
        EventType::Callstack,
        EventType::BoolArgument,
        EventType::IntArgument,
        EventType::FloatArgument,
        EventType::FlagsArgument,
        EventType::PtrArgument,
        EventType::ForLoopBegin,
        EventType::ForLoopEnd,
        EventType::ForLoopIterBegin,
        EventType::ForLoopIterEnd,
        EventType::MemAlloc,
        EventType::MemFree,
        EventType::DataHeader,
    ];

    /// Decode a tag byte, `None` for bytes outside the known range
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        if (tag as usize) < Self::ALL.len() {
            Some(Self::ALL[tag as usize])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable name used by the console dump
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EventType::Unknown => "Unknown",
            EventType::ThreadBounds => "Thread Bounds",
            EventType::ThreadBegin => "Thread Begin",
            EventType::ThreadEnd => "Thread End",
            EventType::Frame => "Frame",
            EventType::FunctionBegin => "Function Begin",
            EventType::FunctionEnd => "Function End",
            EventType::Callstack => "Callstack",
            EventType::BoolArgument => "Bool Argument",
            EventType::IntArgument => "Int Argument",
            EventType::FloatArgument => "Float Argument",
            EventType::FlagsArgument => "Flags Argument",
            EventType::PtrArgument => "Ptr Argument",
            EventType::ForLoopBegin => "For Loop Begin",
            EventType::ForLoopEnd => "For Loop End",
            EventType::ForLoopIterBegin => "For Loop Iter Begin",
            EventType::ForLoopIterEnd => "For Loop Iter End",
            EventType::MemAlloc => "Mem Alloc",
            EventType::MemFree => "Mem Free",
            EventType::DataHeader => "Data Header",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Record Slot
// ============================================================================

/// One 32-byte record: a tag byte followed by 31 payload bytes
///
/// Recorders hold a dense inline array of these and the merged log is a
/// `Vec<Event>`. Concrete payloads are written and read in place through
/// [`Event::write`] and [`Event::read`]; no record is ever boxed.
#[repr(C, align(8))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Event {
    kind: u8,
    payload: [u8; EVENT_PAYLOAD_SIZE],
}

const _: () = assert!(size_of::<Event>() == EVENT_SIZE);

impl Event {
    /// A zeroed slot tagged [`EventType::Unknown`]
    pub const EMPTY: Event = Event { kind: 0, payload: [0; EVENT_PAYLOAD_SIZE] };

    /// A zeroed slot carrying `kind` as its tag
    #[must_use]
    pub const fn tagged(kind: EventType) -> Self {
        Event { kind: kind as u8, payload: [0; EVENT_PAYLOAD_SIZE] }
    }

    /// Raw tag byte (meaningless for data sections)
    #[must_use]
    pub const fn tag(&self) -> u8 {
        self.kind
    }

    #[must_use]
    pub const fn kind(&self) -> Option<EventType> {
        EventType::from_tag(self.kind)
    }

    /// The slot's 32 bytes, tag included
    #[must_use]
    #[allow(unsafe_code)]
    pub fn as_bytes(&self) -> &[u8; EVENT_SIZE] {
        // SAFETY: `Event` is `repr(C)`, exactly EVENT_SIZE bytes and has no
        // padding, so every byte is initialized.
        unsafe {
            &*(self as *const Event).cast::<[u8; EVENT_SIZE]>()
        }
    }

    /// Zero the slot, stamp `T`'s tag (if any) and hand out the slot as a `T`
    #[allow(unsafe_code)]
    pub fn write<T: EventPayload>(&mut self) -> &mut T {
        *self = Event::EMPTY;
        if let Some(kind) = T::KIND {
            self.kind = kind as u8;
        }
        // SAFETY: `EventPayload` guarantees `T` fits the slot's size and
        // alignment and that every bit pattern is a valid `T`.
        unsafe {
            &mut *(self as *mut Event).cast::<T>()
        }
    }

    /// View the slot as `T` if the tag matches `T`'s tag
    ///
    /// Untagged payloads ([`DataSectionEvent`]) are always returned; the
    /// caller is responsible for knowing the slot is a section.
    #[must_use]
    #[allow(unsafe_code)]
    pub fn read<T: EventPayload>(&self) -> Option<&T> {
        if T::KIND.is_some_and(|kind| kind as u8 != self.kind) {
            return None;
        }
        // SAFETY: see `write`.
        Some(unsafe { &*(self as *const Event).cast::<T>() })
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::EMPTY
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind())
            .field("bytes", self.as_bytes())
            .finish()
    }
}

/// A type that may be written into and read out of an [`Event`] slot
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain only integer fields (or arrays
/// of them, or [`EventTimestamp`]) laid out without implicit padding, and fit
/// within [`EVENT_SIZE`] bytes at an alignment no greater than `Event`'s.
/// Tagged implementors must reserve their first byte for the tag.
#[allow(unsafe_code)]
pub unsafe trait EventPayload: Copy {
    /// Tag stamped by [`Event::write`], `None` for untagged continuation data
    const KIND: Option<EventType>;
}

macro_rules! event_payload {
    ($($ty:ty => $kind:expr),* $(,)?) => {$(
        const _: () = assert!(
            size_of::<$ty>() <= EVENT_SIZE && align_of::<$ty>() <= align_of::<Event>(),
            "payload does not fit an event slot"
        );

        #[allow(unsafe_code)]
        unsafe impl EventPayload for $ty {
            const KIND: Option<EventType> = $kind;
        }
    )*};
}

// ============================================================================
// Thread Framing
// ============================================================================

/// Header written at flush time: the next `length` records belong to `thread_id`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreadBoundsEvent {
    kind: u8,
    _padding: [u8; 7],
    pub thread_id: u64,
    pub length: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreadBeginEvent {
    kind: u8,
    _padding: [u8; 7],
    pub timestamp: EventTimestamp,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ThreadEndEvent {
    kind: u8,
    _padding: [u8; 7],
    pub timestamp: EventTimestamp,
}

/// Frame boundary emitted by the main thread
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameEvent {
    kind: u8,
    _padding: [u8; 7],
    /// Monotonically increasing, reset by `init`
    pub frame_num: u64,
    pub timestamp: EventTimestamp,
}

// ============================================================================
// Function Tracing
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FunctionBeginEvent {
    kind: u8,
    _padding: [u8; 7],
    /// Opaque function identifier, usually a code address
    pub function: u64,
    pub timestamp: EventTimestamp,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FunctionEndEvent {
    kind: u8,
    _padding: [u8; 7],
    pub timestamp: EventTimestamp,
}

/// Reference to a blob holding `num_entries` raw frame addresses
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallstackEvent {
    kind: u8,
    _padding: [u8; 7],
    pub data_id: u64,
    pub num_entries: u64,
}

// ============================================================================
// Arguments
// ============================================================================
//
// `offset` is the zero-based parameter position of the enclosing function.

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BoolArgumentEvent {
    kind: u8,
    pub offset: u8,
    /// `0` or `1`
    pub value: u8,
    _padding: [u8; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IntArgumentEvent {
    kind: u8,
    pub offset: u8,
    /// Byte width of the original integer (1, 2, 4, 8 or 16)
    pub size: u8,
    /// Numeric base the value should be displayed in
    pub base: u8,
    /// `1` for signed integer types
    pub signed: u8,
    _padding: [u8; 3],
    /// Native-endian bytes of the value, zero filled past `size`
    pub data: [u8; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FloatArgumentEvent {
    kind: u8,
    pub offset: u8,
    /// 4 for `f32`, 8 for `f64`
    pub size: u8,
    _padding: [u8; 5],
    pub data: [u8; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FlagsArgumentEvent {
    kind: u8,
    pub offset: u8,
    pub size: u8,
    _padding: [u8; 5],
    /// Identity of the flags type, stable within one process
    pub flags_type: u64,
    pub bits: [u8; 16],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PtrArgumentEvent {
    kind: u8,
    pub offset: u8,
    _padding: [u8; 6],
    pub address: u64,
}

// ============================================================================
// Loop Tracing
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForLoopBeginEvent {
    kind: u8,
    _padding: [u8; 3],
    pub id: u32,
    pub timestamp: EventTimestamp,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForLoopEndEvent {
    kind: u8,
    _padding: [u8; 3],
    pub id: u32,
    pub timestamp: EventTimestamp,
}

/// Start of one loop iteration
///
/// **Size**: exactly 32 bytes; the 32-bit loop id is what lets a full 16-byte
/// index fit next to the timestamp.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForLoopIterBeginEvent {
    kind: u8,
    /// Byte width of the index type
    pub size: u8,
    /// `1` for signed index types
    pub signed: u8,
    _padding: u8,
    pub id: u32,
    pub timestamp: EventTimestamp,
    /// Native-endian bytes of the index, zero filled past `size`
    pub index: [u8; MAX_INDEX_SIZE],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForLoopIterEndEvent {
    kind: u8,
    _padding: [u8; 3],
    pub id: u32,
    pub timestamp: EventTimestamp,
}

// ============================================================================
// Memory Tracing
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemAllocEvent {
    kind: u8,
    _padding: [u8; 7],
    pub address: u64,
    pub size: u64,
    pub timestamp: EventTimestamp,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemFreeEvent {
    kind: u8,
    _padding: [u8; 7],
    pub address: u64,
    pub timestamp: EventTimestamp,
}

// ============================================================================
// Data Blobs
// ============================================================================

/// Header of a blob; followed by `data_section_count(size)` sections
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataHeaderEvent {
    kind: u8,
    _padding: [u8; 7],
    pub size: u64,
    pub id: u64,
}

/// Untagged continuation record holding [`DATA_CHUNK_SIZE`] blob bytes
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataSectionEvent {
    pub bytes: [u8; DATA_CHUNK_SIZE],
}

event_payload! {
    ThreadBoundsEvent => Some(EventType::ThreadBounds),
    ThreadBeginEvent => Some(EventType::ThreadBegin),
    ThreadEndEvent => Some(EventType::ThreadEnd),
    FrameEvent => Some(EventType::Frame),
    FunctionBeginEvent => Some(EventType::FunctionBegin),
    FunctionEndEvent => Some(EventType::FunctionEnd),
    CallstackEvent => Some(EventType::Callstack),
    BoolArgumentEvent => Some(EventType::BoolArgument),
    IntArgumentEvent => Some(EventType::IntArgument),
    FloatArgumentEvent => Some(EventType::FloatArgument),
    FlagsArgumentEvent => Some(EventType::FlagsArgument),
    PtrArgumentEvent => Some(EventType::PtrArgument),
    ForLoopBeginEvent => Some(EventType::ForLoopBegin),
    ForLoopEndEvent => Some(EventType::ForLoopEnd),
    ForLoopIterBeginEvent => Some(EventType::ForLoopIterBegin),
    ForLoopIterEndEvent => Some(EventType::ForLoopIterEnd),
    MemAllocEvent => Some(EventType::MemAlloc),
    MemFreeEvent => Some(EventType::MemFree),
    DataHeaderEvent => Some(EventType::DataHeader),
    DataSectionEvent => None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_packing() {
        let lr = EventTimestamp::new(1234, TimestampSource::WallClock);
        assert_eq!(lr.time(), 1234);
        assert_eq!(lr.discriminator(), 0);
        assert!(!lr.is_high_res());

        let hr = EventTimestamp::new(u64::MAX, TimestampSource::InvariantCycles);
        assert_eq!(hr.time(), EventTimestamp::MAX_TIME);
        assert_eq!(hr.discriminator(), 1);
        assert_eq!(hr.source(), TimestampSource::InvariantCycles);
    }

    #[test]
    fn test_timestamps_from_different_sources_do_not_compare() {
        let lr = EventTimestamp::new(10, TimestampSource::WallClock);
        let hr = EventTimestamp::new(20, TimestampSource::InvariantCycles);
        assert_eq!(lr.partial_cmp(&hr), None);
        assert_eq!(hr.ticks_since(lr), None);

        let later = EventTimestamp::new(25, TimestampSource::InvariantCycles);
        assert!(later > hr);
        assert_eq!(later.ticks_since(hr), Some(5));
        assert_eq!(hr.ticks_since(later), None);
    }

    #[test]
    fn test_tag_decoding() {
        for (index, kind) in EventType::ALL.iter().enumerate() {
            assert_eq!(kind.tag() as usize, index);
            assert_eq!(EventType::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(EventType::from_tag(20), None);
        assert_eq!(EventType::from_tag(0xFF), None);
    }

    #[test]
    fn test_write_stamps_tag_and_clears_slot() {
        let mut slot = Event::tagged(EventType::MemAlloc);
        slot.write::<DataSectionEvent>().bytes = [0xAA; DATA_CHUNK_SIZE];

        let frame = slot.write::<FrameEvent>();
        frame.frame_num = 7;
        frame.timestamp = EventTimestamp::new(99, TimestampSource::WallClock);

        assert_eq!(slot.kind(), Some(EventType::Frame));
        let read = slot.read::<FrameEvent>().unwrap();
        assert_eq!(read.frame_num, 7);
        assert_eq!(read.timestamp.time(), 99);
        // Padding bytes left over from the section were zeroed.
        assert!(slot.as_bytes()[1..8].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_read_rejects_mismatched_tag() {
        let mut slot = Event::EMPTY;
        slot.write::<FunctionEndEvent>();
        assert!(slot.read::<FunctionBeginEvent>().is_none());
        assert!(slot.read::<FunctionEndEvent>().is_some());
    }

    #[test]
    fn test_iter_begin_fills_whole_slot() {
        assert_eq!(size_of::<ForLoopIterBeginEvent>(), EVENT_SIZE);
        assert_eq!(size_of::<MemAllocEvent>(), EVENT_SIZE);
        assert_eq!(size_of::<FlagsArgumentEvent>(), EVENT_SIZE);

        let mut slot = Event::EMPTY;
        let iter = slot.write::<ForLoopIterBeginEvent>();
        iter.index = [0xFF; MAX_INDEX_SIZE];
        assert_eq!(slot.tag(), EventType::ForLoopIterBegin.tag());
        assert_eq!(&slot.as_bytes()[16..], &[0xFF; MAX_INDEX_SIZE]);
    }

    #[test]
    fn test_data_section_count() {
        assert_eq!(data_section_count(0), 0);
        assert_eq!(data_section_count(1), 1);
        assert_eq!(data_section_count(32), 1);
        assert_eq!(data_section_count(33), 2);
        assert_eq!(data_section_count(128), 4);
    }
}
