//! Function argument records
//!
//! Argument calls go between a function's begin and end. `offset` is the
//! zero-based position of the parameter in the enclosing function, so a reader
//! can attach the N argument records that follow a FunctionBegin to it.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracecap_common::{
    BoolArgumentEvent, FlagsArgumentEvent, FloatArgumentEvent, IntArgumentEvent, PtrArgumentEvent, MAX_INDEX_SIZE,
};

use super::{address_of, record};

/// Primitive integers whose raw bytes (at most 16) can be recorded
pub trait Integral: Copy {
    const SIGNED: bool;
    /// Byte width of the type
    const SIZE: u8;

    /// Native-endian bytes, zero filled past [`Self::SIZE`]
    fn to_raw(self) -> [u8; MAX_INDEX_SIZE];
}

macro_rules! impl_integral {
    ($signed:expr => $($ty:ty),*) => {$(
        impl Integral for $ty {
            const SIGNED: bool = $signed;
            #[allow(clippy::cast_possible_truncation)]
            const SIZE: u8 = size_of::<$ty>() as u8;

            #[inline]
            fn to_raw(self) -> [u8; MAX_INDEX_SIZE] {
                let mut raw = [0u8; MAX_INDEX_SIZE];
                raw[..size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
                raw
            }
        }
    )*};
}

impl_integral!(true => i8, i16, i32, i64, i128, isize);
impl_integral!(false => u8, u16, u32, u64, u128, usize);

/// `f32` and `f64`
pub trait Float: Copy {
    const SIZE: u8;
    fn to_raw(self) -> [u8; 8];
}

impl Float for f32 {
    const SIZE: u8 = 4;

    fn to_raw(self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        raw[..4].copy_from_slice(&self.to_ne_bytes());
        raw
    }
}

impl Float for f64 {
    const SIZE: u8 = 8;

    fn to_raw(self) -> [u8; 8] {
        self.to_ne_bytes()
    }
}

/// A flags value recorded as its raw bits plus an identity of its type
///
/// Implemented for the unsigned integers; applications implement it for their
/// own bitflag types so readers can tell two flag sets apart.
pub trait FlagBits: 'static {
    /// Byte width of the meaningful bits (at most 16)
    const SIZE: u8;

    fn bits(&self) -> u128;

    /// Identity tag of the flags type, stable for the life of the process
    fn flags_type() -> u64
    where
        Self: Sized,
    {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<Self>().hash(&mut hasher);
        hasher.finish()
    }
}

macro_rules! impl_flag_bits {
    ($($ty:ty),*) => {$(
        impl FlagBits for $ty {
            #[allow(clippy::cast_possible_truncation)]
            const SIZE: u8 = size_of::<$ty>() as u8;

            fn bits(&self) -> u128 {
                u128::from(*self)
            }
        }
    )*};
}

impl_flag_bits!(u8, u16, u32, u64, u128);

#[inline]
pub fn bool_arg(offset: u8, value: bool) {
    record(|buffer, state| {
        let event = buffer.append::<BoolArgumentEvent>(state);
        event.offset = offset;
        event.value = u8::from(value);
    });
}

/// Record an integer argument displayed in base 10
#[inline]
pub fn int_arg<T: Integral>(offset: u8, value: T) {
    int_arg_with_base(offset, value, 10);
}

/// Record an integer argument with the base a reader should display it in
#[inline]
pub fn int_arg_with_base<T: Integral>(offset: u8, value: T, base: u8) {
    record(|buffer, state| {
        let event = buffer.append::<IntArgumentEvent>(state);
        event.offset = offset;
        event.size = T::SIZE;
        event.base = base;
        event.signed = u8::from(T::SIGNED);
        event.data = value.to_raw();
    });
}

#[inline]
pub fn float_arg<T: Float>(offset: u8, value: T) {
    record(|buffer, state| {
        let event = buffer.append::<FloatArgumentEvent>(state);
        event.offset = offset;
        event.size = T::SIZE;
        event.data = value.to_raw();
    });
}

#[inline]
pub fn flags_arg<F: FlagBits>(offset: u8, flags: &F) {
    record(|buffer, state| {
        let event = buffer.append::<FlagsArgumentEvent>(state);
        event.offset = offset;
        event.size = F::SIZE;
        event.flags_type = F::flags_type();
        event.bits = flags.bits().to_ne_bytes();
    });
}

#[inline]
pub fn ptr_arg<T: ?Sized>(offset: u8, ptr: *const T) {
    record(|buffer, state| {
        let event = buffer.append::<PtrArgumentEvent>(state);
        event.offset = offset;
        event.address = address_of(ptr);
    });
}
