//! Variable-length integer encoding and decoding.
//!
//! Unsigned integers use LEB128: each byte carries 7 bits of data (least significant group first)
//! and sets its high bit when more bytes follow. Signed integers are first mapped onto unsigned
//! integers with ZigZag so small negative numbers stay short.
//!
//! Reference ids, lengths, meta indexes, and (when compression is enabled) `i32`/`i64` values are
//! all written with this encoding.

use crate::Error;
use bytes::{Buf, BufMut};
use std::ops::{BitOrAssign, Shl, ShrAssign};

const BITS_PER_BYTE: usize = 8;
const DATA_BITS_PER_BYTE: usize = 7;
const DATA_BITS_MASK: u8 = 0x7F;
const CONTINUATION_BIT_MASK: u8 = 0x80;

/// An unsigned integer that can be varint encoded.
pub trait UInt:
    Copy
    + From<u8>
    + Sized
    + ShrAssign<usize>
    + Shl<usize, Output = Self>
    + BitOrAssign<Self>
    + PartialOrd
{
    /// Returns the number of leading zeros in the integer.
    fn leading_zeros(self) -> u32;

    /// Returns the least significant byte of the integer.
    fn as_u8(self) -> u8;
}

macro_rules! impl_uint {
    ($type:ty) => {
        impl UInt for $type {
            #[inline]
            fn leading_zeros(self) -> u32 {
                self.leading_zeros()
            }

            #[inline]
            fn as_u8(self) -> u8 {
                self as u8
            }
        }
    };
}
impl_uint!(u16);
impl_uint!(u32);
impl_uint!(u64);

/// A signed integer with a ZigZag mapping onto the unsigned integer of the same width.
pub trait SInt<UEq: UInt> {
    /// Moves the sign bit into the least significant bit.
    fn as_zigzag(&self) -> UEq;

    /// Reverses [SInt::as_zigzag].
    fn un_zigzag(value: UEq) -> Self;
}

macro_rules! impl_sint {
    ($type:ty, $utype:ty) => {
        impl SInt<$utype> for $type {
            #[inline]
            fn as_zigzag(&self) -> $utype {
                let shr = std::mem::size_of::<$utype>() * 8 - 1;
                ((self << 1) ^ (self >> shr)) as $utype
            }

            #[inline]
            fn un_zigzag(value: $utype) -> Self {
                ((value >> 1) as $type) ^ (-((value & 1) as $type))
            }
        }
    };
}
impl_sint!(i16, u16);
impl_sint!(i32, u32);
impl_sint!(i64, u64);

/// Encodes an unsigned integer as a varint.
pub fn write<T: UInt>(value: T, buf: &mut impl BufMut) {
    let continuation_threshold = T::from(CONTINUATION_BIT_MASK);
    if value < continuation_threshold {
        buf.put_u8(value.as_u8());
        return;
    }

    let mut val = value;
    while val >= continuation_threshold {
        buf.put_u8(val.as_u8() | CONTINUATION_BIT_MASK);
        val >>= DATA_BITS_PER_BYTE;
    }
    buf.put_u8(val.as_u8());
}

/// Decodes an unsigned integer from a varint.
///
/// Encodings that set bits beyond the width of `T` are rejected with [Error::InvalidVarint].
pub fn read<T: UInt>(buf: &mut impl Buf) -> Result<T, Error> {
    let max_bits = std::mem::size_of::<T>() * BITS_PER_BYTE;
    let mut result: T = T::from(0);
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err(Error::EndOfBuffer);
        }
        let byte = buf.get_u8();

        // On the last possible byte, any bit past the width of `T` (including the
        // continuation bit) makes the encoding invalid.
        let remaining_bits = max_bits.saturating_sub(shift);
        if remaining_bits <= DATA_BITS_PER_BYTE {
            let relevant_bits = BITS_PER_BYTE - byte.leading_zeros() as usize;
            if relevant_bits > remaining_bits {
                return Err(Error::InvalidVarint);
            }
        }

        result |= T::from(byte & DATA_BITS_MASK) << shift;
        if byte & CONTINUATION_BIT_MASK == 0 {
            return Ok(result);
        }
        shift += DATA_BITS_PER_BYTE;
    }
}

/// Returns the number of bytes needed to encode an unsigned integer as a varint.
pub fn size<T: UInt>(value: T) -> usize {
    let total_bits = std::mem::size_of::<T>() * BITS_PER_BYTE;
    let data_bits = total_bits - value.leading_zeros() as usize;
    usize::max(1, data_bits.div_ceil(DATA_BITS_PER_BYTE))
}

/// Encodes a signed integer as a ZigZag varint.
pub fn write_signed<U: UInt, S: SInt<U>>(value: S, buf: &mut impl BufMut) {
    write(value.as_zigzag(), buf);
}

/// Decodes a signed integer from a ZigZag varint.
pub fn read_signed<U: UInt, S: SInt<U>>(buf: &mut impl Buf) -> Result<S, Error> {
    Ok(S::un_zigzag(read(buf)?))
}
