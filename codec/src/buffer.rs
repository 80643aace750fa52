//! Fixed-width and length-prefixed reads and writes over [bytes::Buf] and [bytes::BufMut].
//!
//! Fixed-width values are little-endian. Lengths are varints checked against a [RangeCfg]
//! before anything is allocated.

use crate::{varint, Error, RangeCfg};
use bytes::{Buf, BufMut, Bytes};

/// Ensures `buf` holds at least `len` more bytes.
#[inline]
pub fn at_least(buf: &impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

macro_rules! impl_read {
    ($name:ident, $type:ty, $get:ident, $size:expr) => {
        #[doc = concat!("Reads a little-endian `", stringify!($type), "`.")]
        #[inline]
        pub fn $name(buf: &mut impl Buf) -> Result<$type, Error> {
            at_least(buf, $size)?;
            Ok(buf.$get())
        }
    };
}
impl_read!(read_u8, u8, get_u8, 1);
impl_read!(read_i8, i8, get_i8, 1);
impl_read!(read_i16, i16, get_i16_le, 2);
impl_read!(read_u16, u16, get_u16_le, 2);
impl_read!(read_i32, i32, get_i32_le, 4);
impl_read!(read_i64, i64, get_i64_le, 8);
impl_read!(read_f32, f32, get_f32_le, 4);
impl_read!(read_f64, f64, get_f64_le, 8);

/// Reads a single-byte boolean (`0` or `1`).
pub fn read_bool(buf: &mut impl Buf) -> Result<bool, Error> {
    match read_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidBool),
    }
}

/// Reads a varint length and checks it against `range`.
pub fn read_len(buf: &mut impl Buf, range: &RangeCfg<usize>) -> Result<usize, Error> {
    let len = varint::read::<u32>(buf)? as usize;
    if !range.contains(&len) {
        return Err(Error::InvalidLength(len));
    }
    Ok(len)
}

/// Writes a varint length.
pub fn write_len(len: usize, buf: &mut impl BufMut) {
    varint::write(len as u64, buf);
}

/// Writes a length-prefixed byte string.
pub fn write_bytes(bytes: &[u8], buf: &mut impl BufMut) {
    write_len(bytes.len(), buf);
    buf.put_slice(bytes);
}

/// Reads a length-prefixed byte string.
pub fn read_bytes(buf: &mut impl Buf, range: &RangeCfg<usize>) -> Result<Bytes, Error> {
    let len = read_len(buf, range)?;
    at_least(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_string(value: &str, buf: &mut impl BufMut) {
    write_bytes(value.as_bytes(), buf);
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_string(buf: &mut impl Buf, range: &RangeCfg<usize>) -> Result<String, Error> {
    let bytes = read_bytes(buf, range)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|err| Error::InvalidData("string", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use paste::paste;

    macro_rules! fixed_width {
        ($($type:ident => $put:ident, $size:expr, [$($value:expr),*];)*) => {
            paste! {
                $(
                    #[test]
                    fn [<test_read_ $type>]() {
                        for value in [$($value),*] {
                            let mut buf = BytesMut::new();
                            buf.$put(value);
                            assert_eq!(buf.len(), $size);
                            let mut read = buf.freeze();
                            assert_eq!([<read_ $type>](&mut read).unwrap(), value);
                            assert!(matches!([<read_ $type>](&mut read), Err(Error::EndOfBuffer)));
                        }
                    }
                )*
            }
        };
    }
    fixed_width! {
        i16 => put_i16_le, 2, [0, -1, i16::MAX];
        i32 => put_i32_le, 4, [0, 7, i32::MIN];
        i64 => put_i64_le, 8, [0, -7, i64::MAX];
        f64 => put_f64_le, 8, [0.0, 1.5, f64::MIN];
    }

    #[test]
    fn test_little_endian() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(1);
        assert_eq!(&buf[..], &[1, 0, 0, 0]);
    }

    #[test]
    fn test_bool() {
        assert!(read_bool(&mut &[1u8][..]).unwrap());
        assert!(!read_bool(&mut &[0u8][..]).unwrap());
        assert!(matches!(read_bool(&mut &[2u8][..]), Err(Error::InvalidBool)));
    }

    #[test]
    fn test_string() {
        let mut buf = BytesMut::new();
        write_string("héllo", &mut buf);
        let mut read = buf.freeze();
        assert_eq!(read_string(&mut read, &(..).into()).unwrap(), "héllo");
        assert!(!read.has_remaining());
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = BytesMut::new();
        write_string("abcdef", &mut buf);
        let result = read_string(&mut buf.freeze(), &(..=5).into());
        assert!(matches!(result, Err(Error::InvalidLength(6))));
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = BytesMut::new();
        write_string("abcdef", &mut buf);
        let mut read = buf.freeze().slice(..4);
        assert!(matches!(read_string(&mut read, &(..).into()), Err(Error::EndOfBuffer)));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = BytesMut::new();
        write_bytes(&[0xC3, 0x28], &mut buf);
        let result = read_string(&mut buf.freeze(), &(..).into());
        assert!(matches!(result, Err(Error::InvalidData("string", _))));
    }
}
