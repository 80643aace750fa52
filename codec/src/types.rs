//! Declared types of fields and their wire identifiers.

use crate::{buffer, Error, RangeCfg, Value};
use bytes::{Buf, BufMut};
use std::fmt;

/// Maximum nesting of a field type read from the wire.
const MAX_TYPE_DEPTH: usize = 32;

/// Type ids of the native protocol.
pub mod native {
    pub const BOOL: u32 = 1;
    pub const INT8: u32 = 2;
    pub const INT16: u32 = 3;
    pub const CHAR: u32 = 4;
    pub const INT32: u32 = 5;
    pub const INT64: u32 = 6;
    pub const FLOAT32: u32 = 7;
    pub const FLOAT64: u32 = 8;
    pub const STRING: u32 = 9;
    pub const ENUM: u32 = 10;
    pub const STRUCT: u32 = 11;
    pub const COMPATIBLE_STRUCT: u32 = 12;
    pub const LIST: u32 = 13;
    pub const ARRAY: u32 = 14;
    pub const MAP: u32 = 15;
}

/// Type ids of the cross-language protocol.
pub mod xlang {
    pub const BOOL: u32 = 1;
    pub const INT8: u32 = 2;
    pub const INT16: u32 = 3;
    pub const INT32: u32 = 4;
    pub const VAR_INT32: u32 = 5;
    pub const INT64: u32 = 6;
    pub const VAR_INT64: u32 = 7;
    pub const FLOAT32: u32 = 10;
    pub const FLOAT64: u32 = 11;
    pub const STRING: u32 = 12;
    pub const ENUM: u32 = 13;
    pub const NAMED_ENUM: u32 = 14;
    pub const STRUCT: u32 = 15;
    pub const COMPATIBLE_STRUCT: u32 = 16;
    pub const NAMED_STRUCT: u32 = 17;
    pub const NAMED_COMPATIBLE_STRUCT: u32 = 18;
    pub const LIST: u32 = 21;
    pub const MAP: u32 = 23;
    pub const ARRAY: u32 = 29;
}

/// Identity of a registered type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    pub namespace: String,
    pub name: String,
}

impl TypeName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buffer::write_string(&self.namespace, buf);
        buffer::write_string(&self.name, buf);
    }

    pub(crate) fn read(buf: &mut impl Buf, range: &RangeCfg<usize>) -> Result<Self, Error> {
        let namespace = buffer::read_string(buf, range)?;
        let name = buffer::read_string(buf, range)?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            return write!(f, "{}", self.name);
        }
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// An unboxed value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Primitive {
    Bool = 0,
    I8 = 1,
    I16 = 2,
    Char = 3,
    I32 = 4,
    I64 = 5,
    F32 = 6,
    F64 = 7,
}

impl Primitive {
    /// Size of the value when written at fixed width.
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 => 1,
            Self::I16 | Self::Char => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// The zero value of this type.
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::I8 => Value::I8(0),
            Self::I16 => Value::I16(0),
            Self::Char => Value::Char(0),
            Self::I32 => Value::I32(0),
            Self::I64 => Value::I64(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
        }
    }

    /// Returns true if `value` holds this type.
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Bool, Value::Bool(_))
                | (Self::I8, Value::I8(_))
                | (Self::I16, Value::I16(_))
                | (Self::Char, Value::Char(_))
                | (Self::I32, Value::I32(_))
                | (Self::I64, Value::I64(_))
                | (Self::F32, Value::F32(_))
                | (Self::F64, Value::F64(_))
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::Char => "char",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Error> {
        Ok(match tag {
            0 => Self::Bool,
            1 => Self::I8,
            2 => Self::I16,
            3 => Self::Char,
            4 => Self::I32,
            5 => Self::I64,
            6 => Self::F32,
            7 => Self::F64,
            _ => return Err(Error::InvalidData("primitive", format!("tag {tag}"))),
        })
    }
}

/// Declared type of a field, list element, or map key/value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Unboxed value that can never be null.
    Primitive(Primitive),
    /// Nullable wrapper around a primitive.
    Boxed(Primitive),
    String,
    Enum(TypeName),
    Struct(TypeName),
    /// Any value, resolved from the runtime value.
    Any,
    Array(Box<FieldType>),
    List(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
}

const TAG_PRIMITIVE: u8 = 0;
const TAG_BOXED: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_ENUM: u8 = 3;
const TAG_STRUCT: u8 = 4;
const TAG_ANY: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;

impl FieldType {
    pub const BOOL: FieldType = FieldType::Primitive(Primitive::Bool);
    pub const I8: FieldType = FieldType::Primitive(Primitive::I8);
    pub const I16: FieldType = FieldType::Primitive(Primitive::I16);
    pub const CHAR: FieldType = FieldType::Primitive(Primitive::Char);
    pub const I32: FieldType = FieldType::Primitive(Primitive::I32);
    pub const I64: FieldType = FieldType::Primitive(Primitive::I64);
    pub const F32: FieldType = FieldType::Primitive(Primitive::F32);
    pub const F64: FieldType = FieldType::Primitive(Primitive::F64);

    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::Struct(TypeName::new(namespace, name))
    }

    pub fn enumeration(namespace: &str, name: &str) -> Self {
        Self::Enum(TypeName::new(namespace, name))
    }

    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn array(element: FieldType) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn map(key: FieldType, value: FieldType) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Value a field of this type holds before it is populated.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Primitive(p) => p.zero(),
            _ => Value::Null,
        }
    }

    /// Returns true if values of this type may carry an identity.
    pub fn is_referencable(&self) -> bool {
        matches!(
            self,
            Self::Struct(_) | Self::Any | Self::Array(_) | Self::List(_) | Self::Map(..)
        )
    }

    /// Returns true for declared lists and maps.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(..))
    }

    /// Identifier folded into the struct version hash.
    pub(crate) fn hash_id(&self) -> i64 {
        let primitive = |p: Primitive| match p {
            Primitive::Bool => xlang::BOOL,
            Primitive::I8 => xlang::INT8,
            Primitive::I16 => xlang::INT16,
            Primitive::Char => 0,
            Primitive::I32 => xlang::INT32,
            Primitive::I64 => xlang::INT64,
            Primitive::F32 => xlang::FLOAT32,
            Primitive::F64 => xlang::FLOAT64,
        };
        match self {
            Self::Primitive(p) | Self::Boxed(p) => primitive(*p) as i64,
            Self::String => xlang::STRING as i64,
            Self::Enum(_) => xlang::ENUM as i64,
            Self::Struct(name) => {
                string_hash(&format!("{}{}", name.namespace, name.name)) as i64
            }
            Self::Any => 0,
            Self::Array(_) => xlang::ARRAY as i64,
            Self::List(_) => xlang::LIST as i64,
            Self::Map(..) => xlang::MAP as i64,
        }
    }

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::Primitive(p) => {
                buf.put_u8(TAG_PRIMITIVE);
                buf.put_u8(*p as u8);
            }
            Self::Boxed(p) => {
                buf.put_u8(TAG_BOXED);
                buf.put_u8(*p as u8);
            }
            Self::String => buf.put_u8(TAG_STRING),
            Self::Enum(name) => {
                buf.put_u8(TAG_ENUM);
                name.write(buf);
            }
            Self::Struct(name) => {
                buf.put_u8(TAG_STRUCT);
                name.write(buf);
            }
            Self::Any => buf.put_u8(TAG_ANY),
            Self::Array(element) => {
                buf.put_u8(TAG_ARRAY);
                element.write(buf);
            }
            Self::List(element) => {
                buf.put_u8(TAG_LIST);
                element.write(buf);
            }
            Self::Map(key, value) => {
                buf.put_u8(TAG_MAP);
                key.write(buf);
                value.write(buf);
            }
        }
    }

    pub(crate) fn read(buf: &mut impl Buf, range: &RangeCfg<usize>) -> Result<Self, Error> {
        Self::read_nested(buf, range, 0)
    }

    fn read_nested(buf: &mut impl Buf, range: &RangeCfg<usize>, depth: usize) -> Result<Self, Error> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::InvalidData("field type", "nesting too deep".into()));
        }
        Ok(match buffer::read_u8(buf)? {
            TAG_PRIMITIVE => Self::Primitive(Primitive::from_tag(buffer::read_u8(buf)?)?),
            TAG_BOXED => Self::Boxed(Primitive::from_tag(buffer::read_u8(buf)?)?),
            TAG_STRING => Self::String,
            TAG_ENUM => Self::Enum(TypeName::read(buf, range)?),
            TAG_STRUCT => Self::Struct(TypeName::read(buf, range)?),
            TAG_ANY => Self::Any,
            TAG_ARRAY => Self::Array(Box::new(Self::read_nested(buf, range, depth + 1)?)),
            TAG_LIST => Self::List(Box::new(Self::read_nested(buf, range, depth + 1)?)),
            TAG_MAP => {
                let key = Self::read_nested(buf, range, depth + 1)?;
                let value = Self::read_nested(buf, range, depth + 1)?;
                Self::Map(Box::new(key), Box::new(value))
            }
            tag => return Err(Error::InvalidData("field type", format!("tag {tag}"))),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{}", p.name()),
            Self::Boxed(p) => write!(f, "Option<{}>", p.name()),
            Self::String => write!(f, "string"),
            Self::Enum(name) | Self::Struct(name) => write!(f, "{name}"),
            Self::Any => write!(f, "any"),
            Self::Array(element) => write!(f, "[{element}]"),
            Self::List(element) => write!(f, "list<{element}>"),
            Self::Map(key, value) => write!(f, "map<{key}, {value}>"),
        }
    }
}

/// Rolling hash of a string's UTF-8 bytes, kept below `i32::MAX`.
pub(crate) fn string_hash(value: &str) -> i32 {
    let mut hash: i64 = 17;
    for byte in value.bytes() {
        hash = hash * 31 + (byte as i8) as i64;
        while hash >= i32::MAX as i64 {
            hash /= 7;
        }
    }
    hash as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_field_type_nested() {
        let ty = FieldType::map(
            FieldType::String,
            FieldType::list(FieldType::structure("demo", "Point")),
        );
        let mut buf = BytesMut::new();
        ty.write(&mut buf);
        let mut read = buf.freeze();
        assert_eq!(FieldType::read(&mut read, &(..).into()).unwrap(), ty);
        assert!(!read.has_remaining());
    }

    #[test]
    fn test_field_type_too_deep() {
        let mut ty = FieldType::I32;
        for _ in 0..=MAX_TYPE_DEPTH + 1 {
            ty = FieldType::list(ty);
        }
        let mut buf = BytesMut::new();
        ty.write(&mut buf);
        assert!(matches!(
            FieldType::read(&mut buf.freeze(), &(..).into()),
            Err(Error::InvalidData("field type", _))
        ));
    }

    #[test]
    fn test_field_type_invalid_tag() {
        let result = FieldType::read(&mut &[42u8][..], &(..).into());
        assert!(matches!(result, Err(Error::InvalidData("field type", _))));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FieldType::I64.default_value(), Value::I64(0));
        assert_eq!(FieldType::Boxed(Primitive::I64).default_value(), Value::Null);
        assert_eq!(FieldType::String.default_value(), Value::Null);
        assert!(Primitive::F32.matches(&Value::F32(1.0)));
        assert!(!Primitive::F32.matches(&Value::F64(1.0)));
    }

    #[test]
    fn test_string_hash_bounded() {
        assert_eq!(string_hash(""), 17);
        assert_eq!(string_hash("a"), 17 * 31 + 97);
        let long = "x".repeat(1000);
        let hash = string_hash(&long);
        assert!(hash > 0 && hash < i32::MAX);
        assert_eq!(hash, string_hash(&long));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeName::new("demo", "Point").to_string(), "demo.Point");
        assert_eq!(TypeName::new("", "Point").to_string(), "Point");
        assert_eq!(
            FieldType::map(FieldType::String, FieldType::Boxed(Primitive::I32)).to_string(),
            "map<string, Option<i32>>"
        );
    }
}
