//! Protocol bindings: reference flags, type info, and protocol-specific scalar encodings.
//!
//! # Overview
//!
//! Serializers only know how to write a payload. Everything around it (the reference flag, the
//! type info identifying which serializer to use, and the declared element types of containers)
//! is written by a [Binding]. Two bindings exist:
//!
//! - [NativeBinding]: type ids understood by engines of this crate. `char` is supported and
//!   integers are fixed-width or varint depending on [crate::Config::compress_int] and
//!   [crate::Config::compress_long].
//! - [XlangBinding]: type ids shared with other languages. `char` is not supported and integers
//!   are always ZigZag varints.
//!
//! # Type info
//!
//! ```txt
//! primitive, string, list, array, map   varint(type id)
//! enum, struct (native)                 varint(type id) | identity
//! enum, struct (xlang)                  varint(type id) | varint(user id) or namespace + name
//! compatible struct                     varint(type id) | descriptor reference
//! ```

use crate::{
    buffer,
    context::{ReadContext, WriteContext},
    descriptor::TypeIdent,
    reference::{RefRead, NOT_NULL_VALUE_FLAG, NULL_FLAG},
    registry::TypeKind,
    serializer::{
        compatible::CompatibleSerializer, placeholder::PlaceholderSerializer, Serializer,
    },
    types::{native, xlang},
    varint, Config, Error, FieldType, Node, Primitive, Protocol, TypeName, Value,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::trace;

/// Type info to write, independent of protocol.
#[derive(Debug, Clone, Copy)]
pub enum TypeTag<'a> {
    Primitive(Primitive),
    String,
    Enum(&'a TypeIdent),
    Struct(&'a TypeIdent),
    /// Followed by a descriptor reference (written by the caller).
    Compatible(&'a TypeIdent),
    List,
    Array,
    Map,
}

/// Type info read from the wire, independent of protocol.
#[derive(Debug, PartialEq)]
pub enum ReadTag {
    Primitive(Primitive),
    String,
    Enum(TypeIdent),
    Struct(TypeIdent),
    Compatible,
    List,
    Array,
    Map,
}

fn primitive_of(value: &Value) -> Option<Primitive> {
    Some(match value {
        Value::Bool(_) => Primitive::Bool,
        Value::I8(_) => Primitive::I8,
        Value::I16(_) => Primitive::I16,
        Value::Char(_) => Primitive::Char,
        Value::I32(_) => Primitive::I32,
        Value::I64(_) => Primitive::I64,
        Value::F32(_) => Primitive::F32,
        Value::F64(_) => Primitive::F64,
        _ => return None,
    })
}

/// Wire conventions of one protocol.
///
/// Implementors supply the type-id tables and the scalar encodings that differ between
/// protocols. The provided methods implement reference tracking and type info on top of them.
pub trait Binding: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Writes the type id (and identity, if any) of `tag`.
    fn write_tag(&self, tag: TypeTag<'_>, buf: &mut BytesMut) -> Result<(), Error>;

    /// Reads a type id (and identity, if any).
    fn read_tag(&self, buf: &mut Bytes, cfg: &Config) -> Result<ReadTag, Error>;

    fn write_i32(&self, cfg: &Config, value: i32, buf: &mut BytesMut);
    fn read_i32(&self, cfg: &Config, buf: &mut Bytes) -> Result<i32, Error>;
    fn write_i64(&self, cfg: &Config, value: i64, buf: &mut BytesMut);
    fn read_i64(&self, cfg: &Config, buf: &mut Bytes) -> Result<i64, Error>;
    fn write_char(&self, value: u16, buf: &mut BytesMut) -> Result<(), Error>;
    fn read_char(&self, buf: &mut Bytes) -> Result<u16, Error>;

    /// Writes the type info of `value` and returns the serializer for its payload.
    fn write_type_info(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
    ) -> Result<Arc<dyn Serializer>, Error> {
        if let Some(p) = primitive_of(value) {
            self.write_tag(TypeTag::Primitive(p), ctx.buf)?;
            return Ok(ctx.registry.primitive(p));
        }
        match value {
            Value::Null => Err(Error::UnexpectedNull("type info".into())),
            Value::String(_) => {
                self.write_tag(TypeTag::String, ctx.buf)?;
                Ok(ctx.registry.string())
            }
            Value::Enum(constant) => {
                let Some(ty) = constant.ty() else {
                    return Err(Error::Unsupported(
                        "enum constant of unknown type cannot be written".into(),
                    ));
                };
                let ident = ctx.registry.ident(ty);
                self.write_tag(TypeTag::Enum(&ident), ctx.buf)?;
                Ok(ctx.registry.enum_serializer(Some(ty)))
            }
            Value::Ref(handle) => {
                let heap = ctx.heap;
                match heap.get(*handle)? {
                    Node::Object(object) => {
                        let name = object.ty();
                        let serializer = ctx.registry.struct_serializer(name)?;
                        if !ctx.cfg.is_compatible() {
                            let ident = ctx.registry.ident(name);
                            self.write_tag(TypeTag::Struct(&ident), ctx.buf)?;
                            return Ok(serializer);
                        }
                        let Some(info) = ctx.registry.get(name) else {
                            return Err(Error::UnknownType(name.to_string()));
                        };
                        let descriptor = ctx.plans.descriptor(info.def(), ctx.registry);
                        self.write_tag(TypeTag::Compatible(descriptor.ident()), ctx.buf)?;
                        ctx.meta.write(&descriptor, ctx.buf);
                        Ok(serializer)
                    }
                    Node::Placeholder(placeholder) => {
                        if !ctx.cfg.is_compatible() {
                            return Err(Error::Unsupported(
                                "placeholders can only be written in compatible mode".into(),
                            ));
                        }
                        let descriptor = placeholder.descriptor();
                        self.write_tag(TypeTag::Compatible(descriptor.ident()), ctx.buf)?;
                        ctx.meta.write(descriptor, ctx.buf);
                        Ok(Arc::new(PlaceholderSerializer::new(descriptor.clone())))
                    }
                    Node::List(_) => {
                        self.write_tag(TypeTag::List, ctx.buf)?;
                        Ok(ctx.registry.list())
                    }
                    Node::Array(_) => {
                        self.write_tag(TypeTag::Array, ctx.buf)?;
                        Ok(ctx.registry.array())
                    }
                    Node::Map(_) => {
                        self.write_tag(TypeTag::Map, ctx.buf)?;
                        Ok(ctx.registry.map())
                    }
                }
            }
            _ => Err(Error::TypeMismatch {
                context: "type info".into(),
                expected: value.kind().into(),
            }),
        }
    }

    /// Reads type info and returns the serializer for the payload that follows.
    fn read_type_info(&self, ctx: &mut ReadContext<'_>) -> Result<Arc<dyn Serializer>, Error> {
        let registry = ctx.registry;
        match self.read_tag(ctx.buf, ctx.cfg)? {
            ReadTag::Primitive(p) => Ok(registry.primitive(p)),
            ReadTag::String => Ok(registry.string()),
            ReadTag::List => Ok(registry.list()),
            ReadTag::Array => Ok(registry.array()),
            ReadTag::Map => Ok(registry.map()),
            ReadTag::Enum(ident) => {
                let name: Option<TypeName> = match &ident {
                    TypeIdent::Named(name) => Some(name.clone()),
                    TypeIdent::Id(_) => registry
                        .resolve(&ident)
                        .map(|info| info.def().name().clone()),
                };
                Ok(registry.enum_serializer(name.as_ref()))
            }
            ReadTag::Struct(ident) => match registry.resolve(&ident) {
                Some(info) if !matches!(info.def().kind(), TypeKind::Enum(_)) => {
                    Ok(info.serializer().clone())
                }
                _ => Err(Error::UnknownType(ident.to_string())),
            },
            ReadTag::Compatible => {
                let descriptor = ctx.meta.read(ctx.buf, ctx.cfg)?;
                match registry.resolve(descriptor.ident()) {
                    Some(info) if !matches!(info.def().kind(), TypeKind::Enum(_)) => Ok(Arc::new(
                        CompatibleSerializer::new(descriptor, info.def().clone()),
                    )),
                    Some(_) => Err(Error::TypeMismatch {
                        context: descriptor.ident().to_string(),
                        expected: "struct".into(),
                    }),
                    None if ctx.cfg.deserialize_unknown_types => {
                        trace!(ty = %descriptor.ident(), "reading unknown type as placeholder");
                        Ok(Arc::new(PlaceholderSerializer::new(descriptor)))
                    }
                    None => Err(Error::UnknownType(descriptor.ident().to_string())),
                }
            }
        }
    }

    /// Writes the payload of `value`, preceded by its type info if `serializer` is `None`.
    fn write_payload(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
        serializer: Option<&dyn Serializer>,
    ) -> Result<(), Error> {
        if let Some(serializer) = serializer {
            return serializer.write(ctx, value);
        }
        let serializer = self.write_type_info(ctx, value)?;
        ctx.generics.push(FieldType::Any);
        let result = serializer.write(ctx, value);
        ctx.generics.pop();
        result
    }

    /// Writes `value` with a reference flag, emitting a back reference if its node was
    /// already written in this call.
    fn write_ref(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
        serializer: Option<&dyn Serializer>,
    ) -> Result<(), Error> {
        match value {
            Value::Ref(handle) if ctx.cfg.track_ref => {
                if ctx.refs.write_ref_or_null(*handle, ctx.buf) {
                    return Ok(());
                }
                self.write_payload(ctx, value, serializer)
            }
            _ => self.write_nullable(ctx, value, serializer),
        }
    }

    /// Writes `value` with a null flag.
    fn write_nullable(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
        serializer: Option<&dyn Serializer>,
    ) -> Result<(), Error> {
        if value.is_null() {
            ctx.buf.put_i8(NULL_FLAG);
            return Ok(());
        }
        ctx.buf.put_i8(NOT_NULL_VALUE_FLAG);
        self.write_non_ref(ctx, value, serializer)
    }

    /// Writes `value` without any flag.
    ///
    /// Fails if `value` is a node already being written further up.
    fn write_non_ref(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
        serializer: Option<&dyn Serializer>,
    ) -> Result<(), Error> {
        let Value::Ref(handle) = value else {
            return self.write_payload(ctx, value, serializer);
        };
        ctx.refs.enter(*handle)?;
        let result = self.write_payload(ctx, value, serializer);
        ctx.refs.leave(*handle);
        result
    }

    /// Reads a payload (preceded by type info if `serializer` is `None`), binding the first
    /// node it allocates to `id`.
    fn read_payload(
        &self,
        ctx: &mut ReadContext<'_>,
        serializer: Option<&dyn Serializer>,
        id: Option<u32>,
    ) -> Result<Value, Error> {
        let depth = ctx.refs.preserve(id);
        let result = match serializer {
            Some(serializer) => serializer.read(ctx),
            None => self.read_type_info(ctx).and_then(|serializer| {
                ctx.generics.push(FieldType::Any);
                let result = serializer.read(ctx);
                ctx.generics.pop();
                result
            }),
        };
        ctx.refs.restore(depth);
        result
    }

    /// Reads a value written by [Self::write_ref].
    fn read_ref(
        &self,
        ctx: &mut ReadContext<'_>,
        serializer: Option<&dyn Serializer>,
    ) -> Result<Value, Error> {
        match ctx.refs.try_preserve_ref_id(ctx.buf)? {
            RefRead::Null => Ok(Value::Null),
            RefRead::Existing(value) => Ok(value),
            RefRead::NotNull => self.read_payload(ctx, serializer, None),
            RefRead::Preserved(id) => {
                let value = self.read_payload(ctx, serializer, Some(id))?;
                ctx.refs.set_read_object(id, value.clone());
                Ok(value)
            }
        }
    }

    /// Reads a value written by [Self::write_nullable].
    fn read_nullable(
        &self,
        ctx: &mut ReadContext<'_>,
        serializer: Option<&dyn Serializer>,
    ) -> Result<Value, Error> {
        match buffer::read_i8(ctx.buf)? {
            NULL_FLAG => Ok(Value::Null),
            NOT_NULL_VALUE_FLAG => self.read_non_ref(ctx, serializer),
            flag => Err(Error::InvalidRefFlag(flag)),
        }
    }

    /// Reads a value written by [Self::write_non_ref].
    fn read_non_ref(
        &self,
        ctx: &mut ReadContext<'_>,
        serializer: Option<&dyn Serializer>,
    ) -> Result<Value, Error> {
        self.read_payload(ctx, serializer, None)
    }

    /// Writes a list or map declared as `declared`, making its element types visible to the
    /// container serializer.
    fn write_container_field_value(
        &self,
        ctx: &mut WriteContext<'_>,
        value: &Value,
        declared: &FieldType,
        track_ref: bool,
        nullable: bool,
    ) -> Result<(), Error> {
        let serializer = ctx.registry.serializer(declared)?;
        ctx.generics.push(declared.clone());
        let result = if track_ref {
            self.write_ref(ctx, value, Some(&*serializer))
        } else if nullable {
            self.write_nullable(ctx, value, Some(&*serializer))
        } else {
            self.write_non_ref(ctx, value, Some(&*serializer))
        };
        ctx.generics.pop();
        result
    }

    /// Reads a value written by [Self::write_container_field_value].
    fn read_container_field_value(
        &self,
        ctx: &mut ReadContext<'_>,
        declared: &FieldType,
        track_ref: bool,
        nullable: bool,
    ) -> Result<Value, Error> {
        let serializer = ctx.registry.serializer(declared)?;
        ctx.generics.push(declared.clone());
        let result = if track_ref {
            self.read_ref(ctx, Some(&*serializer))
        } else if nullable {
            self.read_nullable(ctx, Some(&*serializer))
        } else {
            self.read_non_ref(ctx, Some(&*serializer))
        };
        ctx.generics.pop();
        result
    }
}

/// Binding for peers running this crate.
#[derive(Debug, Clone, Copy)]
pub struct NativeBinding;

impl NativeBinding {
    const fn primitive_id(p: Primitive) -> u32 {
        match p {
            Primitive::Bool => native::BOOL,
            Primitive::I8 => native::INT8,
            Primitive::I16 => native::INT16,
            Primitive::Char => native::CHAR,
            Primitive::I32 => native::INT32,
            Primitive::I64 => native::INT64,
            Primitive::F32 => native::FLOAT32,
            Primitive::F64 => native::FLOAT64,
        }
    }
}

impl Binding for NativeBinding {
    fn protocol(&self) -> Protocol {
        Protocol::Native
    }

    fn write_tag(&self, tag: TypeTag<'_>, buf: &mut BytesMut) -> Result<(), Error> {
        match tag {
            TypeTag::Primitive(p) => varint::write(Self::primitive_id(p), buf),
            TypeTag::String => varint::write(native::STRING, buf),
            TypeTag::Enum(ident) => {
                varint::write(native::ENUM, buf);
                ident.write(buf);
            }
            TypeTag::Struct(ident) => {
                varint::write(native::STRUCT, buf);
                ident.write(buf);
            }
            TypeTag::Compatible(_) => varint::write(native::COMPATIBLE_STRUCT, buf),
            TypeTag::List => varint::write(native::LIST, buf),
            TypeTag::Array => varint::write(native::ARRAY, buf),
            TypeTag::Map => varint::write(native::MAP, buf),
        }
        Ok(())
    }

    fn read_tag(&self, buf: &mut Bytes, cfg: &Config) -> Result<ReadTag, Error> {
        let id: u32 = varint::read(buf)?;
        Ok(match id {
            native::BOOL => ReadTag::Primitive(Primitive::Bool),
            native::INT8 => ReadTag::Primitive(Primitive::I8),
            native::INT16 => ReadTag::Primitive(Primitive::I16),
            native::CHAR => ReadTag::Primitive(Primitive::Char),
            native::INT32 => ReadTag::Primitive(Primitive::I32),
            native::INT64 => ReadTag::Primitive(Primitive::I64),
            native::FLOAT32 => ReadTag::Primitive(Primitive::F32),
            native::FLOAT64 => ReadTag::Primitive(Primitive::F64),
            native::STRING => ReadTag::String,
            native::ENUM => ReadTag::Enum(TypeIdent::read(buf, cfg)?),
            native::STRUCT => ReadTag::Struct(TypeIdent::read(buf, cfg)?),
            native::COMPATIBLE_STRUCT => ReadTag::Compatible,
            native::LIST => ReadTag::List,
            native::ARRAY => ReadTag::Array,
            native::MAP => ReadTag::Map,
            id => return Err(Error::InvalidTypeId(id)),
        })
    }

    fn write_i32(&self, cfg: &Config, value: i32, buf: &mut BytesMut) {
        if cfg.compress_int {
            varint::write_signed::<u32, i32>(value, buf);
        } else {
            buf.put_i32_le(value);
        }
    }

    fn read_i32(&self, cfg: &Config, buf: &mut Bytes) -> Result<i32, Error> {
        if cfg.compress_int {
            varint::read_signed::<u32, i32>(buf)
        } else {
            buffer::read_i32(buf)
        }
    }

    fn write_i64(&self, cfg: &Config, value: i64, buf: &mut BytesMut) {
        if cfg.compress_long {
            varint::write_signed::<u64, i64>(value, buf);
        } else {
            buf.put_i64_le(value);
        }
    }

    fn read_i64(&self, cfg: &Config, buf: &mut Bytes) -> Result<i64, Error> {
        if cfg.compress_long {
            varint::read_signed::<u64, i64>(buf)
        } else {
            buffer::read_i64(buf)
        }
    }

    fn write_char(&self, value: u16, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16_le(value);
        Ok(())
    }

    fn read_char(&self, buf: &mut Bytes) -> Result<u16, Error> {
        buffer::read_u16(buf)
    }
}

/// Binding for peers in other languages.
#[derive(Debug, Clone, Copy)]
pub struct XlangBinding;

impl XlangBinding {
    fn unsupported_char() -> Error {
        Error::Unsupported("char is not part of the cross-language type system".into())
    }

    /// Writes the user id or the name of a named type.
    fn write_ident(ident: &TypeIdent, by_id: u32, by_name: u32, buf: &mut BytesMut) {
        match ident {
            TypeIdent::Id(id) => {
                varint::write(by_id, buf);
                varint::write(*id, buf);
            }
            TypeIdent::Named(name) => {
                varint::write(by_name, buf);
                name.write(buf);
            }
        }
    }
}

impl Binding for XlangBinding {
    fn protocol(&self) -> Protocol {
        Protocol::Xlang
    }

    fn write_tag(&self, tag: TypeTag<'_>, buf: &mut BytesMut) -> Result<(), Error> {
        let id = match tag {
            TypeTag::Primitive(Primitive::Bool) => xlang::BOOL,
            TypeTag::Primitive(Primitive::I8) => xlang::INT8,
            TypeTag::Primitive(Primitive::I16) => xlang::INT16,
            TypeTag::Primitive(Primitive::Char) => return Err(Self::unsupported_char()),
            TypeTag::Primitive(Primitive::I32) => xlang::VAR_INT32,
            TypeTag::Primitive(Primitive::I64) => xlang::VAR_INT64,
            TypeTag::Primitive(Primitive::F32) => xlang::FLOAT32,
            TypeTag::Primitive(Primitive::F64) => xlang::FLOAT64,
            TypeTag::String => xlang::STRING,
            TypeTag::Enum(ident) => {
                Self::write_ident(ident, xlang::ENUM, xlang::NAMED_ENUM, buf);
                return Ok(());
            }
            TypeTag::Struct(ident) => {
                Self::write_ident(ident, xlang::STRUCT, xlang::NAMED_STRUCT, buf);
                return Ok(());
            }
            TypeTag::Compatible(TypeIdent::Id(_)) => xlang::COMPATIBLE_STRUCT,
            TypeTag::Compatible(TypeIdent::Named(_)) => xlang::NAMED_COMPATIBLE_STRUCT,
            TypeTag::List => xlang::LIST,
            TypeTag::Array => xlang::ARRAY,
            TypeTag::Map => xlang::MAP,
        };
        varint::write(id, buf);
        Ok(())
    }

    fn read_tag(&self, buf: &mut Bytes, cfg: &Config) -> Result<ReadTag, Error> {
        let id: u32 = varint::read(buf)?;
        Ok(match id {
            xlang::BOOL => ReadTag::Primitive(Primitive::Bool),
            xlang::INT8 => ReadTag::Primitive(Primitive::I8),
            xlang::INT16 => ReadTag::Primitive(Primitive::I16),
            xlang::VAR_INT32 => ReadTag::Primitive(Primitive::I32),
            xlang::VAR_INT64 => ReadTag::Primitive(Primitive::I64),
            xlang::FLOAT32 => ReadTag::Primitive(Primitive::F32),
            xlang::FLOAT64 => ReadTag::Primitive(Primitive::F64),
            xlang::STRING => ReadTag::String,
            xlang::ENUM => ReadTag::Enum(TypeIdent::Id(varint::read(buf)?)),
            xlang::NAMED_ENUM => {
                ReadTag::Enum(TypeIdent::Named(TypeName::read(buf, &cfg.max_string_len)?))
            }
            xlang::STRUCT => ReadTag::Struct(TypeIdent::Id(varint::read(buf)?)),
            xlang::NAMED_STRUCT => {
                ReadTag::Struct(TypeIdent::Named(TypeName::read(buf, &cfg.max_string_len)?))
            }
            xlang::COMPATIBLE_STRUCT | xlang::NAMED_COMPATIBLE_STRUCT => ReadTag::Compatible,
            xlang::LIST => ReadTag::List,
            xlang::ARRAY => ReadTag::Array,
            xlang::MAP => ReadTag::Map,
            id => return Err(Error::InvalidTypeId(id)),
        })
    }

    fn write_i32(&self, _: &Config, value: i32, buf: &mut BytesMut) {
        varint::write_signed::<u32, i32>(value, buf);
    }

    fn read_i32(&self, _: &Config, buf: &mut Bytes) -> Result<i32, Error> {
        varint::read_signed::<u32, i32>(buf)
    }

    fn write_i64(&self, _: &Config, value: i64, buf: &mut BytesMut) {
        varint::write_signed::<u64, i64>(value, buf);
    }

    fn read_i64(&self, _: &Config, buf: &mut Bytes) -> Result<i64, Error> {
        varint::read_signed::<u64, i64>(buf)
    }

    fn write_char(&self, _: u16, _: &mut BytesMut) -> Result<(), Error> {
        Err(Self::unsupported_char())
    }

    fn read_char(&self, _: &mut Bytes) -> Result<u16, Error> {
        Err(Self::unsupported_char())
    }
}

static NATIVE: NativeBinding = NativeBinding;
static XLANG: XlangBinding = XlangBinding;

/// Returns the binding implementing `protocol`.
pub fn for_protocol(protocol: Protocol) -> &'static dyn Binding {
    match protocol {
        Protocol::Native => &NATIVE,
        Protocol::Xlang => &XLANG,
    }
}
