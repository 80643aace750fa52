//! Primitive and string payloads.

use super::Serializer;
use crate::{
    buffer,
    context::{ReadContext, WriteContext},
    Error, Primitive, Value,
};
use bytes::BufMut;

/// Writes a primitive without any flag.
pub(crate) fn write_primitive(
    ctx: &mut WriteContext<'_>,
    primitive: Primitive,
    value: &Value,
    context: &str,
) -> Result<(), Error> {
    let binding = ctx.binding;
    match (primitive, value) {
        (Primitive::Bool, Value::Bool(v)) => ctx.buf.put_u8(*v as u8),
        (Primitive::I8, Value::I8(v)) => ctx.buf.put_i8(*v),
        (Primitive::I16, Value::I16(v)) => ctx.buf.put_i16_le(*v),
        (Primitive::Char, Value::Char(v)) => binding.write_char(*v, ctx.buf)?,
        (Primitive::I32, Value::I32(v)) => binding.write_i32(ctx.cfg, *v, ctx.buf),
        (Primitive::I64, Value::I64(v)) => binding.write_i64(ctx.cfg, *v, ctx.buf),
        (Primitive::F32, Value::F32(v)) => ctx.buf.put_f32_le(*v),
        (Primitive::F64, Value::F64(v)) => ctx.buf.put_f64_le(*v),
        (_, Value::Null) => return Err(Error::UnexpectedNull(context.to_string())),
        _ => {
            return Err(Error::TypeMismatch {
                context: context.to_string(),
                expected: primitive.name().to_string(),
            })
        }
    }
    Ok(())
}

/// Reads a primitive written by [write_primitive].
pub(crate) fn read_primitive(
    ctx: &mut ReadContext<'_>,
    primitive: Primitive,
) -> Result<Value, Error> {
    let binding = ctx.binding;
    Ok(match primitive {
        Primitive::Bool => Value::Bool(buffer::read_bool(ctx.buf)?),
        Primitive::I8 => Value::I8(buffer::read_i8(ctx.buf)?),
        Primitive::I16 => Value::I16(buffer::read_i16(ctx.buf)?),
        Primitive::Char => Value::Char(binding.read_char(ctx.buf)?),
        Primitive::I32 => Value::I32(binding.read_i32(ctx.cfg, ctx.buf)?),
        Primitive::I64 => Value::I64(binding.read_i64(ctx.cfg, ctx.buf)?),
        Primitive::F32 => Value::F32(buffer::read_f32(ctx.buf)?),
        Primitive::F64 => Value::F64(buffer::read_f64(ctx.buf)?),
    })
}

pub(crate) fn write_string(
    ctx: &mut WriteContext<'_>,
    value: &Value,
    context: &str,
) -> Result<(), Error> {
    match value {
        Value::String(s) => {
            buffer::write_string(s, ctx.buf);
            Ok(())
        }
        Value::Null => Err(Error::UnexpectedNull(context.to_string())),
        _ => Err(Error::TypeMismatch {
            context: context.to_string(),
            expected: "string".into(),
        }),
    }
}

pub(crate) fn read_string(ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
    Ok(Value::String(buffer::read_string(
        ctx.buf,
        &ctx.cfg.max_string_len,
    )?))
}

/// Payload of a primitive value reached through type info.
#[derive(Debug)]
pub struct PrimitiveSerializer(Primitive);

impl PrimitiveSerializer {
    pub fn new(primitive: Primitive) -> Self {
        Self(primitive)
    }
}

impl Serializer for PrimitiveSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        write_primitive(ctx, self.0, value, self.0.name())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        read_primitive(ctx, self.0)
    }
}

#[derive(Debug)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        write_string(ctx, value, "string")
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        read_string(ctx)
    }
}
