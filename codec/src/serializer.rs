//! Serializers for value payloads.
//!
//! A serializer writes and reads the payload of one kind of value. Flags and type info around the
//! payload are the concern of the [crate::binding::Binding] that routes to it.

use crate::{
    context::{ReadContext, WriteContext},
    reference::{NOT_NULL_VALUE_FLAG, NULL_FLAG},
    Config, Error, FieldType, Registry, Value,
};
use bytes::BufMut;
use std::fmt::Debug;

pub mod compatible;
pub mod containers;
pub mod enums;
pub mod object;
pub mod placeholder;
pub mod primitives;

/// Writes and reads the payload of a value.
pub trait Serializer: Debug + Send + Sync {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error>;

    /// Reads a payload.
    ///
    /// Serializers that allocate a node must call [ReadContext::reference] right after
    /// allocating it and before reading anything the node contains.
    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error>;
}

/// How a declared value is framed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Shape {
    pub nullable: bool,
    pub track_ref: bool,
    pub monomorphic: bool,
}

impl Shape {
    /// Shape of a list element, map key, or map value declared as `ty`.
    pub fn element(ty: &FieldType, cfg: &Config, registry: &Registry) -> Self {
        Self {
            nullable: !matches!(ty, FieldType::Primitive(_)),
            track_ref: cfg.track_ref && ty.is_referencable(),
            monomorphic: is_monomorphic(ty, cfg, registry),
        }
    }
}

/// Whether values declared as `ty` are written without type info.
pub(crate) fn is_monomorphic(ty: &FieldType, cfg: &Config, registry: &Registry) -> bool {
    match ty {
        FieldType::Primitive(_)
        | FieldType::Boxed(_)
        | FieldType::String
        | FieldType::Enum(_)
        | FieldType::List(_)
        | FieldType::Map(..) => true,
        FieldType::Struct(name) => !cfg.is_compatible() && registry.is_final(name),
        FieldType::Any | FieldType::Array(_) => false,
    }
}

/// Routes a value to the ref-tracked, nullable, or plain write path.
///
/// Without a serializer, type info is written before the payload.
pub(crate) fn write_routed(
    ctx: &mut WriteContext<'_>,
    value: &Value,
    serializer: Option<&dyn Serializer>,
    shape: Shape,
    context: &str,
) -> Result<(), Error> {
    let binding = ctx.binding;
    if shape.track_ref {
        return binding.write_ref(ctx, value, serializer);
    }
    if shape.nullable {
        return binding.write_nullable(ctx, value, serializer);
    }
    if value.is_null() {
        return Err(Error::UnexpectedNull(context.to_string()));
    }
    binding.write_non_ref(ctx, value, serializer)
}

/// Reads a value written by [write_routed].
pub(crate) fn read_routed(
    ctx: &mut ReadContext<'_>,
    serializer: Option<&dyn Serializer>,
    shape: Shape,
) -> Result<Value, Error> {
    let binding = ctx.binding;
    if shape.track_ref {
        return binding.read_ref(ctx, serializer);
    }
    if shape.nullable {
        return binding.read_nullable(ctx, serializer);
    }
    binding.read_non_ref(ctx, serializer)
}

/// Writes a value of the declared type `ty`.
pub(crate) fn write_declared(
    ctx: &mut WriteContext<'_>,
    ty: &FieldType,
    shape: Shape,
    value: &Value,
    context: &str,
) -> Result<(), Error> {
    match ty {
        FieldType::Primitive(p) => primitives::write_primitive(ctx, *p, value, context),
        FieldType::Boxed(_) | FieldType::String => {
            if shape.nullable {
                if value.is_null() {
                    ctx.buf.put_i8(NULL_FLAG);
                    return Ok(());
                }
                ctx.buf.put_i8(NOT_NULL_VALUE_FLAG);
            }
            match ty {
                FieldType::Boxed(p) => primitives::write_primitive(ctx, *p, value, context),
                _ => primitives::write_string(ctx, value, context),
            }
        }
        FieldType::List(_) | FieldType::Map(..) => {
            if !shape.nullable && !shape.track_ref && value.is_null() {
                return Err(Error::UnexpectedNull(context.to_string()));
            }
            let binding = ctx.binding;
            binding.write_container_field_value(ctx, value, ty, shape.track_ref, shape.nullable)
        }
        _ => {
            let serializer = match shape.monomorphic {
                true => Some(ctx.registry.serializer(ty)?),
                false => None,
            };
            write_routed(ctx, value, serializer.as_deref(), shape, context)
        }
    }
}

/// Reads a value written by [write_declared].
pub(crate) fn read_declared(
    ctx: &mut ReadContext<'_>,
    ty: &FieldType,
    shape: Shape,
) -> Result<Value, Error> {
    match ty {
        FieldType::Primitive(p) => primitives::read_primitive(ctx, *p),
        FieldType::Boxed(_) | FieldType::String => {
            if shape.nullable {
                match crate::buffer::read_i8(ctx.buf)? {
                    NULL_FLAG => return Ok(Value::Null),
                    NOT_NULL_VALUE_FLAG => {}
                    flag => return Err(Error::InvalidRefFlag(flag)),
                }
            }
            match ty {
                FieldType::Boxed(p) => primitives::read_primitive(ctx, *p),
                _ => primitives::read_string(ctx),
            }
        }
        FieldType::List(_) | FieldType::Map(..) => {
            let binding = ctx.binding;
            binding.read_container_field_value(ctx, ty, shape.track_ref, shape.nullable)
        }
        _ => {
            let serializer = match shape.monomorphic {
                true => Some(ctx.registry.serializer(ty)?),
                false => None,
            };
            read_routed(ctx, serializer.as_deref(), shape)
        }
    }
}
