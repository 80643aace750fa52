//! Struct and record payloads.
//!
//! # Format
//!
//! In schema-consistent mode with [crate::Config::check_struct_version] set, the payload starts
//! with the little-endian `i32` version hash of the field plan. The fields follow in plan order:
//!
//! ```txt
//! primitives  raw
//! boxed       null flag, then raw
//! finals      ref flag + payload (monomorphic) or ref flag + type info + payload
//! others      ref flag + type info + payload
//! containers  ref flag + payload, elements framed by their declared type
//! ```
//!
//! # Reading
//!
//! A struct is allocated (and registered with the reference table) before its fields are read,
//! so a field pointing back at it resolves to the same node. A record cannot exist until all of
//! its components are known; it is allocated after its fields are read, and a back reference
//! read while its fields are still pending decodes as [Value::Null].

use super::{primitives, write_declared, write_routed, Serializer, Shape};
use crate::{
    buffer,
    classifier::{FieldInfo, FieldPlan},
    context::{ReadContext, WriteContext},
    registry::TypeDef,
    serializer::{read_declared, read_routed},
    Error, Handle, Node, Object, Value,
};
use bytes::BufMut;
use std::{borrow::Cow, sync::Arc};
use tracing::warn;

fn shape(field: &FieldInfo, monomorphic: bool) -> Shape {
    Shape {
        nullable: field.nullable,
        track_ref: field.track_ref,
        monomorphic,
    }
}

/// Writes the fields of `values` (laid out by slot) in plan order.
///
/// Fields the plan names but `values` lacks are written with their default value.
pub(crate) fn write_fields(
    ctx: &mut WriteContext<'_>,
    plan: &FieldPlan,
    values: &[Value],
) -> Result<(), Error> {
    let value = |field: &FieldInfo| match field.slot.and_then(|slot| values.get(slot)) {
        Some(value) => Cow::Borrowed(value),
        None => Cow::Owned(field.ty.default_value()),
    };

    for field in &plan.primitives {
        let FieldInfo { ty, qualified, .. } = field;
        let crate::FieldType::Primitive(p) = ty else {
            return Err(Error::TypeMismatch {
                context: qualified.clone(),
                expected: "primitive".into(),
            });
        };
        primitives::write_primitive(ctx, *p, &value(field), qualified)?;
    }
    for field in &plan.boxed {
        write_declared(ctx, &field.ty, shape(field, true), &value(field), &field.qualified)?;
    }
    for (field, monomorphic) in plan.finals.iter().zip(&plan.finals_monomorphic) {
        let shape = shape(field, *monomorphic);
        let serializer = match monomorphic {
            true => Some(field.serializer(ctx.registry)?),
            false => None,
        };
        write_routed(
            ctx,
            &value(field),
            serializer.as_deref(),
            shape,
            &field.qualified,
        )?;
    }
    for field in &plan.others {
        write_routed(ctx, &value(field), None, shape(field, false), &field.qualified)?;
    }
    for field in &plan.containers {
        write_declared(ctx, &field.ty, shape(field, true), &value(field), &field.qualified)?;
    }
    Ok(())
}

/// Where decoded field values are stored.
pub(crate) enum Target<'a> {
    /// An object or placeholder already in the heap.
    Node(Handle),
    /// Components of a record not yet allocated.
    Components(&'a mut Vec<Value>),
}

impl Target<'_> {
    fn store(&mut self, ctx: &mut ReadContext<'_>, slot: usize, value: Value) -> Result<(), Error> {
        match self {
            Self::Node(handle) => match ctx.heap.get_mut(*handle)? {
                Node::Object(object) => object.set_slot(slot, value),
                Node::Placeholder(placeholder) => placeholder.set_slot(slot, value),
                _ => {
                    return Err(Error::TypeMismatch {
                        context: format!("{handle:?}"),
                        expected: "object".into(),
                    })
                }
            },
            Self::Components(components) => {
                if let Some(entry) = components.get_mut(slot) {
                    *entry = value;
                }
            }
        }
        Ok(())
    }
}

/// Reads fields written by [write_fields], storing each at its slot in `target`.
///
/// Fields without a slot are read and dropped.
pub(crate) fn read_fields(
    ctx: &mut ReadContext<'_>,
    plan: &FieldPlan,
    target: &mut Target<'_>,
) -> Result<(), Error> {
    for field in &plan.primitives {
        let crate::FieldType::Primitive(p) = &field.ty else {
            return Err(Error::TypeMismatch {
                context: field.qualified.clone(),
                expected: "primitive".into(),
            });
        };
        let value = primitives::read_primitive(ctx, *p)?;
        store(ctx, target, field, value)?;
    }
    for field in &plan.boxed {
        let value = read_declared(ctx, &field.ty, shape(field, true))?;
        store(ctx, target, field, value)?;
    }
    for (field, monomorphic) in plan.finals.iter().zip(&plan.finals_monomorphic) {
        let serializer = match monomorphic {
            true => Some(field.serializer(ctx.registry)?),
            false => None,
        };
        let value = read_routed(ctx, serializer.as_deref(), shape(field, *monomorphic))?;
        store(ctx, target, field, value)?;
    }
    for field in &plan.others {
        let value = read_routed(ctx, None, shape(field, false))?;
        store(ctx, target, field, value)?;
    }
    for field in &plan.containers {
        let value = read_declared(ctx, &field.ty, shape(field, true))?;
        store(ctx, target, field, value)?;
    }
    Ok(())
}

fn store(
    ctx: &mut ReadContext<'_>,
    target: &mut Target<'_>,
    field: &FieldInfo,
    value: Value,
) -> Result<(), Error> {
    match field.slot {
        Some(slot) => target.store(ctx, slot, value),
        None => Ok(()),
    }
}

/// Reads an instance of `def` whose fields are laid out by `plan`.
pub(crate) fn read_instance(
    ctx: &mut ReadContext<'_>,
    def: &Arc<TypeDef>,
    plan: &FieldPlan,
) -> Result<Value, Error> {
    if !def.is_record() {
        let handle = ctx.heap.insert(Object::new(def.clone()));
        let value = Value::Ref(handle);
        ctx.reference(&value);
        read_fields(ctx, plan, &mut Target::Node(handle))?;
        return Ok(value);
    }

    let mut components = ctx.take_scratch();
    components.extend(def.fields().iter().map(|f| f.meta.ty.default_value()));
    if let Err(err) = read_fields(ctx, plan, &mut Target::Components(&mut components)) {
        ctx.return_scratch(components);
        return Err(err);
    }
    let object = Object::from_values(def.clone(), components.drain(..).collect());
    ctx.return_scratch(components);
    let value = ctx.heap.alloc(object);
    ctx.reference(&value);
    Ok(value)
}

/// Payload of a registered struct or record.
#[derive(Debug)]
pub struct ObjectSerializer {
    def: Arc<TypeDef>,
}

impl ObjectSerializer {
    pub fn new(def: Arc<TypeDef>) -> Self {
        Self { def }
    }

    fn versioned(cfg: &crate::Config) -> bool {
        !cfg.is_compatible() && cfg.check_struct_version
    }
}

/// Returns the object behind `value` if it is an instance of `def`.
pub(crate) fn expect_object<'h>(
    heap: &'h crate::Heap,
    value: &Value,
    def: &TypeDef,
) -> Result<&'h Object, Error> {
    let mismatch = || Error::TypeMismatch {
        context: value.kind().into(),
        expected: def.name().to_string(),
    };
    let Value::Ref(handle) = value else {
        return Err(mismatch());
    };
    let object = heap.object(*handle)?;
    if object.ty() != def.name() {
        return Err(mismatch());
    }
    // Values are laid out by the slots of `def`.
    let layout = object.def();
    if !std::ptr::eq(layout.as_ref(), def)
        && (layout.kind() != def.kind() || layout.fields() != def.fields())
    {
        return Err(Error::TypeMismatch {
            context: format!("{} with a different field layout", object.ty()),
            expected: def.name().to_string(),
        });
    }
    Ok(object)
}

impl Serializer for ObjectSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let heap = ctx.heap;
        let object = expect_object(heap, value, &self.def)?;
        let plan = ctx.plans.local(&self.def, ctx.registry, ctx.cfg);
        if Self::versioned(ctx.cfg) {
            ctx.buf.put_i32_le(plan.version_hash());
        }
        write_fields(ctx, &plan, object.values())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        let plan = ctx.plans.local(&self.def, ctx.registry, ctx.cfg);
        if Self::versioned(ctx.cfg) {
            let read = buffer::read_i32(ctx.buf)?;
            let expected = plan.version_hash();
            if read != expected {
                warn!(ty = %self.def.name(), read, expected, "struct version mismatch");
                return Err(Error::VersionMismatch {
                    ty: self.def.name().clone(),
                    read,
                    expected,
                });
            }
        }
        read_instance(ctx, &self.def, &plan)
    }
}
