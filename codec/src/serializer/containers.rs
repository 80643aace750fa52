//! List, array, and map payloads.
//!
//! Declared element types are taken from the top of the generics stack. Elements of a
//! monomorphic declared type are written like fields of that type; anything else is written with
//! its type info.

use super::{read_declared, write_declared, Serializer, Shape};
use crate::{
    buffer,
    context::{ReadContext, WriteContext},
    Error, FieldType, Node, Value,
};
use bytes::Buf;

fn mismatch(expected: &str) -> Error {
    Error::TypeMismatch {
        context: "container".into(),
        expected: expected.into(),
    }
}

/// Writes one element of a container.
fn write_element(
    ctx: &mut WriteContext<'_>,
    declared: Option<&(FieldType, Shape)>,
    value: &Value,
) -> Result<(), Error> {
    match declared {
        Some((ty, shape)) => write_declared(ctx, ty, *shape, value, "element"),
        None => ctx.write_ref(value),
    }
}

fn read_element(
    ctx: &mut ReadContext<'_>,
    declared: Option<&(FieldType, Shape)>,
) -> Result<Value, Error> {
    match declared {
        Some((ty, shape)) => read_declared(ctx, ty, *shape),
        None => ctx.read_ref(),
    }
}

/// Payload of a list (or array): varint length, then each element.
#[derive(Debug)]
pub struct ListSerializer {
    array: bool,
}

impl ListSerializer {
    pub fn new(array: bool) -> Self {
        Self { array }
    }

    fn name(&self) -> &'static str {
        if self.array {
            "array"
        } else {
            "list"
        }
    }
}

impl Serializer for ListSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let Value::Ref(handle) = value else {
            return Err(mismatch(self.name()));
        };
        let heap = ctx.heap;
        let items = match (heap.get(*handle)?, self.array) {
            (Node::List(items), false) | (Node::Array(items), true) => items,
            _ => return Err(mismatch(self.name())),
        };
        let declared = match ctx.generics.top() {
            Some(FieldType::List(element)) | Some(FieldType::Array(element)) => {
                let shape = Shape::element(element, ctx.cfg, ctx.registry);
                Some(((**element).clone(), shape))
            }
            _ => None,
        };

        buffer::write_len(items.len(), ctx.buf);
        for item in items {
            write_element(ctx, declared.as_ref(), item)?;
        }
        Ok(())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        let node = match self.array {
            true => Node::Array(Vec::new()),
            false => Node::List(Vec::new()),
        };
        let handle = ctx.heap.insert(node);
        let value = Value::Ref(handle);
        ctx.reference(&value);

        let declared = match ctx.generics.top() {
            Some(FieldType::List(element)) | Some(FieldType::Array(element)) => {
                let shape = Shape::element(element, ctx.cfg, ctx.registry);
                Some(((**element).clone(), shape))
            }
            _ => None,
        };
        let len = buffer::read_len(ctx.buf, &ctx.cfg.max_collection_len)?;
        let mut items = Vec::with_capacity(len.min(ctx.buf.remaining()));
        for _ in 0..len {
            items.push(read_element(ctx, declared.as_ref())?);
        }

        let node = match self.array {
            true => Node::Array(items),
            false => Node::List(items),
        };
        ctx.heap.replace(handle, node)?;
        Ok(value)
    }
}

/// Payload of a map: varint length, then each key followed by its value.
#[derive(Debug)]
pub struct MapSerializer;

impl MapSerializer {
    #[allow(clippy::type_complexity)]
    fn declared(
        top: Option<&FieldType>,
        cfg: &crate::Config,
        registry: &crate::Registry,
    ) -> (Option<(FieldType, Shape)>, Option<(FieldType, Shape)>) {
        match top {
            Some(FieldType::Map(key, value)) => (
                Some(((**key).clone(), Shape::element(key, cfg, registry))),
                Some(((**value).clone(), Shape::element(value, cfg, registry))),
            ),
            _ => (None, None),
        }
    }
}

impl Serializer for MapSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let Value::Ref(handle) = value else {
            return Err(mismatch("map"));
        };
        let heap = ctx.heap;
        let Node::Map(entries) = heap.get(*handle)? else {
            return Err(mismatch("map"));
        };
        let (key, val) = Self::declared(ctx.generics.top(), ctx.cfg, ctx.registry);

        buffer::write_len(entries.len(), ctx.buf);
        for (k, v) in entries {
            write_element(ctx, key.as_ref(), k)?;
            write_element(ctx, val.as_ref(), v)?;
        }
        Ok(())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        let handle = ctx.heap.insert(Node::Map(Vec::new()));
        let value = Value::Ref(handle);
        ctx.reference(&value);

        let (key, val) = Self::declared(ctx.generics.top(), ctx.cfg, ctx.registry);
        let len = buffer::read_len(ctx.buf, &ctx.cfg.max_collection_len)?;
        let mut entries = Vec::with_capacity(len.min(ctx.buf.remaining()));
        for _ in 0..len {
            let k = read_element(ctx, key.as_ref())?;
            let v = read_element(ctx, val.as_ref())?;
            entries.push((k, v));
        }

        ctx.heap.replace(handle, Node::Map(entries))?;
        Ok(value)
    }
}
