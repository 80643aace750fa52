//! Payloads of structs whose type the reader does not know.

use super::{
    object::{read_fields, write_fields, Target},
    Serializer,
};
use crate::{
    context::{ReadContext, WriteContext},
    descriptor::ClassDescriptor,
    Error, Node, Placeholder, Value,
};
use std::sync::Arc;
use tracing::debug;

/// Reads instances described by `descriptor` into [Placeholder]s, and writes placeholders back
/// out with their own descriptor.
#[derive(Debug)]
pub struct PlaceholderSerializer {
    descriptor: Arc<ClassDescriptor>,
}

impl PlaceholderSerializer {
    pub fn new(descriptor: Arc<ClassDescriptor>) -> Self {
        Self { descriptor }
    }
}

impl Serializer for PlaceholderSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let heap = ctx.heap;
        let placeholder = match value {
            Value::Ref(handle) => match heap.get(*handle)? {
                Node::Placeholder(placeholder) => placeholder,
                _ => return Err(mismatch(value)),
            },
            _ => return Err(mismatch(value)),
        };
        let plan = ctx
            .plans
            .reconciled(placeholder.descriptor(), None, ctx.registry, ctx.cfg);
        write_fields(ctx, &plan, placeholder.values())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        let handle = ctx.heap.insert(Placeholder::new(self.descriptor.clone()));
        let value = Value::Ref(handle);
        ctx.reference(&value);

        let plan = ctx
            .plans
            .reconciled(&self.descriptor, None, ctx.registry, ctx.cfg);
        read_fields(ctx, &plan, &mut Target::Node(handle))?;
        debug!(ty = %self.descriptor.ident(), fields = plan.len(), "decoded placeholder");
        Ok(value)
    }
}

fn mismatch(value: &Value) -> Error {
    Error::TypeMismatch {
        context: value.kind().into(),
        expected: "placeholder".into(),
    }
}
