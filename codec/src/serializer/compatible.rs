//! Payloads of registered structs whose layout comes from an in-band class descriptor.

use super::{
    object::{expect_object, read_instance, write_fields},
    Serializer,
};
use crate::{
    context::{ReadContext, WriteContext},
    descriptor::ClassDescriptor,
    registry::TypeDef,
    Error, Value,
};
use std::sync::Arc;

/// Reads (and writes) instances of `def` laid out by the fields of `descriptor`.
///
/// Fields the descriptor names but `def` lacks are read and dropped. Fields of `def` the
/// descriptor does not name keep their default value.
#[derive(Debug)]
pub struct CompatibleSerializer {
    descriptor: Arc<ClassDescriptor>,
    def: Arc<TypeDef>,
}

impl CompatibleSerializer {
    pub fn new(descriptor: Arc<ClassDescriptor>, def: Arc<TypeDef>) -> Self {
        Self { descriptor, def }
    }
}

impl Serializer for CompatibleSerializer {
    fn write(&self, ctx: &mut WriteContext<'_>, value: &Value) -> Result<(), Error> {
        let heap = ctx.heap;
        let object = expect_object(heap, value, &self.def)?;
        let plan = ctx
            .plans
            .reconciled(&self.descriptor, Some(&self.def), ctx.registry, ctx.cfg);
        write_fields(ctx, &plan, object.values())
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Value, Error> {
        let plan = ctx
            .plans
            .reconciled(&self.descriptor, Some(&self.def), ctx.registry, ctx.cfg);
        read_instance(ctx, &self.def, &plan)
    }
}
