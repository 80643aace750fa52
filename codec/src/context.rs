//! Per-call state threaded through serializers.

use crate::{
    binding::Binding, classifier::PlanCache, descriptor::MetaContext, reference::RefResolver,
    Config, FieldType, Heap, Registry, Value,
};
use bytes::{Bytes, BytesMut};

/// Stack of declared container types, consulted by list and map serializers to find their
/// element types.
#[derive(Debug, Default)]
pub struct Generics {
    stack: Vec<FieldType>,
}

impl Generics {
    pub fn push(&mut self, ty: FieldType) {
        self.stack.push(ty);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn top(&self) -> Option<&FieldType> {
        self.stack.last()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

/// State of one `serialize` call.
pub struct WriteContext<'a> {
    pub(crate) cfg: &'a Config,
    pub(crate) registry: &'a Registry,
    pub(crate) heap: &'a Heap,
    pub(crate) binding: &'static dyn Binding,
    pub(crate) plans: &'a mut PlanCache,
    pub(crate) buf: &'a mut BytesMut,
    pub(crate) refs: &'a mut RefResolver,
    pub(crate) generics: &'a mut Generics,
    pub(crate) meta: &'a mut MetaContext,
}

impl WriteContext<'_> {
    /// Writes `value` with its type info, tracking it if it has identity.
    pub(crate) fn write_ref(&mut self, value: &Value) -> Result<(), crate::Error> {
        let binding = self.binding;
        binding.write_ref(self, value, None)
    }
}

/// State of one `deserialize` call.
pub struct ReadContext<'a> {
    pub(crate) cfg: &'a Config,
    pub(crate) registry: &'a Registry,
    pub(crate) binding: &'static dyn Binding,
    pub(crate) heap: &'a mut Heap,
    pub(crate) plans: &'a mut PlanCache,
    pub(crate) buf: &'a mut Bytes,
    pub(crate) refs: &'a mut RefResolver,
    pub(crate) generics: &'a mut Generics,
    pub(crate) meta: &'a mut MetaContext,
    pub(crate) scratch: &'a mut Vec<Vec<Value>>,
}

impl ReadContext<'_> {
    /// Reads a value written by [WriteContext::write_ref].
    pub(crate) fn read_ref(&mut self) -> Result<Value, crate::Error> {
        let binding = self.binding;
        binding.read_ref(self, None)
    }

    /// Registers a freshly allocated node with the reference table.
    pub(crate) fn reference(&mut self, value: &Value) {
        self.refs.reference(value);
    }

    /// Takes a cleared buffer for collecting record components.
    pub(crate) fn take_scratch(&mut self) -> Vec<Value> {
        self.scratch.pop().unwrap_or_default()
    }

    /// Returns a buffer taken with [Self::take_scratch].
    pub(crate) fn return_scratch(&mut self, mut buffer: Vec<Value>) {
        buffer.clear();
        self.scratch.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generics_stack() {
        let mut generics = Generics::default();
        assert!(generics.top().is_none());
        generics.push(FieldType::list(FieldType::I32));
        generics.push(FieldType::Any);
        assert_eq!(generics.top(), Some(&FieldType::Any));
        generics.pop();
        assert_eq!(generics.top(), Some(&FieldType::list(FieldType::I32)));
        generics.push(FieldType::String);
        generics.clear();
        assert!(generics.top().is_none());
    }
}
