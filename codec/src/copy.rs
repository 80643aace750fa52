//! Deep copies of object graphs within a heap.

use crate::{Error, Handle, Heap, Node, Object, Value};
use std::collections::{HashMap, HashSet};

/// Per-call state of a deep copy.
///
/// Every node is copied at most once: a handle reached again maps to its copy, so sharing and
/// cycles carry over. Mutable nodes are allocated (and mapped) before their contents are copied.
/// Records are allocated only after their components are copied, so a cycle through a record
/// cannot be copied.
#[derive(Debug, Default)]
pub(crate) struct Copier {
    copies: HashMap<Handle, Handle>,
    pending: HashSet<Handle>,
}

impl Copier {
    pub fn reset(&mut self) {
        self.copies.clear();
        self.pending.clear();
    }

    pub fn copy(&mut self, heap: &mut Heap, value: &Value) -> Result<Value, Error> {
        let Value::Ref(handle) = value else {
            return Ok(value.clone());
        };
        let handle = *handle;
        if let Some(copy) = self.copies.get(&handle) {
            return Ok(Value::Ref(*copy));
        }
        if self.pending.contains(&handle) {
            return Err(Error::Unsupported(format!(
                "cycle through record {handle:?} cannot be copied"
            )));
        }

        let copy = match heap.get(handle)? {
            Node::Object(object) if object.def().is_immutable() => {
                self.copies.insert(handle, handle);
                return Ok(value.clone());
            }
            Node::Object(object) if object.def().is_record() => {
                let def = object.def().clone();
                let values = object.values().to_vec();
                self.pending.insert(handle);
                let components = self.copy_all(heap, &values);
                self.pending.remove(&handle);
                heap.insert(Object::from_values(def, components?))
            }
            Node::Object(object) => {
                let def = object.def().clone();
                let values = object.values().to_vec();
                let copy = heap.insert(Object::new(def));
                self.copies.insert(handle, copy);
                for (slot, value) in values.iter().enumerate() {
                    let value = self.copy(heap, value)?;
                    heap.object_mut(copy)?.set_slot(slot, value);
                }
                copy
            }
            Node::List(items) | Node::Array(items) => {
                let array = matches!(heap.get(handle)?, Node::Array(_));
                let items = items.clone();
                let copy = heap.insert(Node::List(Vec::new()));
                self.copies.insert(handle, copy);
                let items = self.copy_all(heap, &items)?;
                let node = match array {
                    true => Node::Array(items),
                    false => Node::List(items),
                };
                heap.replace(copy, node)?;
                copy
            }
            Node::Map(entries) => {
                let entries = entries.clone();
                let copy = heap.insert(Node::Map(Vec::new()));
                self.copies.insert(handle, copy);
                let mut copied = Vec::with_capacity(entries.len());
                for (key, value) in &entries {
                    copied.push((self.copy(heap, key)?, self.copy(heap, value)?));
                }
                heap.replace(copy, Node::Map(copied))?;
                copy
            }
            Node::Placeholder(_) => {
                return Err(Error::Unsupported(
                    "placeholders cannot be copied".into(),
                ))
            }
        };
        self.copies.insert(handle, copy);
        Ok(Value::Ref(copy))
    }

    fn copy_all(&mut self, heap: &mut Heap, values: &[Value]) -> Result<Vec<Value>, Error> {
        values.iter().map(|value| self.copy(heap, value)).collect()
    }
}
