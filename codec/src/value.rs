//! Values and the arena that holds an object graph.
//!
//! Every node with identity (objects, lists, arrays, maps, placeholders) lives in a [Heap] and is
//! referenced through a [Handle]. Two fields pointing at the same handle share the node; a node
//! whose fields lead back to its own handle forms a cycle.

use crate::{descriptor::ClassDescriptor, registry::TypeDef, Error, TypeName};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

/// Address of a node in a [Heap].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A constant of an enum type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EnumValue {
    /// A constant the local registry knows.
    Known { ty: TypeName, ordinal: u32 },

    /// A constant that could not be resolved when decoding.
    ///
    /// Whatever the stream carried (ordinal or name) is kept so the value can be forwarded.
    Unknown {
        ty: Option<TypeName>,
        ordinal: Option<u32>,
        name: Option<String>,
    },
}

impl EnumValue {
    pub fn known(ty: TypeName, ordinal: u32) -> Self {
        Self::Known { ty, ordinal }
    }

    /// Enum type of the constant, if known.
    pub fn ty(&self) -> Option<&TypeName> {
        match self {
            Self::Known { ty, .. } => Some(ty),
            Self::Unknown { ty, .. } => ty.as_ref(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

/// A single field, element, or root value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    Char(u16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Enum(EnumValue),
    Ref(Handle),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Self::Ref(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::Char(_) => "char",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::Ref(_) => "ref",
        }
    }

    /// Compares two scalars; floats are compared bitwise so `NaN` equals itself.
    fn scalar_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

macro_rules! impl_from {
    ($($type:ty => $variant:ident),*) => {
        $(
            impl From<$type> for Value {
                fn from(value: $type) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}
impl_from!(bool => Bool, i8 => I8, i16 => I16, i32 => I32, i64 => I64, f32 => F32, f64 => F64);
impl_from!(String => String, EnumValue => Enum, Handle => Ref);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// An instance of a registered struct or record type.
#[derive(Clone, Debug)]
pub struct Object {
    def: Arc<TypeDef>,
    values: Vec<Value>,
}

impl Object {
    /// Creates an instance with every field at its default value.
    pub fn new(def: Arc<TypeDef>) -> Self {
        let values = def.fields().iter().map(|f| f.meta.ty.default_value()).collect();
        Self { def, values }
    }

    pub(crate) fn from_values(def: Arc<TypeDef>, values: Vec<Value>) -> Self {
        Self { def, values }
    }

    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    pub fn ty(&self) -> &TypeName {
        self.def.name()
    }

    /// Field values in slot order (inherited fields first).
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value of the field `name`, preferring the most derived declaration.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.def.slot(name).map(|slot| &self.values[slot])
    }

    /// Returns the value of the field `name` declared by `declaring`.
    pub fn get_declared(&self, declaring: &TypeName, name: &str) -> Option<&Value> {
        self.def
            .declared_slot(declaring, name)
            .map(|slot| &self.values[slot])
    }

    /// Sets the field `name`, preferring the most derived declaration.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let slot = self
            .def
            .slot(name)
            .ok_or_else(|| Error::UnknownType(format!("{}.{}", self.def.name(), name)))?;
        self.values[slot] = value.into();
        Ok(())
    }

    /// Sets the field `name` and returns the object.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.set(name, value)?;
        Ok(self)
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) {
        if let Some(entry) = self.values.get_mut(slot) {
            *entry = value;
        }
    }
}

/// Stand-in for an instance of a type the reader does not know.
///
/// Holds one value per field of the writer's descriptor, in descriptor order.
#[derive(Clone, Debug)]
pub struct Placeholder {
    descriptor: Arc<ClassDescriptor>,
    values: Vec<Value>,
}

impl Placeholder {
    pub(crate) fn new(descriptor: Arc<ClassDescriptor>) -> Self {
        let values = descriptor
            .fields()
            .iter()
            .map(|f| f.ty.default_value())
            .collect();
        Self { descriptor, values }
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterates `(qualified field name, value)` in descriptor order.
    pub fn entries(&self) -> impl Iterator<Item = (String, &Value)> + '_ {
        self.descriptor
            .fields()
            .iter()
            .map(|f| f.qualified())
            .zip(self.values.iter())
    }

    /// Returns the value of the field `name`, preferring the most derived declaration.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.descriptor
            .fields()
            .iter()
            .rposition(|f| f.name == name)
            .map(|i| &self.values[i])
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) {
        if let Some(entry) = self.values.get_mut(slot) {
            *entry = value;
        }
    }
}

/// A node with identity.
#[derive(Clone, Debug)]
pub enum Node {
    Object(Object),
    List(Vec<Value>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Placeholder(Placeholder),
}

/// Arena holding the nodes of one or more object graphs.
#[derive(Clone, Debug, Default)]
pub struct Heap {
    nodes: Vec<Node>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node and returns its handle.
    pub fn insert(&mut self, node: impl Into<Node>) -> Handle {
        let handle = Handle(self.nodes.len() as u32);
        self.nodes.push(node.into());
        handle
    }

    /// Adds an object and returns a reference to it.
    pub fn alloc(&mut self, object: Object) -> Value {
        Value::Ref(self.insert(object))
    }

    pub fn get(&self, handle: Handle) -> Result<&Node, Error> {
        self.nodes
            .get(handle.index())
            .ok_or(Error::DanglingHandle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Node, Error> {
        self.nodes
            .get_mut(handle.index())
            .ok_or(Error::DanglingHandle(handle))
    }

    /// Drops every node inserted after the heap held `len` nodes.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    /// Replaces the node at `handle`.
    pub fn replace(&mut self, handle: Handle, node: impl Into<Node>) -> Result<(), Error> {
        *self.get_mut(handle)? = node.into();
        Ok(())
    }

    pub fn object(&self, handle: Handle) -> Result<&Object, Error> {
        match self.get(handle)? {
            Node::Object(object) => Ok(object),
            _ => Err(Error::TypeMismatch {
                context: format!("{handle:?}"),
                expected: "object".into(),
            }),
        }
    }

    pub fn object_mut(&mut self, handle: Handle) -> Result<&mut Object, Error> {
        match self.get_mut(handle)? {
            Node::Object(object) => Ok(object),
            _ => Err(Error::TypeMismatch {
                context: format!("{handle:?}"),
                expected: "object".into(),
            }),
        }
    }

    /// Returns true if the graph reachable from `a` in `self` has the same shape as the one
    /// reachable from `b` in `other`: equal scalars, equal types, and the same sharing and
    /// cycle structure.
    pub fn isomorphic(&self, a: &Value, other: &Heap, b: &Value) -> bool {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        let mut pending = vec![(a.clone(), b.clone())];
        while let Some((a, b)) = pending.pop() {
            let (ha, hb) = match (&a, &b) {
                (Value::Ref(ha), Value::Ref(hb)) => (*ha, *hb),
                (a, b) => {
                    if !a.scalar_eq(b) {
                        return false;
                    }
                    continue;
                }
            };
            match (forward.entry(ha), backward.entry(hb)) {
                (Entry::Occupied(f), Entry::Occupied(b)) => {
                    if *f.get() != hb || *b.get() != ha {
                        return false;
                    }
                    continue;
                }
                (Entry::Vacant(f), Entry::Vacant(b)) => {
                    f.insert(hb);
                    b.insert(ha);
                }
                _ => return false,
            }
            let (Ok(na), Ok(nb)) = (self.get(ha), other.get(hb)) else {
                return false;
            };
            match (na, nb) {
                (Node::Object(oa), Node::Object(ob)) => {
                    if oa.ty() != ob.ty() || oa.values.len() != ob.values.len() {
                        return false;
                    }
                    pending.extend(oa.values.iter().cloned().zip(ob.values.iter().cloned()));
                }
                (Node::List(la), Node::List(lb)) | (Node::Array(la), Node::Array(lb)) => {
                    if la.len() != lb.len() {
                        return false;
                    }
                    pending.extend(la.iter().cloned().zip(lb.iter().cloned()));
                }
                (Node::Map(ma), Node::Map(mb)) => {
                    if ma.len() != mb.len() {
                        return false;
                    }
                    for ((ka, va), (kb, vb)) in ma.iter().zip(mb.iter()) {
                        pending.push((ka.clone(), kb.clone()));
                        pending.push((va.clone(), vb.clone()));
                    }
                }
                (Node::Placeholder(pa), Node::Placeholder(pb)) => {
                    if pa.descriptor.id() != pb.descriptor.id() {
                        return false;
                    }
                    pending.extend(pa.values.iter().cloned().zip(pb.values.iter().cloned()));
                }
                _ => return false,
            }
        }
        true
    }
}

impl From<Object> for Node {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Placeholder> for Node {
    fn from(placeholder: Placeholder) -> Self {
        Self::Placeholder(placeholder)
    }
}

/// A decoded object graph.
#[derive(Clone, Debug)]
pub struct Graph {
    pub heap: Heap,
    pub root: Value,
}
