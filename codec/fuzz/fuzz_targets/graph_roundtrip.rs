#![no_main]

use arbitrary::Arbitrary;
use commonware_graph_codec::{
    Config, Engine, FieldMeta, FieldType, Handle, Heap, Node, Object, Primitive, Protocol,
    TypeDef, Value,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const MAX_NODES: usize = 64;

#[derive(Arbitrary, Debug)]
enum Scalar {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::I8(v) => Value::I8(v),
            Scalar::I16(v) => Value::I16(v),
            Scalar::I32(v) => Value::I32(v),
            Scalar::I64(v) => Value::I64(v),
            Scalar::F32(v) => Value::F32(v),
            Scalar::F64(v) => Value::F64(v),
            Scalar::String(v) => Value::String(v),
        }
    }
}

/// A value that is either a scalar or an edge to another node (by index, modulo node count).
#[derive(Arbitrary, Debug)]
enum Slot {
    Scalar(Scalar),
    Edge(u8),
}

#[derive(Arbitrary, Debug)]
enum Shape {
    Object {
        weight: i64,
        count: Option<i32>,
        next: Option<u8>,
        any: Slot,
    },
    List(Vec<Slot>),
    Map(Vec<(String, Slot)>),
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    nodes: Vec<Shape>,
    root: u8,
    compatible: bool,
    xlang: bool,
}

fn vertex() -> Arc<TypeDef> {
    TypeDef::structure("fuzz", "Vertex")
        .field(FieldMeta::new("weight", FieldType::I64))
        .field(FieldMeta::new("count", FieldType::Boxed(Primitive::I32)))
        .field(FieldMeta::new("next", FieldType::structure("fuzz", "Vertex")))
        .field(FieldMeta::new("any", FieldType::Any))
        .build()
}

fn fuzz(input: FuzzInput) {
    let def = vertex();
    let shapes: Vec<Shape> = input.nodes.into_iter().take(MAX_NODES).collect();
    if shapes.is_empty() {
        return;
    }

    // Allocate every node first so edges can point anywhere.
    let mut heap = Heap::new();
    let handles: Vec<Handle> = shapes
        .iter()
        .map(|shape| match shape {
            Shape::Object { .. } => heap.insert(Object::new(def.clone())),
            Shape::List(_) => heap.insert(Node::List(Vec::new())),
            Shape::Map(_) => heap.insert(Node::Map(Vec::new())),
        })
        .collect();
    let node = |index: u8| handles[index as usize % handles.len()];
    let slot = |slot: Slot| match slot {
        Slot::Scalar(scalar) => Value::from(scalar),
        Slot::Edge(index) => Value::Ref(node(index)),
    };

    let mut vertices = Vec::new();
    for (shape, handle) in shapes.into_iter().zip(&handles) {
        match shape {
            Shape::Object {
                weight,
                count,
                next,
                any,
            } => {
                // `next` is declared as a vertex, so it may only point at objects.
                let next = next.map(node).filter(|h| matches!(heap.get(*h), Ok(Node::Object(_))));
                let object = heap.object_mut(*handle).unwrap();
                object.set("weight", weight).unwrap();
                object.set("count", count.map(Value::I32).unwrap_or(Value::Null)).unwrap();
                object.set("any", slot(any)).unwrap();
                vertices.push((*handle, next));
            }
            Shape::List(items) => {
                let items = items.into_iter().map(slot).collect::<Vec<_>>();
                heap.replace(*handle, Node::List(items)).unwrap();
            }
            Shape::Map(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|(key, value)| (Value::String(key), slot(value)))
                    .collect::<Vec<_>>();
                heap.replace(*handle, Node::Map(entries)).unwrap();
            }
        }
    }
    for (handle, next) in vertices {
        let next = next.map(Value::Ref).unwrap_or(Value::Null);
        heap.object_mut(handle).unwrap().set("next", next).unwrap();
    }

    let mut cfg = match input.compatible {
        true => Config::compatible(),
        false => Config::default(),
    };
    if input.xlang {
        cfg.protocol = Protocol::Xlang;
    }
    let mut engine = Engine::new(cfg);
    engine.register(def).unwrap();

    let root = Value::Ref(node(input.root));
    let bytes = engine.serialize(&heap, &root).expect("failed to encode graph");
    let decoded = engine.deserialize(bytes).expect("failed to decode graph");
    assert!(heap.isomorphic(&root, &decoded.heap, &decoded.root));
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
