use commonware_graph_codec::{
    Config, Engine, EnumValue, Error, FieldMeta, FieldType, Graph, Handle, Heap, Node, Object,
    Primitive, Protocol, TypeDef, TypeName, Value,
};
use commonware_macros::test_traced;
use std::sync::Arc;
use test_case::test_case;

fn node_def() -> Arc<TypeDef> {
    TypeDef::structure("test", "Node")
        .field(FieldMeta::new("value", FieldType::I32))
        .field(FieldMeta::new("next", FieldType::structure("test", "Node")))
        .build()
}

fn engine(cfg: Config, defs: &[&Arc<TypeDef>]) -> Engine {
    let mut engine = Engine::new(cfg);
    for def in defs {
        engine.register((*def).clone()).unwrap();
    }
    engine
}

fn roundtrip(engine: &mut Engine, heap: &Heap, root: &Value) -> Graph {
    let bytes = engine.serialize(heap, root).unwrap();
    let graph = engine.deserialize(bytes).unwrap();
    assert!(heap.isomorphic(root, &graph.heap, &graph.root));
    graph
}

fn field(graph: &Graph, handle: Handle, name: &str) -> Value {
    graph.heap.object(handle).unwrap().get(name).unwrap().clone()
}

fn ring(heap: &mut Heap, def: &Arc<TypeDef>, len: usize) -> Value {
    let handles: Vec<Handle> = (0..len)
        .map(|i| heap.insert(Object::new(def.clone()).with("value", i as i32).unwrap()))
        .collect();
    for (i, handle) in handles.iter().enumerate() {
        let next = handles[(i + 1) % len];
        heap.object_mut(*handle).unwrap().set("next", next).unwrap();
    }
    Value::Ref(handles[0])
}

#[test_traced]
fn test_self_cycle() {
    let def = node_def();
    let mut engine = engine(Config::default(), &[&def]);
    let mut heap = Heap::new();
    let root = ring(&mut heap, &def, 1);

    let graph = roundtrip(&mut engine, &heap, &root);
    let handle = graph.root.handle().unwrap();
    assert_eq!(field(&graph, handle, "next"), graph.root);
    assert_eq!(graph.heap.len(), 1);
}

#[test_case(2; "two nodes")]
#[test_case(3; "three nodes")]
#[test_case(64; "long ring")]
fn test_ring(len: usize) {
    let def = node_def();
    for cfg in [Config::default(), Config::compatible()] {
        let mut engine = engine(cfg, &[&def]);
        let mut heap = Heap::new();
        let root = ring(&mut heap, &def, len);
        let graph = roundtrip(&mut engine, &heap, &root);
        assert_eq!(graph.heap.len(), len);

        // Walking `len` steps returns to the root.
        let mut current = graph.root.clone();
        for _ in 0..len {
            current = field(&graph, current.handle().unwrap(), "next");
        }
        assert_eq!(current, graph.root);
    }
}

#[test_traced]
fn test_shared_reference() {
    let point = TypeDef::structure("test", "Point")
        .field(FieldMeta::new("x", FieldType::I64))
        .build();
    let pair = TypeDef::structure("test", "Pair")
        .field(FieldMeta::new("left", FieldType::structure("test", "Point")))
        .field(FieldMeta::new("right", FieldType::structure("test", "Point")))
        .build();
    let mut engine = engine(Config::default(), &[&point, &pair]);
    let mut heap = Heap::new();
    let shared = heap.insert(Object::new(point).with("x", 7i64).unwrap());
    let root = heap.alloc(
        Object::new(pair)
            .with("left", shared)
            .unwrap()
            .with("right", shared)
            .unwrap(),
    );

    let graph = roundtrip(&mut engine, &heap, &root);
    let handle = graph.root.handle().unwrap();
    assert_eq!(field(&graph, handle, "left"), field(&graph, handle, "right"));
    assert_eq!(graph.heap.len(), 2);
}

#[test_traced]
fn test_untracked_duplicates_shared_nodes() {
    let def = TypeDef::structure("test", "Holder")
        .field(FieldMeta::new("items", FieldType::list(FieldType::Any)))
        .build();
    let cfg = Config {
        track_ref: false,
        ..Default::default()
    };
    let mut engine = engine(cfg, &[&def]);
    let mut heap = Heap::new();
    let shared = heap.insert(Node::List(vec![Value::I32(1)]));
    let items = heap.insert(Node::List(vec![Value::Ref(shared), Value::Ref(shared)]));
    let root = heap.alloc(Object::new(def.clone()).with("items", items).unwrap());

    let bytes = engine.serialize(&heap, &root).unwrap();
    let graph = engine.deserialize(bytes).unwrap();
    let items = field(&graph, graph.root.handle().unwrap(), "items");
    let Node::List(items) = graph.heap.get(items.handle().unwrap()).unwrap() else {
        panic!("expected list");
    };
    assert_ne!(items[0], items[1]);
    assert!(!heap.isomorphic(&root, &graph.heap, &graph.root));

    // Cycles cannot be written without tracking.
    let node = node_def();
    let mut engine = engine_untracked(&node);
    let mut heap = Heap::new();
    let root = ring(&mut heap, &node, 2);
    assert!(matches!(
        engine.serialize(&heap, &root),
        Err(Error::Unsupported(_))
    ));
}

fn engine_untracked(def: &Arc<TypeDef>) -> Engine {
    let cfg = Config {
        track_ref: false,
        ..Default::default()
    };
    engine(cfg, &[def])
}

#[test_traced]
fn test_mixed_fields_repeated() {
    let def = TypeDef::structure("test", "Data")
        .field(FieldMeta::new("a", FieldType::I32))
        .field(FieldMeta::new("b", FieldType::String))
        .field(FieldMeta::new(
            "c",
            FieldType::list(FieldType::Boxed(Primitive::I32)),
        ))
        .build();
    let mut engine = engine(Config::default(), &[&def]);
    for i in 0..100 {
        let mut heap = Heap::new();
        let list = heap.insert(Node::List(vec![
            Value::I32(i),
            Value::Null,
            Value::I32(-i),
        ]));
        let root = heap.alloc(
            Object::new(def.clone())
                .with("a", i)
                .unwrap()
                .with("b", format!("value {i}"))
                .unwrap()
                .with("c", list)
                .unwrap(),
        );
        let graph = roundtrip(&mut engine, &heap, &root);
        let handle = graph.root.handle().unwrap();
        assert_eq!(field(&graph, handle, "a"), Value::I32(i));
        assert_eq!(field(&graph, handle, "b"), Value::String(format!("value {i}")));
    }
}

#[test_traced]
fn test_null_fields() {
    let def = TypeDef::structure("test", "Sparse")
        .field(FieldMeta::new("name", FieldType::String))
        .field(FieldMeta::new("count", FieldType::Boxed(Primitive::I64)))
        .field(FieldMeta::new("child", FieldType::Any))
        .field(FieldMeta::new("items", FieldType::list(FieldType::String)))
        .field(FieldMeta::new("index", FieldType::map(FieldType::String, FieldType::I32)))
        .build();
    let mut engine = engine(Config::default(), &[&def]);
    let mut heap = Heap::new();
    let root = heap.alloc(Object::new(def));
    let graph = roundtrip(&mut engine, &heap, &root);
    let object = graph.heap.object(graph.root.handle().unwrap()).unwrap();
    assert!(object.values().iter().all(Value::is_null));
}

#[test_traced]
fn test_non_null_violation() {
    let def = TypeDef::structure("test", "Strict")
        .field(FieldMeta::new("name", FieldType::String).non_null())
        .build();
    let mut engine = engine(Config::default(), &[&def]);
    let mut heap = Heap::new();
    let root = heap.alloc(Object::new(def));
    assert!(matches!(
        engine.serialize(&heap, &root),
        Err(Error::UnexpectedNull(_))
    ));
    assert!(matches!(
        engine.serialize(&heap, &root),
        Err(Error::Poisoned)
    ));
}

fn pair_def(first: &str, second: &str) -> Arc<TypeDef> {
    TypeDef::structure("test", "Pair")
        .field(FieldMeta::new(first, FieldType::I32))
        .field(FieldMeta::new(second, FieldType::I32))
        .build()
}

#[test_case(Config::default(); "consistent")]
#[test_case(Config::compatible(); "compatible")]
fn test_object_layout_must_match_registered(cfg: Config) {
    let registered = pair_def("a", "b");

    // An equal definition built separately is accepted.
    let mut engine = engine(cfg.clone(), &[&registered]);
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(pair_def("a", "b"))
            .with("a", 1)
            .unwrap()
            .with("b", 2)
            .unwrap(),
    );
    let graph = roundtrip(&mut engine, &heap, &root);
    let handle = graph.root.handle().unwrap();
    assert_eq!(field(&graph, handle, "a"), Value::I32(1));
    assert_eq!(field(&graph, handle, "b"), Value::I32(2));

    // Same name, fields in another order.
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(pair_def("b", "a"))
            .with("a", 1)
            .unwrap()
            .with("b", 2)
            .unwrap(),
    );
    assert!(matches!(
        engine.serialize(&heap, &root),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test_traced]
fn test_containers() {
    let def = TypeDef::structure("test", "Containers")
        .field(FieldMeta::new(
            "nested",
            FieldType::list(FieldType::list(FieldType::I32)),
        ))
        .field(FieldMeta::new("bytes", FieldType::array(FieldType::I8)))
        .field(FieldMeta::new(
            "index",
            FieldType::map(FieldType::String, FieldType::Any),
        ))
        .field(FieldMeta::new("anything", FieldType::Any))
        .build();
    for cfg in [Config::default(), Config::compatible()] {
        let mut engine = engine(cfg, &[&def]);
        let mut heap = Heap::new();
        let inner = heap.insert(Node::List(vec![Value::I32(1), Value::I32(2)]));
        let nested = heap.insert(Node::List(vec![Value::Ref(inner), Value::Ref(inner)]));
        let bytes = heap.insert(Node::Array(vec![Value::I8(-1), Value::I8(1)]));
        let index = heap.insert(Node::Map(vec![
            (Value::from("float"), Value::F64(0.5)),
            (Value::from("list"), Value::Ref(nested)),
            (Value::from("none"), Value::Null),
        ]));
        let anything = heap.insert(Node::List(vec![
            Value::Bool(true),
            Value::I16(-3),
            Value::F32(f32::NAN),
            Value::Ref(bytes),
        ]));
        let root = heap.alloc(
            Object::new(def.clone())
                .with("nested", nested)
                .unwrap()
                .with("bytes", bytes)
                .unwrap()
                .with("index", index)
                .unwrap()
                .with("anything", anything)
                .unwrap(),
        );
        roundtrip(&mut engine, &heap, &root);
    }
}

#[test_traced]
fn test_records() {
    let point = TypeDef::record("test", "Point")
        .field(FieldMeta::new("x", FieldType::I32))
        .field(FieldMeta::new("label", FieldType::String))
        .build();
    let mut engine = engine(Config::default(), &[&point]);
    let mut heap = Heap::new();
    let a = heap.insert(Object::new(point.clone()).with("x", 3).unwrap());
    let root = heap.alloc(
        Object::new(point)
            .with("x", 4)
            .unwrap()
            .with("label", "p")
            .unwrap(),
    );
    roundtrip(&mut engine, &heap, &Value::Ref(a));
    roundtrip(&mut engine, &heap, &root);
}

#[test_traced]
fn test_record_back_reference_is_null() {
    let holder = TypeDef::structure("test", "Holder")
        .field(FieldMeta::new("pair", FieldType::structure("test", "Pair")))
        .build();
    let pair = TypeDef::record("test", "Pair")
        .field(FieldMeta::new("holder", FieldType::structure("test", "Holder")))
        .build();
    let mut engine = engine(Config::default(), &[&holder, &pair]);
    let mut heap = Heap::new();
    let h = heap.insert(Object::new(holder));
    let p = heap.insert(Object::new(pair).with("holder", h).unwrap());
    heap.object_mut(h).unwrap().set("pair", p).unwrap();

    let bytes = engine.serialize(&heap, &Value::Ref(p)).unwrap();
    let graph = engine.deserialize(bytes).unwrap();
    let holder = field(&graph, graph.root.handle().unwrap(), "holder");
    assert_eq!(field(&graph, holder.handle().unwrap(), "pair"), Value::Null);
}

#[test_traced]
fn test_version_mismatch() {
    let writer = TypeDef::structure("test", "Versioned")
        .field(FieldMeta::new("x", FieldType::I32))
        .build();
    let reader = TypeDef::structure("test", "Versioned")
        .field(FieldMeta::new("x", FieldType::I64))
        .build();
    let mut heap = Heap::new();
    let root = heap.alloc(Object::new(writer.clone()));
    let bytes = engine(Config::default(), &[&writer])
        .serialize(&heap, &root)
        .unwrap();
    let result = engine(Config::default(), &[&reader]).deserialize(bytes);
    let Err(Error::VersionMismatch { ty, .. }) = result else {
        panic!("expected version mismatch");
    };
    assert_eq!(ty, TypeName::new("test", "Versioned"));
}

#[test_traced]
fn test_transient_fields_skipped() {
    let def = TypeDef::structure("test", "Cached")
        .field(FieldMeta::new("value", FieldType::I32))
        .field(FieldMeta::new("cache", FieldType::String).transient())
        .build();
    let mut engine = engine(Config::default(), &[&def]);
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(def)
            .with("value", 1)
            .unwrap()
            .with("cache", "stale")
            .unwrap(),
    );
    let bytes = engine.serialize(&heap, &root).unwrap();
    let graph = engine.deserialize(bytes).unwrap();
    let handle = graph.root.handle().unwrap();
    assert_eq!(field(&graph, handle, "value"), Value::I32(1));
    assert_eq!(field(&graph, handle, "cache"), Value::Null);
}

#[test_traced]
fn test_inherited_fields() {
    let base = TypeDef::structure("test", "Base")
        .field(FieldMeta::new("id", FieldType::I64))
        .polymorphic()
        .build();
    let derived = TypeDef::structure("test", "Derived")
        .extends(&base)
        .field(FieldMeta::new("id", FieldType::String))
        .build();
    let holder = TypeDef::structure("test", "Holder")
        .field(FieldMeta::new("base", FieldType::structure("test", "Base")))
        .build();
    let mut engine = engine(Config::default(), &[&base, &derived, &holder]);
    let mut heap = Heap::new();
    let mut object = Object::new(derived).with("id", "derived").unwrap();
    object.set("id", "shadowing").unwrap();
    let child = heap.alloc(object);
    if let Value::Ref(handle) = child {
        let inherited = heap.object(handle).unwrap().def().declared_slot(base.name(), "id");
        assert_eq!(inherited, Some(0));
    }
    let root = heap.alloc(Object::new(holder).with("base", child).unwrap());
    roundtrip(&mut engine, &heap, &root);
}

#[test_case(false; "by ordinal")]
#[test_case(true; "by name")]
fn test_enums(by_name: bool) {
    let color = TypeDef::enumeration("test", "Color", ["Red", "Green", "Blue"]);
    let def = TypeDef::structure("test", "Paint")
        .field(FieldMeta::new("color", FieldType::enumeration("test", "Color")))
        .field(FieldMeta::new("other", FieldType::Any))
        .build();
    let cfg = Config {
        enum_by_name: by_name,
        ..Default::default()
    };
    let mut engine = engine(cfg, &[&color, &def]);
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(def)
            .with("color", color.constant("Blue").unwrap())
            .unwrap()
            .with("other", color.constant("Red").unwrap())
            .unwrap(),
    );
    roundtrip(&mut engine, &heap, &root);
}

#[test_case(false; "by ordinal")]
#[test_case(true; "by name")]
fn test_unknown_enum_constant(by_name: bool) {
    let writer_color = TypeDef::enumeration("test", "Color", ["Red", "Green", "Blue"]);
    let reader_color = TypeDef::enumeration("test", "Color", ["Red", "Green"]);
    let def = TypeDef::structure("test", "Paint")
        .field(FieldMeta::new("color", FieldType::enumeration("test", "Color")))
        .build();
    let cfg = Config {
        enum_by_name: by_name,
        ..Default::default()
    };
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(def.clone())
            .with("color", writer_color.constant("Blue").unwrap())
            .unwrap(),
    );
    let bytes = engine(cfg.clone(), &[&writer_color, &def])
        .serialize(&heap, &root)
        .unwrap();

    // Decodes to the unknown sentinel, keeping what was written.
    let mut reader = engine(cfg.clone(), &[&reader_color, &def]);
    let graph = reader.deserialize(bytes.clone()).unwrap();
    let Value::Enum(EnumValue::Unknown { ordinal, name, .. }) =
        field(&graph, graph.root.handle().unwrap(), "color")
    else {
        panic!("expected unknown constant");
    };
    if by_name {
        assert_eq!(name.as_deref(), Some("Blue"));
    } else {
        assert_eq!(ordinal, Some(2));
    }

    // The sentinel can be forwarded unchanged.
    let forwarded = reader.serialize(&graph.heap, &graph.root).unwrap();
    assert_eq!(forwarded, bytes);

    // Or rejected.
    let strict = Config {
        unknown_enum_as_error: true,
        ..cfg
    };
    assert!(matches!(
        engine(strict, &[&reader_color, &def]).deserialize(bytes),
        Err(Error::UnknownEnumVariant { .. })
    ));
}

#[test_case(true, true; "compressed")]
#[test_case(false, false; "fixed")]
#[test_case(true, false; "mixed")]
fn test_integer_encodings(compress_int: bool, compress_long: bool) {
    let def = TypeDef::structure("test", "Ints")
        .field(FieldMeta::new("a", FieldType::I32))
        .field(FieldMeta::new("b", FieldType::I64))
        .field(FieldMeta::new("c", FieldType::Boxed(Primitive::I64)))
        .build();
    let cfg = Config {
        compress_int,
        compress_long,
        ..Default::default()
    };
    let mut engine = engine(cfg, &[&def]);
    let mut heap = Heap::new();
    let root = heap.alloc(
        Object::new(def)
            .with("a", i32::MIN)
            .unwrap()
            .with("b", i64::MAX)
            .unwrap()
            .with("c", -1i64)
            .unwrap(),
    );
    roundtrip(&mut engine, &heap, &root);
}

#[test_traced]
fn test_xlang() {
    let def = node_def();
    let cfg = Config {
        protocol: Protocol::Xlang,
        ..Default::default()
    };
    let mut engine = engine(cfg.clone(), &[&def]);
    let mut heap = Heap::new();
    let root = ring(&mut heap, &def, 3);
    roundtrip(&mut engine, &heap, &root);

    // Native and cross-language payloads are not interchangeable.
    let bytes = engine.serialize(&heap, &root).unwrap();
    let mut native = self::engine(Config::default(), &[&def]);
    assert!(matches!(
        native.deserialize(bytes),
        Err(Error::HeaderMismatch { .. })
    ));

    // `char` has no cross-language representation.
    let mut engine = self::engine(cfg, &[&def]);
    assert!(matches!(
        engine.serialize(&Heap::new(), &Value::Char(97)),
        Err(Error::Unsupported(_))
    ));
}

#[test_traced]
fn test_ids() {
    let def = node_def();
    let mut engine = Engine::new(Config::default());
    engine.register_with_id(def.clone(), 100).unwrap();
    let mut heap = Heap::new();
    let root = ring(&mut heap, &def, 2);
    let graph = roundtrip(&mut engine, &heap, &root);

    // A reader without the id cannot resolve the type.
    let bytes = engine.serialize(&graph.heap, &graph.root).unwrap();
    let mut reader = self::engine(Config::default(), &[&def]);
    assert!(matches!(
        reader.deserialize(bytes),
        Err(Error::UnknownType(_))
    ));
}

#[test_traced]
fn test_copy() {
    let def = node_def();
    let mut engine = engine(Config::default(), &[&def]);
    let mut heap = Heap::new();
    let root = ring(&mut heap, &def, 3);
    let copy = engine.copy(&mut heap, &root).unwrap();
    assert_ne!(copy, root);
    assert_eq!(heap.len(), 6);
    let snapshot = heap.clone();
    assert!(heap.isomorphic(&root, &snapshot, &copy));

    // The copy serializes to the same bytes.
    let a = engine.serialize(&heap, &root).unwrap();
    let b = engine.serialize(&heap, &copy).unwrap();
    assert_eq!(a, b);
}

#[test_traced]
fn test_failed_copy_leaves_heap_untouched() {
    let holder = TypeDef::structure("test", "Holder")
        .field(FieldMeta::new("link", FieldType::structure("test", "Link")))
        .build();
    let link = TypeDef::record("test", "Link")
        .field(FieldMeta::new("holder", FieldType::structure("test", "Holder")))
        .build();
    let mut engine = engine(Config::default(), &[&holder, &link]);
    let mut heap = Heap::new();
    let h = heap.insert(Object::new(holder));
    let l = heap.insert(Object::new(link).with("holder", h).unwrap());
    heap.object_mut(h).unwrap().set("link", l).unwrap();

    assert!(matches!(
        engine.copy(&mut heap, &Value::Ref(l)),
        Err(Error::Unsupported(_))
    ));
    assert_eq!(heap.len(), 2);
}

#[test_traced]
fn test_invalid_input() {
    let def = node_def();
    let mut engine = engine(Config::default(), &[&def]);

    // Unknown ref flag after a valid header.
    assert!(matches!(
        engine.deserialize(&[0b10, 5][..]),
        Err(Error::InvalidRefFlag(5))
    ));
    engine.reset();

    // Back reference to an id never assigned.
    assert!(matches!(
        engine.deserialize(&[0b10, (-2i8) as u8, 3][..]),
        Err(Error::UnknownRef(3))
    ));
    engine.reset();

    // Unknown type id.
    assert!(matches!(
        engine.deserialize(&[0b10, (-1i8) as u8, 99][..]),
        Err(Error::InvalidTypeId(99))
    ));
}
