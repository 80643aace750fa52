use commonware_graph_codec::{
    Config, Engine, FieldMeta, FieldType, Heap, Node, Object, TypeDef, Value,
};
use std::sync::Arc;

pub fn item() -> Arc<TypeDef> {
    TypeDef::structure("bench", "Item")
        .field(FieldMeta::new("id", FieldType::I64))
        .field(FieldMeta::new("name", FieldType::String))
        .field(FieldMeta::new("values", FieldType::list(FieldType::I32)))
        .field(FieldMeta::new("next", FieldType::structure("bench", "Item")))
        .build()
}

pub fn engine(cfg: Config) -> Engine {
    let mut engine = Engine::new(cfg);
    engine.register(item()).unwrap();
    engine
}

/// A ring of `items` items, each holding a short list.
pub fn ring(items: usize) -> (Heap, Value) {
    let def = item();
    let mut heap = Heap::new();
    let handles: Vec<_> = (0..items)
        .map(|i| {
            let values = heap.insert(Node::List((0..8).map(Value::I32).collect()));
            let object = Object::new(def.clone())
                .with("id", i as i64)
                .unwrap()
                .with("name", format!("item-{i}"))
                .unwrap()
                .with("values", values)
                .unwrap();
            heap.insert(object)
        })
        .collect();
    for (i, handle) in handles.iter().enumerate() {
        let next = handles[(i + 1) % items];
        heap.object_mut(*handle).unwrap().set("next", next).unwrap();
    }
    (heap, Value::Ref(handles[0]))
}

pub fn configs() -> [(&'static str, Config); 2] {
    [
        ("consistent", Config::default()),
        ("compatible", Config::compatible()),
    ]
}
