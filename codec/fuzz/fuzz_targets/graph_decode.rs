#![no_main]

use bytes::Bytes;
use commonware_graph_codec::{Config, Engine, FieldMeta, FieldType, TypeDef};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let vertex = TypeDef::structure("fuzz", "Vertex")
        .field(FieldMeta::new("weight", FieldType::I64))
        .field(FieldMeta::new("next", FieldType::structure("fuzz", "Vertex")))
        .field(FieldMeta::new("any", FieldType::Any))
        .build();
    let data = Bytes::copy_from_slice(data);
    for cfg in [Config::default(), Config::compatible()] {
        let mut engine = Engine::new(cfg);
        engine.register(vertex.clone()).unwrap();
        let _ = engine.deserialize(data.clone());
    }
});
