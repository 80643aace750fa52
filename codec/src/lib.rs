//! Serialize object graphs.
//!
//! # Overview
//!
//! A binary serialization library for graphs of dynamically typed objects that:
//! - Preserves shared references and cycles (every node is written once and referenced by id)
//! - Writes the fields of a type in a deterministic, type-grouped order
//! - Lets writer and reader disagree on the fields of a type (compatible mode)
//! - Decodes instances of unknown types into placeholders that can be forwarded unchanged
//!
//! Types are described at runtime with [TypeDef] and registered on an [Engine]. Instances live
//! in a [Heap] and are referenced through [Handle]s, so a graph may alias and cycle freely.
//!
//! # Modes
//!
//! - [Mode::SchemaConsistent]: both peers register identical types. Each struct payload may be
//!   prefixed with a version hash of its field layout to catch accidental divergence.
//! - [Mode::Compatible]: each struct is preceded by a reference to a [ClassDescriptor] listing its
//!   fields. Readers match fields by declaring type, name, and type; fields only one side knows
//!   are skipped or left at their default.
//!
//! # Format
//!
//! A payload is a header byte followed by the root value. Values with identity are framed by a
//! reference flag (see [reference]); values reached through an undeclared type carry type info
//! (see [binding]); struct fields follow the order of their [FieldPlan] (see [classifier]).
//!
//! # Example
//!
//! ```
//! use commonware_graph_codec::{Config, Engine, FieldMeta, FieldType, Heap, Object, TypeDef, Value};
//!
//! // Define a self-referential type
//! let node = TypeDef::structure("example", "Node")
//!     .field(FieldMeta::new("value", FieldType::I32))
//!     .field(FieldMeta::new("next", FieldType::structure("example", "Node")))
//!     .build();
//!
//! let mut engine = Engine::new(Config::default());
//! engine.register(node.clone()).unwrap();
//!
//! // Build a two-node cycle
//! let mut heap = Heap::new();
//! let a = heap.insert(Object::new(node.clone()).with("value", 1).unwrap());
//! let b = heap.insert(Object::new(node).with("value", 2).unwrap().with("next", a).unwrap());
//! heap.object_mut(a).unwrap().set("next", b).unwrap();
//!
//! // Round trip
//! let root = Value::Ref(a);
//! let bytes = engine.serialize(&heap, &root).unwrap();
//! let graph = engine.deserialize(bytes).unwrap();
//! assert!(heap.isomorphic(&root, &graph.heap, &graph.root));
//! ```

pub mod binding;
pub mod buffer;
pub mod classifier;
pub mod config;
mod context;
mod copy;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod reference;
pub mod registry;
pub mod serializer;
pub mod types;
pub mod value;
pub mod varint;

// Re-export main types
pub use classifier::{Category, FieldInfo, FieldPlan};
pub use config::{Config, Mode, Protocol, RangeCfg};
pub use descriptor::{ClassDescriptor, FieldDescriptor, TypeIdent};
pub use engine::Engine;
pub use error::Error;
pub use registry::{FieldMeta, Registry, TypeDef, TypeKind};
pub use types::{FieldType, Primitive, TypeName};
pub use value::{EnumValue, Graph, Handle, Heap, Node, Object, Placeholder, Value};
