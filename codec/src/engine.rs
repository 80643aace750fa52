//! Serialization entry point.
//!
//! # Format
//!
//! Every payload starts with a header byte:
//!
//! ```txt
//! bit 0  root is null (nothing follows)
//! bit 1  little-endian (always set)
//! bit 2  cross-language protocol
//! bit 3  compatible mode
//! ```
//!
//! The root value follows, written like a list element of undeclared type: a reference flag,
//! type info, and the payload.

use crate::{
    binding::{self, Binding},
    buffer,
    classifier::{FieldPlan, PlanCache},
    context::{Generics, ReadContext, WriteContext},
    copy::Copier,
    descriptor::MetaContext,
    reference::RefResolver,
    registry::TypeDef,
    Config, Error, Graph, Heap, Protocol, Registry, TypeName, Value,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::trace;

const HEADER_NULL: u8 = 1;
const HEADER_LITTLE_ENDIAN: u8 = 1 << 1;
const HEADER_XLANG: u8 = 1 << 2;
const HEADER_COMPATIBLE: u8 = 1 << 3;

/// Serializes and deserializes object graphs.
///
/// An engine holds the type registry, cached field plans, and per-call scratch state. It is not
/// meant to be shared between threads; create one per worker.
///
/// A call that fails leaves the engine poisoned: every later call returns [Error::Poisoned]
/// until [Engine::reset] is called.
pub struct Engine {
    cfg: Config,
    registry: Registry,
    binding: &'static dyn Binding,
    plans: PlanCache,
    refs: RefResolver,
    generics: Generics,
    meta: MetaContext,
    scratch: Vec<Vec<Value>>,
    copier: Copier,
    buffer: BytesMut,
    poisoned: bool,
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        Self {
            binding: binding::for_protocol(cfg.protocol),
            cfg,
            registry: Registry::new(),
            plans: PlanCache::default(),
            refs: RefResolver::default(),
            generics: Generics::default(),
            meta: MetaContext::default(),
            scratch: Vec::new(),
            copier: Copier::default(),
            buffer: BytesMut::new(),
            poisoned: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers a type, identified on the wire by its name.
    pub fn register(&mut self, def: Arc<TypeDef>) -> Result<(), Error> {
        self.registry.register(def, None)?;
        self.plans.clear();
        Ok(())
    }

    /// Registers a type, identified on the wire by `id`.
    pub fn register_with_id(&mut self, def: Arc<TypeDef>, id: u32) -> Result<(), Error> {
        self.registry.register(def, Some(id))?;
        self.plans.clear();
        Ok(())
    }

    /// Returns the field plan of the registered type `name`.
    pub fn field_plan(&mut self, name: &TypeName) -> Result<Arc<FieldPlan>, Error> {
        let info = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))?;
        let def = info.def().clone();
        Ok(self.plans.local(&def, &self.registry, &self.cfg))
    }

    fn header(&self) -> u8 {
        let mut header = HEADER_LITTLE_ENDIAN;
        if self.cfg.protocol == Protocol::Xlang {
            header |= HEADER_XLANG;
        }
        if self.cfg.is_compatible() {
            header |= HEADER_COMPATIBLE;
        }
        header
    }

    fn begin(&mut self) -> Result<(), Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        self.refs.reset();
        self.generics.clear();
        if !self.cfg.share_meta {
            self.meta.reset();
        }
        Ok(())
    }

    /// Serializes the graph reachable from `root`.
    pub fn serialize(&mut self, heap: &Heap, root: &Value) -> Result<Bytes, Error> {
        self.begin()?;
        let result = self.write(heap, root);
        if result.is_err() {
            self.poisoned = true;
            self.buffer.clear();
        }
        result
    }

    fn write(&mut self, heap: &Heap, root: &Value) -> Result<Bytes, Error> {
        let header = self.header();
        self.buffer.clear();
        if root.is_null() {
            self.buffer.put_u8(header | HEADER_NULL);
            return Ok(self.buffer.split().freeze());
        }
        self.buffer.put_u8(header);

        let mut ctx = WriteContext {
            cfg: &self.cfg,
            registry: &self.registry,
            heap,
            binding: self.binding,
            plans: &mut self.plans,
            buf: &mut self.buffer,
            refs: &mut self.refs,
            generics: &mut self.generics,
            meta: &mut self.meta,
        };
        ctx.write_ref(root)?;
        Ok(self.buffer.split().freeze())
    }

    /// Deserializes a graph into a fresh heap.
    ///
    /// All of `buf` must be consumed.
    pub fn deserialize(&mut self, mut buf: impl Buf) -> Result<Graph, Error> {
        self.begin()?;
        let mut bytes = buf.copy_to_bytes(buf.remaining());
        let result = self.read(&mut bytes);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn read(&mut self, buf: &mut Bytes) -> Result<Graph, Error> {
        let header = buffer::read_u8(buf)?;
        let expected = self.header();
        if header & !HEADER_NULL != expected {
            return Err(Error::HeaderMismatch {
                read: header,
                expected,
            });
        }

        let mut heap = Heap::new();
        let root = if header & HEADER_NULL != 0 {
            Value::Null
        } else {
            let mut ctx = ReadContext {
                cfg: &self.cfg,
                registry: &self.registry,
                binding: self.binding,
                heap: &mut heap,
                plans: &mut self.plans,
                buf: &mut *buf,
                refs: &mut self.refs,
                generics: &mut self.generics,
                meta: &mut self.meta,
                scratch: &mut self.scratch,
            };
            ctx.read_ref()?
        };
        if buf.has_remaining() {
            return Err(Error::ExtraData(buf.remaining()));
        }
        Ok(Graph { heap, root })
    }

    /// Duplicates the graph reachable from `value` inside `heap` and returns the copy of
    /// `value`.
    ///
    /// On error, `heap` is left as it was.
    pub fn copy(&mut self, heap: &mut Heap, value: &Value) -> Result<Value, Error> {
        let len = heap.len();
        self.copier.reset();
        let result = self.copier.copy(heap, value);
        self.copier.reset();
        if result.is_err() {
            heap.truncate(len);
        }
        result
    }

    /// Clears all per-call state (including shared descriptors) and lifts poisoning.
    pub fn reset(&mut self) {
        self.refs.reset();
        self.generics.clear();
        self.meta.reset();
        self.scratch.clear();
        self.copier.reset();
        self.buffer.clear();
        self.poisoned = false;
        trace!("engine reset");
    }

    /// Forgets descriptors exchanged so far (with [Config::share_meta]).
    pub fn reset_meta(&mut self) {
        self.meta.reset();
        trace!("engine meta reset");
    }
}
