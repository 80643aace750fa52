//! Class descriptors and their in-band transmission.
//!
//! # Overview
//!
//! In compatible mode, a writer describes the field set of every struct type it writes with a
//! [ClassDescriptor]. Readers reconcile that description with their own definition of the type
//! (or, if they have none, decode into a [crate::Placeholder]).
//!
//! # Format
//!
//! Descriptors are sent at most once per [MetaContext] lifetime. Each struct written in compatible
//! mode carries a varint `index << 1 | is_new`. When `is_new` is set, the length-prefixed
//! descriptor body follows:
//!
//! ```txt
//! +----------+-------------+-----------------------------------------------------------+
//! | identity | field count | per field: declaring type | name | field type | flags (u8) |
//! +----------+-------------+-----------------------------------------------------------+
//! ```
//!
//! The identity is `varint(id << 1)` for types registered with a numeric id, or `varint(1)`
//! followed by namespace and name. The descriptor id is the first 8 bytes of the SHA-256 digest
//! of the body, masked to 50 bits.

use crate::{
    buffer, registry::TypeDef, varint, Config, Error, FieldType, Registry, TypeName,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

const ID_MASK: u64 = (1 << 50) - 1;
const FLAG_NULLABLE: u8 = 1;
const FLAG_TRACK_REF: u8 = 1 << 1;
const FLAG_MONOMORPHIC: u8 = 1 << 2;

/// Identity of a type on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeIdent {
    Named(TypeName),
    Id(u32),
}

impl TypeIdent {
    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::Id(id) => varint::write((*id as u64) << 1, buf),
            Self::Named(name) => {
                varint::write(1u64, buf);
                name.write(buf);
            }
        }
    }

    pub(crate) fn read(buf: &mut impl Buf, cfg: &Config) -> Result<Self, Error> {
        let tag = varint::read::<u64>(buf)?;
        match tag {
            1 => Ok(Self::Named(TypeName::read(buf, &cfg.max_string_len)?)),
            tag if tag & 1 == 0 => {
                let id = u32::try_from(tag >> 1)
                    .map_err(|_| Error::InvalidData("type identity", format!("id {tag}")))?;
                Ok(Self::Id(id))
            }
            tag => Err(Error::InvalidData("type identity", format!("tag {tag}"))),
        }
    }

    /// Name of the type, if sent by name.
    pub fn name(&self) -> Option<&TypeName> {
        match self {
            Self::Named(name) => Some(name),
            Self::Id(_) => None,
        }
    }
}

impl fmt::Display for TypeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// One field of a [ClassDescriptor].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub declaring: TypeName,
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub track_ref: bool,
    /// Whether the declared type is final on the writer.
    pub monomorphic: bool,
}

impl FieldDescriptor {
    /// Describes a field of a registered type.
    pub fn new(registry: &Registry, declaring: &TypeName, meta: &crate::FieldMeta) -> Self {
        let monomorphic = match &meta.ty {
            FieldType::Struct(name) => registry.is_final(name),
            FieldType::Primitive(_)
            | FieldType::Boxed(_)
            | FieldType::String
            | FieldType::Enum(_) => true,
            FieldType::Any | FieldType::Array(_) | FieldType::List(_) | FieldType::Map(..) => {
                false
            }
        };
        Self {
            declaring: declaring.clone(),
            name: meta.name.clone(),
            ty: meta.ty.clone(),
            nullable: meta.nullable && !matches!(meta.ty, FieldType::Primitive(_)),
            track_ref: meta.track_ref,
            monomorphic,
        }
    }

    /// Name qualified by the declaring type, unique across an inheritance chain.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.declaring, self.name)
    }

    fn write(&self, buf: &mut impl BufMut) {
        self.declaring.write(buf);
        buffer::write_string(&self.name, buf);
        self.ty.write(buf);
        let mut flags = 0;
        if self.nullable {
            flags |= FLAG_NULLABLE;
        }
        if self.track_ref {
            flags |= FLAG_TRACK_REF;
        }
        if self.monomorphic {
            flags |= FLAG_MONOMORPHIC;
        }
        buf.put_u8(flags);
    }

    fn read(buf: &mut impl Buf, cfg: &Config) -> Result<Self, Error> {
        let declaring = TypeName::read(buf, &cfg.max_string_len)?;
        let name = buffer::read_string(buf, &cfg.max_string_len)?;
        let ty = FieldType::read(buf, &cfg.max_string_len)?;
        let flags = buffer::read_u8(buf)?;
        if flags & !(FLAG_NULLABLE | FLAG_TRACK_REF | FLAG_MONOMORPHIC) != 0 {
            return Err(Error::InvalidData("field flags", format!("{flags:#x}")));
        }
        Ok(Self {
            declaring,
            name,
            nullable: flags & FLAG_NULLABLE != 0 && !matches!(ty, FieldType::Primitive(_)),
            ty,
            track_ref: flags & FLAG_TRACK_REF != 0,
            monomorphic: flags & FLAG_MONOMORPHIC != 0,
        })
    }
}

/// Field set of a type as seen by the writer.
#[derive(Clone, Debug)]
pub struct ClassDescriptor {
    ident: TypeIdent,
    fields: Vec<FieldDescriptor>,
    id: u64,
    encoded: Bytes,
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for ClassDescriptor {}

impl ClassDescriptor {
    pub fn new(ident: TypeIdent, fields: Vec<FieldDescriptor>) -> Self {
        let mut body = BytesMut::new();
        ident.write(&mut body);
        buffer::write_len(fields.len(), &mut body);
        for field in &fields {
            field.write(&mut body);
        }
        let encoded = body.freeze();
        Self {
            ident,
            fields,
            id: Self::digest(&encoded),
            encoded,
        }
    }

    /// Describes every field of `def` (including inherited and transient ones).
    pub fn from_def(def: &TypeDef, registry: &Registry) -> Self {
        let fields = def
            .fields()
            .iter()
            .map(|f| FieldDescriptor::new(registry, &f.declaring, &f.meta))
            .collect();
        Self::new(registry.ident(def.name()), fields)
    }

    /// Decodes a descriptor body.
    pub fn decode(encoded: Bytes, cfg: &Config) -> Result<Self, Error> {
        let mut buf = encoded.clone();
        let ident = TypeIdent::read(&mut buf, cfg)?;
        let count = buffer::read_len(&mut buf, &cfg.max_collection_len)?;
        let mut fields = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            fields.push(FieldDescriptor::read(&mut buf, cfg)?);
        }
        if buf.has_remaining() {
            return Err(Error::ExtraData(buf.remaining()));
        }
        Ok(Self {
            ident,
            fields,
            id: Self::digest(&encoded),
            encoded,
        })
    }

    fn digest(encoded: &[u8]) -> u64 {
        let hash = Sha256::digest(encoded);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash[..8]);
        u64::from_le_bytes(prefix) & ID_MASK
    }

    pub fn ident(&self) -> &TypeIdent {
        &self.ident
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Deterministic id of the descriptor.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }
}

/// Descriptors exchanged so far, on the write side and on the read side.
#[derive(Debug, Default)]
pub struct MetaContext {
    written: HashMap<u64, u32>,
    read: Vec<Arc<ClassDescriptor>>,
    by_id: HashMap<u64, Arc<ClassDescriptor>>,
}

impl MetaContext {
    /// Writes a reference to `descriptor`, inlining it the first time.
    pub fn write(&mut self, descriptor: &ClassDescriptor, buf: &mut impl BufMut) {
        if let Some(index) = self.written.get(&descriptor.id) {
            varint::write((*index as u64) << 1, buf);
            return;
        }
        let index = self.written.len() as u32;
        self.written.insert(descriptor.id, index);
        varint::write(((index as u64) << 1) | 1, buf);
        buffer::write_bytes(&descriptor.encoded, buf);
        debug!(
            ty = %descriptor.ident,
            id = descriptor.id,
            index,
            fields = descriptor.fields.len(),
            "sent class descriptor"
        );
    }

    /// Reads a reference to a descriptor, decoding it if inlined.
    pub fn read(&mut self, buf: &mut impl Buf, cfg: &Config) -> Result<Arc<ClassDescriptor>, Error> {
        let header = varint::read::<u64>(buf)?;
        let index = u32::try_from(header >> 1)
            .map_err(|_| Error::InvalidData("meta index", format!("{header}")))?;
        if header & 1 == 0 {
            return self
                .read
                .get(index as usize)
                .cloned()
                .ok_or(Error::UnknownMeta(index));
        }
        if index as usize != self.read.len() {
            return Err(Error::InvalidData(
                "meta index",
                format!("expected {}, found {index}", self.read.len()),
            ));
        }
        let encoded = buffer::read_bytes(buf, &cfg.max_string_len)?;
        let decoded = ClassDescriptor::decode(encoded, cfg)?;
        let descriptor = self
            .by_id
            .entry(decoded.id)
            .or_insert_with(|| Arc::new(decoded))
            .clone();
        debug!(
            ty = %descriptor.ident,
            id = descriptor.id,
            index,
            fields = descriptor.fields.len(),
            "received class descriptor"
        );
        self.read.push(descriptor.clone());
        Ok(descriptor)
    }

    pub fn reset(&mut self) {
        self.written.clear();
        self.read.clear();
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldMeta, Primitive};

    fn point(registry: &mut Registry, id: Option<u32>) -> Arc<TypeDef> {
        let def = TypeDef::structure("test", "Point")
            .field(FieldMeta::new("x", FieldType::I32))
            .field(FieldMeta::new("y", FieldType::Boxed(Primitive::F64)))
            .field(FieldMeta::new("tags", FieldType::list(FieldType::String)).untracked())
            .build();
        registry.register(def.clone(), id).unwrap();
        def
    }

    #[test]
    fn test_descriptor_decode() {
        let mut registry = Registry::new();
        let def = point(&mut registry, None);
        let descriptor = ClassDescriptor::from_def(&def, &registry);
        let decoded =
            ClassDescriptor::decode(descriptor.encoded().clone(), &Config::compatible()).unwrap();
        assert_eq!(decoded, descriptor);
        assert_eq!(decoded.id(), descriptor.id());
        assert_eq!(decoded.fields()[0].qualified(), "test.Point.x");
        assert!(!decoded.fields()[0].nullable);
        assert!(decoded.fields()[1].nullable);
        assert!(!decoded.fields()[2].track_ref);
        assert!(!decoded.fields()[2].monomorphic);
        assert!(decoded.id() <= ID_MASK);
    }

    #[test]
    fn test_descriptor_ident_by_id() {
        let mut registry = Registry::new();
        let def = point(&mut registry, Some(42));
        let descriptor = ClassDescriptor::from_def(&def, &registry);
        assert_eq!(descriptor.ident(), &TypeIdent::Id(42));

        // Same fields, different identity
        let named = ClassDescriptor::new(
            TypeIdent::Named(def.name().clone()),
            descriptor.fields().to_vec(),
        );
        assert_ne!(named.id(), descriptor.id());
    }

    #[test]
    fn test_descriptor_trailing_bytes() {
        let mut registry = Registry::new();
        let def = point(&mut registry, None);
        let descriptor = ClassDescriptor::from_def(&def, &registry);
        let mut encoded = BytesMut::from(&descriptor.encoded()[..]);
        encoded.put_u8(0);
        assert!(matches!(
            ClassDescriptor::decode(encoded.freeze(), &Config::compatible()),
            Err(Error::ExtraData(1))
        ));
    }

    #[test]
    fn test_meta_context_sends_once() {
        let mut registry = Registry::new();
        let def = point(&mut registry, None);
        let descriptor = ClassDescriptor::from_def(&def, &registry);
        let cfg = Config::compatible();

        let mut writer = MetaContext::default();
        let mut buf = BytesMut::new();
        writer.write(&descriptor, &mut buf);
        let first = buf.len();
        writer.write(&descriptor, &mut buf);
        assert_eq!(buf.len(), first + 1);

        let mut reader = MetaContext::default();
        let mut read = buf.freeze();
        let a = reader.read(&mut read, &cfg).unwrap();
        let b = reader.read(&mut read, &cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, descriptor);
    }

    #[test]
    fn test_meta_context_unknown_index() {
        let mut reader = MetaContext::default();
        let mut buf = &[4u8][..];
        assert!(matches!(
            reader.read(&mut buf, &Config::compatible()),
            Err(Error::UnknownMeta(2))
        ));
    }

    #[test]
    fn test_meta_context_out_of_order() {
        let mut registry = Registry::new();
        let def = point(&mut registry, None);
        let descriptor = ClassDescriptor::from_def(&def, &registry);
        let mut buf = BytesMut::new();
        varint::write((1u64 << 1) | 1, &mut buf);
        buffer::write_bytes(descriptor.encoded(), &mut buf);
        let mut reader = MetaContext::default();
        assert!(matches!(
            reader.read(&mut buf.freeze(), &Config::compatible()),
            Err(Error::InvalidData("meta index", _))
        ));
    }
}
