//! Type definitions and the registry that maps them to serializers.

use crate::{
    descriptor::TypeIdent,
    serializer::{
        containers::{ListSerializer, MapSerializer},
        enums::EnumSerializer,
        object::ObjectSerializer,
        primitives::{PrimitiveSerializer, StringSerializer},
        Serializer,
    },
    EnumValue, Error, FieldType, Primitive, TypeName, Value,
};
use std::{collections::HashMap, sync::Arc};

/// Shape of a registered type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// Mutable struct, allocated before its fields are read.
    Struct,
    /// Immutable record, constructed from all of its field values at once.
    Record,
    /// Enum with the listed constants (ordinal = position).
    Enum(Vec<String>),
}

/// A field as declared on a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub track_ref: bool,
    pub transient: bool,
}

impl FieldMeta {
    /// Creates a field that is nullable unless primitive and takes part in reference tracking.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        let nullable = !matches!(ty, FieldType::Primitive(_));
        Self {
            name: name.into(),
            ty,
            nullable,
            track_ref: true,
            transient: false,
        }
    }

    /// Marks the field as never null.
    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Excludes the field from reference tracking.
    pub fn untracked(mut self) -> Self {
        self.track_ref = false;
        self
    }

    /// Marks the field as transient (skipped in schema-consistent mode).
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// A field together with the type that declares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredField {
    pub declaring: TypeName,
    pub meta: FieldMeta,
}

/// Definition of a struct, record, or enum type.
#[derive(Debug)]
pub struct TypeDef {
    name: TypeName,
    kind: TypeKind,
    parent: Option<Arc<TypeDef>>,
    fields: Vec<DeclaredField>,
    is_final: bool,
    immutable: bool,
}

impl TypeDef {
    /// Starts the definition of a mutable struct.
    pub fn structure(namespace: &str, name: &str) -> TypeDefBuilder {
        TypeDefBuilder::new(TypeName::new(namespace, name), TypeKind::Struct)
    }

    /// Starts the definition of an immutable record.
    pub fn record(namespace: &str, name: &str) -> TypeDefBuilder {
        TypeDefBuilder::new(TypeName::new(namespace, name), TypeKind::Record)
    }

    /// Defines an enum.
    pub fn enumeration<S: Into<String>>(
        namespace: &str,
        name: &str,
        variants: impl IntoIterator<Item = S>,
    ) -> Arc<Self> {
        let variants = variants.into_iter().map(Into::into).collect();
        TypeDefBuilder::new(TypeName::new(namespace, name), TypeKind::Enum(variants)).build()
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<&Arc<TypeDef>> {
        self.parent.as_ref()
    }

    /// All fields, inherited ones first.
    pub fn fields(&self) -> &[DeclaredField] {
        &self.fields
    }

    /// Whether a field declared with this type always holds exactly this type.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn is_record(&self) -> bool {
        self.kind == TypeKind::Record
    }

    /// Constants of an enum (empty for other kinds).
    pub fn variants(&self) -> &[String] {
        match &self.kind {
            TypeKind::Enum(variants) => variants,
            _ => &[],
        }
    }

    /// Returns the enum constant called `name`.
    pub fn constant(&self, name: &str) -> Option<Value> {
        let ordinal = self.variants().iter().position(|v| v == name)?;
        Some(Value::Enum(EnumValue::known(self.name.clone(), ordinal as u32)))
    }

    /// Slot of the most derived field called `name`.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.fields.iter().rposition(|f| f.meta.name == name)
    }

    /// Slot of the field `name` declared by `declaring`.
    pub fn declared_slot(&self, declaring: &TypeName, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| &f.declaring == declaring && f.meta.name == name)
    }
}

/// Builder for a [TypeDef].
pub struct TypeDefBuilder {
    name: TypeName,
    kind: TypeKind,
    parent: Option<Arc<TypeDef>>,
    own: Vec<FieldMeta>,
    is_final: bool,
    immutable: bool,
}

impl TypeDefBuilder {
    fn new(name: TypeName, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            parent: None,
            own: Vec::new(),
            is_final: true,
            immutable: false,
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.own.push(field);
        self
    }

    /// Inherits every field of `parent`.
    pub fn extends(mut self, parent: &Arc<TypeDef>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Allows fields declared with this type to hold other types at runtime.
    pub fn polymorphic(mut self) -> Self {
        self.is_final = false;
        self
    }

    /// Marks instances as never mutated (shared rather than duplicated by deep copy).
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn build(self) -> Arc<TypeDef> {
        let mut fields = self
            .parent
            .as_ref()
            .map(|parent| parent.fields.clone())
            .unwrap_or_default();
        fields.extend(self.own.into_iter().map(|meta| DeclaredField {
            declaring: self.name.clone(),
            meta,
        }));
        Arc::new(TypeDef {
            name: self.name,
            kind: self.kind,
            parent: self.parent,
            fields,
            is_final: self.is_final,
            immutable: self.immutable,
        })
    }
}

/// A registered type and the serializer for its payload.
#[derive(Debug)]
pub struct TypeInfo {
    def: Arc<TypeDef>,
    id: Option<u32>,
    serializer: Arc<dyn Serializer>,
}

impl TypeInfo {
    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub(crate) fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }
}

/// Maps type identities to definitions and serializers.
#[derive(Debug)]
pub struct Registry {
    by_name: HashMap<TypeName, Arc<TypeInfo>>,
    by_id: HashMap<u32, Arc<TypeInfo>>,
    primitives: Vec<Arc<dyn Serializer>>,
    string: Arc<dyn Serializer>,
    list: Arc<dyn Serializer>,
    array: Arc<dyn Serializer>,
    map: Arc<dyn Serializer>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let primitives = [
            Primitive::Bool,
            Primitive::I8,
            Primitive::I16,
            Primitive::Char,
            Primitive::I32,
            Primitive::I64,
            Primitive::F32,
            Primitive::F64,
        ]
        .into_iter()
        .map(|p| Arc::new(PrimitiveSerializer::new(p)) as Arc<dyn Serializer>)
        .collect();
        Self {
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            primitives,
            string: Arc::new(StringSerializer),
            list: Arc::new(ListSerializer::new(false)),
            array: Arc::new(ListSerializer::new(true)),
            map: Arc::new(MapSerializer),
        }
    }

    /// Registers `def`, optionally under a numeric id.
    pub fn register(&mut self, def: Arc<TypeDef>, id: Option<u32>) -> Result<(), Error> {
        if self.by_name.contains_key(def.name()) {
            return Err(Error::DuplicateType(def.name().to_string()));
        }
        if let Some(id) = id {
            if self.by_id.contains_key(&id) {
                return Err(Error::DuplicateType(format!("id {id}")));
            }
        }
        let serializer: Arc<dyn Serializer> = match def.kind() {
            TypeKind::Enum(_) => Arc::new(EnumSerializer::known(def.clone())),
            TypeKind::Struct | TypeKind::Record => Arc::new(ObjectSerializer::new(def.clone())),
        };
        let info = Arc::new(TypeInfo {
            def: def.clone(),
            id,
            serializer,
        });
        if let Some(id) = id {
            self.by_id.insert(id, info.clone());
        }
        self.by_name.insert(def.name().clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &TypeName) -> Option<&Arc<TypeInfo>> {
        self.by_name.get(name)
    }

    pub fn resolve(&self, ident: &TypeIdent) -> Option<&Arc<TypeInfo>> {
        match ident {
            TypeIdent::Named(name) => self.by_name.get(name),
            TypeIdent::Id(id) => self.by_id.get(id),
        }
    }

    /// Identity written for `name`: its numeric id when it has one.
    pub fn ident(&self, name: &TypeName) -> TypeIdent {
        match self.by_name.get(name).and_then(|info| info.id) {
            Some(id) => TypeIdent::Id(id),
            None => TypeIdent::Named(name.clone()),
        }
    }

    /// Whether `name` is registered and final.
    pub fn is_final(&self, name: &TypeName) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|info| info.def.is_final())
    }

    pub(crate) fn primitive(&self, primitive: Primitive) -> Arc<dyn Serializer> {
        self.primitives[primitive as usize].clone()
    }

    pub(crate) fn string(&self) -> Arc<dyn Serializer> {
        self.string.clone()
    }

    pub(crate) fn list(&self) -> Arc<dyn Serializer> {
        self.list.clone()
    }

    pub(crate) fn array(&self) -> Arc<dyn Serializer> {
        self.array.clone()
    }

    pub(crate) fn map(&self) -> Arc<dyn Serializer> {
        self.map.clone()
    }

    /// Serializer for constants of `ty`, decoding to the unknown sentinel if not registered.
    pub(crate) fn enum_serializer(&self, ty: Option<&TypeName>) -> Arc<dyn Serializer> {
        match ty.and_then(|ty| self.by_name.get(ty)) {
            Some(info) if matches!(info.def.kind(), TypeKind::Enum(_)) => info.serializer.clone(),
            _ => Arc::new(EnumSerializer::unknown(ty.cloned())),
        }
    }

    pub(crate) fn struct_serializer(&self, name: &TypeName) -> Result<Arc<dyn Serializer>, Error> {
        match self.by_name.get(name) {
            Some(info) if !matches!(info.def.kind(), TypeKind::Enum(_)) => {
                Ok(info.serializer.clone())
            }
            _ => Err(Error::UnknownType(name.to_string())),
        }
    }

    /// Serializer for values of the declared type `ty`.
    pub(crate) fn serializer(&self, ty: &FieldType) -> Result<Arc<dyn Serializer>, Error> {
        match ty {
            FieldType::Primitive(p) | FieldType::Boxed(p) => Ok(self.primitive(*p)),
            FieldType::String => Ok(self.string()),
            FieldType::Enum(name) => Ok(self.enum_serializer(Some(name))),
            FieldType::Struct(name) => self.struct_serializer(name),
            FieldType::List(_) => Ok(self.list()),
            FieldType::Array(_) => Ok(self.array()),
            FieldType::Map(..) => Ok(self.map()),
            FieldType::Any => Err(Error::Unsupported(
                "values of type any have no static serializer".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherited_fields() {
        let base = TypeDef::structure("test", "Base")
            .field(FieldMeta::new("id", FieldType::I64))
            .field(FieldMeta::new("name", FieldType::String))
            .polymorphic()
            .build();
        let derived = TypeDef::structure("test", "Derived")
            .extends(&base)
            .field(FieldMeta::new("name", FieldType::String))
            .build();

        assert_eq!(derived.fields().len(), 3);
        assert_eq!(derived.fields()[0].declaring, TypeName::new("test", "Base"));
        assert_eq!(derived.slot("name"), Some(2));
        assert_eq!(derived.declared_slot(base.name(), "name"), Some(1));
        assert!(!base.is_final());
        assert!(derived.is_final());
    }

    #[test]
    fn test_field_defaults() {
        let primitive = FieldMeta::new("a", FieldType::I32);
        assert!(!primitive.nullable);
        let boxed = FieldMeta::new("b", FieldType::Boxed(Primitive::I32));
        assert!(boxed.nullable);
        assert!(!boxed.clone().non_null().nullable);
        assert!(boxed.track_ref);
        assert!(!boxed.untracked().track_ref);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = Registry::new();
        let def = TypeDef::structure("test", "A").build();
        registry.register(def.clone(), Some(1)).unwrap();
        assert!(matches!(
            registry.register(def, None),
            Err(Error::DuplicateType(_))
        ));
        let other = TypeDef::structure("test", "B").build();
        assert!(matches!(
            registry.register(other, Some(1)),
            Err(Error::DuplicateType(_))
        ));
    }

    #[test]
    fn test_ident() {
        let mut registry = Registry::new();
        registry
            .register(TypeDef::structure("test", "A").build(), Some(7))
            .unwrap();
        registry
            .register(TypeDef::structure("test", "B").build(), None)
            .unwrap();
        let a = TypeName::new("test", "A");
        let b = TypeName::new("test", "B");
        assert_eq!(registry.ident(&a), TypeIdent::Id(7));
        assert_eq!(registry.ident(&b), TypeIdent::Named(b.clone()));
        assert_eq!(registry.resolve(&TypeIdent::Id(7)).unwrap().def().name(), &a);
        assert!(registry.resolve(&TypeIdent::Id(8)).is_none());
    }

    #[test]
    fn test_enum_constant() {
        let color = TypeDef::enumeration("test", "Color", ["Red", "Green"]);
        assert_eq!(
            color.constant("Green"),
            Some(Value::Enum(EnumValue::known(color.name().clone(), 1)))
        );
        assert_eq!(color.constant("Blue"), None);
    }

    #[test]
    fn test_serializer_lookup() {
        let registry = Registry::new();
        assert!(registry.serializer(&FieldType::I32).is_ok());
        assert!(matches!(
            registry.serializer(&FieldType::structure("test", "Missing")),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            registry.serializer(&FieldType::Any),
            Err(Error::Unsupported(_))
        ));
    }
}
