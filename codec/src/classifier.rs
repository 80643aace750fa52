//! Grouping and ordering of a type's fields.
//!
//! Fields are split into five groups, written in this order:
//!
//! 1. `primitives`: unboxed values, written raw.
//! 2. `boxed`: nullable primitives and strings, written with a null flag.
//! 3. `finals`: enums and final structs, written without type info when monomorphic.
//! 4. `others`: polymorphic values (non-final structs, `any`, arrays), written with type info.
//! 5. `containers`: declared lists and maps, written with their declared element types pushed.
//!
//! Within a group, fields are sorted by declaring type and then by name, so equal field sets
//! always produce the same layout.

use crate::{
    descriptor::{ClassDescriptor, FieldDescriptor},
    registry::TypeDef,
    serializer::Serializer,
    Config, Error, FieldType, Registry, TypeName,
};
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};
use tracing::debug;

/// Group a field is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Primitive,
    Boxed,
    Final,
    Other,
    Container,
}

impl Category {
    fn of(field: &FieldDescriptor) -> Self {
        match &field.ty {
            FieldType::Primitive(_) => Self::Primitive,
            FieldType::Boxed(_) | FieldType::String => Self::Boxed,
            FieldType::List(_) | FieldType::Map(..) => Self::Container,
            FieldType::Enum(_) => Self::Final,
            FieldType::Struct(_) if field.monomorphic => Self::Final,
            FieldType::Struct(_) | FieldType::Any | FieldType::Array(_) => Self::Other,
        }
    }
}

/// A classified field.
#[derive(Debug)]
pub struct FieldInfo {
    pub name: String,
    pub declaring: TypeName,
    pub qualified: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub track_ref: bool,
    /// Where the value lives on the local instance (`None` if the local type lacks the field).
    pub slot: Option<usize>,
    serializer: OnceLock<Arc<dyn Serializer>>,
}

impl FieldInfo {
    fn new(field: FieldDescriptor, slot: Option<usize>, cfg: &Config) -> Self {
        let track_ref = cfg.track_ref && field.track_ref && field.ty.is_referencable();
        Self {
            qualified: field.qualified(),
            name: field.name,
            declaring: field.declaring,
            nullable: field.nullable,
            ty: field.ty,
            track_ref,
            slot,
            serializer: OnceLock::new(),
        }
    }

    /// Serializer of the declared type, resolved on first use if it was not registered when the
    /// plan was built.
    pub(crate) fn serializer(&self, registry: &Registry) -> Result<Arc<dyn Serializer>, Error> {
        if let Some(serializer) = self.serializer.get() {
            return Ok(serializer.clone());
        }
        let serializer = registry.serializer(&self.ty)?;
        let _ = self.serializer.set(serializer.clone());
        Ok(serializer)
    }
}

/// Ordered field groups of one type.
#[derive(Debug)]
pub struct FieldPlan {
    pub primitives: Vec<FieldInfo>,
    pub boxed: Vec<FieldInfo>,
    pub finals: Vec<FieldInfo>,
    /// For each of `finals`, whether it is written without type info.
    pub finals_monomorphic: Vec<bool>,
    pub others: Vec<FieldInfo>,
    pub containers: Vec<FieldInfo>,
    version_hash: i32,
}

impl FieldPlan {
    /// Plan of a local type: one entry per field, each bound to its slot.
    ///
    /// Transient fields are left out unless running in compatible mode.
    pub fn for_def(def: &TypeDef, registry: &Registry, cfg: &Config) -> Self {
        let fields = def
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| cfg.is_compatible() || !f.meta.transient)
            .map(|(slot, f)| {
                (
                    FieldDescriptor::new(registry, &f.declaring, &f.meta),
                    Some(slot),
                )
            })
            .collect();
        classify(fields, registry, cfg)
    }

    /// Plan that walks the fields of `descriptor`.
    ///
    /// With a local definition, each field is bound to the local slot declaring the same field
    /// with the same type (or to nothing). Without one, fields are bound to their position in
    /// the descriptor (the layout of a [crate::Placeholder]).
    pub fn reconcile(
        descriptor: &ClassDescriptor,
        local: Option<&TypeDef>,
        registry: &Registry,
        cfg: &Config,
    ) -> Self {
        let fields = descriptor
            .fields()
            .iter()
            .enumerate()
            .map(|(index, field)| {
                let slot = match local {
                    Some(def) => def
                        .declared_slot(&field.declaring, &field.name)
                        .filter(|slot| def.fields()[*slot].meta.ty == field.ty),
                    None => Some(index),
                };
                (field.clone(), slot)
            })
            .collect();
        classify(fields, registry, cfg)
    }

    /// Fields in write order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.primitives
            .iter()
            .chain(&self.boxed)
            .chain(&self.finals)
            .chain(&self.others)
            .chain(&self.containers)
    }

    /// Group and qualified name of every field, in write order.
    pub fn layout(&self) -> Vec<(Category, String)> {
        let group = |category, fields: &[FieldInfo]| {
            fields
                .iter()
                .map(move |f| (category, f.qualified.clone()))
                .collect::<Vec<_>>()
        };
        [
            group(Category::Primitive, &self.primitives),
            group(Category::Boxed, &self.boxed),
            group(Category::Final, &self.finals),
            group(Category::Other, &self.others),
            group(Category::Container, &self.containers),
        ]
        .concat()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rolling hash over the declared types of all fields, in write order.
    pub fn version_hash(&self) -> i32 {
        self.version_hash
    }
}

/// Groups and orders `fields` (each paired with its local slot).
pub fn classify(
    fields: Vec<(FieldDescriptor, Option<usize>)>,
    registry: &Registry,
    cfg: &Config,
) -> FieldPlan {
    let mut groups: [Vec<(FieldDescriptor, Option<usize>)>; 5] = Default::default();
    for (field, slot) in fields {
        let index = match Category::of(&field) {
            Category::Primitive => 0,
            Category::Boxed => 1,
            Category::Final => 2,
            Category::Other => 3,
            Category::Container => 4,
        };
        groups[index].push((field, slot));
    }
    let [primitives, boxed, finals, others, containers] = groups.map(|mut group| {
        group.sort_by(|(a, _), (b, _)| (&a.declaring, &a.name).cmp(&(&b.declaring, &b.name)));
        group
            .into_iter()
            .map(|(field, slot)| FieldInfo::new(field, slot, cfg))
            .collect::<Vec<_>>()
    });

    // In compatible mode, final structs still carry their type info so readers can reconcile
    // their descriptors. Enums carry no fields and stay monomorphic.
    let finals_monomorphic = finals
        .iter()
        .map(|f| matches!(f.ty, FieldType::Enum(_)) || !cfg.is_compatible())
        .collect::<Vec<_>>();
    for (field, monomorphic) in finals.iter().zip(&finals_monomorphic) {
        if *monomorphic {
            if let Ok(serializer) = registry.serializer(&field.ty) {
                let _ = field.serializer.set(serializer);
            }
        }
    }

    let mut plan = FieldPlan {
        primitives,
        boxed,
        finals,
        finals_monomorphic,
        others,
        containers,
        version_hash: 0,
    };
    plan.version_hash = plan.iter().fold(17i64, |hash, field| {
        let mut hash = hash * 31 + field.ty.hash_id();
        while hash >= i32::MAX as i64 {
            hash /= 7;
        }
        hash
    }) as i32;
    plan
}

/// Plans and descriptors built so far by one engine.
#[derive(Debug, Default)]
pub struct PlanCache {
    local: HashMap<TypeName, Arc<FieldPlan>>,
    reconciled: HashMap<(u64, bool), Arc<FieldPlan>>,
    descriptors: HashMap<TypeName, Arc<ClassDescriptor>>,
}

impl PlanCache {
    /// Plan of the local type `def`.
    pub fn local(&mut self, def: &TypeDef, registry: &Registry, cfg: &Config) -> Arc<FieldPlan> {
        self.local
            .entry(def.name().clone())
            .or_insert_with(|| {
                let plan = FieldPlan::for_def(def, registry, cfg);
                debug!(
                    ty = %def.name(),
                    primitives = plan.primitives.len(),
                    boxed = plan.boxed.len(),
                    finals = plan.finals.len(),
                    others = plan.others.len(),
                    containers = plan.containers.len(),
                    "built field plan"
                );
                Arc::new(plan)
            })
            .clone()
    }

    /// Plan reconciling `descriptor` with the local type `local` (or a placeholder).
    pub fn reconciled(
        &mut self,
        descriptor: &ClassDescriptor,
        local: Option<&TypeDef>,
        registry: &Registry,
        cfg: &Config,
    ) -> Arc<FieldPlan> {
        self.reconciled
            .entry((descriptor.id(), local.is_none()))
            .or_insert_with(|| {
                let plan = FieldPlan::reconcile(descriptor, local, registry, cfg);
                let matched = plan.iter().filter(|f| f.slot.is_some()).count();
                debug!(
                    ty = %descriptor.ident(),
                    id = descriptor.id(),
                    fields = plan.len(),
                    matched,
                    placeholder = local.is_none(),
                    "reconciled class descriptor"
                );
                Arc::new(plan)
            })
            .clone()
    }

    /// Descriptor of the local type `def`.
    pub fn descriptor(&mut self, def: &TypeDef, registry: &Registry) -> Arc<ClassDescriptor> {
        self.descriptors
            .entry(def.name().clone())
            .or_insert_with(|| Arc::new(ClassDescriptor::from_def(def, registry)))
            .clone()
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.reconciled.clear();
        self.descriptors.clear();
    }
}
