//! Entity-graph metadata consumed by the query compiler.
//!
//! A [`Model`] is an immutable arena of [`EntityType`]s connected by
//! [`ForeignKey`]s and [`NavigationProperty`]s. The compiler only ever reads
//! this structure; it is built once up front by a
//! [`ModelBuilder`](crate::builder::ModelBuilder) and then shared by
//! reference across arbitrarily many concurrent compilations.
//!
//! Entities, properties, foreign keys, and navigations refer to each other
//! through index handles ([`EntityId`], [`PropertyRef`], [`NavigationRef`],
//! [`ForeignKeyRef`]) rather than owned pointers, which keeps navigation
//! inverses and self-referencing relationships cycle-free.

use crate::value::{Value, ValueType};

/// Handle to an [`EntityType`] within a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

/// Handle to a [`Property`] on a specific entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    /// The entity declaring the property.
    pub entity: EntityId,
    /// Index into [`EntityType::properties`].
    pub index: usize,
}

/// Handle to a [`NavigationProperty`] on a specific entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavigationRef {
    /// The entity owning the navigation.
    pub entity: EntityId,
    /// Index into [`EntityType::navigations`].
    pub index: usize,
}

/// Handle to a [`ForeignKey`] declared on its dependent entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKeyRef {
    /// The dependent entity declaring the foreign key.
    pub entity: EntityId,
    /// Index into [`EntityType::foreign_keys`].
    pub index: usize,
}

/// A single column-backed property of an entity.
#[derive(Debug, Clone)]
pub struct Property {
    /// The property name as it appears in the entity graph.
    pub name: String,
    /// The backing column name.
    pub column: String,
    /// The declared value type.
    pub value_type: ValueType,
    /// Whether the column admits NULL.
    pub nullable: bool,
    /// The value treated as "unset", which may differ from the type's
    /// natural default. Consumed as metadata only; enforcement belongs to
    /// the state tracker, not this compiler.
    pub sentinel: Option<Value>,
}

/// Ordered dependent properties referencing a principal entity's key.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Indices of the dependent properties on the declaring entity, in
    /// principal-key order.
    pub dependent_properties: Vec<usize>,
    /// The principal entity whose primary key is referenced.
    pub principal: EntityId,
}

/// Whether a navigation is single-valued or multi-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// A to-one navigation.
    Reference,
    /// A to-many navigation.
    Collection,
}

/// Whether a Reference navigation may be absent.
///
/// Meaningful only for [`Multiplicity::Reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optionality {
    /// The related entity always exists.
    Required,
    /// The related entity may be absent (nullable foreign key).
    Optional,
}

/// The shape of a navigation property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// A to-one navigation with the given optionality. The associated
    /// foreign key is declared on the owning entity.
    Reference(Optionality),
    /// A to-many navigation. The associated foreign key is declared on the
    /// target entity, pointing back at the owner.
    Collection,
}

/// A typed relationship from one entity to another.
#[derive(Debug, Clone)]
pub struct NavigationProperty {
    /// The navigation name as it appears in the entity graph.
    pub name: String,
    /// Reference or Collection, with optionality for references.
    pub kind: NavigationKind,
    /// The entity the navigation leads to.
    pub target: EntityId,
    /// The foreign key the navigation traverses. For a Reference this is
    /// declared on the owner; for a Collection, on the target.
    pub foreign_key: ForeignKeyRef,
    /// The navigation in the opposite direction, when modeled.
    pub inverse: Option<NavigationRef>,
}

impl NavigationProperty {
    /// Returns the multiplicity of this navigation.
    pub const fn multiplicity(&self) -> Multiplicity {
        match self.kind {
            NavigationKind::Reference(_) => Multiplicity::Reference,
            NavigationKind::Collection => Multiplicity::Collection,
        }
    }

    /// Returns the optionality of a Reference navigation. Collections are
    /// reported as `Required`; owner preservation for collections is an
    /// include-planning concern, not a join-kind one.
    pub const fn optionality(&self) -> Optionality {
        match self.kind {
            NavigationKind::Reference(opt) => opt,
            NavigationKind::Collection => Optionality::Required,
        }
    }
}

/// A modeled row-shaped record type with identity.
#[derive(Debug, Clone)]
pub struct EntityType {
    /// The entity name (e.g. "Blog").
    pub name: String,
    /// The backing table name (e.g. "blogs").
    pub table: String,
    /// Ordered properties.
    pub properties: Vec<Property>,
    /// Indices of the primary-key properties, in key order.
    pub primary_key: Vec<usize>,
    /// Foreign keys declared on this (dependent) entity.
    pub foreign_keys: Vec<ForeignKey>,
    /// Navigation properties owned by this entity.
    pub navigations: Vec<NavigationProperty>,
}

impl EntityType {
    /// Looks up a property index by name.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Looks up a navigation index by name.
    pub fn navigation_index(&self, name: &str) -> Option<usize> {
        self.navigations.iter().position(|n| n.name == name)
    }
}

/// The immutable entity-graph metadata arena.
///
/// Constructed by [`ModelBuilder`](crate::builder::ModelBuilder); all
/// compiler lookups go through the checked accessors here, which return
/// `None` when a handle does not belong to this model.
#[derive(Debug)]
pub struct Model {
    pub(crate) entities: Vec<EntityType>,
}

impl Model {
    /// Returns the entity for a handle, if it belongs to this model.
    pub fn entity(&self, id: EntityId) -> Option<&EntityType> {
        self.entities.get(id.0)
    }

    /// Returns all entities in declaration order.
    pub fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    /// Finds an entity handle by name.
    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .position(|e| e.name == name)
            .map(EntityId)
    }

    /// Returns the property for a handle.
    pub fn property(&self, prop: PropertyRef) -> Option<&Property> {
        self.entity(prop.entity)?.properties.get(prop.index)
    }

    /// Returns the navigation for a handle.
    pub fn navigation(&self, nav: NavigationRef) -> Option<&NavigationProperty> {
        self.entity(nav.entity)?.navigations.get(nav.index)
    }

    /// Returns the foreign key for a handle.
    pub fn foreign_key(&self, fk: ForeignKeyRef) -> Option<&ForeignKey> {
        self.entity(fk.entity)?.foreign_keys.get(fk.index)
    }

    /// Returns a handle to the named navigation on the given entity.
    pub fn navigation_by_name(&self, entity: EntityId, name: &str) -> Option<NavigationRef> {
        let index = self.entity(entity)?.navigation_index(name)?;
        Some(NavigationRef { entity, index })
    }

    /// Returns a handle to the named property on the given entity.
    pub fn property_by_name(&self, entity: EntityId, name: &str) -> Option<PropertyRef> {
        let index = self.entity(entity)?.property_index(name)?;
        Some(PropertyRef { entity, index })
    }
}
