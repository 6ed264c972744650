//! Validating construction of [`Model`] metadata.
//!
//! [`ModelBuilder`] is the only way to obtain a [`Model`]. Entities and
//! properties are declared first; relationships are declared afterwards as
//! references with optional collection inverses, and all cross-entity wiring
//! (foreign keys, navigation handles, inverse pairs) is validated and
//! resolved in [`ModelBuilder::build`].

use relate_rs_core::{RelateError, RelateResult};

use crate::metadata::{
    EntityId, EntityType, ForeignKey, ForeignKeyRef, Model, NavigationKind, NavigationProperty,
    NavigationRef, Optionality, Property,
};
use crate::value::{Value, ValueType};

/// Declares properties for one entity inside
/// [`ModelBuilder::entity`]'s closure.
pub struct EntityBuilder {
    properties: Vec<Property>,
    primary_key: Vec<usize>,
}

impl EntityBuilder {
    /// Declares a primary-key property. Key properties are non-nullable and
    /// participate in the key in declaration order.
    pub fn key(&mut self, name: &str, value_type: ValueType) -> &mut Self {
        self.primary_key.push(self.properties.len());
        self.push(name, value_type, false, None)
    }

    /// Declares an ordinary non-nullable property.
    pub fn property(&mut self, name: &str, value_type: ValueType) -> &mut Self {
        self.push(name, value_type, false, None)
    }

    /// Declares a nullable property.
    pub fn nullable_property(&mut self, name: &str, value_type: ValueType) -> &mut Self {
        self.push(name, value_type, true, None)
    }

    /// Declares a property with a sentinel "unset" value, which may differ
    /// from the type's natural default.
    pub fn sentinel_property(
        &mut self,
        name: &str,
        value_type: ValueType,
        sentinel: Value,
    ) -> &mut Self {
        self.push(name, value_type, false, Some(sentinel))
    }

    fn push(
        &mut self,
        name: &str,
        value_type: ValueType,
        nullable: bool,
        sentinel: Option<Value>,
    ) -> &mut Self {
        self.properties.push(Property {
            name: name.to_string(),
            column: name.to_string(),
            value_type,
            nullable,
            sentinel,
        });
        self
    }
}

struct PendingReference {
    owner: EntityId,
    name: String,
    target: EntityId,
    fk_properties: Vec<String>,
    optionality: Optionality,
    inverse_name: Option<String>,
}

/// Attaches follow-up configuration to a declared reference.
pub struct ReferenceBuilder<'a> {
    pending: &'a mut PendingReference,
}

impl ReferenceBuilder<'_> {
    /// Declares the inverse Collection navigation on the target entity.
    pub fn inverse(self, name: &str) {
        self.pending.inverse_name = Some(name.to_string());
    }
}

/// Builds an immutable [`Model`].
///
/// # Examples
///
/// ```
/// use relate_rs_model::builder::ModelBuilder;
/// use relate_rs_model::metadata::Optionality;
/// use relate_rs_model::value::ValueType;
///
/// let mut b = ModelBuilder::new();
/// let blog = b.entity("Blog", "blogs", |e| {
///     e.key("id", ValueType::Int);
///     e.property("name", ValueType::Text);
/// });
/// let post = b.entity("Post", "posts", |e| {
///     e.key("id", ValueType::Int);
///     e.property("title", ValueType::Text);
///     e.nullable_property("blog_id", ValueType::Int);
/// });
/// b.reference(post, "Blog", blog, &["blog_id"], Optionality::Optional)
///     .inverse("Posts");
/// let model = b.build().unwrap();
/// assert!(model.entity_by_name("Blog").is_some());
/// ```
#[derive(Default)]
pub struct ModelBuilder {
    entities: Vec<EntityType>,
    references: Vec<PendingReference>,
}

impl ModelBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity with the given name and table, configuring its
    /// properties through the closure.
    pub fn entity(
        &mut self,
        name: &str,
        table: &str,
        configure: impl FnOnce(&mut EntityBuilder),
    ) -> EntityId {
        let mut eb = EntityBuilder {
            properties: Vec::new(),
            primary_key: Vec::new(),
        };
        configure(&mut eb);
        let id = EntityId(self.entities.len());
        self.entities.push(EntityType {
            name: name.to_string(),
            table: table.to_string(),
            properties: eb.properties,
            primary_key: eb.primary_key,
            foreign_keys: Vec::new(),
            navigations: Vec::new(),
        });
        id
    }

    /// Declares a Reference navigation from `owner` to `target`, traversing
    /// a foreign key over the named properties on `owner` (in target-key
    /// order). Chain [`ReferenceBuilder::inverse`] to also declare the
    /// Collection navigation back from `target`.
    ///
    /// Wiring and validation are deferred to [`build`](Self::build).
    pub fn reference(
        &mut self,
        owner: EntityId,
        name: &str,
        target: EntityId,
        fk_properties: &[&str],
        optionality: Optionality,
    ) -> ReferenceBuilder<'_> {
        self.references.push(PendingReference {
            owner,
            name: name.to_string(),
            target,
            fk_properties: fk_properties.iter().map(|s| (*s).to_string()).collect(),
            optionality,
            inverse_name: None,
        });
        let index = self.references.len() - 1;
        ReferenceBuilder {
            pending: &mut self.references[index],
        }
    }

    /// Validates the declared graph and produces the immutable [`Model`].
    ///
    /// # Errors
    ///
    /// Returns [`RelateError::InvalidModel`] when an entity lacks a primary
    /// key, names collide, a foreign key's properties are missing or do not
    /// match the principal key in arity or type, a Required reference rests
    /// on a nullable column, or a sentinel value disagrees with its
    /// property's declared type.
    pub fn build(mut self) -> RelateResult<Model> {
        self.check_entities()?;
        let references = std::mem::take(&mut self.references);
        for pending in references {
            self.wire_reference(&pending)?;
        }
        Ok(Model {
            entities: self.entities,
        })
    }

    fn check_entities(&self) -> RelateResult<()> {
        for (i, entity) in self.entities.iter().enumerate() {
            if self.entities[..i].iter().any(|e| e.name == entity.name) {
                return Err(RelateError::InvalidModel(format!(
                    "duplicate entity name '{}'",
                    entity.name
                )));
            }
            if entity.primary_key.is_empty() {
                return Err(RelateError::InvalidModel(format!(
                    "entity '{}' has no primary key",
                    entity.name
                )));
            }
            for (j, prop) in entity.properties.iter().enumerate() {
                if entity.properties[..j].iter().any(|p| p.name == prop.name) {
                    return Err(RelateError::InvalidModel(format!(
                        "duplicate property '{}' on entity '{}'",
                        prop.name, entity.name
                    )));
                }
                if let Some(sentinel) = &prop.sentinel {
                    if sentinel.value_type() != Some(prop.value_type) {
                        return Err(RelateError::InvalidModel(format!(
                            "sentinel value for '{}.{}' does not match its declared type",
                            entity.name, prop.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn wire_reference(&mut self, pending: &PendingReference) -> RelateResult<()> {
        let owner_name = self.entities[pending.owner.0].name.clone();
        let target = &self.entities[pending.target.0];
        let target_key_len = target.primary_key.len();
        let target_key_types: Vec<ValueType> = target
            .primary_key
            .iter()
            .map(|&i| target.properties[i].value_type)
            .collect();

        if pending.fk_properties.len() != target_key_len {
            return Err(RelateError::InvalidModel(format!(
                "foreign key for '{}.{}' has {} properties but the principal key has {}",
                owner_name,
                pending.name,
                pending.fk_properties.len(),
                target_key_len
            )));
        }

        let owner = &self.entities[pending.owner.0];
        let mut dependent_properties = Vec::with_capacity(pending.fk_properties.len());
        for (fk_name, key_type) in pending.fk_properties.iter().zip(&target_key_types) {
            let index = owner.property_index(fk_name).ok_or_else(|| {
                RelateError::InvalidModel(format!(
                    "foreign key property '{fk_name}' is not declared on entity '{owner_name}'"
                ))
            })?;
            let prop = &owner.properties[index];
            if prop.value_type != *key_type {
                return Err(RelateError::InvalidModel(format!(
                    "foreign key property '{owner_name}.{fk_name}' does not match the principal key type"
                )));
            }
            if pending.optionality == Optionality::Required && prop.nullable {
                return Err(RelateError::InvalidModel(format!(
                    "required reference '{}.{}' rests on nullable property '{fk_name}'",
                    owner_name, pending.name
                )));
            }
            dependent_properties.push(index);
        }

        self.check_navigation_name(pending.owner, &pending.name)?;
        if let Some(inverse_name) = &pending.inverse_name {
            self.check_navigation_name(pending.target, inverse_name)?;
        }

        let fk = ForeignKeyRef {
            entity: pending.owner,
            index: self.entities[pending.owner.0].foreign_keys.len(),
        };
        self.entities[pending.owner.0].foreign_keys.push(ForeignKey {
            dependent_properties,
            principal: pending.target,
        });

        let reference = NavigationRef {
            entity: pending.owner,
            index: self.entities[pending.owner.0].navigations.len(),
        };
        // For a self-reference the collection handle lands one slot later on
        // the same entity.
        let inverse = pending.inverse_name.as_ref().map(|_| NavigationRef {
            entity: pending.target,
            index: self.entities[pending.target.0].navigations.len()
                + usize::from(pending.target == pending.owner),
        });

        self.entities[pending.owner.0]
            .navigations
            .push(NavigationProperty {
                name: pending.name.clone(),
                kind: NavigationKind::Reference(pending.optionality),
                target: pending.target,
                foreign_key: fk,
                inverse,
            });

        if let Some(inverse_name) = &pending.inverse_name {
            self.entities[pending.target.0]
                .navigations
                .push(NavigationProperty {
                    name: inverse_name.clone(),
                    kind: NavigationKind::Collection,
                    target: pending.owner,
                    foreign_key: fk,
                    inverse: Some(reference),
                });
        }
        Ok(())
    }

    fn check_navigation_name(&self, entity: EntityId, name: &str) -> RelateResult<()> {
        let entity = &self.entities[entity.0];
        if entity.navigations.iter().any(|n| n.name == name) {
            return Err(RelateError::InvalidModel(format!(
                "duplicate navigation '{}' on entity '{}'",
                name, entity.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_primary_key() {
        let mut b = ModelBuilder::new();
        b.entity("Orphan", "orphans", |e| {
            e.property("name", ValueType::Text);
        });
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("has no primary key"));
    }

    #[test]
    fn test_duplicate_entity_name() {
        let mut b = ModelBuilder::new();
        b.entity("A", "a1", |e| {
            e.key("id", ValueType::Int);
        });
        b.entity("A", "a2", |e| {
            e.key("id", ValueType::Int);
        });
        assert!(b.build().is_err());
    }

    #[test]
    fn test_fk_arity_mismatch() {
        let mut b = ModelBuilder::new();
        let a = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
            e.key("region", ValueType::Text);
        });
        let d = b.entity("D", "d", |e| {
            e.key("id", ValueType::Int);
            e.property("a_id", ValueType::Int);
        });
        b.reference(d, "A", a, &["a_id"], Optionality::Required);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("principal key has 2"));
    }

    #[test]
    fn test_fk_type_mismatch() {
        let mut b = ModelBuilder::new();
        let a = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
        });
        let d = b.entity("D", "d", |e| {
            e.key("id", ValueType::Int);
            e.property("a_id", ValueType::Text);
        });
        b.reference(d, "A", a, &["a_id"], Optionality::Required);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("does not match the principal key type"));
    }

    #[test]
    fn test_required_reference_on_nullable_column() {
        let mut b = ModelBuilder::new();
        let a = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
        });
        let d = b.entity("D", "d", |e| {
            e.key("id", ValueType::Int);
            e.nullable_property("a_id", ValueType::Int);
        });
        b.reference(d, "A", a, &["a_id"], Optionality::Required);
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("rests on nullable property"));
    }

    #[test]
    fn test_sentinel_type_mismatch() {
        let mut b = ModelBuilder::new();
        b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
            e.sentinel_property("code", ValueType::Int, Value::from("unset"));
        });
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("sentinel value"));
    }

    #[test]
    fn test_sentinel_value_kept_as_metadata() {
        let mut b = ModelBuilder::new();
        let a = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
            e.sentinel_property("code", ValueType::Int, Value::Int(7));
        });
        let model = b.build().unwrap();
        let code = model.property_by_name(a, "code").unwrap();
        assert_eq!(model.property(code).unwrap().sentinel, Some(Value::Int(7)));
    }

    #[test]
    fn test_self_reference_inverse_wiring() {
        let mut b = ModelBuilder::new();
        let emp = b.entity("Employee", "employees", |e| {
            e.key("id", ValueType::Int);
            e.nullable_property("manager_id", ValueType::Int);
        });
        b.reference(emp, "Manager", emp, &["manager_id"], Optionality::Optional)
            .inverse("Reports");
        let model = b.build().unwrap();

        let manager = model.navigation_by_name(emp, "Manager").unwrap();
        let reports = model.navigation_by_name(emp, "Reports").unwrap();
        assert_eq!(model.navigation(manager).unwrap().inverse, Some(reports));
        assert_eq!(model.navigation(reports).unwrap().inverse, Some(manager));
    }

    #[test]
    fn test_composite_foreign_key() {
        let mut b = ModelBuilder::new();
        let a = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
            e.key("region", ValueType::Text);
        });
        let d = b.entity("D", "d", |e| {
            e.key("id", ValueType::Int);
            e.property("a_id", ValueType::Int);
            e.property("a_region", ValueType::Text);
        });
        b.reference(d, "A", a, &["a_id", "a_region"], Optionality::Required);
        let model = b.build().unwrap();
        let nav = model.navigation_by_name(d, "A").unwrap();
        let fk = model.navigation(nav).unwrap().foreign_key;
        assert_eq!(
            model.foreign_key(fk).unwrap().dependent_properties,
            vec![1, 2]
        );
    }
}
