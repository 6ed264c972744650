//! Navigation resolution against the Model.
//!
//! [`resolve`] is a pure lookup: given an owner entity and a navigation
//! handle, it produces everything the join planner needs — target entity,
//! multiplicity, optionality, the join column pairs, and the inverse. It
//! never decides join kind; that is the selector's job
//! (see [`crate::join_graph`]).

use relate_rs_core::{RelateError, RelateResult};
use relate_rs_model::{
    EntityId, Model, Multiplicity, NavigationKind, NavigationProperty, NavigationRef, Optionality,
};

/// The facts about one navigation traversal.
#[derive(Debug)]
pub struct ResolvedNavigation<'m> {
    /// The navigation metadata.
    pub navigation: &'m NavigationProperty,
    /// The entity the traversal lands on.
    pub target: EntityId,
    /// Reference or Collection.
    pub multiplicity: Multiplicity,
    /// Required or Optional (References only; Collections report Required).
    pub optionality: Optionality,
    /// Equi-join column pairs as property indices:
    /// `(owner-side property, target-side property)`.
    pub join_predicate: Vec<(usize, usize)>,
    /// The opposite-direction navigation, when modeled.
    pub inverse: Option<NavigationRef>,
}

/// Resolves a navigation traversal from `owner`.
///
/// # Errors
///
/// Returns [`RelateError::UnresolvedNavigation`] if the handle does not name
/// a navigation on `owner`'s entity type, which fails the whole compilation
/// before any statement is emitted.
pub fn resolve<'m>(
    model: &'m Model,
    owner: EntityId,
    nav: NavigationRef,
) -> RelateResult<ResolvedNavigation<'m>> {
    let owner_entity = model
        .entity(owner)
        .ok_or_else(|| unresolved(model, owner, nav))?;
    if nav.entity != owner {
        return Err(unresolved(model, owner, nav));
    }
    let navigation = owner_entity
        .navigations
        .get(nav.index)
        .ok_or_else(|| unresolved(model, owner, nav))?;
    let fk = model
        .foreign_key(navigation.foreign_key)
        .ok_or_else(|| unresolved(model, owner, nav))?;

    let target_entity = model
        .entity(navigation.target)
        .ok_or_else(|| unresolved(model, owner, nav))?;

    // The foreign key sits on the dependent side: the owner for a Reference,
    // the target for a Collection. Either way the principal side contributes
    // its primary key, in key order.
    let join_predicate = match navigation.kind {
        NavigationKind::Reference(_) => fk
            .dependent_properties
            .iter()
            .zip(&target_entity.primary_key)
            .map(|(&dep, &key)| (dep, key))
            .collect(),
        NavigationKind::Collection => owner_entity
            .primary_key
            .iter()
            .zip(&fk.dependent_properties)
            .map(|(&key, &dep)| (key, dep))
            .collect(),
    };

    Ok(ResolvedNavigation {
        navigation,
        target: navigation.target,
        multiplicity: navigation.multiplicity(),
        optionality: navigation.optionality(),
        join_predicate,
        inverse: navigation.inverse,
    })
}

fn unresolved(model: &Model, owner: EntityId, nav: NavigationRef) -> RelateError {
    let entity = model
        .entity(owner)
        .map_or_else(|| format!("#{}", owner.0), |e| e.name.clone());
    let navigation = model
        .navigation(nav)
        .map_or_else(|| format!("#{}", nav.index), |n| n.name.clone());
    RelateError::UnresolvedNavigation { entity, navigation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relate_rs_model::{ModelBuilder, ValueType};

    fn blog_post_model() -> (Model, EntityId, EntityId) {
        let mut b = ModelBuilder::new();
        let blog = b.entity("Blog", "blogs", |e| {
            e.key("id", ValueType::Int);
            e.property("name", ValueType::Text);
        });
        let post = b.entity("Post", "posts", |e| {
            e.key("id", ValueType::Int);
            e.property("title", ValueType::Text);
            e.nullable_property("blog_id", ValueType::Int);
        });
        b.reference(post, "Blog", blog, &["blog_id"], Optionality::Optional)
            .inverse("Posts");
        (b.build().unwrap(), blog, post)
    }

    #[test]
    fn test_resolve_reference() {
        let (model, blog, post) = blog_post_model();
        let nav = model.navigation_by_name(post, "Blog").unwrap();
        let resolved = resolve(&model, post, nav).unwrap();
        assert_eq!(resolved.target, blog);
        assert_eq!(resolved.multiplicity, Multiplicity::Reference);
        assert_eq!(resolved.optionality, Optionality::Optional);
        // posts.blog_id (index 2) joins blogs.id (index 0).
        assert_eq!(resolved.join_predicate, vec![(2, 0)]);
    }

    #[test]
    fn test_resolve_collection_uses_inverse_fk() {
        let (model, blog, post) = blog_post_model();
        let nav = model.navigation_by_name(blog, "Posts").unwrap();
        let resolved = resolve(&model, blog, nav).unwrap();
        assert_eq!(resolved.target, post);
        assert_eq!(resolved.multiplicity, Multiplicity::Collection);
        // blogs.id (index 0) joins posts.blog_id (index 2).
        assert_eq!(resolved.join_predicate, vec![(0, 2)]);
    }

    #[test]
    fn test_resolve_rejects_foreign_handle() {
        let (model, blog, post) = blog_post_model();
        // A navigation handle belonging to Post, looked up on Blog.
        let nav = model.navigation_by_name(post, "Blog").unwrap();
        let err = resolve(&model, blog, nav).unwrap_err();
        assert!(matches!(err, RelateError::UnresolvedNavigation { .. }));
    }

    #[test]
    fn test_resolve_rejects_out_of_range_index() {
        let (model, _, post) = blog_post_model();
        let nav = NavigationRef {
            entity: post,
            index: 42,
        };
        let err = resolve(&model, post, nav).unwrap_err();
        assert!(err.to_string().contains("Post"));
    }
}
