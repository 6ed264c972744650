//! Incremental join-graph construction and join-kind selection.
//!
//! A [`QueryShape`] is the alias arena and edge set of one statement. It is
//! created fresh per compilation, mutated append-only while the translator
//! visits the IR, and frozen (consumed) when the statement is finalized —
//! no alias state is ever cached or shared across compilations.
//!
//! Alias identity is the navigation *path key*: owner alias + navigation +
//! optional join-predicate override. Two traversals of the identical path
//! from the identical alias resolve to the same alias; traversals that
//! differ in path or in join predicate never collapse, even when they reach
//! the same entity type. Human-readable name collisions are resolved with a
//! purely cosmetic numeric suffix.

use std::collections::HashMap;

use relate_rs_core::{RelateError, RelateResult};
use relate_rs_model::{EntityId, Model, Multiplicity, NavigationRef, Optionality};
use tracing::debug;

use crate::ir::NavPath;
use crate::resolver::{self, ResolvedNavigation};
use crate::select::{JoinKind, SqlExpr, SqlJoin, TableSource};

/// Equi-join column pairs as `(from-side property, to-side property)`
/// indices.
pub type JoinColumns = Vec<(usize, usize)>;

/// Handle to a query source within one [`QueryShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub usize);

/// One occurrence of an entity within a statement's FROM/JOIN graph.
#[derive(Debug, Clone)]
pub struct QuerySource {
    /// The generated alias name.
    pub name: String,
    /// The entity bound to this alias.
    pub entity: EntityId,
    /// The navigation path that produced the alias; empty for the root.
    pub path: NavPath,
    /// Whether the alias is reachable through a LEFT join (its columns may
    /// be NULL even when the underlying property is not nullable).
    pub nullable: bool,
}

/// A join edge between two aliases.
#[derive(Debug, Clone)]
pub struct JoinEdge {
    /// The owning side.
    pub from: AliasId,
    /// The joined side.
    pub to: AliasId,
    /// The selected join kind.
    pub kind: JoinKind,
    /// Equi-join column pairs.
    pub predicate: JoinColumns,
}

/// How a traversal entered the join graph, for join-kind selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinContext {
    /// An ordinary navigation access inside a predicate, projection, or
    /// ordering.
    Navigate,
    /// A collection explicitly enumerated into the statement; cardinality
    /// expansion is intended.
    Flatten,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathKey {
    owner: AliasId,
    nav: NavigationRef,
    predicate_override: Option<JoinColumns>,
}

/// Selects the join kind for one navigation edge.
///
/// `owner_nullable` reports whether the owning alias sits behind a LEFT
/// join already; a required hop under an optional one must not filter out
/// owners, so Inner demotes to Left in that case.
///
/// # Errors
///
/// A Collection navigation outside a flattening context is not an edge at
/// all — it must become an include statement or a correlated count — and
/// is rejected as [`RelateError::InvalidQuery`].
pub fn select_join_kind(
    resolved: &ResolvedNavigation<'_>,
    context: JoinContext,
    owner_nullable: bool,
) -> RelateResult<JoinKind> {
    let kind = match (resolved.multiplicity, context) {
        (Multiplicity::Collection, JoinContext::Flatten) => JoinKind::Inner,
        (Multiplicity::Collection, JoinContext::Navigate) => {
            return Err(RelateError::InvalidQuery(format!(
                "collection navigation '{}' cannot be joined into the statement; \
                 flatten it, include it, or aggregate over it",
                resolved.navigation.name
            )));
        }
        (Multiplicity::Reference, _) => match resolved.optionality {
            Optionality::Required if owner_nullable => JoinKind::Left,
            Optionality::Required => JoinKind::Inner,
            Optionality::Optional => JoinKind::Left,
        },
    };
    Ok(kind)
}

/// The alias set and edge set of one statement under construction.
#[derive(Debug)]
pub struct QueryShape {
    sources: Vec<QuerySource>,
    edges: Vec<JoinEdge>,
    dedup: HashMap<PathKey, AliasId>,
    name_counts: HashMap<String, usize>,
    max_identifier_len: Option<usize>,
    multiplying: bool,
}

impl QueryShape {
    /// Creates a shape rooted at the given entity, allocating the root
    /// alias from its table name.
    pub fn new(
        model: &Model,
        root: EntityId,
        max_identifier_len: Option<usize>,
    ) -> RelateResult<Self> {
        let entity = model
            .entity(root)
            .ok_or_else(|| RelateError::InvalidQuery(format!("unknown root entity #{}", root.0)))?;
        let mut shape = Self {
            sources: Vec::new(),
            edges: Vec::new(),
            dedup: HashMap::new(),
            name_counts: HashMap::new(),
            max_identifier_len,
            multiplying: false,
        };
        let name = shape.reserve_name(&entity.table)?;
        shape.sources.push(QuerySource {
            name,
            entity: root,
            path: NavPath::root(),
            nullable: false,
        });
        Ok(shape)
    }

    /// The root alias.
    pub fn root(&self) -> AliasId {
        AliasId(0)
    }

    /// All sources, in allocation order (root first).
    pub fn sources(&self) -> &[QuerySource] {
        &self.sources
    }

    /// All join edges, in allocation order.
    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    /// The source behind an alias.
    pub fn source(&self, id: AliasId) -> &QuerySource {
        &self.sources[id.0]
    }

    /// The generated name of an alias.
    pub fn alias_name(&self, id: AliasId) -> &str {
        &self.sources[id.0].name
    }

    /// Returns `true` if any edge can multiply root rows (a flattened
    /// collection join).
    pub const fn has_multiplying_join(&self) -> bool {
        self.multiplying
    }

    /// The alias bound to a navigation path, if the path has been joined.
    pub fn alias_for_path(&self, path: &NavPath) -> Option<AliasId> {
        self.sources.iter().position(|s| s.path == *path).map(AliasId)
    }

    /// Returns the alias for a navigation traversal, allocating it and its
    /// pending join edge on first use.
    ///
    /// The dedup key is (owner, navigation, predicate override): an
    /// identical traversal returns the existing alias; a traversal that
    /// differs in any component allocates a fresh one. Self-referencing
    /// navigations therefore get a fresh alias per traversal instance.
    pub fn get_or_create_alias(
        &mut self,
        model: &Model,
        owner: AliasId,
        nav: NavigationRef,
        predicate_override: Option<&JoinColumns>,
        context: JoinContext,
    ) -> RelateResult<AliasId> {
        let key = PathKey {
            owner,
            nav,
            predicate_override: predicate_override.cloned(),
        };
        if let Some(&existing) = self.dedup.get(&key) {
            return Ok(existing);
        }

        let owner_entity = self.sources[owner.0].entity;
        let owner_nullable = self.sources[owner.0].nullable;
        let path = self.sources[owner.0].path.child(nav);
        let resolved = resolver::resolve(model, owner_entity, nav)?;
        let kind = select_join_kind(&resolved, context, owner_nullable)?;
        let target_entity = model.entity(resolved.target).ok_or_else(|| {
            RelateError::InvalidQuery(format!("unknown entity #{}", resolved.target.0))
        })?;

        let name = self.reserve_name(&target_entity.table)?;
        let id = AliasId(self.sources.len());
        let nullable = owner_nullable || kind == JoinKind::Left;
        debug!(
            alias = %name,
            navigation = %resolved.navigation.name,
            kind = ?kind,
            "allocated join alias"
        );
        self.sources.push(QuerySource {
            name,
            entity: resolved.target,
            path,
            nullable,
        });
        self.edges.push(JoinEdge {
            from: owner,
            to: id,
            kind,
            predicate: predicate_override
                .cloned()
                .unwrap_or(resolved.join_predicate),
        });
        if context == JoinContext::Flatten {
            self.multiplying = true;
        }
        self.dedup.insert(key, id);
        Ok(id)
    }

    /// Allocates a unique alias name from a base, appending a numeric
    /// suffix on collision. The suffix is cosmetic and never affects alias
    /// identity.
    ///
    /// Also used for subquery aliases that live outside the dedup map, so
    /// nested scopes never shadow an outer alias.
    pub fn reserve_name(&mut self, base: &str) -> RelateResult<String> {
        let count = self.name_counts.entry(base.to_string()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            base.to_string()
        } else {
            format!("{base}_{count}")
        };
        if let Some(limit) = self.max_identifier_len {
            if name.len() > limit {
                return Err(RelateError::UnsupportedIdentifier {
                    identifier: name,
                    limit,
                });
            }
        }
        Ok(name)
    }
}

/// Lowers the shape's edges into JOIN clauses, in allocation order.
pub fn joins_from_shape(model: &Model, shape: &QueryShape) -> RelateResult<Vec<SqlJoin>> {
    shape
        .edges()
        .iter()
        .map(|edge| {
            let from = shape.source(edge.from);
            let to = shape.source(edge.to);
            let from_entity = model.entity(from.entity).ok_or_else(|| {
                RelateError::InvalidQuery(format!("unknown entity #{}", from.entity.0))
            })?;
            let to_entity = model.entity(to.entity).ok_or_else(|| {
                RelateError::InvalidQuery(format!("unknown entity #{}", to.entity.0))
            })?;
            let on = SqlExpr::conjoin(edge.predicate.iter().map(|&(f, t)| {
                SqlExpr::column(from.name.clone(), from_entity.properties[f].column.clone()).eq(
                    SqlExpr::column(to.name.clone(), to_entity.properties[t].column.clone()),
                )
            }));
            Ok(SqlJoin {
                kind: edge.kind,
                source: TableSource::Table {
                    name: to_entity.table.clone(),
                    alias: to.name.clone(),
                },
                on,
            })
        })
        .collect()
}
