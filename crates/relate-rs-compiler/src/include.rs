//! Eager-load planning.
//!
//! Include paths are split at cardinality boundaries. Reference segments
//! fold into their enclosing statement as joins whose target columns join
//! the projection; each Collection segment starts a separate child
//! statement so result rows are never multiplied. A Reference segment is
//! also promoted to its own statement when folding it would exceed the
//! configured join depth, or when its alias would blow the backend's
//! identifier limit.
//!
//! A child statement selects from the child table and inner-joins a
//! derived *owners* table: the parent statement reduced to its correlation
//! key columns. Paged parents are wrapped whole in a derived table first so
//! the page boundary is computed exactly once; flattened parents project
//! their keys `DISTINCT` so duplicated owner rows never duplicate
//! children. Child rows are ordered by the correlation key first, so the
//! consumer can stitch parent and child streams in a single merge pass.

use std::collections::{HashMap, HashSet};

use relate_rs_core::{RelateError, RelateResult};
use relate_rs_model::{EntityId, EntityType, Model, Multiplicity};
use tracing::debug;

use crate::ir::{NavPath, QueryIr};
use crate::join_graph::{joins_from_shape, JoinContext, QueryShape};
use crate::resolver;
use crate::select::{
    JoinKind, OrderByItem, SelectColumn, SelectQuery, SqlExpr, SqlJoin, TableSource,
};
use crate::translate::{path_target, Translator};

/// One split point: a statement rooted at the target of `path`'s last
/// segment.
#[derive(Debug)]
struct SplitNode {
    /// Absolute navigation path from the query root to the splitting
    /// segment.
    path: NavPath,
    /// Absolute paths of Reference navigations folded into this
    /// statement.
    ref_folds: Vec<NavPath>,
    /// Child split points, in first-seen order.
    children: Vec<usize>,
}

/// The tree of split points produced by folding.
#[derive(Debug, Default)]
pub(crate) struct SplitForest {
    nodes: Vec<SplitNode>,
    roots: Vec<usize>,
    by_path: HashMap<NavPath, usize>,
}

impl SplitForest {
    /// Returns `true` when every include folded into the primary
    /// statement.
    pub(crate) fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn split(&mut self, parent: Option<usize>, path: NavPath) -> usize {
        if let Some(&existing) = self.by_path.get(&path) {
            return existing;
        }
        let id = self.nodes.len();
        self.nodes.push(SplitNode {
            path: path.clone(),
            ref_folds: Vec::new(),
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.by_path.insert(path, id);
        id
    }
}

/// The statement a child correlates against.
enum Scope<'a> {
    Primary {
        statement: &'a SelectQuery,
        shape: &'a QueryShape,
    },
    Level {
        statement: SelectQuery,
        shape: QueryShape,
        /// Length of the absolute path at this statement's root.
        base_len: usize,
    },
}

/// Plans eager loads for one query.
pub(crate) struct IncludePlanner<'m> {
    model: &'m Model,
    max_join_depth: usize,
    max_identifier_len: Option<usize>,
}

impl<'m> IncludePlanner<'m> {
    pub(crate) fn new(
        model: &'m Model,
        max_join_depth: usize,
        max_identifier_len: Option<usize>,
    ) -> Self {
        Self {
            model,
            max_join_depth,
            max_identifier_len,
        }
    }

    /// Folds every include path, joining Reference prefixes into the
    /// primary statement. Returns the extra projection columns and the
    /// split points that become child statements.
    pub(crate) fn fold(
        &self,
        ir: &QueryIr,
        translator: &mut Translator<'m>,
    ) -> RelateResult<(Vec<SelectColumn>, SplitForest)> {
        let mut forest = SplitForest::default();
        let mut columns = Vec::new();
        let mut folded: HashSet<NavPath> = HashSet::new();

        for path in &ir.includes {
            let mut scope: Option<usize> = None;
            let mut entity = ir.root;
            for (i, &seg) in path.segments().iter().enumerate() {
                let resolved = resolver::resolve(self.model, entity, seg)?;
                let abs = NavPath::new(path.segments()[..=i].to_vec());
                match resolved.multiplicity {
                    Multiplicity::Collection => {
                        scope = Some(forest.split(scope, abs));
                    }
                    Multiplicity::Reference => match scope {
                        None => {
                            if i + 1 > self.max_join_depth {
                                debug!(
                                    navigation = %resolved.navigation.name,
                                    depth = i + 1,
                                    "promoting deep reference include to its own statement"
                                );
                                scope = Some(forest.split(None, abs));
                            } else {
                                match translator.ensure_joined(&abs) {
                                    Ok(alias) => {
                                        if folded.insert(abs) {
                                            let target = self.entity(resolved.target)?;
                                            let name =
                                                translator.shape().alias_name(alias).to_string();
                                            push_entity_columns(&mut columns, &name, target);
                                        }
                                    }
                                    Err(RelateError::UnsupportedIdentifier { .. }) => {
                                        debug!(
                                            navigation = %resolved.navigation.name,
                                            "promoting reference include past the identifier limit"
                                        );
                                        scope = Some(forest.split(None, abs));
                                    }
                                    Err(e) => return Err(e),
                                }
                            }
                        }
                        Some(node) => {
                            let base_len = forest.nodes[node].path.segments().len();
                            if (i + 1) - base_len > self.max_join_depth {
                                scope = Some(forest.split(Some(node), abs));
                            } else if !forest.nodes[node].ref_folds.contains(&abs) {
                                forest.nodes[node].ref_folds.push(abs);
                            }
                        }
                    },
                }
                entity = resolved.target;
            }
        }
        Ok((columns, forest))
    }

    /// Builds the child statements, depth-first with each parent before
    /// its children.
    pub(crate) fn child_statements(
        &self,
        root: EntityId,
        primary: &SelectQuery,
        primary_shape: &QueryShape,
        forest: &SplitForest,
    ) -> RelateResult<Vec<SelectQuery>> {
        let mut out = Vec::new();
        let scope = Scope::Primary {
            statement: primary,
            shape: primary_shape,
        };
        for &node in &forest.roots {
            self.build_node(root, forest, node, &scope, &mut out)?;
        }
        Ok(out)
    }

    fn build_node(
        &self,
        root: EntityId,
        forest: &SplitForest,
        index: usize,
        scope: &Scope<'_>,
        out: &mut Vec<SelectQuery>,
    ) -> RelateResult<()> {
        let node = &forest.nodes[index];
        let (statement, shape) = self.build_statement(root, node, scope)?;
        out.push(statement.clone());

        let child_scope = Scope::Level {
            statement,
            shape,
            base_len: node.path.segments().len(),
        };
        for &child in &node.children {
            self.build_node(root, forest, child, &child_scope, out)?;
        }
        Ok(())
    }

    fn build_statement(
        &self,
        root: EntityId,
        node: &SplitNode,
        scope: &Scope<'_>,
    ) -> RelateResult<(SelectQuery, QueryShape)> {
        let last = node.path.last().ok_or_else(|| {
            RelateError::InvalidQuery("empty include path".to_string())
        })?;
        let parent_path = node.path.parent();
        let parent_entity_id = path_target(self.model, root, &parent_path)?;
        let resolved = resolver::resolve(self.model, parent_entity_id, last)?;
        let parent_entity = self.entity(parent_entity_id)?;
        let child_entity = self.entity(resolved.target)?;

        // The join predicate is `(owner-side, target-side)` for both a
        // promoted Reference and a Collection, so the correlation columns
        // fall out uniformly.
        let parent_props: Vec<usize> = resolved.join_predicate.iter().map(|&(p, _)| p).collect();
        let child_props: Vec<usize> = resolved.join_predicate.iter().map(|&(_, c)| c).collect();

        let owners = self.owners_query(scope, &parent_path, &parent_props, parent_entity)?;

        let mut shape = QueryShape::new(self.model, resolved.target, self.max_identifier_len)?;
        let owners_alias = shape.reserve_name("owners")?;
        let child_alias = shape.alias_name(shape.root()).to_string();

        let mut columns = Vec::new();
        push_entity_columns(&mut columns, &child_alias, child_entity);

        // Reference navigations requested below this split point fold into
        // this statement the same way they would into the primary one.
        let mut folded: HashSet<NavPath> = HashSet::new();
        for fold in &node.ref_folds {
            let rel = &fold.segments()[node.path.segments().len()..];
            let mut alias = shape.root();
            let mut entity = resolved.target;
            let mut rel_path = NavPath::root();
            for &seg in rel {
                let hop = resolver::resolve(self.model, entity, seg)?;
                alias = shape.get_or_create_alias(
                    self.model,
                    alias,
                    seg,
                    None,
                    JoinContext::Navigate,
                )?;
                entity = hop.target;
                rel_path = rel_path.child(seg);
                if folded.insert(rel_path.clone()) {
                    let target = self.entity(hop.target)?;
                    let name = shape.alias_name(alias).to_string();
                    push_entity_columns(&mut columns, &name, target);
                }
            }
        }

        let correlation = SqlExpr::conjoin(child_props.iter().zip(&parent_props).map(
            |(&child_prop, &parent_prop)| {
                SqlExpr::column(
                    child_alias.clone(),
                    child_entity.properties[child_prop].column.clone(),
                )
                .eq(SqlExpr::column(
                    owners_alias.clone(),
                    parent_entity.properties[parent_prop].column.clone(),
                ))
            },
        ));

        let mut joins = vec![SqlJoin {
            kind: JoinKind::Inner,
            source: TableSource::Derived {
                query: Box::new(owners),
                alias: owners_alias,
            },
            on: correlation,
        }];
        joins.extend(joins_from_shape(self.model, &shape)?);

        // Correlation key first so child rows group by owner, then the
        // child key for a stable order within each group.
        let mut order_by = Vec::new();
        let mut ordered: HashSet<usize> = HashSet::new();
        for &prop in child_props.iter().chain(&child_entity.primary_key) {
            if ordered.insert(prop) {
                order_by.push(OrderByItem {
                    expr: SqlExpr::column(
                        child_alias.clone(),
                        child_entity.properties[prop].column.clone(),
                    ),
                    descending: false,
                });
            }
        }

        let mut statement = SelectQuery::over_table(child_entity.table.clone(), child_alias);
        statement.columns = columns;
        statement.joins = joins;
        statement.order_by = order_by;
        debug!(
            navigation = %resolved.navigation.name,
            "planned eager load as correlated child statement"
        );
        Ok((statement, shape))
    }

    /// The derived *owners* table: the parent statement reduced to its
    /// correlation key columns.
    fn owners_query(
        &self,
        scope: &Scope<'_>,
        parent_path: &NavPath,
        parent_props: &[usize],
        parent_entity: &EntityType,
    ) -> RelateResult<SelectQuery> {
        let key_columns = |alias: &str| -> Vec<SelectColumn> {
            parent_props
                .iter()
                .map(|&prop| SelectColumn {
                    expr: SqlExpr::column(
                        alias.to_string(),
                        parent_entity.properties[prop].column.clone(),
                    ),
                    alias: None,
                })
                .collect()
        };

        match scope {
            Scope::Primary { statement, shape } => {
                let alias_id = shape.alias_for_path(parent_path).ok_or_else(|| {
                    RelateError::InvalidQuery(
                        "include correlates against an unjoined navigation".to_string(),
                    )
                })?;
                let alias = shape.alias_name(alias_id);

                if statement.is_paged() {
                    // The page boundary must be computed exactly once, so
                    // the whole paged statement becomes a derived table
                    // and the keys are picked off the page.
                    let mut inner = (*statement).clone();
                    inner.columns = key_columns(alias);
                    let outer_columns = parent_props
                        .iter()
                        .map(|&prop| SelectColumn {
                            expr: SqlExpr::column(
                                "page",
                                parent_entity.properties[prop].column.clone(),
                            ),
                            alias: None,
                        })
                        .collect();
                    let mut outer = SelectQuery::over(TableSource::Derived {
                        query: Box::new(inner),
                        alias: "page".to_string(),
                    });
                    outer.distinct = true;
                    outer.columns = outer_columns;
                    Ok(outer)
                } else {
                    let mut owners = SelectQuery::over((*statement).source.clone());
                    // Keys read off a folded reference repeat once per root
                    // row, exactly like a flattened collection join.
                    owners.distinct = shape.has_multiplying_join() || !parent_path.is_root();
                    owners.columns = key_columns(alias);
                    owners.joins = statement.joins.clone();
                    owners.predicate = statement.predicate.clone();
                    Ok(owners)
                }
            }
            Scope::Level {
                statement,
                shape,
                base_len,
            } => {
                let rel = NavPath::new(parent_path.segments()[*base_len..].to_vec());
                let alias_id = shape.alias_for_path(&rel).ok_or_else(|| {
                    RelateError::InvalidQuery(
                        "include correlates against an unjoined navigation".to_string(),
                    )
                })?;
                let alias = shape.alias_name(alias_id).to_string();
                let mut owners = statement.clone();
                owners.columns = key_columns(&alias);
                // Rows of a child statement are unique per its own root;
                // keys read off a folded reference can repeat.
                owners.distinct = !rel.is_root();
                owners.order_by.clear();
                owners.offset = None;
                owners.limit = None;
                Ok(owners)
            }
        }
    }

    fn entity(&self, id: EntityId) -> RelateResult<&'m EntityType> {
        self.model
            .entity(id)
            .ok_or_else(|| RelateError::InvalidQuery(format!("unknown entity #{}", id.0)))
    }
}

fn push_entity_columns(columns: &mut Vec<SelectColumn>, alias: &str, entity: &EntityType) {
    for property in &entity.properties {
        columns.push(SelectColumn {
            expr: SqlExpr::column(alias.to_string(), property.column.clone()),
            alias: None,
        });
    }
}
