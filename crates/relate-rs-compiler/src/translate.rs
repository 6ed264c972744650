//! Predicate, projection, and ordering translation.
//!
//! The [`Translator`] walks IR expression trees and lowers every
//! navigation-qualified member access into an aliased column reference,
//! re-entering the join graph whenever a traversal needs an alias that does
//! not exist yet. Three concerns live here:
//!
//! - **Foreign-key substitution**: a Reference path whose only use across
//!   the whole query is reading the target's primary key compiles to the
//!   owner's FK column with no join at all. A usage pre-pass
//!   ([`analyze_usage`]) decides this globally, so a path that is also
//!   projected or filtered elsewhere keeps its real join.
//! - **Null guards**: comparisons under Optional paths carry explicit
//!   tri-valued-logic guards — positive comparisons are conjoined with
//!   `IS NOT NULL`, negated/inequality comparisons disjoined with
//!   `IS NULL` — mirroring host-language null-propagating semantics instead
//!   of the database's native NULL behavior. Each `OR` branch is guarded
//!   independently.
//! - **Collection aggregates**: `Count` over a Collection navigation
//!   becomes a correlated scalar `SELECT COUNT(*)` subquery, never a join,
//!   because a join would multiply owner rows.

use std::collections::HashSet;

use relate_rs_core::{RelateError, RelateResult};
use relate_rs_model::{EntityId, Model, Multiplicity, NavigationKind, Optionality, Value};
use tracing::debug;

use crate::ir::{BinaryOp, Expr, NavPath, QueryIr};
use crate::join_graph::{AliasId, JoinContext, QueryShape};
use crate::select::{ColumnRef, SelectColumn, SelectQuery, SqlExpr, TableSource};

/// Walks `path` from `root`, returning the entity it lands on.
pub(crate) fn path_target(model: &Model, root: EntityId, path: &NavPath) -> RelateResult<EntityId> {
    let mut entity = root;
    for &seg in path.segments() {
        entity = crate::resolver::resolve(model, entity, seg)?.target;
    }
    Ok(entity)
}

/// Global navigation-path usage, computed before translation.
///
/// A path present in `joins` needs a real alias: some expression reads a
/// non-key column through it, a longer path traverses it, or an eager-load
/// or flatten directive pins it. Everything else is a candidate for
/// foreign-key substitution.
#[derive(Debug, Default)]
pub(crate) struct UsageMap {
    joins: HashSet<NavPath>,
}

impl UsageMap {
    fn pin(&mut self, path: NavPath) {
        self.joins.insert(path);
    }

    fn pin_prefixes(&mut self, path: &NavPath, through: usize) {
        for len in 1..=through {
            self.pin(NavPath::new(path.segments()[..len].to_vec()));
        }
    }

    pub(crate) fn substitutable(&self, path: &NavPath) -> bool {
        !self.joins.contains(path)
    }
}

/// Scans every expression of the query once, recording which navigation
/// paths require a real join.
pub(crate) fn analyze_usage(model: &Model, ir: &QueryIr) -> RelateResult<UsageMap> {
    let mut usage = UsageMap::default();

    let scan = |expr: &Expr, usage: &mut UsageMap| -> RelateResult<()> {
        scan_expr(model, ir.root, expr, usage)
    };
    if let Some(filter) = &ir.filter {
        scan(filter, &mut usage)?;
    }
    for item in &ir.projection {
        scan(&item.expr, &mut usage)?;
    }
    for ordering in &ir.order_by {
        scan(&ordering.expr, &mut usage)?;
    }

    for path in &ir.flatten {
        usage.pin_prefixes(path, path.segments().len());
    }
    for path in &ir.includes {
        // Only the leading Reference prefix folds into the primary
        // statement; collection levels split off and do not pin anything
        // here.
        let mut entity = ir.root;
        for (i, &seg) in path.segments().iter().enumerate() {
            let resolved = crate::resolver::resolve(model, entity, seg)?;
            if resolved.multiplicity == Multiplicity::Collection {
                break;
            }
            usage.pin_prefixes(path, i + 1);
            entity = resolved.target;
        }
    }
    Ok(usage)
}

fn scan_expr(model: &Model, root: EntityId, expr: &Expr, usage: &mut UsageMap) -> RelateResult<()> {
    match expr {
        Expr::Property { path, property } => {
            if path.is_root() {
                return Ok(());
            }
            // Every hop before the last is traversed through and needs its
            // join regardless of what is read at the end.
            usage.pin_prefixes(path, path.segments().len() - 1);
            let target = path_target(model, root, path)?;
            let entity = model
                .entity(target)
                .ok_or_else(|| RelateError::InvalidQuery(format!("unknown entity #{}", target.0)))?;
            if !entity.primary_key.contains(property) {
                usage.pin(path.clone());
            }
        }
        Expr::Count(path) => {
            // The correlation key is the parent's primary key; the parent
            // itself stays substitutable unless something else pins it.
            let parent = path.parent();
            if !parent.is_root() {
                usage.pin_prefixes(&parent, parent.segments().len() - 1);
            }
        }
        Expr::Binary { left, right, .. } => {
            scan_expr(model, root, left, usage)?;
            scan_expr(model, root, right, usage)?;
        }
        Expr::Not(inner) => scan_expr(model, root, inner, usage)?,
        Expr::IsNull { expr, .. } => scan_expr(model, root, expr, usage)?,
        Expr::Literal(_) => {}
    }
    Ok(())
}

/// Translates IR expressions into [`SqlExpr`] trees over one
/// [`QueryShape`].
pub(crate) struct Translator<'m> {
    model: &'m Model,
    root: EntityId,
    shape: QueryShape,
    usage: UsageMap,
    flatten: Vec<NavPath>,
    expected_guards: Vec<ColumnRef>,
}

impl<'m> Translator<'m> {
    /// Creates a translator with a fresh shape rooted at the query's root
    /// entity, pre-joining every flattened collection path.
    pub(crate) fn new(
        model: &'m Model,
        ir: &QueryIr,
        max_identifier_len: Option<usize>,
    ) -> RelateResult<Self> {
        let usage = analyze_usage(model, ir)?;
        let shape = QueryShape::new(model, ir.root, max_identifier_len)?;
        let mut translator = Self {
            model,
            root: ir.root,
            shape,
            usage,
            flatten: ir.flatten.clone(),
            expected_guards: Vec::new(),
        };
        for path in &ir.flatten {
            translator.ensure_joined(path)?;
        }
        Ok(translator)
    }

    pub(crate) fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Consumes the translator, yielding the frozen shape and the guard
    /// columns every emitted predicate is expected to carry.
    pub(crate) fn into_parts(self) -> (QueryShape, Vec<ColumnRef>) {
        (self.shape, self.expected_guards)
    }

    /// Translates a filter expression in predicate position.
    pub(crate) fn translate_filter(&mut self, expr: &Expr) -> RelateResult<SqlExpr> {
        self.predicate(expr, false)
    }

    /// Translates an expression in value position (projection, ordering).
    /// Guards do not apply outside comparisons.
    pub(crate) fn translate_scalar(&mut self, expr: &Expr) -> RelateResult<SqlExpr> {
        Ok(self.scalar_operand(expr)?.0)
    }

    /// The default projection: every property of the root entity.
    pub(crate) fn root_columns(&self) -> RelateResult<Vec<SelectColumn>> {
        let root = self.shape.root();
        let entity = self.entity(self.shape.source(root).entity)?;
        let alias = self.shape.alias_name(root).to_string();
        Ok(entity
            .properties
            .iter()
            .map(|p| SelectColumn {
                expr: SqlExpr::column(alias.clone(), p.column.clone()),
                alias: None,
            })
            .collect())
    }

    fn entity(&self, id: EntityId) -> RelateResult<&'m relate_rs_model::EntityType> {
        self.model
            .entity(id)
            .ok_or_else(|| RelateError::InvalidQuery(format!("unknown entity #{}", id.0)))
    }

    // ── Predicate position ───────────────────────────────────────────

    fn predicate(&mut self, expr: &Expr, negated: bool) -> RelateResult<SqlExpr> {
        match expr {
            Expr::Binary { op, left, right } if !op.is_comparison() => {
                let l = self.predicate(left, negated)?;
                let r = self.predicate(right, negated)?;
                // De Morgan under negation: each branch has already been
                // negated, so the connective flips.
                let conjunction = (*op == BinaryOp::And) != negated;
                Ok(if conjunction { l.and(r) } else { l.or(r) })
            }
            Expr::Binary { op, left, right } => self.comparison(*op, left, right, negated),
            Expr::Not(inner) => self.predicate(inner, !negated),
            Expr::IsNull { expr, negated: n } => {
                let (operand, _) = self.scalar_operand(expr)?;
                Ok(SqlExpr::IsNull {
                    expr: Box::new(operand),
                    negated: n != &negated,
                })
            }
            // A bare boolean member access is an implicit equality test.
            Expr::Property { .. } => {
                self.comparison(BinaryOp::Eq, expr, &Expr::Literal(Value::Bool(true)), negated)
            }
            Expr::Literal(_) | Expr::Count(_) => Err(RelateError::InvalidQuery(
                "expression cannot be used in predicate position".to_string(),
            )),
        }
    }

    fn comparison(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        negated: bool,
    ) -> RelateResult<SqlExpr> {
        // Comparisons against a NULL literal are explicit null tests, not
        // guarded value comparisons.
        if let Expr::Literal(Value::Null) = right {
            return self.null_literal_comparison(op, left, negated);
        }
        if let Expr::Literal(Value::Null) = left {
            return self.null_literal_comparison(op, right, negated);
        }

        let (left_sql, left_guards) = self.scalar_operand(left)?;
        let (right_sql, right_guards) = self.scalar_operand(right)?;
        let core = SqlExpr::Binary {
            op,
            left: Box::new(left_sql),
            right: Box::new(right_sql),
        };
        let core = if negated {
            SqlExpr::Not(Box::new(core))
        } else {
            core
        };

        // A negated equality and a plain inequality both let a missing
        // optional value satisfy the predicate; everything else demands
        // presence.
        let negative = negated != (op == BinaryOp::Ne);
        let mut result = core;
        for guard in left_guards.into_iter().chain(right_guards) {
            self.expected_guards.push(guard.clone());
            let guard_expr = SqlExpr::Column(guard);
            result = if negative {
                result.or(guard_expr.is_null())
            } else {
                result.and(guard_expr.is_not_null())
            };
        }
        Ok(result)
    }

    fn null_literal_comparison(
        &mut self,
        op: BinaryOp,
        operand: &Expr,
        negated: bool,
    ) -> RelateResult<SqlExpr> {
        if op != BinaryOp::Eq && op != BinaryOp::Ne {
            return Err(RelateError::InvalidQuery(
                "NULL literal only supports equality comparison".to_string(),
            ));
        }
        let (operand_sql, _) = self.scalar_operand(operand)?;
        Ok(SqlExpr::IsNull {
            expr: Box::new(operand_sql),
            negated: (op == BinaryOp::Ne) != negated,
        })
    }

    // ── Value position ───────────────────────────────────────────────

    /// Translates a value-position expression, returning the guard columns
    /// a surrounding comparison must attach for optional paths.
    fn scalar_operand(&mut self, expr: &Expr) -> RelateResult<(SqlExpr, Vec<ColumnRef>)> {
        match expr {
            Expr::Property { path, property } => {
                let (sql, optional) = self.translate_property(path, *property)?;
                let guards = match (&sql, optional) {
                    (SqlExpr::Column(column), true) => vec![column.clone()],
                    _ => Vec::new(),
                };
                Ok((sql, guards))
            }
            Expr::Literal(value) => Ok((SqlExpr::Param(value.clone()), Vec::new())),
            Expr::Count(path) => {
                let subquery = self.count_subquery(path)?;
                Ok((SqlExpr::Scalar(Box::new(subquery)), Vec::new()))
            }
            Expr::Binary { .. } | Expr::Not(_) | Expr::IsNull { .. } => {
                Err(RelateError::InvalidQuery(
                    "logical expression cannot be used in value position".to_string(),
                ))
            }
        }
    }

    /// Lowers a navigation-qualified member access to a column reference.
    ///
    /// Returns the expression and whether it sits under an Optional path
    /// (requiring guards in comparisons).
    pub(crate) fn translate_property(
        &mut self,
        path: &NavPath,
        property: usize,
    ) -> RelateResult<(SqlExpr, bool)> {
        let Some(last) = path.last() else {
            let entity = self.entity(self.root)?;
            let prop = entity.properties.get(property).ok_or_else(|| {
                RelateError::UnresolvedProperty {
                    entity: entity.name.clone(),
                    index: property,
                }
            })?;
            let alias = self.shape.alias_name(self.shape.root()).to_string();
            return Ok((SqlExpr::column(alias, prop.column.clone()), false));
        };

        let target_id = path_target(self.model, self.root, path)?;
        let target = self.entity(target_id)?;
        if property >= target.properties.len() {
            return Err(RelateError::UnresolvedProperty {
                entity: target.name.clone(),
                index: property,
            });
        }

        let last_nav = self
            .model
            .navigation(last)
            .ok_or_else(|| RelateError::InvalidQuery("dangling navigation handle".to_string()))?;

        // Foreign-key substitution: a Reference path used only for its
        // target key reads the owner-side FK column instead of joining.
        if let NavigationKind::Reference(optionality) = last_nav.kind {
            if self.usage.substitutable(path) {
                if let Some(key_pos) = target.primary_key.iter().position(|&k| k == property) {
                    let fk = self
                        .model
                        .foreign_key(last_nav.foreign_key)
                        .ok_or_else(|| {
                            RelateError::InvalidQuery("dangling foreign key handle".to_string())
                        })?;
                    let owner_property = fk.dependent_properties[key_pos];
                    debug!(
                        navigation = %last_nav.name,
                        "substituting foreign-key column for navigation key access"
                    );
                    let (sql, parent_optional) =
                        self.translate_property(&path.parent(), owner_property)?;
                    let optional = parent_optional || optionality == Optionality::Optional;
                    return Ok((sql, optional));
                }
            }
        }

        let alias = self.ensure_joined(path)?;
        let optional = self.shape.source(alias).nullable;
        let name = self.shape.alias_name(alias).to_string();
        let column = target.properties[property].column.clone();
        Ok((SqlExpr::column(name, column), optional))
    }

    /// Walks a path through the join graph, allocating aliases as needed,
    /// and returns the alias of the final segment.
    pub(crate) fn ensure_joined(&mut self, path: &NavPath) -> RelateResult<AliasId> {
        let mut alias = self.shape.root();
        let mut entity = self.root;
        for (i, &seg) in path.segments().iter().enumerate() {
            let resolved = crate::resolver::resolve(self.model, entity, seg)?;
            let context = if resolved.multiplicity == Multiplicity::Collection {
                let prefix = NavPath::new(path.segments()[..=i].to_vec());
                if !self.flatten.iter().any(|f| *f == prefix) {
                    return Err(RelateError::InvalidQuery(format!(
                        "collection navigation '{}' reached outside a flatten directive",
                        resolved.navigation.name
                    )));
                }
                JoinContext::Flatten
            } else {
                JoinContext::Navigate
            };
            entity = resolved.target;
            alias = self
                .shape
                .get_or_create_alias(self.model, alias, seg, None, context)?;
        }
        Ok(alias)
    }

    /// Builds the correlated `SELECT COUNT(*)` subquery for a Collection
    /// aggregate.
    fn count_subquery(&mut self, path: &NavPath) -> RelateResult<SelectQuery> {
        let last = path.last().ok_or_else(|| {
            RelateError::InvalidQuery("count requires a navigation path".to_string())
        })?;
        let parent_path = path.parent();
        let parent_entity = path_target(self.model, self.root, &parent_path)?;
        let resolved = crate::resolver::resolve(self.model, parent_entity, last)?;
        if resolved.multiplicity != Multiplicity::Collection {
            return Err(RelateError::InvalidQuery(format!(
                "count over non-collection navigation '{}'",
                resolved.navigation.name
            )));
        }

        let target = self.entity(resolved.target)?;
        // Reserve the inner alias in the outer namespace so nested scopes
        // never shadow an enclosing alias.
        let inner_alias = self.shape.reserve_name(&target.table)?;
        let mut correlation = Vec::with_capacity(resolved.join_predicate.len());
        for &(owner_prop, target_prop) in &resolved.join_predicate {
            let (owner_sql, _) = self.translate_property(&parent_path, owner_prop)?;
            let inner_column =
                SqlExpr::column(inner_alias.clone(), target.properties[target_prop].column.clone());
            correlation.push(inner_column.eq(owner_sql));
        }

        let mut subquery = SelectQuery::over(TableSource::Table {
            name: target.table.clone(),
            alias: inner_alias,
        });
        subquery.columns.push(SelectColumn {
            expr: SqlExpr::CountStar,
            alias: None,
        });
        subquery.predicate = SqlExpr::conjoin(correlation);
        debug!(navigation = %resolved.navigation.name, "compiled collection count to correlated subquery");
        Ok(subquery)
    }
}

/// Verifies that every guard column the translator promised actually
/// appears in an `IS [NOT] NULL` node of the final predicate.
///
/// This is the internal null-semantics invariant of the compiler: failure
/// is a defect, never a user condition.
pub(crate) fn audit_null_guards(
    predicate: Option<&SqlExpr>,
    expected: &[ColumnRef],
) -> RelateResult<()> {
    let mut guarded: HashSet<&ColumnRef> = HashSet::new();
    if let Some(predicate) = predicate {
        collect_guarded(predicate, &mut guarded);
    }
    for column in expected {
        if !guarded.contains(column) {
            return Err(RelateError::NullSemanticsViolation(format!(
                "comparison over optional path lacks a null guard on {}.{}",
                column.table_alias, column.column
            )));
        }
    }
    Ok(())
}

fn collect_guarded<'e>(expr: &'e SqlExpr, guarded: &mut HashSet<&'e ColumnRef>) {
    match expr {
        SqlExpr::IsNull { expr, .. } => {
            if let SqlExpr::Column(column) = expr.as_ref() {
                guarded.insert(column);
            }
            collect_guarded(expr, guarded);
        }
        SqlExpr::Binary { left, right, .. } => {
            collect_guarded(left, guarded);
            collect_guarded(right, guarded);
        }
        SqlExpr::Not(inner) => collect_guarded(inner, guarded),
        SqlExpr::Scalar(subquery) => {
            if let Some(predicate) = &subquery.predicate {
                collect_guarded(predicate, guarded);
            }
        }
        SqlExpr::Column(_) | SqlExpr::Param(_) | SqlExpr::CountStar => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Ordering, ProjectionItem};
    use relate_rs_model::{ModelBuilder, ValueType};

    struct Fixture {
        model: Model,
        blog: EntityId,
        post: EntityId,
    }

    fn fixture() -> Fixture {
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
        Fixture {
            model: b.build().unwrap(),
            blog,
            post,
        }
    }

    fn blog_nav(f: &Fixture) -> NavPath {
        NavPath::new(vec![f.model.navigation_by_name(f.post, "Blog").unwrap()])
    }

    fn posts_nav(f: &Fixture) -> NavPath {
        NavPath::new(vec![f.model.navigation_by_name(f.blog, "Posts").unwrap()])
    }

    #[test]
    fn test_root_property_translation() {
        let f = fixture();
        let ir = QueryIr::new(f.post);
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let (sql, optional) = t.translate_property(&NavPath::root(), 1).unwrap();
        assert_eq!(sql, SqlExpr::column("posts", "title"));
        assert!(!optional);
    }

    #[test]
    fn test_key_only_access_substitutes_fk_without_join() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        // Post.Blog.id == 5 — the only use of the Blog path is its key.
        ir.filter = Some(Expr::property(blog_nav(&f), 0).eq(Expr::literal(5)));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        assert_eq!(t.shape().edges().len(), 0, "no join should be emitted");
        // The substituted FK column is nullable, so the equality carries
        // a presence guard.
        let fk = SqlExpr::column("posts", "blog_id");
        assert_eq!(
            predicate,
            fk.clone().eq(SqlExpr::Param(Value::Int(5))).and(fk.is_not_null())
        );
    }

    #[test]
    fn test_non_key_access_forces_join() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.filter = Some(Expr::property(blog_nav(&f), 1).eq(Expr::literal("x")));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        assert_eq!(t.shape().edges().len(), 1);
        let name = SqlExpr::column("blogs", "name");
        assert_eq!(
            predicate,
            name.clone()
                .eq(SqlExpr::Param(Value::from("x")))
                .and(name.is_not_null())
        );
    }

    #[test]
    fn test_key_access_elsewhere_projected_keeps_single_join() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        // The same path is filtered on its key AND projected on a non-key
        // column: the join must win and substitution must not fire.
        ir.filter = Some(Expr::property(blog_nav(&f), 0).eq(Expr::literal(5)));
        ir.projection.push(ProjectionItem {
            expr: Expr::property(blog_nav(&f), 1),
            alias: "blog_name".to_string(),
        });
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        t.translate_scalar(&ir.projection[0].expr).unwrap();
        assert_eq!(t.shape().edges().len(), 1, "exactly one join, no second alias");
        let id = SqlExpr::column("blogs", "id");
        assert_eq!(
            predicate,
            id.clone().eq(SqlExpr::Param(Value::Int(5))).and(id.is_not_null())
        );
    }

    #[test]
    fn test_inequality_guard_is_or_is_null() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.filter = Some(Expr::property(blog_nav(&f), 1).ne(Expr::literal("x")));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        let name = SqlExpr::column("blogs", "name");
        assert_eq!(
            predicate,
            SqlExpr::Binary {
                op: BinaryOp::Ne,
                left: Box::new(name.clone()),
                right: Box::new(SqlExpr::Param(Value::from("x"))),
            }
            .or(name.is_null())
        );
    }

    #[test]
    fn test_negated_equality_guard_flips() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.filter = Some(Expr::property(blog_nav(&f), 1).eq(Expr::literal("x")).not());
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        let name = SqlExpr::column("blogs", "name");
        let core = SqlExpr::Not(Box::new(
            name.clone().eq(SqlExpr::Param(Value::from("x"))),
        ));
        assert_eq!(predicate, core.or(name.is_null()));
    }

    #[test]
    fn test_negated_inequality_demands_presence() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.filter = Some(Expr::property(blog_nav(&f), 1).ne(Expr::literal("x")).not());
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        let name = SqlExpr::column("blogs", "name");
        let core = SqlExpr::Not(Box::new(SqlExpr::Binary {
            op: BinaryOp::Ne,
            left: Box::new(name.clone()),
            right: Box::new(SqlExpr::Param(Value::from("x"))),
        }));
        assert_eq!(predicate, core.and(name.is_not_null()));
    }

    #[test]
    fn test_null_literal_comparison_becomes_is_null() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.filter = Some(Expr::root_property(2).eq(Expr::Literal(Value::Null)));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        assert_eq!(predicate, SqlExpr::column("posts", "blog_id").is_null());
    }

    #[test]
    fn test_count_compiles_to_correlated_subquery() {
        let f = fixture();
        let mut ir = QueryIr::new(f.blog);
        ir.filter = Some(Expr::count(posts_nav(&f)).gt(Expr::literal(0)));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();
        assert_eq!(t.shape().edges().len(), 0, "count must not join");
        let SqlExpr::Binary { left, .. } = predicate else {
            panic!("expected comparison");
        };
        let SqlExpr::Scalar(subquery) = *left else {
            panic!("expected scalar subquery");
        };
        assert_eq!(subquery.columns, vec![SelectColumn {
            expr: SqlExpr::CountStar,
            alias: None
        }]);
        assert_eq!(
            subquery.predicate,
            Some(SqlExpr::column("posts", "blog_id").eq(SqlExpr::column("blogs", "id")))
        );
    }

    #[test]
    fn test_ordering_by_navigation_key_substitutes_fk() {
        let f = fixture();
        let mut ir = QueryIr::new(f.post);
        ir.order_by.push(Ordering::asc(Expr::property(blog_nav(&f), 0)));
        let mut t = Translator::new(&f.model, &ir, None).unwrap();
        let sql = t.translate_scalar(&ir.order_by[0].expr.clone()).unwrap();
        assert_eq!(sql, SqlExpr::column("posts", "blog_id"));
        assert_eq!(t.shape().edges().len(), 0);
    }

    #[test]
    fn test_audit_detects_missing_guard() {
        let expected = vec![ColumnRef::new("blogs", "name")];
        let bare = SqlExpr::column("blogs", "name").eq(SqlExpr::Param(Value::from("x")));
        let err = audit_null_guards(Some(&bare), &expected).unwrap_err();
        assert!(matches!(err, RelateError::NullSemanticsViolation(_)));

        let guarded = bare.and(SqlExpr::column("blogs", "name").is_not_null());
        assert!(audit_null_guards(Some(&guarded), &expected).is_ok());
    }

    #[test]
    fn test_or_branches_guarded_independently() {
        let mut b = ModelBuilder::new();
        let b_ent = b.entity("B", "b", |e| {
            e.key("id", ValueType::Int);
            e.property("name", ValueType::Text);
        });
        let c_ent = b.entity("C", "c", |e| {
            e.key("id", ValueType::Int);
            e.property("name", ValueType::Text);
        });
        let a_ent = b.entity("A", "a", |e| {
            e.key("id", ValueType::Int);
            e.nullable_property("b_id", ValueType::Int);
            e.nullable_property("c_id", ValueType::Int);
        });
        b.reference(a_ent, "B", b_ent, &["b_id"], Optionality::Optional);
        b.reference(a_ent, "C", c_ent, &["c_id"], Optionality::Optional);
        let model = b.build().unwrap();

        let b_path = NavPath::new(vec![model.navigation_by_name(a_ent, "B").unwrap()]);
        let c_path = NavPath::new(vec![model.navigation_by_name(a_ent, "C").unwrap()]);
        let mut ir = QueryIr::new(a_ent);
        ir.filter = Some(
            Expr::property(b_path, 1)
                .eq(Expr::literal("x"))
                .or(Expr::property(c_path, 1).eq(Expr::literal("y"))),
        );
        let mut t = Translator::new(&model, &ir, None).unwrap();
        let predicate = t.translate_filter(ir.filter.as_ref().unwrap()).unwrap();

        let b_name = SqlExpr::column("b", "name");
        let c_name = SqlExpr::column("c", "name");
        let left = b_name
            .clone()
            .eq(SqlExpr::Param(Value::from("x")))
            .and(b_name.is_not_null());
        let right = c_name
            .clone()
            .eq(SqlExpr::Param(Value::from("y")))
            .and(c_name.is_not_null());
        assert_eq!(predicate, left.or(right));
        assert_eq!(t.shape().edges().len(), 2, "two independent LEFT joins");
    }
}
