//! # relate-rs-compiler
//!
//! The query-compilation core of relate-rs: translates a normalized
//! entity-graph query ([`QueryIr`]) into one or more dialect-specific SQL
//! statements.
//!
//! Compilation is a fixed pipeline over an immutable [`Model`]:
//!
//! 1. **Usage analysis** scans every expression once to decide which
//!    navigation paths need real joins and which collapse to foreign-key
//!    columns ([`translate`]).
//! 2. **Translation** lowers filters, projections, and orderings into an
//!    aliased column algebra, growing the join graph on demand
//!    ([`join_graph`]) and attaching tri-valued-logic null guards to
//!    comparisons under Optional paths.
//! 3. **Include planning** folds Reference eager loads into the primary
//!    statement and splits each Collection eager load into a correlated
//!    child statement ([`include`]).
//! 4. **Emission** renders each frozen [`SelectQuery`](select::SelectQuery)
//!    as SQL text with dialect-specific quoting, placeholders, and paging
//!    ([`emit`]).
//!
//! The compiler holds no mutable state between calls: compiling the same
//! IR twice yields identical statements.
//!
//! # Examples
//!
//! ```
//! use relate_rs_compiler::{Dialect, Expr, QueryCompiler, QueryIr};
//! use relate_rs_model::{ModelBuilder, ValueType};
//!
//! let mut builder = ModelBuilder::new();
//! let blog = builder.entity("Blog", "blogs", |e| {
//!     e.key("id", ValueType::Int);
//!     e.property("name", ValueType::Text);
//! });
//! let model = builder.build().unwrap();
//!
//! let mut ir = QueryIr::new(blog);
//! ir.filter = Some(Expr::root_property(1).eq(Expr::literal("tech")));
//!
//! let compiler = QueryCompiler::new(&model, Dialect::postgres());
//! let compiled = compiler.compile(&ir).unwrap();
//! assert_eq!(
//!     compiled.primary.sql,
//!     r#"SELECT "blogs"."id", "blogs"."name" FROM "blogs" WHERE "blogs"."name" = $1"#
//! );
//! ```

// These clippy lints are intentionally allowed for the compiler crate:
// - result_large_err: RelateError is the project error type and is used consistently
// - too_many_lines: the translator and planner are inherently large match-heavy fns
// - option_if_let_else: match on Option reads better in the translation paths
// - doc_markdown: backtick requirements for documentation items are too strict
#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::doc_markdown)]

pub mod emit;
pub mod include;
pub mod ir;
pub mod join_graph;
pub mod resolver;
pub mod select;
pub mod translate;

use relate_rs_core::{CompilerOptions, RelateError, RelateResult};
use relate_rs_core::logging::compile_span;
use relate_rs_model::Model;
use tracing::debug;

use crate::include::IncludePlanner;
use crate::join_graph::joins_from_shape;
use crate::select::{OrderByItem, SelectColumn, SelectQuery, SqlExpr};
use crate::translate::{audit_null_guards, Translator};

pub use emit::{Dialect, SqlEmitter, Statement};
pub use ir::{BinaryOp, Expr, NavPath, Ordering, Page, ProjectionItem, QueryIr};

/// The output of one compilation: the primary statement plus one follow-up
/// statement per Collection eager load, in stitch order (each parent
/// before its children).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CompiledQuery {
    /// The statement producing root rows.
    pub primary: Statement,
    /// Correlated eager-load statements.
    pub includes: Vec<Statement>,
}

/// Compiles [`QueryIr`] values against one Model and dialect.
#[derive(Debug)]
pub struct QueryCompiler<'m> {
    model: &'m Model,
    dialect: Dialect,
    options: CompilerOptions,
}

impl<'m> QueryCompiler<'m> {
    /// Creates a compiler with default options.
    pub fn new(model: &'m Model, dialect: Dialect) -> Self {
        Self::with_options(model, dialect, CompilerOptions::default())
    }

    /// Creates a compiler with explicit options.
    pub fn with_options(model: &'m Model, dialect: Dialect, options: CompilerOptions) -> Self {
        Self {
            model,
            dialect,
            options,
        }
    }

    /// Compiles one query.
    ///
    /// # Errors
    ///
    /// Fails without emitting anything when the IR references unknown
    /// handles, uses a Collection navigation where a scalar is required,
    /// exceeds the dialect's identifier limit, or requests paging the
    /// dialect cannot express.
    pub fn compile(&self, ir: &QueryIr) -> RelateResult<CompiledQuery> {
        let entity = self.model.entity(ir.root).ok_or_else(|| {
            RelateError::InvalidQuery(format!("unknown root entity #{}", ir.root.0))
        })?;
        let span = compile_span(&entity.name);
        let _guard = span.enter();

        let mut translator = Translator::new(self.model, ir, self.dialect.max_identifier_len)?;

        let mut columns = if ir.projection.is_empty() {
            translator.root_columns()?
        } else {
            ir.projection
                .iter()
                .map(|item| {
                    Ok(SelectColumn {
                        expr: translator.translate_scalar(&item.expr)?,
                        alias: Some(item.alias.clone()),
                    })
                })
                .collect::<RelateResult<Vec<_>>>()?
        };

        let predicate = ir
            .filter
            .as_ref()
            .map(|filter| translator.translate_filter(filter))
            .transpose()?;

        let mut order_by = ir
            .order_by
            .iter()
            .map(|ordering| {
                Ok(OrderByItem {
                    expr: translator.translate_scalar(&ordering.expr)?,
                    descending: ordering.descending,
                })
            })
            .collect::<RelateResult<Vec<_>>>()?;

        let planner = IncludePlanner::new(
            self.model,
            self.options.max_join_depth,
            self.dialect.max_identifier_len,
        );
        let (include_columns, forest) = planner.fold(ir, &mut translator)?;
        columns.extend(include_columns);

        let (shape, expected_guards) = translator.into_parts();
        audit_null_guards(predicate.as_ref(), &expected_guards)?;

        // With separate child statements in play, root rows must arrive in
        // a deterministic key order so the consumer can merge the streams.
        if !forest.is_empty() {
            let root_alias = shape.alias_name(shape.root());
            for &key in &entity.primary_key {
                let expr = SqlExpr::column(root_alias, entity.properties[key].column.clone());
                if !order_by.iter().any(|item| item.expr == expr) {
                    order_by.push(OrderByItem {
                        expr,
                        descending: false,
                    });
                }
            }
        }

        let mut primary = SelectQuery::over_table(
            entity.table.clone(),
            shape.alias_name(shape.root()).to_string(),
        );
        primary.columns = columns;
        primary.joins = joins_from_shape(self.model, &shape)?;
        primary.predicate = predicate;
        primary.order_by = order_by;
        if let Some(page) = ir.page {
            primary.offset = page.offset;
            primary.limit = page.limit;
        }

        let children = planner.child_statements(ir.root, &primary, &shape, &forest)?;

        let emitter = SqlEmitter::new(&self.dialect, self.options.parameterize_literals);
        let primary = emitter.emit(&primary)?;
        let includes = children
            .iter()
            .map(|child| emitter.emit(child))
            .collect::<RelateResult<Vec<_>>>()?;
        debug!(statements = 1 + includes.len(), "compiled query");
        Ok(CompiledQuery { primary, includes })
    }
}
