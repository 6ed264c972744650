//! The frozen statement AST shared by the include planner and the emitter.
//!
//! Once translation finishes, every statement is a [`SelectQuery`]: a source
//! (base table or derived subquery), joins, a predicate tree of [`SqlExpr`]
//! nodes, projections, ordering, and paging. The tree is purely structural —
//! all navigation semantics have been lowered to aliased column references
//! by the time it is built.

use relate_rs_model::Value;

pub use crate::ir::BinaryOp;

/// A column on a specific statement alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// The alias of the query source the column belongs to.
    pub table_alias: String,
    /// The column name.
    pub column: String,
}

impl ColumnRef {
    /// Creates a column reference.
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

/// A translated scalar or predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// An aliased column reference.
    Column(ColumnRef),
    /// A parameterized value.
    Param(Value),
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<SqlExpr>,
        /// Right operand.
        right: Box<SqlExpr>,
    },
    /// `expr IS [NOT] NULL`.
    IsNull {
        /// The tested operand.
        expr: Box<SqlExpr>,
        /// `true` for IS NOT NULL.
        negated: bool,
    },
    /// `NOT (expr)`.
    Not(Box<SqlExpr>),
    /// `COUNT(*)`.
    CountStar,
    /// A correlated scalar subquery.
    Scalar(Box<SelectQuery>),
}

impl SqlExpr {
    /// A column reference expression.
    pub fn column(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Column(ColumnRef::new(table_alias, column))
    }

    fn binary(self, op: BinaryOp, other: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self = other`.
    pub fn eq(self, other: Self) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self > other`.
    pub fn gt(self, other: Self) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self AND other`.
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`.
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self IS NULL`.
    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// `self IS NOT NULL`.
    pub fn is_not_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Folds expressions into a conjunction. Returns `None` for an empty
    /// iterator.
    pub fn conjoin(exprs: impl IntoIterator<Item = SqlExpr>) -> Option<SqlExpr> {
        exprs.into_iter().reduce(SqlExpr::and)
    }
}

/// The FROM-clause source of a statement or join.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// A base table under an alias.
    Table {
        /// The table name.
        name: String,
        /// The alias it is bound to.
        alias: String,
    },
    /// A parenthesized subquery under an alias.
    Derived {
        /// The subquery.
        query: Box<SelectQuery>,
        /// The alias it is bound to.
        alias: String,
    },
}

/// SQL join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT OUTER JOIN.
    Left,
}

impl JoinKind {
    /// Returns the SQL keyword for this join kind.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// One JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    /// The join kind.
    pub kind: JoinKind,
    /// The joined source.
    pub source: TableSource,
    /// The ON predicate.
    pub on: Option<SqlExpr>,
}

/// One projected column of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    /// The projected expression.
    pub expr: SqlExpr,
    /// The output name, when it differs from the bare column name.
    pub alias: Option<String>,
}

/// One ORDER BY entry of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// The ordered expression.
    pub expr: SqlExpr,
    /// Whether to sort descending.
    pub descending: bool,
}

/// A complete SELECT statement, frozen for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// The base source.
    pub source: TableSource,
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Projected columns.
    pub columns: Vec<SelectColumn>,
    /// Joined sources, in join order.
    pub joins: Vec<SqlJoin>,
    /// The WHERE predicate.
    pub predicate: Option<SqlExpr>,
    /// Result ordering.
    pub order_by: Vec<OrderByItem>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// Creates an empty statement over a base table.
    pub fn over_table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::over(TableSource::Table {
            name: name.into(),
            alias: alias.into(),
        })
    }

    /// Creates an empty statement over the given source.
    pub fn over(source: TableSource) -> Self {
        Self {
            source,
            distinct: false,
            columns: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Returns `true` when the statement carries OFFSET or LIMIT.
    pub const fn is_paged(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conjoin_empty() {
        assert_eq!(SqlExpr::conjoin(Vec::new()), None);
    }

    #[test]
    fn test_conjoin_folds_left() {
        let a = SqlExpr::column("t", "a");
        let b = SqlExpr::column("t", "b");
        let c = SqlExpr::column("t", "c");
        let folded = SqlExpr::conjoin(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(folded, a.and(b).and(c));
    }

    #[test]
    fn test_join_kind_keywords() {
        assert_eq!(JoinKind::Inner.sql_keyword(), "INNER JOIN");
        assert_eq!(JoinKind::Left.sql_keyword(), "LEFT JOIN");
    }

    #[test]
    fn test_is_paged() {
        let mut q = SelectQuery::over_table("t", "t");
        assert!(!q.is_paged());
        q.limit = Some(10);
        assert!(q.is_paged());
    }
}
