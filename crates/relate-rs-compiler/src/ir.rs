//! The normalized query IR consumed by the compiler.
//!
//! A [`QueryIr`] is an entity-graph-shaped description of one query: a root
//! entity, an optional filter, projections, orderings, paging, and eager-load
//! directives. Expressions are a finite tagged union ([`Expr`]) whose
//! identifiers are pre-resolved Model handles, never raw names — the front
//! end that produces this IR has already bound every property and navigation
//! against the Model, so no reflection or name resolution happens here.

use relate_rs_model::{EntityId, NavigationRef, Value};

/// A sequence of navigation traversals starting at the statement root.
///
/// The empty path denotes the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NavPath(pub Vec<NavigationRef>);

impl NavPath {
    /// The root path (no traversals).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A path made of the given traversals in order.
    pub fn new(segments: Vec<NavigationRef>) -> Self {
        Self(segments)
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The traversal segments in order.
    pub fn segments(&self) -> &[NavigationRef] {
        &self.0
    }

    /// The path with the last traversal removed. The root path is its own
    /// parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    /// The last traversal, if any.
    pub fn last(&self) -> Option<NavigationRef> {
        self.0.last().copied()
    }

    /// The path extended by one traversal.
    pub fn child(&self, nav: NavigationRef) -> Self {
        let mut segments = self.0.clone();
        segments.push(nav);
        Self(segments)
    }
}

/// Binary operators of the IR expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less-than.
    Lt,
    /// Less-than-or-equal.
    Lte,
    /// Greater-than.
    Gt,
    /// Greater-than-or-equal.
    Gte,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
}

impl BinaryOp {
    /// Returns `true` for value-comparing operators (everything but the
    /// logical connectives).
    pub const fn is_comparison(&self) -> bool {
        !matches!(self, Self::And | Self::Or)
    }

    /// Returns the SQL operator text.
    pub const fn sql_symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A node of the tagged-union query expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A navigation-qualified member access: the property at `property`
    /// (index into the path target's properties) reached via `path`.
    Property {
        /// Navigation traversals from the root.
        path: NavPath,
        /// Property index on the path's target entity.
        property: usize,
    },
    /// A literal operand.
    Literal(Value),
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// An explicit null test.
    IsNull {
        /// The tested operand.
        expr: Box<Expr>,
        /// `true` for IS NOT NULL.
        negated: bool,
    },
    /// A count aggregate over a Collection navigation path.
    Count(NavPath),
}

impl Expr {
    /// A property access on the root entity.
    pub fn root_property(property: usize) -> Self {
        Self::Property {
            path: NavPath::root(),
            property,
        }
    }

    /// A property access through a navigation path.
    pub fn property(path: NavPath, property: usize) -> Self {
        Self::Property { path, property }
    }

    /// A literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A count aggregate over a Collection navigation path.
    pub fn count(path: NavPath) -> Self {
        Self::Count(path)
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

    /// `self <> other`.
    pub fn ne(self, other: Self) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// `self < other`.
    pub fn lt(self, other: Self) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`.
    pub fn lte(self, other: Self) -> Self {
        self.binary(BinaryOp::Lte, other)
    }

    /// `self > other`.
    pub fn gt(self, other: Self) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`.
    pub fn gte(self, other: Self) -> Self {
        self.binary(BinaryOp::Gte, other)
    }

    /// Logical conjunction.
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical disjunction.
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
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
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// The ordered expression.
    pub expr: Expr,
    /// Whether to sort descending.
    pub descending: bool,
}

impl Ordering {
    /// Ascending order over the expression.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    /// Descending order over the expression.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

/// OFFSET/LIMIT paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

/// One projected output column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    /// The projected expression.
    pub expr: Expr,
    /// The output column name.
    pub alias: String,
}

/// The full normalized description of one query.
///
/// Construct with [`QueryIr::new`] and populate the public fields, in the
/// manner of a query AST. An empty `projection` selects all root columns.
#[derive(Debug, Clone)]
pub struct QueryIr {
    /// The root entity the query ranges over.
    pub root: EntityId,
    /// The WHERE predicate.
    pub filter: Option<Expr>,
    /// Projected columns; empty selects every root property.
    pub projection: Vec<ProjectionItem>,
    /// Result ordering.
    pub order_by: Vec<Ordering>,
    /// Paging, applied after ordering.
    pub page: Option<Page>,
    /// Eager-load requests: navigation paths to load alongside the root.
    pub includes: Vec<NavPath>,
    /// Collection paths enumerated into the main statement (cardinality
    /// expansion is intended for these).
    pub flatten: Vec<NavPath>,
}

impl QueryIr {
    /// Creates an empty query over the given root entity.
    pub fn new(root: EntityId) -> Self {
        Self {
            root,
            filter: None,
            projection: Vec::new(),
            order_by: Vec::new(),
            page: None,
            includes: Vec::new(),
            flatten: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(entity: usize, index: usize) -> NavigationRef {
        NavigationRef {
            entity: EntityId(entity),
            index,
        }
    }

    #[test]
    fn test_nav_path_root() {
        let root = NavPath::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), root);
        assert_eq!(root.last(), None);
    }

    #[test]
    fn test_nav_path_child_and_parent() {
        let p = NavPath::root().child(nav(0, 0)).child(nav(1, 1));
        assert_eq!(p.segments().len(), 2);
        assert_eq!(p.parent(), NavPath::new(vec![nav(0, 0)]));
        assert_eq!(p.last(), Some(nav(1, 1)));
    }

    #[test]
    fn test_expr_builders() {
        let e = Expr::root_property(0).eq(Expr::literal(5));
        assert!(matches!(
            e,
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_binary_op_classification() {
        assert!(BinaryOp::Eq.is_comparison());
        assert!(BinaryOp::Gt.is_comparison());
        assert!(!BinaryOp::And.is_comparison());
        assert_eq!(BinaryOp::Ne.sql_symbol(), "<>");
    }
}
