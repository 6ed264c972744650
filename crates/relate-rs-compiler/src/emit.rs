//! SQL text generation for a frozen [`SelectQuery`].
//!
//! A [`Dialect`] is a static capability descriptor: identifier quoting,
//! parameter placeholder shape, paging clause form, boolean rendering, and
//! the backend's identifier length limit. The [`SqlEmitter`] walks the
//! statement AST once, appending text and collecting parameters in
//! encounter order. Emission never re-plans: unsupported combinations
//! (OFFSET/FETCH without ORDER BY on SQL Server) fail here with a dialect
//! error rather than producing text the backend would reject.

use std::fmt::Write as _;

use relate_rs_core::{RelateError, RelateResult};
use relate_rs_model::Value;

use crate::select::{
    OrderByItem, SelectColumn, SelectQuery, SqlExpr, SqlJoin, TableSource,
};
use crate::ir::BinaryOp;

/// Identifier quoting style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"identifier"` (PostgreSQL, SQLite).
    DoubleQuote,
    /// `` `identifier` `` (MySQL).
    Backtick,
    /// `[identifier]` (SQL Server).
    Bracket,
}

/// Parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, … (PostgreSQL).
    Numbered,
    /// `?` (MySQL, SQLite).
    QuestionMark,
    /// `@p1`, `@p2`, … (SQL Server).
    AtNumbered,
}

/// Paging clause form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `LIMIT n OFFSET m`.
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`; requires ORDER BY.
    OffsetFetch,
}

/// A static capability descriptor for one SQL backend.
#[derive(Debug, Clone)]
pub struct Dialect {
    /// The backend name, used in error messages.
    pub name: &'static str,
    /// Identifier quoting style.
    pub quote: QuoteStyle,
    /// Parameter placeholder style.
    pub placeholder: PlaceholderStyle,
    /// Paging clause form.
    pub paging: PagingStyle,
    /// Whether OFFSET may appear without LIMIT (MySQL requires both).
    pub offset_requires_limit: bool,
    /// Whether the backend has TRUE/FALSE keywords; otherwise 1/0.
    pub boolean_keywords: bool,
    /// The backend's identifier length limit, when it has one.
    pub max_identifier_len: Option<usize>,
}

impl Dialect {
    /// PostgreSQL.
    pub const fn postgres() -> Self {
        Self {
            name: "postgres",
            quote: QuoteStyle::DoubleQuote,
            placeholder: PlaceholderStyle::Numbered,
            paging: PagingStyle::LimitOffset,
            offset_requires_limit: false,
            boolean_keywords: true,
            max_identifier_len: Some(63),
        }
    }

    /// MySQL.
    pub const fn mysql() -> Self {
        Self {
            name: "mysql",
            quote: QuoteStyle::Backtick,
            placeholder: PlaceholderStyle::QuestionMark,
            paging: PagingStyle::LimitOffset,
            offset_requires_limit: true,
            boolean_keywords: true,
            max_identifier_len: Some(64),
        }
    }

    /// SQLite.
    pub const fn sqlite() -> Self {
        Self {
            name: "sqlite",
            quote: QuoteStyle::DoubleQuote,
            placeholder: PlaceholderStyle::QuestionMark,
            paging: PagingStyle::LimitOffset,
            offset_requires_limit: false,
            boolean_keywords: false,
            max_identifier_len: None,
        }
    }

    /// Microsoft SQL Server.
    pub const fn sqlserver() -> Self {
        Self {
            name: "sqlserver",
            quote: QuoteStyle::Bracket,
            placeholder: PlaceholderStyle::AtNumbered,
            paging: PagingStyle::OffsetFetch,
            offset_requires_limit: false,
            boolean_keywords: false,
            max_identifier_len: Some(128),
        }
    }

    /// Quotes an identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self.quote {
            QuoteStyle::DoubleQuote => format!("\"{}\"", ident.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", ident.replace('`', "``")),
            QuoteStyle::Bracket => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    fn placeholder_text(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Numbered => format!("${index}"),
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::AtNumbered => format!("@p{index}"),
        }
    }
}

/// One emitted statement: SQL text plus its parameters in placeholder
/// order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Statement {
    /// The SQL text.
    pub sql: String,
    /// Bind parameters in encounter order.
    pub params: Vec<Value>,
}

/// Walks a [`SelectQuery`] and produces dialect-specific SQL text.
#[derive(Debug)]
pub struct SqlEmitter<'d> {
    dialect: &'d Dialect,
    parameterize: bool,
}

// Expression precedence, lowest binds loosest. Operands at strictly lower
// precedence than their parent get parenthesized.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_CMP: u8 = 3;
const PREC_PRIMARY: u8 = 4;

impl<'d> SqlEmitter<'d> {
    /// Creates an emitter. With `parameterize` off, literals are inlined
    /// into the SQL text and the parameter list stays empty.
    pub const fn new(dialect: &'d Dialect, parameterize: bool) -> Self {
        Self {
            dialect,
            parameterize,
        }
    }

    /// Emits one statement.
    ///
    /// # Errors
    ///
    /// Returns [`RelateError::UnsupportedDialectFeature`] when the
    /// statement's paging shape cannot be expressed in this dialect.
    pub fn emit(&self, query: &SelectQuery) -> RelateResult<Statement> {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.write_query(query, &mut sql, &mut params)?;
        Ok(Statement { sql, params })
    }

    fn write_query(
        &self,
        query: &SelectQuery,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        out.push_str("SELECT ");
        if query.distinct {
            out.push_str("DISTINCT ");
        }
        for (i, column) in query.columns.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_column(column, out, params)?;
        }

        out.push_str(" FROM ");
        self.write_source(&query.source, out, params)?;

        for join in &query.joins {
            self.write_join(join, out, params)?;
        }

        if let Some(predicate) = &query.predicate {
            out.push_str(" WHERE ");
            self.write_expr(predicate, PREC_OR, out, params)?;
        }

        if !query.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            for (i, item) in query.order_by.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.write_order_item(item, out, params)?;
            }
        }

        self.write_paging(query, out)?;
        Ok(())
    }

    fn write_column(
        &self,
        column: &SelectColumn,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        self.write_expr(&column.expr, PREC_PRIMARY, out, params)?;
        if let Some(alias) = &column.alias {
            out.push_str(" AS ");
            out.push_str(&self.dialect.quote_identifier(alias));
        }
        Ok(())
    }

    fn write_order_item(
        &self,
        item: &OrderByItem,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        self.write_expr(&item.expr, PREC_PRIMARY, out, params)?;
        if item.descending {
            out.push_str(" DESC");
        }
        Ok(())
    }

    fn write_source(
        &self,
        source: &TableSource,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        match source {
            TableSource::Table { name, alias } => {
                out.push_str(&self.dialect.quote_identifier(name));
                // The alias clause is noise when it matches the bare table
                // name.
                if alias != name {
                    out.push_str(" AS ");
                    out.push_str(&self.dialect.quote_identifier(alias));
                }
            }
            TableSource::Derived { query, alias } => {
                out.push('(');
                self.write_query(query, out, params)?;
                out.push_str(") AS ");
                out.push_str(&self.dialect.quote_identifier(alias));
            }
        }
        Ok(())
    }

    fn write_join(
        &self,
        join: &SqlJoin,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        out.push(' ');
        out.push_str(join.kind.sql_keyword());
        out.push(' ');
        self.write_source(&join.source, out, params)?;
        if let Some(on) = &join.on {
            out.push_str(" ON ");
            self.write_expr(on, PREC_OR, out, params)?;
        }
        Ok(())
    }

    fn write_paging(&self, query: &SelectQuery, out: &mut String) -> RelateResult<()> {
        if !query.is_paged() {
            return Ok(());
        }
        match self.dialect.paging {
            PagingStyle::LimitOffset => {
                match (query.limit, self.dialect.offset_requires_limit) {
                    (Some(limit), _) => {
                        let _ = write!(out, " LIMIT {limit}");
                    }
                    // MySQL has no standalone OFFSET; the documented idiom
                    // is an effectively-unbounded LIMIT.
                    (None, true) => out.push_str(" LIMIT 18446744073709551615"),
                    (None, false) => {}
                }
                if let Some(offset) = query.offset {
                    let _ = write!(out, " OFFSET {offset}");
                }
            }
            PagingStyle::OffsetFetch => {
                if query.order_by.is_empty() {
                    return Err(RelateError::UnsupportedDialectFeature {
                        dialect: self.dialect.name.to_string(),
                        feature: "OFFSET/FETCH without ORDER BY".to_string(),
                    });
                }
                let offset = query.offset.unwrap_or(0);
                let _ = write!(out, " OFFSET {offset} ROWS");
                if let Some(limit) = query.limit {
                    let _ = write!(out, " FETCH NEXT {limit} ROWS ONLY");
                }
            }
        }
        Ok(())
    }

    fn write_expr(
        &self,
        expr: &SqlExpr,
        parent_prec: u8,
        out: &mut String,
        params: &mut Vec<Value>,
    ) -> RelateResult<()> {
        let prec = precedence(expr);
        let parens = prec < parent_prec;
        if parens {
            out.push('(');
        }
        match expr {
            SqlExpr::Column(column) => {
                out.push_str(&self.dialect.quote_identifier(&column.table_alias));
                out.push('.');
                out.push_str(&self.dialect.quote_identifier(&column.column));
            }
            SqlExpr::Param(value) => {
                if self.parameterize {
                    params.push(value.clone());
                    out.push_str(&self.dialect.placeholder_text(params.len()));
                } else {
                    out.push_str(&self.render_literal(value));
                }
            }
            SqlExpr::Binary { op, left, right } => {
                self.write_expr(left, prec, out, params)?;
                out.push(' ');
                out.push_str(op.sql_symbol());
                out.push(' ');
                // Same-precedence right operands get parenthesized so the
                // text reflects the tree's left-fold shape.
                self.write_expr(right, prec + 1, out, params)?;
            }
            SqlExpr::IsNull { expr, negated } => {
                self.write_expr(expr, PREC_PRIMARY, out, params)?;
                out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            SqlExpr::Not(inner) => {
                out.push_str("NOT (");
                self.write_expr(inner, PREC_OR, out, params)?;
                out.push(')');
            }
            SqlExpr::CountStar => out.push_str("COUNT(*)"),
            SqlExpr::Scalar(subquery) => {
                out.push('(');
                self.write_query(subquery, out, params)?;
                out.push(')');
            }
        }
        if parens {
            out.push(')');
        }
        Ok(())
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match (self.dialect.boolean_keywords, b) {
                (true, true) => "TRUE".to_string(),
                (true, false) => "FALSE".to_string(),
                (false, true) => "1".to_string(),
                (false, false) => "0".to_string(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(v) => v.to_string(),
            Value::String(s) => quote_string(s),
            Value::Bytes(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2 + 3);
                hex.push_str("X'");
                for byte in bytes {
                    let _ = write!(hex, "{byte:02X}");
                }
                hex.push('\'');
                hex
            }
            Value::Date(d) => quote_string(&d.to_string()),
            Value::DateTime(dt) => quote_string(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Uuid(u) => quote_string(&u.to_string()),
            Value::Json(j) => quote_string(&j.to_string()),
        }
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

const fn precedence(expr: &SqlExpr) -> u8 {
    match expr {
        SqlExpr::Binary { op, .. } => match op {
            BinaryOp::Or => PREC_OR,
            BinaryOp::And => PREC_AND,
            _ => PREC_CMP,
        },
        SqlExpr::IsNull { .. } => PREC_CMP,
        SqlExpr::Column(_)
        | SqlExpr::Param(_)
        | SqlExpr::Not(_)
        | SqlExpr::CountStar
        | SqlExpr::Scalar(_) => PREC_PRIMARY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::{JoinKind, SelectColumn};

    fn column(alias: &str, name: &str) -> SelectColumn {
        SelectColumn {
            expr: SqlExpr::column(alias, name),
            alias: None,
        }
    }

    fn basic_query() -> SelectQuery {
        let mut q = SelectQuery::over_table("posts", "posts");
        q.columns.push(column("posts", "id"));
        q.columns.push(column("posts", "title"));
        q
    }

    #[test]
    fn test_select_without_redundant_alias() {
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&basic_query()).unwrap();
        assert_eq!(stmt.sql, r#"SELECT "posts"."id", "posts"."title" FROM "posts""#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_suffixed_alias_is_emitted() {
        let mut q = SelectQuery::over_table("posts", "posts_2");
        q.columns.push(column("posts_2", "id"));
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert_eq!(stmt.sql, r#"SELECT "posts_2"."id" FROM "posts" AS "posts_2""#);
    }

    #[test]
    fn test_numbered_placeholders_collect_params_in_order() {
        let mut q = basic_query();
        q.predicate = Some(
            SqlExpr::column("posts", "title")
                .eq(SqlExpr::Param(Value::from("a")))
                .and(SqlExpr::column("posts", "id").eq(SqlExpr::Param(Value::Int(7)))),
        );
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT "posts"."id", "posts"."title" FROM "posts" WHERE "posts"."title" = $1 AND "posts"."id" = $2"#
        );
        assert_eq!(stmt.params, vec![Value::from("a"), Value::Int(7)]);
    }

    #[test]
    fn test_question_mark_placeholders() {
        let mut q = basic_query();
        q.predicate = Some(SqlExpr::column("posts", "id").eq(SqlExpr::Param(Value::Int(1))));
        let dialect = Dialect::sqlite();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.ends_with(r#"WHERE "posts"."id" = ?"#));
    }

    #[test]
    fn test_backtick_quoting() {
        let dialect = Dialect::mysql();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&basic_query()).unwrap();
        assert_eq!(stmt.sql, "SELECT `posts`.`id`, `posts`.`title` FROM `posts`");
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let mut q = basic_query();
        let a = SqlExpr::column("posts", "a").eq(SqlExpr::Param(Value::Int(1)));
        let b = SqlExpr::column("posts", "b").eq(SqlExpr::Param(Value::Int(2)));
        let c = SqlExpr::column("posts", "c").eq(SqlExpr::Param(Value::Int(3)));
        q.predicate = Some(a.or(b).and(c));
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.ends_with(
            r#"WHERE ("posts"."a" = $1 OR "posts"."b" = $2) AND "posts"."c" = $3"#
        ));
    }

    #[test]
    fn test_left_join_with_on_clause() {
        let mut q = basic_query();
        q.joins.push(SqlJoin {
            kind: JoinKind::Left,
            source: TableSource::Table {
                name: "blogs".to_string(),
                alias: "blogs".to_string(),
            },
            on: Some(SqlExpr::column("posts", "blog_id").eq(SqlExpr::column("blogs", "id"))),
        });
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt
            .sql
            .contains(r#"LEFT JOIN "blogs" ON "posts"."blog_id" = "blogs"."id""#));
    }

    #[test]
    fn test_limit_offset_paging() {
        let mut q = basic_query();
        q.order_by.push(OrderByItem {
            expr: SqlExpr::column("posts", "id"),
            descending: false,
        });
        q.offset = Some(20);
        q.limit = Some(10);
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.ends_with(r#"ORDER BY "posts"."id" LIMIT 10 OFFSET 20"#));
    }

    #[test]
    fn test_mysql_offset_without_limit_uses_max_limit() {
        let mut q = basic_query();
        q.offset = Some(5);
        let dialect = Dialect::mysql();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.ends_with("LIMIT 18446744073709551615 OFFSET 5"));
    }

    #[test]
    fn test_offset_fetch_requires_order_by() {
        let mut q = basic_query();
        q.limit = Some(10);
        let dialect = Dialect::sqlserver();
        let emitter = SqlEmitter::new(&dialect, true);
        let err = emitter.emit(&q).unwrap_err();
        assert!(matches!(err, RelateError::UnsupportedDialectFeature { .. }));

        q.order_by.push(OrderByItem {
            expr: SqlExpr::column("posts", "id"),
            descending: false,
        });
        q.offset = Some(20);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt
            .sql
            .ends_with("ORDER BY [posts].[id] OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"));
    }

    #[test]
    fn test_inlined_literals_when_not_parameterizing() {
        let mut q = basic_query();
        q.predicate = Some(
            SqlExpr::column("posts", "title")
                .eq(SqlExpr::Param(Value::from("o'brien")))
                .and(SqlExpr::column("posts", "hidden").eq(SqlExpr::Param(Value::Bool(false)))),
        );
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, false);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt
            .sql
            .ends_with(r#"WHERE "posts"."title" = 'o''brien' AND "posts"."hidden" = FALSE"#));
        assert!(stmt.params.is_empty());

        let dialect = Dialect::sqlite();
        let emitter = SqlEmitter::new(&dialect, false);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.ends_with("= 0"), "sqlite renders booleans as 1/0");
    }

    #[test]
    fn test_derived_table_source() {
        let mut inner = SelectQuery::over_table("posts", "posts");
        inner.columns.push(column("posts", "id"));
        let mut q = SelectQuery::over(TableSource::Derived {
            query: Box::new(inner),
            alias: "page".to_string(),
        });
        q.columns.push(column("page", "id"));
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT "page"."id" FROM (SELECT "posts"."id" FROM "posts") AS "page""#
        );
    }

    #[test]
    fn test_scalar_subquery_parameter_numbering_spans_scopes() {
        let mut sub = SelectQuery::over_table("posts", "posts");
        sub.columns.push(SelectColumn {
            expr: SqlExpr::CountStar,
            alias: None,
        });
        sub.predicate = Some(SqlExpr::column("posts", "blog_id").eq(SqlExpr::column("blogs", "id")));
        let mut q = SelectQuery::over_table("blogs", "blogs");
        q.columns.push(column("blogs", "id"));
        q.predicate = Some(
            SqlExpr::Scalar(Box::new(sub))
                .gt(SqlExpr::Param(Value::Int(5)))
                .and(SqlExpr::column("blogs", "name").eq(SqlExpr::Param(Value::from("x")))),
        );
        let dialect = Dialect::postgres();
        let emitter = SqlEmitter::new(&dialect, true);
        let stmt = emitter.emit(&q).unwrap();
        assert!(stmt.sql.contains(
            r#"(SELECT COUNT(*) FROM "posts" WHERE "posts"."blog_id" = "blogs"."id") > $1"#
        ));
        assert!(stmt.sql.contains(r#""blogs"."name" = $2"#));
        assert_eq!(stmt.params, vec![Value::Int(5), Value::from("x")]);
    }
}
