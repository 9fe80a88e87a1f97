//! Predicate rendering.
//!
//! Predicates are built as ``SeaQuery`` expressions and rendered with named `@__pN`
//! parameters. Column names arrive already resolved (and escaped), so identifiers are written
//! verbatim.

use std::fmt;
use std::sync::Arc;

use sea_query::backend::{
    EscapeBuilder, OperLeftAssocDecider, PrecedenceDecider, QuotedBuilder, TableRefBuilder,
};
use sea_query::prepare::{SqlWriter, SqlWriterValues};
use sea_query::{BinOper, Iden, Oper, Quote, SimpleExpr, SubQueryStatement, Value};

use crate::connection::Param;

/// A resolved identifier, written without quoting.
#[derive(Debug, Clone)]
pub struct RawIden(pub Arc<str>);

impl Iden for RawIden {
    fn prepare(&self, s: &mut dyn fmt::Write, _q: Quote) {
        let _ = s.write_str(&self.0);
    }

    fn unquoted(&self, s: &mut dyn fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// A rendered predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// SQL text, without the `where` keyword.
    pub sql: String,
    /// Parameters referenced by the text.
    pub params: Vec<Param>,
}

pub struct QueryBuilder {
    pub quote: Quote,
    pub placeholder: &'static str,
    pub numbered: bool,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            quote: Quote::new(b'"'),
            placeholder: "@__p",
            numbered: true,
        }
    }
}

impl QueryBuilder {
    /// Render `expr` into SQL text and named parameters.
    pub fn render(&self, expr: &SimpleExpr) -> Predicate {
        let mut writer = SqlWriterValues::new(self.placeholder, self.numbered);
        sea_query::backend::QueryBuilder::prepare_simple_expr(self, expr, &mut writer);
        let (sql, values) = writer.into_parts();

        let prefix = self.placeholder.trim_start_matches('@');
        let params = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Param {
                name: format!("{prefix}{}", index + 1),
                value,
            })
            .collect();

        Predicate { sql, params }
    }
}

impl QuotedBuilder for QueryBuilder {
    fn quote(&self) -> Quote {
        self.quote
    }
}

impl EscapeBuilder for QueryBuilder {}

impl TableRefBuilder for QueryBuilder {}

impl OperLeftAssocDecider for QueryBuilder {
    fn well_known_left_associative(&self, op: &BinOper) -> bool {
        matches!(
            op,
            BinOper::And | BinOper::Or | BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Mod
        )
    }
}

impl PrecedenceDecider for QueryBuilder {
    fn inner_expr_well_known_greater_precedence(
        &self, inner: &SimpleExpr, _outer_oper: &Oper,
    ) -> bool {
        // operands that never need parentheses; everything else is wrapped
        matches!(
            inner,
            SimpleExpr::Column(_)
                | SimpleExpr::Value(_)
                | SimpleExpr::Tuple(_)
                | SimpleExpr::Constant(_)
                | SimpleExpr::FunctionCall(_)
                | SimpleExpr::Keyword(_)
        )
    }
}

impl sea_query::backend::QueryBuilder for QueryBuilder {
    fn prepare_query_statement(&self, query: &SubQueryStatement, sql: &mut dyn SqlWriter) {
        match query {
            SubQueryStatement::SelectStatement(s) => self.prepare_select_statement(s, sql),
            SubQueryStatement::InsertStatement(s) => self.prepare_insert_statement(s, sql),
            SubQueryStatement::UpdateStatement(s) => self.prepare_update_statement(s, sql),
            SubQueryStatement::DeleteStatement(s) => self.prepare_delete_statement(s, sql),
            SubQueryStatement::WithStatement(s) => self.prepare_with_query(s, sql),
        }
    }

    fn prepare_value(&self, value: &Value, sql: &mut dyn SqlWriter) {
        sql.push_param(value.clone(), self);
    }

    fn placeholder(&self) -> (&str, bool) {
        (self.placeholder, self.numbered)
    }
}
