use std::sync::Arc;

use sea_query::{Expr, SimpleExpr, Value};

use crate::error::{Error, Result};
use crate::query::RawIden;

/// Predicate over the members of an entity.
///
/// Filters name members, not columns. Members are resolved to column names through the
/// [`Catalog`](crate::Catalog) when the predicate is rendered, so mappings and escaping apply.
/// Values use natural Rust types (i32, String, ``DateTime<Utc>``) which convert via From.
#[derive(Debug, Clone)]
pub enum Filter {
    /// member = value
    Eq(&'static str, Value),
    /// member != value
    Ne(&'static str, Value),
    /// member > value
    Gt(&'static str, Value),
    /// member >= value
    Gte(&'static str, Value),
    /// member < value
    Lt(&'static str, Value),
    /// member <= value
    Lte(&'static str, Value),
    /// member IN (values)
    In(&'static str, Vec<Value>),
    /// member NOT IN (values)
    NotIn(&'static str, Vec<Value>),
    /// member IS NULL
    IsNull(&'static str),
    /// member IS NOT NULL
    IsNotNull(&'static str),
    /// member LIKE pattern
    Like(&'static str, String),
    /// member NOT LIKE pattern
    NotLike(&'static str, String),
    /// member BETWEEN low AND high
    Between(&'static str, Value, Value),
    /// member NOT BETWEEN low AND high
    NotBetween(&'static str, Value, Value),
    /// Member-to-member comparison: left = right
    ColEq(&'static str, &'static str),
    /// Member-to-member comparison: left != right
    ColNe(&'static str, &'static str),
    /// Member-to-member comparison: left > right
    ColGt(&'static str, &'static str),
    /// Member-to-member comparison: left < right
    ColLt(&'static str, &'static str),
    /// Logical AND of multiple filters
    And(Vec<Self>),
    /// Logical OR of multiple filters
    Or(Vec<Self>),
    /// Logical NOT of a filter
    Not(Box<Self>),
}

impl Filter {
    /// Convert to a ``SeaQuery`` expression, naming columns with `column`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `column`, typically an unknown member.
    pub fn into_expr(self, column: &dyn Fn(&str) -> Result<Arc<str>>) -> Result<SimpleExpr> {
        let col = |member: &str| -> Result<Expr> { Ok(Expr::col(RawIden(column(member)?))) };

        let expr = match self {
            Self::Eq(member, val) => col(member)?.eq(val),
            Self::Ne(member, val) => col(member)?.ne(val),
            Self::Gt(member, val) => col(member)?.gt(val),
            Self::Gte(member, val) => col(member)?.gte(val),
            Self::Lt(member, val) => col(member)?.lt(val),
            Self::Lte(member, val) => col(member)?.lte(val),
            Self::In(member, vals) => col(member)?.is_in(vals),
            Self::NotIn(member, vals) => col(member)?.is_not_in(vals),
            Self::IsNull(member) => col(member)?.is_null(),
            Self::IsNotNull(member) => col(member)?.is_not_null(),
            Self::Like(member, pattern) => col(member)?.like(pattern),
            Self::NotLike(member, pattern) => col(member)?.not_like(pattern),
            Self::Between(member, low, high) => col(member)?.between(low, high),
            Self::NotBetween(member, low, high) => col(member)?.not_between(low, high),
            Self::ColEq(left, right) => col(left)?.eq(col(right)?),
            Self::ColNe(left, right) => col(left)?.ne(col(right)?),
            Self::ColGt(left, right) => col(left)?.gt(col(right)?),
            Self::ColLt(left, right) => col(left)?.lt(col(right)?),
            Self::And(filters) => {
                let mut exprs = filters.into_iter().map(|f| f.into_expr(column));
                match exprs.next() {
                    // no filters, so all conditions satisfied, hence `true`
                    None => Expr::value(true),
                    Some(first) => {
                        exprs.try_fold(first?, |acc, next| Ok::<_, Error>(acc.and(next?)))?
                    }
                }
            }
            Self::Or(filters) => {
                let mut exprs = filters.into_iter().map(|f| f.into_expr(column));
                match exprs.next() {
                    // no filters, so 0 conditions satisfied, hence `false`
                    None => Expr::value(false),
                    Some(first) => {
                        exprs.try_fold(first?, |acc, next| Ok::<_, Error>(acc.or(next?)))?
                    }
                }
            }
            Self::Not(filter) => Expr::expr(filter.into_expr(column)?).not(),
        };
        Ok(expr)
    }

    /// Creates an equality filter (member = value).
    #[must_use]
    pub fn eq(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Eq(member, val.into())
    }

    /// Creates an inequality filter (member != value).
    #[must_use]
    pub fn ne(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Ne(member, val.into())
    }

    /// Creates a greater-than filter (member > value).
    #[must_use]
    pub fn gt(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Gt(member, val.into())
    }

    /// Creates a greater-than-or-equal filter (member >= value).
    #[must_use]
    pub fn gte(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Gte(member, val.into())
    }

    /// Creates a less-than filter (member < value).
    #[must_use]
    pub fn lt(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Lt(member, val.into())
    }

    /// Creates a less-than-or-equal filter (member <= value).
    #[must_use]
    pub fn lte(member: &'static str, val: impl Into<Value>) -> Self {
        Self::Lte(member, val.into())
    }

    /// Creates an IN filter (member IN (values)).
    #[must_use]
    pub fn r#in(member: &'static str, vals: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In(member, vals.into_iter().map(Into::into).collect())
    }

    /// Creates a NOT IN filter (member NOT IN (values)).
    #[must_use]
    pub fn not_in(member: &'static str, vals: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::NotIn(member, vals.into_iter().map(Into::into).collect())
    }

    /// Creates an IS NULL filter.
    #[must_use]
    pub const fn is_null(member: &'static str) -> Self {
        Self::IsNull(member)
    }

    /// Creates an IS NOT NULL filter.
    #[must_use]
    pub const fn is_not_null(member: &'static str) -> Self {
        Self::IsNotNull(member)
    }

    /// Creates a LIKE filter with pattern matching.
    #[must_use]
    pub fn like(member: &'static str, pattern: impl Into<String>) -> Self {
        Self::Like(member, pattern.into())
    }

    /// Creates a NOT LIKE filter with pattern matching.
    #[must_use]
    pub fn not_like(member: &'static str, pattern: impl Into<String>) -> Self {
        Self::NotLike(member, pattern.into())
    }

    /// Creates a BETWEEN filter (member BETWEEN low AND high).
    #[must_use]
    pub fn between(member: &'static str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Between(member, low.into(), high.into())
    }

    /// Creates a NOT BETWEEN filter.
    #[must_use]
    pub fn not_between(
        member: &'static str, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        Self::NotBetween(member, low.into(), high.into())
    }

    /// Compare two members for equality.
    #[must_use]
    pub const fn col_eq(left: &'static str, right: &'static str) -> Self {
        Self::ColEq(left, right)
    }

    /// Combine filters with AND.
    #[must_use]
    pub const fn and(filters: Vec<Self>) -> Self {
        Self::And(filters)
    }

    /// Combine filters with OR.
    #[must_use]
    pub const fn or(filters: Vec<Self>) -> Self {
        Self::Or(filters)
    }

    /// Negate a filter.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Self) -> Self {
        Self::Not(Box::new(filter))
    }
}
