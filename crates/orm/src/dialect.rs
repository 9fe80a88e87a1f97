//! Dialect specific insert, identity retrieval and paging syntax.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::log::LogSink;

/// Database dialect a connection speaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Microsoft SQL Server.
    SqlServer,
    /// Microsoft SQL Server Compact Edition.
    SqlServerCe,
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    MySql,
    /// A custom dialect, registered at runtime.
    Other(String),
}

impl Dialect {
    /// Dialect for a driver connection kind name such as `SqlConnection` or
    /// `NpgsqlConnection`, matched ignoring case.
    #[must_use]
    pub fn from_kind_name(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "sqlconnection" => Self::SqlServer,
            "sqlceconnection" => Self::SqlServerCe,
            "sqliteconnection" => Self::Sqlite,
            "npgsqlconnection" => Self::Postgres,
            "mysqlconnection" => Self::MySql,
            other => Self::Other(other.to_string()),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::SqlServer => "SqlServer",
            Self::SqlServerCe => "SqlServerCe",
            Self::Sqlite => "Sqlite",
            Self::Postgres => "Postgres",
            Self::MySql => "MySql",
            Self::Other(name) => name,
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs to an insert statement.
#[derive(Debug, Clone, Copy)]
pub struct InsertParts<'a> {
    /// Resolved table name.
    pub table: &'a str,
    /// Resolved column names, in parameter order.
    pub columns: &'a [String],
    /// Parameter placeholders, one per column.
    pub params: &'a [String],
    /// Resolved key column, when the type has one.
    pub key_column: Option<&'a str>,
    /// Whether names were already wrapped with escape characters.
    pub escaped: bool,
}

impl InsertParts<'_> {
    fn values_clause(&self) -> String {
        format!(
            "insert into {} ({}) values ({})",
            self.table,
            self.columns.join(", "),
            self.params.join(", ")
        )
    }
}

/// Builds dialect specific SQL fragments.
pub trait SqlBuilder: Debug + Send + Sync {
    /// Name used in diagnostics and errors.
    fn name(&self) -> &'static str;

    /// Single row insert that also returns the generated identity.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot express the statement for the inputs.
    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String>;

    /// Insert executed once per row of a list, without identity retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the dialect does not support list inserts.
    fn build_multiple_insert(&self, insert: &InsertParts<'_>) -> Result<String>;

    /// Paging fragment appended to a query ordered by `order_by`. Pages are 1-based; pages
    /// below 1 are treated as page 1.
    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String;
}

/// Zero-based offset of the first row of `page_number`.
#[must_use]
pub const fn page_start(page_number: i64, page_size: i64) -> i64 {
    let page = if page_number > 1 { page_number - 1 } else { 0 };
    page.saturating_mul(page_size)
}

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerBuilder;

impl SqlBuilder for SqlServerBuilder {
    fn name(&self) -> &'static str {
        "SqlServer"
    }

    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(format!(
            "set nocount on {} select cast(scope_identity() as int)",
            insert.values_clause()
        ))
    }

    fn build_multiple_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(insert.values_clause())
    }

    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String {
        let start = page_start(page_number, page_size);
        format!(" {order_by} offset {start} rows fetch next {page_size} rows only")
    }
}

/// Microsoft SQL Server Compact Edition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerCeBuilder;

impl SqlBuilder for SqlServerCeBuilder {
    fn name(&self) -> &'static str {
        "SqlServerCe"
    }

    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(format!("{} select cast(@@IDENTITY as int)", insert.values_clause()))
    }

    fn build_multiple_insert(&self, _insert: &InsertParts<'_>) -> Result<String> {
        Err(Error::Unsupported {
            dialect: self.name().to_string(),
            operation: "multi-row insert",
        })
    }

    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String {
        SqlServerBuilder.build_paging(order_by, page_number, page_size)
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBuilder;

impl SqlBuilder for SqliteBuilder {
    fn name(&self) -> &'static str {
        "Sqlite"
    }

    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(format!("{}; select last_insert_rowid() id", insert.values_clause()))
    }

    fn build_multiple_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(insert.values_clause())
    }

    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String {
        let start = page_start(page_number, page_size);
        format!(" {order_by} LIMIT {start}, {page_size}")
    }
}

/// PostgreSQL. Identity retrieval needs the key column.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBuilder;

impl SqlBuilder for PostgresBuilder {
    fn name(&self) -> &'static str {
        "Postgres"
    }

    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        let Some(key) = insert.key_column else {
            return Err(Error::KeyRequired {
                dialect: self.name(),
                operation: "insert",
                table: insert.table.to_string(),
            });
        };
        Ok(format!("{} RETURNING {key}", insert.values_clause()))
    }

    fn build_multiple_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(insert.values_clause())
    }

    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String {
        let start = page_start(page_number, page_size);
        format!(" {order_by} OFFSET {start} LIMIT {page_size}")
    }
}

/// MySQL. Unescaped names are quoted with backticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlBuilder;

impl MySqlBuilder {
    fn quoted(insert: &InsertParts<'_>) -> String {
        if insert.escaped {
            return insert.values_clause();
        }
        let columns: Vec<String> = insert.columns.iter().map(|c| format!("`{c}`")).collect();
        format!(
            "insert into `{}` ({}) values ({})",
            insert.table,
            columns.join(", "),
            insert.params.join(", ")
        )
    }
}

impl SqlBuilder for MySqlBuilder {
    fn name(&self) -> &'static str {
        "MySql"
    }

    fn build_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(format!("{}; select LAST_INSERT_ID() id", Self::quoted(insert)))
    }

    fn build_multiple_insert(&self, insert: &InsertParts<'_>) -> Result<String> {
        Ok(Self::quoted(insert))
    }

    fn build_paging(&self, order_by: &str, page_number: i64, page_size: i64) -> String {
        SqliteBuilder.build_paging(order_by, page_number, page_size)
    }
}

/// Dialect to builder registry.
///
/// Ships with the five built-in dialects. Dialects without a registered builder use the SQL
/// Server builder.
#[derive(Debug)]
pub struct DialectRegistry {
    builders: DashMap<Dialect, Arc<dyn SqlBuilder>>,
    fallback: Arc<dyn SqlBuilder>,
    log: LogSink,
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new(LogSink::default())
    }
}

impl DialectRegistry {
    /// Registry with the built-in dialects, reporting selections to `log`.
    #[must_use]
    pub fn new(log: LogSink) -> Self {
        let builders: DashMap<Dialect, Arc<dyn SqlBuilder>> = DashMap::new();
        builders.insert(Dialect::SqlServer, Arc::new(SqlServerBuilder));
        builders.insert(Dialect::SqlServerCe, Arc::new(SqlServerCeBuilder));
        builders.insert(Dialect::Sqlite, Arc::new(SqliteBuilder));
        builders.insert(Dialect::Postgres, Arc::new(PostgresBuilder));
        builders.insert(Dialect::MySql, Arc::new(MySqlBuilder));

        Self {
            builders,
            fallback: Arc::new(SqlServerBuilder),
            log,
        }
    }

    /// Register `builder` for `dialect`, replacing any existing entry.
    pub fn register(&self, dialect: Dialect, builder: impl SqlBuilder + 'static) {
        self.builders.insert(dialect, Arc::new(builder));
    }

    /// Builder for `dialect`.
    #[must_use]
    pub fn builder(&self, dialect: &Dialect) -> Arc<dyn SqlBuilder> {
        let builder = self
            .builders
            .get(dialect)
            .map_or_else(|| Arc::clone(&self.fallback), |entry| Arc::clone(entry.value()));

        self.log.emit(&format!(
            "Selected SQL builder '{}' for dialect '{dialect}'",
            builder.name()
        ));
        builder
    }

    /// Builder for a driver connection kind name.
    #[must_use]
    pub fn builder_for_kind(&self, kind: &str) -> Arc<dyn SqlBuilder> {
        self.builder(&Dialect::from_kind_name(kind))
    }
}
