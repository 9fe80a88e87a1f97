//! Data access collaborators.
//!
//! Drivers implement [`Connection`] and [`Transaction`] to execute the SQL this crate generates.
//! Statements carry named parameters (`@name`); drivers bind them in whatever way the database
//! expects.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sea_query::Value;

use crate::dialect::Dialect;
use crate::resolver::DataColumn;

/// Boxed future returned by collaborator calls.
pub type FutureResult<T> = BoxFuture<'static, anyhow::Result<T>>;

/// A named statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name without the `@` prefix.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// A SQL statement with its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// Statement text.
    pub sql: String,
    /// Named parameters.
    pub params: Vec<Param>,
    /// Upper bound on statement execution.
    pub timeout: Option<Duration>,
}

impl Command {
    /// Statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Bind `value` to `@name`.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.push(Param {
            name: name.into(),
            value,
        });
        self
    }

    /// Bind every `(name, value)` pair.
    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    /// Bound execution by `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A named column value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column value.
    pub value: Value,
}

/// A result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Columns in result order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Value of the column `name`, matched ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)).map(|f| &f.value)
    }

    /// Value of the first column.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.fields.first().map(|f| &f.value)
    }
}

/// In-memory tabular buffer handed to the bulk copy primitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    /// Destination table.
    pub name: String,
    /// Column descriptors.
    pub columns: Vec<DataColumn>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    /// Empty buffer for `columns`.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<DataColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }
}

/// Bulk copy behavior flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CopyOptions {
    /// Preserve source identity values.
    pub keep_identity: bool,
    /// Check constraints while copying.
    pub check_constraints: bool,
    /// Take a table lock for the duration of the copy.
    pub table_lock: bool,
    /// Keep NULLs instead of applying column defaults.
    pub keep_nulls: bool,
    /// Fire insert triggers.
    pub fire_triggers: bool,
}

/// Progress callback, invoked with the number of rows copied so far.
pub type RowsCopied = Arc<dyn Fn(u64) + Send + Sync>;

/// Bulk copy settings.
#[derive(Clone)]
pub struct BulkCopy {
    /// Destination table.
    pub destination: String,
    /// Behavior flags.
    pub options: CopyOptions,
    /// Upper bound on the copy.
    pub timeout: Duration,
    /// Rows per batch.
    pub batch_size: usize,
    /// Rows between progress notifications.
    pub notify_after: usize,
    /// Stream rows instead of buffering them.
    pub enable_streaming: bool,
    /// Progress callback.
    pub on_rows_copied: Option<RowsCopied>,
}

impl BulkCopy {
    /// Report progress to the callback, if any.
    pub fn notify(&self, rows: u64) {
        if let Some(callback) = &self.on_rows_copied {
            callback(rows);
        }
    }
}

impl Debug for BulkCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkCopy")
            .field("destination", &self.destination)
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("batch_size", &self.batch_size)
            .field("notify_after", &self.notify_after)
            .field("enable_streaming", &self.enable_streaming)
            .finish_non_exhaustive()
    }
}

/// Executes statements against a database, either directly on a connection or inside a
/// transaction.
pub trait Executor: Debug + Send + Sync {
    /// Dialect spoken by the underlying connection.
    fn dialect(&self) -> Dialect;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, command: Command) -> FutureResult<u64>;

    /// Execute a query and return the resulting rows.
    fn query(&self, command: Command) -> FutureResult<Vec<Row>>;

    /// Stream `table` into `settings.destination` and return the number of rows copied.
    fn bulk_copy(&self, settings: BulkCopy, table: DataTable) -> FutureResult<u64>;
}

/// An open transaction. Consumed by [`commit`](Self::commit) or [`rollback`](Self::rollback).
pub trait Transaction: Executor {
    /// Commit the transaction.
    fn commit(self: Box<Self>) -> FutureResult<()>;

    /// Roll the transaction back.
    fn rollback(self: Box<Self>) -> FutureResult<()>;
}

/// A database connection.
pub trait Connection: Executor {
    /// Open the connection. Opening an open connection is a no-op.
    fn open(&self) -> FutureResult<()>;

    /// Close the connection.
    fn close(&self) -> FutureResult<()>;

    /// Begin a transaction.
    fn begin(&self) -> FutureResult<Box<dyn Transaction>>;
}
