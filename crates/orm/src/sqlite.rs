//! Default `SQLite` implementation of the data-access traits.
//!
//! This is a lightweight implementation for development and tests only. Statements bind
//! `@name` parameters by name; parameters the statement does not reference are ignored.
//! Bulk copies are plain inserts inside the caller's transaction.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;

use anyhow::{Context, Result};
use fromenv::FromEnv;
use futures::FutureExt;
use rusqlite::Connection as SqliteConnection;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use sea_query::Value;
use tracing::instrument;

use crate::connection::{
    BulkCopy, Command, Connection, DataTable, Executor, Field, FutureResult, Param, Row,
    Transaction,
};
use crate::dialect::Dialect;

/// Options used to open the `SQLite` database.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path, or `:memory:`.
    #[env(from = "TABLEMAP_SQLITE_DATABASE", default = ":memory:")]
    pub database: String,
}

impl ConnectOptions {
    /// Load options from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// `SQLite` connection speaking [`Dialect::Sqlite`].
#[derive(Debug, Clone)]
pub struct SqliteDb {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<SqliteConnection>>,
}

impl SqliteDb {
    /// Open the database named by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    #[instrument]
    pub fn connect_with(options: &ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = SqliteConnection::open(&options.database).context("failed to open SQLite database")?;
        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        Self::connect_with(&ConnectOptions {
            database: ":memory:".to_string(),
        })
    }

    fn batch(&self, sql: &'static str) -> FutureResult<()> {
        let conn = Arc::clone(&self.conn);
        async move {
            conn.lock().execute_batch(sql).with_context(|| format!("failed to run {sql}"))
        }
        .boxed()
    }
}

impl Executor for SqliteDb {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, command: Command) -> FutureResult<u64> {
        tracing::debug!("executing statement: {}", command.sql);
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let mut affected = 0;
            for sql in statements(&command.sql) {
                let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
                bind(&mut stmt, &command.params)?;
                affected = stmt.raw_execute().context("failed to execute statement")?;
            }
            Ok(affected as u64)
        }
        .boxed()
    }

    fn query(&self, command: Command) -> FutureResult<Vec<Row>> {
        tracing::debug!("executing query: {}", command.sql);
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let statements = statements(&command.sql);
            let Some((last, leading)) = statements.split_last() else {
                return Ok(Vec::new());
            };

            for sql in leading {
                let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
                bind(&mut stmt, &command.params)?;
                stmt.raw_execute().context("failed to execute statement")?;
            }

            let mut stmt = conn.prepare(last).context("failed to prepare statement")?;
            bind(&mut stmt, &command.params)?;
            let column_names: Vec<String> =
                stmt.column_names().iter().map(ToString::to_string).collect();

            let mut rows = stmt.raw_query();
            let mut result_rows = Vec::new();
            while let Some(row) = rows.next().context("failed to fetch row")? {
                let mut fields = Vec::with_capacity(column_names.len());
                for (i, name) in column_names.iter().enumerate() {
                    let value = row.get_ref(i).context("failed to get column value")?;
                    fields.push(Field {
                        name: name.clone(),
                        value: from_sqlite(value)?,
                    });
                }
                result_rows.push(Row { fields });
            }

            Ok(result_rows)
        }
        .boxed()
    }

    fn bulk_copy(&self, settings: BulkCopy, table: DataTable) -> FutureResult<u64> {
        tracing::debug!("copying {} rows into {}", table.rows.len(), settings.destination);
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "insert into {} ({}) values ({placeholders})",
                settings.destination,
                columns.join(", ")
            );
            let mut stmt = conn.prepare(&sql).context("failed to prepare bulk insert")?;

            let mut copied = 0_u64;
            for row in &table.rows {
                let values: Vec<SqliteValue> = row.iter().map(to_sqlite).collect();
                stmt.execute(rusqlite::params_from_iter(values.iter()))
                    .context("failed to copy row")?;
                copied += 1;

                if settings.notify_after > 0 && copied % settings.notify_after as u64 == 0 {
                    settings.notify(copied);
                }
            }

            Ok(copied)
        }
        .boxed()
    }
}

impl Connection for SqliteDb {
    fn open(&self) -> FutureResult<()> {
        async { Ok(()) }.boxed()
    }

    fn close(&self) -> FutureResult<()> {
        async { Ok(()) }.boxed()
    }

    fn begin(&self) -> FutureResult<Box<dyn Transaction>> {
        tracing::debug!("beginning transaction");
        let db = self.clone();

        async move {
            db.batch("BEGIN").await?;
            Ok(Box::new(SqliteTransaction { db }) as Box<dyn Transaction>)
        }
        .boxed()
    }
}

/// An open `SQLite` transaction.
#[derive(Debug)]
pub struct SqliteTransaction {
    db: SqliteDb,
}

impl Executor for SqliteTransaction {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, command: Command) -> FutureResult<u64> {
        self.db.execute(command)
    }

    fn query(&self, command: Command) -> FutureResult<Vec<Row>> {
        self.db.query(command)
    }

    fn bulk_copy(&self, settings: BulkCopy, table: DataTable) -> FutureResult<u64> {
        self.db.bulk_copy(settings, table)
    }
}

impl Transaction for SqliteTransaction {
    fn commit(self: Box<Self>) -> FutureResult<()> {
        self.db.batch("COMMIT")
    }

    fn rollback(self: Box<Self>) -> FutureResult<()> {
        self.db.batch("ROLLBACK")
    }
}

// Generated inserts append `; select last_insert_rowid() id`; statements run one at a time.
fn statements(sql: &str) -> Vec<&str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &[Param]) -> Result<()> {
    for param in params {
        let Some(index) = stmt
            .parameter_index(&format!("@{}", param.name))
            .context("invalid parameter name")?
        else {
            continue;
        };
        stmt.raw_bind_parameter(index, to_sqlite(&param.value))
            .with_context(|| format!("failed to bind @{}", param.name))?;
    }
    Ok(())
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Bool(Some(b)) => SqliteValue::Integer(i64::from(*b)),
        Value::TinyInt(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::SmallInt(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::Int(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::BigInt(Some(i)) => SqliteValue::Integer(*i),
        Value::TinyUnsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::Unsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => SqliteValue::Integer(*u as i64),
        Value::Float(Some(f)) => SqliteValue::Real(f64::from(*f)),
        Value::Double(Some(f)) => SqliteValue::Real(*f),
        Value::Char(Some(c)) => SqliteValue::Text(c.to_string()),
        Value::String(Some(s)) => SqliteValue::Text(s.to_string()),
        Value::Bytes(Some(b)) => SqliteValue::Blob(b.to_vec()),
        Value::Uuid(Some(id)) => SqliteValue::Text(id.to_string()),
        Value::Decimal(Some(d)) => SqliteValue::Text(d.to_string()),
        Value::Json(Some(json)) => SqliteValue::Text(json.to_string()),
        Value::ChronoDate(Some(d)) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::ChronoTime(Some(t)) => SqliteValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::ChronoDateTime(Some(dt)) => {
            SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        Value::ChronoDateTimeUtc(Some(dt)) => SqliteValue::Text(dt.to_rfc3339()),
        Value::ChronoDateTimeLocal(Some(dt)) => SqliteValue::Text(dt.to_rfc3339()),
        Value::ChronoDateTimeWithTimeZone(Some(dt)) => SqliteValue::Text(dt.to_rfc3339()),
        // All None variants map to NULL
        _ => SqliteValue::Null,
    }
}

fn from_sqlite(value: ValueRef) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::String(None)),
        ValueRef::Integer(i) => Ok(Value::BigInt(Some(i))),
        ValueRef::Real(f) => Ok(Value::Double(Some(f))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Value::from(s.to_string()))
        }
        ValueRef::Blob(b) => Ok(Value::from(b.to_vec())),
    }
}
