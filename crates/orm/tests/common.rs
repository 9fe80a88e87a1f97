//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use parking_lot::Mutex;
use tablemap_orm::{
    BulkCopy, Command, Connection, DataTable, Dialect, Entity, Executor, Field, FutureResult,
    Mapped, Row, Transaction, Value,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

// Common test entities used across multiple test files

#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub price: f64,
    #[orm(column = "CategoryId")]
    pub category_id: Option<i32>,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Default, Entity)]
pub struct Customer {
    pub id: i32,
    pub name: String,
    #[orm(foreign_key = "buyer")]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "tblOrder", schema = "dbo")]
pub struct Order {
    #[orm(key)]
    pub order_number: String,
    pub buyer: i32,
    #[orm(foreign_key = "buyer")]
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Default, Entity)]
pub struct Shipment {
    pub id: i32,
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Default, Entity)]
#[orm(interface)]
pub struct IAnimal {
    pub id: i32,
}

#[derive(Debug, Clone, Default, Entity)]
pub struct Note {
    pub text: String,
}

#[derive(Debug, Clone, Default, Entity)]
pub struct Pair {
    pub id: i32,
    #[orm(key)]
    pub code: i32,
}

#[derive(Debug, Clone, Default, Entity)]
pub struct Document {
    pub id: i32,
    pub body: serde_json::Value,
    #[orm(skip)]
    pub scratch: Vec<String>,
}

/// Route engine spans to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = Registry::default()
        .with(EnvFilter::new("tablemap_orm=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

pub fn product(id: i32, name: &str, price: f64) -> Product {
    Product {
        id,
        name: name.to_string(),
        price,
        ..Product::default()
    }
}

/// Assert that `sql` contains each of `fragments`.
pub fn assert_sql_contains(sql: &str, fragments: &[&str]) {
    for fragment in fragments {
        assert!(sql.contains(fragment), "expected SQL to contain {fragment:?}\n  sql: {sql}");
    }
}

/// Diagnostic messages collected from a catalog log callback.
#[derive(Debug, Clone, Default)]
pub struct Messages(Arc<Mutex<Vec<String>>>);

impl Messages {
    pub fn sink(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let messages = Arc::clone(&self.0);
        move |message| messages.lock().push(message.to_string())
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.0.lock().iter().filter(|m| m.contains(needle)).count()
    }
}

/// What the fake server has seen, and what it will answer.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Every statement executed or queried, in order.
    pub statements: Vec<String>,
    /// Connection and transaction lifecycle calls, in order.
    pub events: Vec<String>,
    /// Every buffer handed to the bulk copy primitive.
    pub copies: Vec<DataTable>,
    /// Keys present in the destination table.
    pub existing: BTreeSet<i64>,
    /// Result of the staging discovery query; `None` yields no rows.
    pub discovered_staging: Option<String>,
    /// `(__row_seq, id)` pairs returned from the identity output table. Rows deleted by a
    /// pruning merge come back as `(None, None)`.
    pub identities: Vec<(Option<i32>, Option<i64>)>,
    /// Fail any statement containing this fragment.
    pub fail_on: Option<&'static str>,
    staged: Vec<i64>,
}

/// In-memory stand-in for a SQL Server connection.
///
/// Tracks destination keys so that `MERGE` statements report realistic row counts.
#[derive(Debug, Clone)]
pub struct FakeServer {
    dialect: Dialect,
    state: Arc<Mutex<ServerState>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::with_dialect(Dialect::SqlServer)
    }
}

impl FakeServer {
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, ServerState> {
        self.state.lock()
    }

    pub fn statements_starting(&self, prefix: &str) -> Vec<String> {
        self.state().statements.iter().filter(|s| s.starts_with(prefix)).cloned().collect()
    }

    fn record(&self, sql: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());
        match state.fail_on {
            Some(fragment) if sql.contains(fragment) => Err(anyhow!("simulated failure: {fragment}")),
            _ => Ok(()),
        }
    }

    fn run(&self, sql: &str) -> anyhow::Result<u64> {
        self.record(sql)?;

        let mut state = self.state.lock();
        let staged = std::mem::take(&mut state.staged);
        if sql.contains("WHEN MATCHED THEN DELETE") {
            let removed = staged.iter().filter(|key| state.existing.remove(key)).count();
            return Ok(removed as u64);
        }
        if sql.contains("MERGE INTO") {
            let matched = staged.iter().filter(|key| state.existing.contains(key)).count();
            if sql.contains("WHEN NOT MATCHED BY TARGET") {
                let mut affected = staged.len();
                if sql.contains("WHEN NOT MATCHED BY SOURCE THEN DELETE") {
                    let before = state.existing.len();
                    state.existing.retain(|key| staged.contains(key));
                    affected += before - state.existing.len();
                }
                state.existing.extend(staged.iter().filter(|key| **key != 0));
                return Ok(affected as u64);
            }
            return Ok(matched as u64);
        }
        state.staged = staged;
        Ok(0)
    }
}

impl Executor for FakeServer {
    fn dialect(&self) -> Dialect {
        self.dialect.clone()
    }

    fn execute(&self, command: Command) -> FutureResult<u64> {
        let server = self.clone();
        async move { server.run(&command.sql) }.boxed()
    }

    fn query(&self, command: Command) -> FutureResult<Vec<Row>> {
        let server = self.clone();
        async move {
            server.record(&command.sql)?;
            let state = server.state.lock();

            if command.sql.starts_with("SELECT N'CREATE TABLE") {
                let rows = state.discovered_staging.iter().map(|sql| Row {
                    fields: vec![Field {
                        name: String::new(),
                        value: Value::from(sql.clone()),
                    }],
                });
                return Ok(rows.collect());
            }
            if command.sql.starts_with("SELECT [__row_seq]") {
                let rows = state.identities.iter().map(|(seq, id)| Row {
                    fields: vec![
                        Field {
                            name: "__row_seq".to_string(),
                            value: Value::Int(*seq),
                        },
                        Field {
                            name: "id".to_string(),
                            value: Value::BigInt(*id),
                        },
                    ],
                });
                return Ok(rows.collect());
            }
            Ok(Vec::new())
        }
        .boxed()
    }

    fn bulk_copy(&self, settings: BulkCopy, table: DataTable) -> FutureResult<u64> {
        let server = self.clone();
        async move {
            server.record(&format!("bulk copy into {}", settings.destination))?;

            let mut state = server.state.lock();
            if let Some(index) = table.columns.iter().position(|c| c.name == "id") {
                let keys = table.rows.iter().map(|row| i64::from_value(row[index].clone()).unwrap_or(0));
                state.staged = keys.collect();
            }
            let copied = table.rows.len() as u64;
            state.copies.push(table);
            drop(state);

            settings.notify(copied);
            Ok(copied)
        }
        .boxed()
    }
}

impl Connection for FakeServer {
    fn open(&self) -> FutureResult<()> {
        self.state.lock().events.push("open".to_string());
        async { Ok(()) }.boxed()
    }

    fn close(&self) -> FutureResult<()> {
        self.state.lock().events.push("close".to_string());
        async { Ok(()) }.boxed()
    }

    fn begin(&self) -> FutureResult<Box<dyn Transaction>> {
        self.state.lock().events.push("begin".to_string());
        let server = self.clone();
        async move { Ok(Box::new(FakeTransaction { server }) as Box<dyn Transaction>) }.boxed()
    }
}

#[derive(Debug)]
pub struct FakeTransaction {
    server: FakeServer,
}

impl Executor for FakeTransaction {
    fn dialect(&self) -> Dialect {
        self.server.dialect()
    }

    fn execute(&self, command: Command) -> FutureResult<u64> {
        self.server.execute(command)
    }

    fn query(&self, command: Command) -> FutureResult<Vec<Row>> {
        self.server.query(command)
    }

    fn bulk_copy(&self, settings: BulkCopy, table: DataTable) -> FutureResult<u64> {
        self.server.bulk_copy(settings, table)
    }
}

impl Transaction for FakeTransaction {
    fn commit(self: Box<Self>) -> FutureResult<()> {
        self.server.state.lock().events.push("commit".to_string());
        async { Ok(()) }.boxed()
    }

    fn rollback(self: Box<Self>) -> FutureResult<()> {
        self.server.state.lock().events.push("rollback".to_string());
        async { Ok(()) }.boxed()
    }
}
