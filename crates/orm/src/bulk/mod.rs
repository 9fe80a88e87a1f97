//! Bulk synchronization.
//!
//! Every operation runs the same sequence inside one transaction:
//!
//! 1. stage: shred the input into a [`DataTable`], create a session temporary table shaped
//!    like the destination and bulk-copy the buffer into it;
//! 2. reconcile: run one `MERGE` joining the temporary table to the destination on the key
//!    column, dropping the temporary table as its final action;
//! 3. correlate (upserts with identity output): read generated identities back from an
//!    output table and assign them to the originating instances by input index;
//! 4. cleanup: commit, or roll back and drop leftover temporary tables; close the
//!    connection.
//!
//! The `MERGE` paths need SQL Server. Plain bulk inserts copy straight into the destination
//! and work with any connection that implements
//! [`Executor::bulk_copy`](crate::Executor::bulk_copy).

mod metadata;
mod shred;

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::instrument;

pub use self::metadata::{BulkMetadata, ROW_SEQ, sql_type};
pub use self::shred::{PendingIdentities, Shape, shred};
use crate::catalog::Catalog;
use crate::config::BulkOptions;
use crate::connection::{BulkCopy, Command, Connection, CopyOptions, DataTable, Transaction};
use crate::dialect::Dialect;
use crate::entity::{Entity, Mapped, is_null};
use crate::error::{Error, Result};

/// Optional upsert behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Upsert {
    /// Delete destination rows that have no staged counterpart.
    pub prune: bool,
    /// Write server-generated identities back into the inserted instances.
    pub output_identity: bool,
}

/// Bulk insert, update, delete and upsert of entity sequences.
#[derive(Debug, Clone)]
pub struct BulkEngine {
    catalog: Arc<Catalog>,
    options: BulkOptions,
    metadata: Arc<DashMap<(TypeId, bool), Arc<BulkMetadata>>>,
}

impl BulkEngine {
    /// Engine resolving metadata through `catalog`, with default copy options.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            options: BulkOptions::default(),
            metadata: Arc::new(DashMap::new()),
        }
    }

    /// Use `options` for copies and reconciliation statements.
    #[must_use]
    pub const fn options(mut self, options: BulkOptions) -> Self {
        self.options = options;
        self
    }

    /// Metadata catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Bulk metadata of `T`, with or without the correlation column.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved or a member is not
    /// primitive-shaped.
    pub fn metadata<T: Entity>(&self, correlated: bool) -> Result<Arc<BulkMetadata>> {
        let entity = T::entity_info();
        let cache_key = (entity.type_id(), correlated);
        if let Some(metadata) = self.metadata.get(&cache_key) {
            return Ok(Arc::clone(metadata.value()));
        }

        let metadata = Arc::new(BulkMetadata::resolve(&self.catalog, entity, correlated)?);
        let metadata = Arc::clone(self.metadata.entry(cache_key).or_insert(metadata).value());

        self.catalog.log().emit(&format!(
            "Resolved bulk metadata '{}' (staging: {}, correlated: {correlated}) for '{}'",
            metadata.destination(),
            metadata.staging(),
            entity.type_name()
        ));
        Ok(metadata)
    }

    /// Copy `entities` straight into the destination table and return the number of rows
    /// copied. A server-generated key is left to the server unless
    /// [`BulkOptions::keep_identity`] is set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the metadata cannot be resolved, or the
    /// data-access error unchanged after rolling back.
    #[instrument(skip_all, fields(entity = T::entity_info().name(), count = entities.len()))]
    pub async fn bulk_insert<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }

        let metadata = self.metadata::<T>(false)?;
        let shape = if self.options.keep_identity { Shape::Full } else { Shape::WithoutIdentity };
        let table = shred(&metadata, entities, metadata.destination(), shape)?;

        let tx = self.begin(conn, transaction).await?;
        let outcome = self.copy::<T>(&*tx, table).await;
        self.finish(conn, tx, outcome, &[]).await
    }

    /// Update the destination rows matching `entities` by key and return the number of rows
    /// affected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for dialects without `MERGE`, a configuration error
    /// when the metadata cannot be resolved, or the data-access error unchanged after rolling
    /// back.
    #[instrument(skip_all, fields(entity = T::entity_info().name(), count = entities.len()))]
    pub async fn bulk_update<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        require_merge(conn, "bulk update")?;

        let metadata = self.metadata::<T>(false)?;
        if !metadata.has_updatable_columns() {
            return Err(Error::Unsupported {
                dialect: conn.dialect().to_string(),
                operation: "bulk update without updatable columns",
            });
        }
        let table = shred(&metadata, entities, metadata.staging(), Shape::Full)?;

        let tx = self.begin(conn, transaction).await?;
        let outcome = self.reconcile::<T>(&*tx, &metadata, table, metadata.update_merge()).await;
        self.finish(conn, tx, outcome, &[metadata.staging()]).await
    }

    /// Delete the destination rows matching `entities` by key and return the number of rows
    /// deleted. Only the key of each instance is staged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for dialects without `MERGE`, a configuration error
    /// when the metadata cannot be resolved, or the data-access error unchanged after rolling
    /// back.
    #[instrument(skip_all, fields(entity = T::entity_info().name(), count = entities.len()))]
    pub async fn bulk_delete<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        require_merge(conn, "bulk delete")?;

        let metadata = self.metadata::<T>(false)?;
        let table = shred(&metadata, entities, metadata.staging(), Shape::KeyOnly)?;

        let tx = self.begin(conn, transaction).await?;
        let outcome = self.reconcile::<T>(&*tx, &metadata, table, metadata.delete_merge()).await;
        self.finish(conn, tx, outcome, &[metadata.staging()]).await
    }

    /// Update matching destination rows and insert the rest, returning the number of rows
    /// affected. With [`Upsert::output_identity`] and a server-generated key, the generated
    /// identities are written back into `entities`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for dialects without `MERGE`, a configuration error
    /// when the metadata cannot be resolved, a conversion error when a generated identity
    /// does not fit the key member, or the data-access error unchanged after rolling back.
    #[instrument(skip_all, fields(entity = T::entity_info().name(), count = entities.len()))]
    pub async fn bulk_upsert<T: Entity>(
        &self, conn: &dyn Connection, entities: &mut [T], transaction: Option<Box<dyn Transaction>>,
        upsert: Upsert,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        require_merge(conn, "bulk upsert")?;

        let key = self.catalog.key_property::<T>()?;
        let correlated = upsert.output_identity && key.is_identity;
        let metadata = self.metadata::<T>(correlated)?;
        let table = shred(&metadata, entities, metadata.staging(), Shape::Full)?;

        let output = metadata.output();
        let merge = upsert_statement(&metadata, upsert.prune);
        let mut pending = PendingIdentities::new(entities);

        let tx = self.begin(conn, transaction).await?;
        let outcome = self.upsert_in(&*tx, &metadata, table, &merge, &mut pending).await;
        self.finish(conn, tx, outcome, &[metadata.staging(), output.as_str()]).await
    }

    async fn upsert_in<T: Entity>(
        &self, tx: &dyn Transaction, metadata: &BulkMetadata, table: DataTable, merge: &str,
        pending: &mut PendingIdentities<'_, T>,
    ) -> Result<u64> {
        let affected = self.reconcile::<T>(tx, metadata, table, merge).await?;
        if metadata.is_correlated() {
            self.correlate(tx, metadata, pending).await?;
        }
        Ok(affected)
    }

    async fn begin(
        &self, conn: &dyn Connection, transaction: Option<Box<dyn Transaction>>,
    ) -> Result<Box<dyn Transaction>> {
        if let Err(e) = conn.open().await {
            close(conn).await;
            return Err(Error::from(e));
        }
        if let Some(tx) = transaction {
            return Ok(tx);
        }
        match conn.begin().await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                close(conn).await;
                Err(Error::from(e))
            }
        }
    }

    async fn finish(
        &self, conn: &dyn Connection, tx: Box<dyn Transaction>, outcome: Result<u64>,
        temporary: &[&str],
    ) -> Result<u64> {
        let result = match outcome {
            Ok(affected) => tx.commit().await.map(|()| affected).map_err(Error::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("rollback failed: {rollback:#}");
                }
                for table in temporary {
                    let drop = format!(
                        "IF OBJECT_ID('tempdb..{table}') IS NOT NULL DROP TABLE {table};"
                    );
                    if let Err(cleanup) = conn.execute(Command::new(drop)).await {
                        tracing::warn!("failed to drop {table}: {cleanup:#}");
                    }
                }
                Err(e)
            }
        };

        close(conn).await;
        result
    }

    async fn reconcile<T: Entity>(
        &self, tx: &dyn Transaction, metadata: &BulkMetadata, table: DataTable, merge: &str,
    ) -> Result<u64> {
        self.create_staging(tx, metadata).await?;
        self.copy::<T>(tx, table).await?;

        self.catalog.log().emit(&format!("merge<{}>: {merge}", T::entity_info().name()));
        Ok(tx.execute(self.command(merge)).await?)
    }

    async fn create_staging(&self, tx: &dyn Transaction, metadata: &BulkMetadata) -> Result<()> {
        let sql = match metadata.create_staging() {
            Some(sql) => sql.to_string(),
            None => {
                let rows = tx.query(self.command(&metadata.discovery_query())).await?;
                let discovered = rows
                    .first()
                    .and_then(|row| row.first())
                    .filter(|value| !is_null(value))
                    .and_then(|value| String::from_value(value.clone()).ok())
                    .filter(|sql| !sql.trim().is_empty());
                let sql = discovered.unwrap_or_else(|| metadata.synthesized_staging());
                metadata.set_create_staging(sql).to_string()
            }
        };

        tracing::debug!(staging = metadata.staging(), sql = %sql, "creating staging table");
        tx.execute(self.command(&sql)).await?;
        Ok(())
    }

    async fn copy<T: Entity>(&self, tx: &dyn Transaction, table: DataTable) -> Result<u64> {
        let log = self.catalog.log().clone();
        let settings = BulkCopy {
            destination: table.name.clone(),
            options: CopyOptions {
                keep_identity: self.options.keep_identity,
                check_constraints: self.options.check_constraints,
                table_lock: self.options.table_lock,
                keep_nulls: self.options.keep_nulls,
                fire_triggers: self.options.fire_triggers,
            },
            timeout: self.options.timeout(),
            batch_size: self.options.batch_size,
            notify_after: self.options.notify_after,
            enable_streaming: self.options.enable_streaming,
            on_rows_copied: Some(Arc::new(move |rows: u64| {
                log.emit(&format!("Inserted {rows} records."));
            })),
        };

        tracing::debug!(
            entity = T::entity_info().name(),
            destination = %settings.destination,
            rows = table.rows.len(),
            "bulk copy"
        );
        Ok(tx.bulk_copy(settings, table).await?)
    }

    async fn correlate<T: Entity>(
        &self, tx: &dyn Transaction, metadata: &BulkMetadata, pending: &mut PendingIdentities<'_, T>,
    ) -> Result<()> {
        let output = metadata.output();
        let key = &metadata.key_column().name;
        let rows = tx
            .query(self.command(&format!("SELECT [{ROW_SEQ}], [{key}] FROM {output};")))
            .await?;

        let mut applied = 0_usize;
        for row in rows {
            let mut fields = row.fields.into_iter();
            let (Some(seq), Some(identity)) = (fields.next(), fields.next()) else {
                continue;
            };
            if pending.apply(metadata, seq.value, identity.value)? {
                applied += 1;
            }
        }
        tracing::debug!(applied, pending = pending.len(), "correlated identities");

        tx.execute(self.command(&format!("DROP TABLE {output};"))).await?;
        Ok(())
    }

    fn command(&self, sql: &str) -> Command {
        Command::new(sql).timeout(Some(self.options.timeout()))
    }
}

async fn close(conn: &dyn Connection) {
    if let Err(e) = conn.close().await {
        tracing::warn!("failed to close connection: {e:#}");
    }
}

fn require_merge(conn: &dyn Connection, operation: &'static str) -> Result<()> {
    match conn.dialect() {
        Dialect::SqlServer => Ok(()),
        other => Err(Error::Unsupported {
            dialect: other.to_string(),
            operation,
        }),
    }
}

/// Upsert batch: optional output table, the memoized merge, optional clauses, terminator.
fn upsert_statement(metadata: &BulkMetadata, prune: bool) -> String {
    let key = &metadata.key_column().name;
    let output = metadata.output();
    let correlated = metadata.is_correlated();

    let mut sql = String::new();
    if correlated {
        sql.push_str(&format!(
            "CREATE TABLE {output}([{ROW_SEQ}] int, [{key}] {}); ",
            sql_type(metadata.key_column().kind)
        ));
    }
    sql.push_str(metadata.upsert_merge());
    if prune {
        sql.push_str(" WHEN NOT MATCHED BY SOURCE THEN DELETE");
    }
    if correlated {
        sql.push_str(&format!(
            " OUTPUT Source.[{ROW_SEQ}], INSERTED.[{key}] INTO {output}([{ROW_SEQ}], [{key}])"
        ));
    }
    sql.push_str(&format!("; DROP TABLE {};", metadata.staging()));
    sql
}
