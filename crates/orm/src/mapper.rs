//! CRUD operations against a data-access executor.

use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

use sea_query::Value;
use tracing::instrument;

use crate::catalog::Catalog;
use crate::config::MapperOptions;
use crate::connection::{Command, Executor, Row};
use crate::crud::QueryCompiler;
use crate::dialect::DialectRegistry;
use crate::entity::{Entity, Mapped, is_null};
use crate::error::{Error, Result};
use crate::filter::Filter;

/// Runs compiled CRUD statements for entity types.
///
/// Cheap to clone; clones share the catalog, the registry and the statement caches.
///
/// ```ignore
/// let mapper = Mapper::new(Arc::new(Catalog::default()));
///
/// let mut product = Product { id: 0, name: "Widget".into(), price: 9.5 };
/// mapper.insert(&conn, &mut product).await?;
/// assert!(product.id > 0);
///
/// let cheap = mapper.select_where(&conn, Filter::lt("price", 10.0)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Mapper {
    compiler: Arc<QueryCompiler>,
    options: MapperOptions,
}

impl Mapper {
    /// Mapper over `catalog` with the built-in dialects.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let registry = Arc::new(DialectRegistry::new(catalog.log().clone()));
        Self::with_registry(catalog, registry)
    }

    /// Mapper over `catalog` using the builders of `registry`.
    #[must_use]
    pub fn with_registry(catalog: Arc<Catalog>, registry: Arc<DialectRegistry>) -> Self {
        Self {
            compiler: Arc::new(QueryCompiler::new(catalog, registry)),
            options: MapperOptions::default(),
        }
    }

    /// Apply `options` to every statement.
    #[must_use]
    pub const fn options(mut self, options: MapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Copy of this mapper whose statements are bounded by `timeout`. The caches are shared.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            compiler: Arc::clone(&self.compiler),
            options: MapperOptions {
                command_timeout_secs: timeout.as_secs().max(1),
            },
        }
    }

    /// Metadata catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.compiler.catalog()
    }

    /// Dialect registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DialectRegistry> {
        self.compiler.registry()
    }

    /// Statement compiler.
    #[must_use]
    pub const fn compiler(&self) -> &Arc<QueryCompiler> {
        &self.compiler
    }

    /// Insert `entity` and return the generated key. An identity key is written back into
    /// `entity`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved, a conversion error when
    /// the generated key does not fit the key member, or the data-access error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn insert<T: Entity>(&self, db: &dyn Executor, entity: &mut T) -> Result<Value> {
        let statement = self.compiler.insert::<T>(&db.dialect())?;
        self.log_query::<T>("insert", &statement.sql);

        let command = statement.bind(&*entity).timeout(self.timeout());
        let rows = db.query(command).await?;
        let id = scalar(&rows).unwrap_or(Value::BigInt(None));

        let key = self.catalog().key_property::<T>()?;
        if key.is_identity && !is_null(&id) {
            key.property.set(entity, id.clone()).map_err(|e| Error::Conversion {
                member: key.property.key().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(id)
    }

    /// Insert every entity of `entities` and return the number of affected rows. Generated
    /// keys are not written back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the dialect has no list insert, a configuration
    /// error when the key cannot be resolved, or the data-access error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name(), count = entities.len()))]
    pub async fn insert_all<T: Entity>(&self, db: &dyn Executor, entities: &[T]) -> Result<u64> {
        let statement = self.compiler.insert_many::<T>(&db.dialect())?;
        self.log_query::<T>("insert_all", &statement.sql);

        let mut affected = 0;
        for entity in entities {
            let command = statement.bind(entity).timeout(self.timeout());
            affected += db.execute(command).await?;
        }
        Ok(affected)
    }

    /// Update every non-key member of `entity`, matched by key. Returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved, or the data-access error
    /// unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn update<T: Entity>(&self, db: &dyn Executor, entity: &T) -> Result<bool> {
        let statement = self.compiler.update::<T>()?;
        self.log_query::<T>("update", &statement.sql);

        let command = statement.bind(entity).timeout(self.timeout());
        Ok(db.execute(command).await? > 0)
    }

    /// Delete `entity`, matched by key. Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved, or the data-access error
    /// unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn delete<T: Entity>(&self, db: &dyn Executor, entity: &T) -> Result<bool> {
        let statement = self.compiler.delete::<T>()?;
        self.log_query::<T>("delete", &statement.sql);

        let command = statement.bind(entity).timeout(self.timeout());
        Ok(db.execute(command).await? > 0)
    }

    /// Delete the rows matching `filter` and return how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] for an unmapped filter member, or the data-access
    /// error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn delete_where<T: Entity>(&self, db: &dyn Executor, filter: Filter) -> Result<u64> {
        let command = self.compiler.delete_where::<T>(filter)?;
        self.log_query::<T>("delete_where", &command.sql);
        Ok(db.execute(command.timeout(self.timeout())).await?)
    }

    /// Delete every row and return how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns the data-access error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn delete_all<T: Entity>(&self, db: &dyn Executor) -> Result<u64> {
        let sql = self.compiler.delete_all::<T>();
        self.log_query::<T>("delete_all", &sql);
        Ok(db.execute(Command::new(sql.as_ref()).timeout(self.timeout())).await?)
    }

    /// Every row of the table.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when a column does not fit its member, or the data-access
    /// error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn select_all<T: Entity + Default>(&self, db: &dyn Executor) -> Result<Vec<T>> {
        let command = self.compiler.select::<T>(None)?;
        self.fetch("select_all", db, command).await
    }

    /// Rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] for an unmapped filter member, a conversion error
    /// when a column does not fit its member, or the data-access error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn select_where<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Filter,
    ) -> Result<Vec<T>> {
        let command = self.compiler.select::<T>(Some(filter))?;
        self.fetch("select_where", db, command).await
    }

    /// First row matching `filter`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] for an unmapped filter member, a conversion error
    /// when a column does not fit its member, or the data-access error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn first_or_default<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Filter,
    ) -> Result<Option<T>> {
        let command = self.compiler.select::<T>(Some(filter))?;
        self.log_query::<T>("first_or_default", &command.sql);

        let rows = db.query(command.timeout(self.timeout())).await?;
        rows.first().map(|row| self.catalog().hydrate::<T>(row)).transpose()
    }

    /// One page of rows ordered by key, optionally restricted by `filter`. Pages are 1-based;
    /// pages below 1 return the first page.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved, a conversion error
    /// when a column does not fit its member, or the data-access error unchanged.
    #[instrument(skip(self, db, filter), fields(entity = T::entity_info().name()))]
    pub async fn select_paged<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Option<Filter>, page_number: i64, page_size: i64,
    ) -> Result<Vec<T>> {
        let command =
            self.compiler.select_paged::<T>(&db.dialect(), filter, page_number, page_size)?;
        self.fetch("select_paged", db, command).await
    }

    /// Number of rows, optionally restricted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] for an unmapped filter member, or the data-access
    /// error unchanged.
    #[instrument(skip_all, fields(entity = T::entity_info().name()))]
    pub async fn count<T: Entity>(&self, db: &dyn Executor, filter: Option<Filter>) -> Result<i64> {
        let command = self.compiler.count::<T>(filter)?;
        self.log_query::<T>("count", &command.sql);

        let rows = db.query(command.timeout(self.timeout())).await?;
        let Some(count) = scalar(&rows) else {
            return Ok(0);
        };
        i64::from_value(count).map_err(|e| Error::Conversion {
            member: format!("{}.count", type_name::<T>()),
            reason: e.to_string(),
        })
    }

    async fn fetch<T: Entity + Default>(
        &self, method: &str, db: &dyn Executor, command: Command,
    ) -> Result<Vec<T>> {
        self.log_query::<T>(method, &command.sql);

        let rows = db.query(command.timeout(self.timeout())).await?;
        rows.iter().map(|row| self.catalog().hydrate::<T>(row)).collect()
    }

    fn log_query<T: Entity>(&self, method: &str, sql: &str) {
        self.catalog().log().emit(&format!("{method}<{}>: {sql}", T::entity_info().name()));
    }

    const fn timeout(&self) -> Option<Duration> {
        self.options.command_timeout()
    }
}

/// First column of the first row.
fn scalar(rows: &[Row]) -> Option<Value> {
    rows.first().and_then(Row::first).cloned()
}
