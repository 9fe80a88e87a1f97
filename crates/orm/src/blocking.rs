//! Synchronous variants of [`crate::Mapper`] and [`crate::BulkEngine`].
//!
//! Each call drives the asynchronous operation to completion on the current thread. The
//! wrappers share caches with the values they wrap. Collaborator futures must not depend on
//! a runtime context the caller's thread lacks.

use std::time::Duration;

use futures::executor::block_on;
use sea_query::Value;

use crate::bulk::Upsert;
use crate::connection::{Connection, Executor, Transaction};
use crate::entity::Entity;
use crate::error::Result;
use crate::filter::Filter;

/// Blocking CRUD operations.
#[derive(Debug, Clone)]
pub struct Mapper {
    inner: crate::Mapper,
}

impl From<crate::Mapper> for Mapper {
    fn from(inner: crate::Mapper) -> Self {
        Self { inner }
    }
}

impl Mapper {
    /// Asynchronous mapper this wraps.
    #[must_use]
    pub const fn inner(&self) -> &crate::Mapper {
        &self.inner
    }

    /// Copy of this mapper whose statements are bounded by `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.inner.with_timeout(timeout).into()
    }

    /// See [`crate::Mapper::insert`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::insert`].
    pub fn insert<T: Entity>(&self, db: &dyn Executor, entity: &mut T) -> Result<Value> {
        block_on(self.inner.insert(db, entity))
    }

    /// See [`crate::Mapper::insert_all`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::insert_all`].
    pub fn insert_all<T: Entity>(&self, db: &dyn Executor, entities: &[T]) -> Result<u64> {
        block_on(self.inner.insert_all(db, entities))
    }

    /// See [`crate::Mapper::update`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::update`].
    pub fn update<T: Entity>(&self, db: &dyn Executor, entity: &T) -> Result<bool> {
        block_on(self.inner.update(db, entity))
    }

    /// See [`crate::Mapper::delete`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::delete`].
    pub fn delete<T: Entity>(&self, db: &dyn Executor, entity: &T) -> Result<bool> {
        block_on(self.inner.delete(db, entity))
    }

    /// See [`crate::Mapper::delete_where`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::delete_where`].
    pub fn delete_where<T: Entity>(&self, db: &dyn Executor, filter: Filter) -> Result<u64> {
        block_on(self.inner.delete_where::<T>(db, filter))
    }

    /// See [`crate::Mapper::delete_all`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::delete_all`].
    pub fn delete_all<T: Entity>(&self, db: &dyn Executor) -> Result<u64> {
        block_on(self.inner.delete_all::<T>(db))
    }

    /// See [`crate::Mapper::select_all`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::select_all`].
    pub fn select_all<T: Entity + Default>(&self, db: &dyn Executor) -> Result<Vec<T>> {
        block_on(self.inner.select_all(db))
    }

    /// See [`crate::Mapper::select_where`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::select_where`].
    pub fn select_where<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Filter,
    ) -> Result<Vec<T>> {
        block_on(self.inner.select_where(db, filter))
    }

    /// See [`crate::Mapper::first_or_default`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::first_or_default`].
    pub fn first_or_default<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Filter,
    ) -> Result<Option<T>> {
        block_on(self.inner.first_or_default(db, filter))
    }

    /// See [`crate::Mapper::select_paged`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::select_paged`].
    pub fn select_paged<T: Entity + Default>(
        &self, db: &dyn Executor, filter: Option<Filter>, page_number: i64, page_size: i64,
    ) -> Result<Vec<T>> {
        block_on(self.inner.select_paged(db, filter, page_number, page_size))
    }

    /// See [`crate::Mapper::count`].
    ///
    /// # Errors
    ///
    /// As [`crate::Mapper::count`].
    pub fn count<T: Entity>(&self, db: &dyn Executor, filter: Option<Filter>) -> Result<i64> {
        block_on(self.inner.count::<T>(db, filter))
    }
}

/// Blocking bulk operations.
#[derive(Debug, Clone)]
pub struct BulkEngine {
    inner: crate::BulkEngine,
}

impl From<crate::BulkEngine> for BulkEngine {
    fn from(inner: crate::BulkEngine) -> Self {
        Self { inner }
    }
}

impl BulkEngine {
    /// Asynchronous engine this wraps.
    #[must_use]
    pub const fn inner(&self) -> &crate::BulkEngine {
        &self.inner
    }

    /// See [`crate::BulkEngine::bulk_insert`].
    ///
    /// # Errors
    ///
    /// As [`crate::BulkEngine::bulk_insert`].
    pub fn bulk_insert<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        block_on(self.inner.bulk_insert(conn, entities, transaction))
    }

    /// See [`crate::BulkEngine::bulk_update`].
    ///
    /// # Errors
    ///
    /// As [`crate::BulkEngine::bulk_update`].
    pub fn bulk_update<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        block_on(self.inner.bulk_update(conn, entities, transaction))
    }

    /// See [`crate::BulkEngine::bulk_delete`].
    ///
    /// # Errors
    ///
    /// As [`crate::BulkEngine::bulk_delete`].
    pub fn bulk_delete<T: Entity>(
        &self, conn: &dyn Connection, entities: &[T], transaction: Option<Box<dyn Transaction>>,
    ) -> Result<u64> {
        block_on(self.inner.bulk_delete(conn, entities, transaction))
    }

    /// See [`crate::BulkEngine::bulk_upsert`].
    ///
    /// # Errors
    ///
    /// As [`crate::BulkEngine::bulk_upsert`].
    pub fn bulk_upsert<T: Entity>(
        &self, conn: &dyn Connection, entities: &mut [T], transaction: Option<Box<dyn Transaction>>,
        upsert: Upsert,
    ) -> Result<u64> {
        block_on(self.inner.bulk_upsert(conn, entities, transaction, upsert))
    }
}
