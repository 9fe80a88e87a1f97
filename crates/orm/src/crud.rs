//! CRUD statement compilation.
//!
//! Statements that depend only on the entity type are compiled once and memoized. Insert
//! statements are memoized per dialect as well, since identity retrieval differs between
//! dialects. Predicate variants are rendered per call.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use sea_query::Value;

use crate::catalog::Catalog;
use crate::connection::{Command, Param};
use crate::dialect::{Dialect, DialectRegistry, InsertParts};
use crate::entity::{Entity, EntityInfo};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::property::Property;
use crate::query::{Predicate, QueryBuilder};

/// A memoized statement and the members it binds, in placeholder order.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Statement text.
    pub sql: Arc<str>,
    /// Members bound as `@{member}`.
    pub bindings: Arc<[Property]>,
}

impl Statement {
    /// Command binding every member of `entity`.
    #[must_use]
    pub fn bind(&self, entity: &dyn Any) -> Command {
        let params = self.bindings.iter().map(|property| Param {
            name: property.name().to_string(),
            value: property.get(entity).unwrap_or(Value::Int(None)),
        });
        Command::new(self.sql.as_ref()).params(params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InsertKind {
    Single,
    Multiple,
}

/// Builds and caches the CRUD statements of entity types.
#[derive(Debug)]
pub struct QueryCompiler {
    catalog: Arc<Catalog>,
    registry: Arc<DialectRegistry>,
    inserts: DashMap<(TypeId, Dialect, InsertKind), Statement>,
    updates: DashMap<TypeId, Statement>,
    deletes: DashMap<TypeId, Statement>,
    delete_all: DashMap<TypeId, Arc<str>>,
    select_all: DashMap<TypeId, Arc<str>>,
    count_all: DashMap<TypeId, Arc<str>>,
}

impl QueryCompiler {
    /// Compiler resolving metadata through `catalog` and dialect syntax through `registry`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, registry: Arc<DialectRegistry>) -> Self {
        Self {
            catalog,
            registry,
            inserts: DashMap::new(),
            updates: DashMap::new(),
            deletes: DashMap::new(),
            delete_all: DashMap::new(),
            select_all: DashMap::new(),
            count_all: DashMap::new(),
        }
    }

    /// Metadata catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Dialect registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<DialectRegistry> {
        &self.registry
    }

    /// Single row insert returning the generated key. A server-generated identity key is not
    /// inserted.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved or the dialect rejects
    /// the statement.
    pub fn insert<T: Entity>(&self, dialect: &Dialect) -> Result<Statement> {
        self.insert_statement(T::entity_info(), dialect, InsertKind::Single)
    }

    /// Insert executed once per entity of a list, without identity retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the dialect has no list insert, or a configuration
    /// error when the key cannot be resolved.
    pub fn insert_many<T: Entity>(&self, dialect: &Dialect) -> Result<Statement> {
        self.insert_statement(T::entity_info(), dialect, InsertKind::Multiple)
    }

    fn insert_statement(
        &self, entity: &'static EntityInfo, dialect: &Dialect, kind: InsertKind,
    ) -> Result<Statement> {
        let cache_key = (entity.type_id(), dialect.clone(), kind);
        if let Some(statement) = self.inserts.get(&cache_key) {
            return Ok(statement.value().clone());
        }

        let table = self.catalog.table_of(entity);
        let key = self.catalog.key_property_of(entity)?;
        let bindings: Arc<[Property]> = self
            .catalog
            .properties_of(entity)
            .iter()
            .filter(|property| !(key.is_identity && **property == key.property))
            .cloned()
            .collect();

        let columns: Vec<String> =
            bindings.iter().map(|p| self.catalog.column(p).to_string()).collect();
        let params: Vec<String> = bindings.iter().map(|p| format!("@{}", p.name())).collect();
        let key_column = self.catalog.column(&key.property);

        let parts = InsertParts {
            table: &*table,
            columns: &columns,
            params: &params,
            key_column: Some(&*key_column),
            escaped: self.catalog.escape().is_set(),
        };
        let builder = self.registry.builder(dialect);
        let sql = match kind {
            InsertKind::Single => builder.build_insert(&parts)?,
            InsertKind::Multiple => builder.build_multiple_insert(&parts)?,
        };

        tracing::debug!(
            table = %table,
            dialect = %dialect,
            sql = %sql,
            param_count = bindings.len(),
            "compiled insert"
        );

        let statement = Statement {
            sql: sql.into(),
            bindings,
        };
        Ok(self.inserts.entry(cache_key).or_insert(statement).value().clone())
    }

    /// Update of every non-key member, matched by key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved.
    pub fn update<T: Entity>(&self) -> Result<Statement> {
        let entity = T::entity_info();
        if let Some(statement) = self.updates.get(&entity.type_id()) {
            return Ok(statement.value().clone());
        }

        let table = self.catalog.table_of(entity);
        let key = self.catalog.key_property_of(entity)?;
        let mut bindings: Vec<Property> = self
            .catalog
            .properties_of(entity)
            .iter()
            .filter(|property| **property != key.property)
            .cloned()
            .collect();

        let assignments = bindings
            .iter()
            .map(|p| format!("{} = @{}", self.catalog.column(p), p.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "update {table} set {assignments} where {} = @{}",
            self.catalog.column(&key.property),
            key.property.name()
        );
        bindings.push(key.property);

        tracing::debug!(table = %table, sql = %sql, param_count = bindings.len(), "compiled update");

        let statement = Statement {
            sql: sql.into(),
            bindings: bindings.into(),
        };
        Ok(self.updates.entry(entity.type_id()).or_insert(statement).value().clone())
    }

    /// Delete matched by key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved.
    pub fn delete<T: Entity>(&self) -> Result<Statement> {
        let entity = T::entity_info();
        if let Some(statement) = self.deletes.get(&entity.type_id()) {
            return Ok(statement.value().clone());
        }

        let table = self.catalog.table_of(entity);
        let key = self.catalog.key_property_of(entity)?;
        let sql = format!(
            "delete from {table} where {} = @{}",
            self.catalog.column(&key.property),
            key.property.name()
        );

        tracing::debug!(table = %table, sql = %sql, param_count = 1, "compiled delete");

        let statement = Statement {
            sql: sql.into(),
            bindings: Arc::new([key.property]),
        };
        Ok(self.deletes.entry(entity.type_id()).or_insert(statement).value().clone())
    }

    /// Delete of every row.
    #[must_use]
    pub fn delete_all<T: Entity>(&self) -> Arc<str> {
        let entity = T::entity_info();
        memoized(&self.delete_all, entity, || format!("delete from {}", self.catalog.table_of(entity)))
    }

    /// Delete of the rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] when the filter names a member that is not mapped.
    pub fn delete_where<T: Entity>(&self, filter: Filter) -> Result<Command> {
        let prefix = self.delete_all::<T>();
        self.filtered(T::entity_info(), &prefix, Some(filter))
    }

    /// Select of every mapped row, optionally restricted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] when the filter names a member that is not mapped.
    pub fn select<T: Entity>(&self, filter: Option<Filter>) -> Result<Command> {
        let entity = T::entity_info();
        let prefix =
            memoized(&self.select_all, entity, || format!("select * from {}", self.catalog.table_of(entity)));
        self.filtered(entity, &prefix, filter)
    }

    /// Select of one page, ordered by key. Pages are 1-based.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved, or
    /// [`Error::UnknownMember`] when the filter names a member that is not mapped.
    pub fn select_paged<T: Entity>(
        &self, dialect: &Dialect, filter: Option<Filter>, page_number: i64, page_size: i64,
    ) -> Result<Command> {
        let mut command = self.select::<T>(filter)?;
        let key = self.catalog.key_property::<T>()?;
        let order_by = format!("order by {}", self.catalog.column(&key.property));
        let paging = self.registry.builder(dialect).build_paging(&order_by, page_number, page_size);
        command.sql.push_str(&paging);

        tracing::debug!(sql = %command.sql, page_number, page_size, "compiled paged select");
        Ok(command)
    }

    /// Row count, optionally restricted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] when the filter names a member that is not mapped.
    pub fn count<T: Entity>(&self, filter: Option<Filter>) -> Result<Command> {
        let entity = T::entity_info();
        let prefix = memoized(&self.count_all, entity, || {
            format!("select count(*) from {}", self.catalog.table_of(entity))
        });
        self.filtered(entity, &prefix, filter)
    }

    /// Render `filter` against the columns of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMember`] when the filter names a member that is not mapped.
    pub fn predicate(&self, entity: &'static EntityInfo, filter: Filter) -> Result<Predicate> {
        let properties = self.catalog.properties_of(entity);
        let column = |member: &str| -> Result<Arc<str>> {
            let property = properties.iter().find(|p| p.name() == member).ok_or_else(|| {
                Error::UnknownMember {
                    type_name: entity.type_name().to_string(),
                    member: member.to_string(),
                }
            })?;
            Ok(self.catalog.column(property))
        };
        let expr = filter.into_expr(&column)?;
        Ok(QueryBuilder::default().render(&expr))
    }

    fn filtered(
        &self, entity: &'static EntityInfo, prefix: &str, filter: Option<Filter>,
    ) -> Result<Command> {
        let Some(filter) = filter else {
            return Ok(Command::new(prefix));
        };
        let Predicate { sql, params } = self.predicate(entity, filter)?;
        let sql = format!("{prefix} where {sql}");

        tracing::debug!(entity = entity.name(), sql = %sql, param_count = params.len(), "compiled predicate");
        Ok(Command::new(sql).params(params))
    }
}

fn memoized(
    cache: &DashMap<TypeId, Arc<str>>, entity: &'static EntityInfo, build: impl FnOnce() -> String,
) -> Arc<str> {
    if let Some(sql) = cache.get(&entity.type_id()) {
        return Arc::clone(sql.value());
    }
    let sql: Arc<str> = build().into();
    tracing::debug!(entity = entity.name(), sql = %sql, "compiled statement");
    Arc::clone(cache.entry(entity.type_id()).or_insert(sql).value())
}
