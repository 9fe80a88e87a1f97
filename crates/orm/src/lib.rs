//! Typed record to table mapping.
//!
//! Resolves how entity types map onto tables, compiles dialect-aware CRUD statements and
//! synchronizes whole sequences of entities with a table through staged `MERGE` statements.
//!
//! # Quick Start
//!
//! ## Define an Entity
//!
//! ```ignore
//! use tablemap_orm::Entity;
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! pub struct Product {
//!     pub id: i32,
//!     pub name: String,
//!     pub price: f64,
//!     #[orm(column = "CategoryId")]
//!     pub category_id: Option<i32>,
//! }
//! ```
//!
//! `Product` maps to the table `Products`; `id` is the identity key.
//!
//! ## CRUD Operations
//!
//! ```ignore
//! use std::sync::Arc;
//! use tablemap_orm::{Catalog, Filter, Mapper};
//!
//! let mapper = Mapper::new(Arc::new(Catalog::default()));
//!
//! let mut product = Product { name: "Widget".into(), price: 9.5, ..Product::default() };
//! mapper.insert(&conn, &mut product).await?;
//!
//! let cheap: Vec<Product> = mapper.select_where(&conn, Filter::lt("price", 10.0)).await?;
//! let page: Vec<Product> = mapper.select_paged(&conn, None, 2, 25).await?;
//! ```
//!
//! ## Bulk Synchronization
//!
//! ```ignore
//! use tablemap_orm::{BulkEngine, Upsert};
//!
//! let engine = BulkEngine::new(Arc::clone(mapper.catalog()));
//! let upsert = Upsert { output_identity: true, ..Upsert::default() };
//! engine.bulk_upsert(&conn, &mut products, None, upsert).await?;
//! ```
//!
//! ## Mapping Overrides
//!
//! ```ignore
//! use tablemap_orm::{Catalog, EntityMap, Mappings, PropertyMap};
//!
//! let mappings = Mappings::new();
//! mappings.add(
//!     EntityMap::new::<Product>()
//!         .to_table_in("tblProduct", "dbo")
//!         .property("id", PropertyMap::identity)
//!         .property("name", |p| p.column("ProductName")),
//! );
//! let catalog = Catalog::builder().mappings(mappings).escape('[', ']').build();
//! ```
//!
//! Every operation has a blocking counterpart in [`blocking`].

extern crate self as tablemap_orm;

pub mod blocking;
mod bulk;
mod catalog;
mod config;
mod connection;
mod crud;
mod dialect;
mod entity;
mod error;
mod filter;
mod log;
mod mapper;
mod mapping;
mod property;
mod query;
mod resolver;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use bulk::{BulkEngine, BulkMetadata, PendingIdentities, ROW_SEQ, Shape, Upsert, shred, sql_type};
pub use catalog::{Catalog, CatalogBuilder, Escape};
pub use config::{BulkOptions, MapperOptions};
pub use connection::{
    BulkCopy, Command, Connection, CopyOptions, DataTable, Executor, Field, FutureResult, Param,
    Row, RowsCopied, Transaction,
};
pub use crud::{QueryCompiler, Statement};
pub use dialect::{
    Dialect, DialectRegistry, InsertParts, MySqlBuilder, PostgresBuilder, SqlBuilder,
    SqlServerBuilder, SqlServerCeBuilder, SqliteBuilder, page_start,
};
pub use entity::{
    Entity, EntityInfo, EntityRef, FieldInfo, FieldType, Mapped, TableAnnotation, ValueKind,
    is_null,
};
pub use error::{Error, Result};
pub use filter::Filter;
pub use log::LogSink;
pub use mapper::Mapper;
pub use mapping::{
    EntityMap, MappedColumnNameResolver, MappedDataColumnResolver, MappedKeyPropertyResolver,
    MappedPropertyResolver, MappedTableNameResolver, Mappings, PropertyMap,
};
pub use property::Property;
pub use query::Predicate;
pub use resolver::{
    ColumnNameResolver, DataColumn, DataColumnResolver, DefaultColumnNameResolver,
    DefaultDataColumnResolver, DefaultForeignKeyPropertyResolver, DefaultKeyPropertyResolver,
    DefaultPropertyResolver, DefaultTableNameResolver, ForeignKey, ForeignKeyPropertyResolver,
    KeyProperty, KeyPropertyResolver, PropertyResolver, Relation, TableNameResolver, pluralize,
};
pub use sea_query::Value;
pub use tablemap_orm_macro::Entity;
