//! Metadata resolution façade and cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::connection::Row;
use crate::entity::{Entity, EntityInfo};
use crate::error::{Error, Result};
use crate::log::LogSink;
use crate::mapping::{
    MappedColumnNameResolver, MappedDataColumnResolver, MappedKeyPropertyResolver,
    MappedPropertyResolver, MappedTableNameResolver, Mappings,
};
use crate::property::Property;
use crate::resolver::{
    ColumnNameResolver, DataColumn, DataColumnResolver, DefaultColumnNameResolver,
    DefaultDataColumnResolver, DefaultForeignKeyPropertyResolver, DefaultKeyPropertyResolver,
    DefaultPropertyResolver, DefaultTableNameResolver, ForeignKey, ForeignKeyPropertyResolver,
    KeyProperty, KeyPropertyResolver, PropertyResolver, TableNameResolver,
};

/// Identifier escape characters wrapped around resolved table and column names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Escape {
    /// Opening character.
    pub start: Option<char>,
    /// Closing character.
    pub end: Option<char>,
}

impl Escape {
    /// Escape with `start` and `end`.
    #[must_use]
    pub const fn new(start: char, end: char) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether either character is configured.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Wrap `name` with the configured characters.
    #[must_use]
    pub fn wrap(&self, name: &str) -> String {
        let mut wrapped = String::with_capacity(name.len() + 2);
        wrapped.extend(self.start);
        wrapped.push_str(name);
        wrapped.extend(self.end);
        wrapped
    }
}

#[derive(Clone)]
struct Strategies {
    properties: Arc<dyn PropertyResolver>,
    key: Arc<dyn KeyPropertyResolver>,
    column: Arc<dyn ColumnNameResolver>,
    table: Arc<dyn TableNameResolver>,
    data_column: Arc<dyn DataColumnResolver>,
    foreign_key: Arc<dyn ForeignKeyPropertyResolver>,
}

/// Resolver façade owning the per-type metadata caches.
///
/// Every lookup is cache-first. On a miss the active strategy resolves the value, table and
/// column names are wrapped with the configured [`Escape`], the result is stored and a
/// diagnostic message is emitted. Concurrent misses for the same key are benign: the first
/// stored value wins and every caller returns it.
///
/// Cached entries live as long as the catalog. Replacing a strategy or the escape characters
/// affects only entries resolved afterwards.
pub struct Catalog {
    strategies: RwLock<Strategies>,
    escape: RwLock<Escape>,
    log: LogSink,
    tables: DashMap<TypeId, Arc<str>>,
    columns: DashMap<Property, Arc<str>>,
    data_columns: DashMap<Property, DataColumn>,
    keys: DashMap<TypeId, KeyProperty>,
    properties: DashMap<TypeId, Arc<[Property]>>,
    foreign_keys: DashMap<(TypeId, TypeId), ForeignKey>,
    column_members: DashMap<TypeId, Arc<HashMap<String, Property>>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("escape", &*self.escape.read())
            .field("tables", &self.tables.len())
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Configure a new catalog.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Table name of `T`.
    #[must_use]
    pub fn table<T: Entity>(&self) -> Arc<str> {
        self.table_of(T::entity_info())
    }

    /// Table name of the described type.
    #[must_use]
    pub fn table_of(&self, entity: &'static EntityInfo) -> Arc<str> {
        if let Some(name) = self.tables.get(&entity.type_id()) {
            return Arc::clone(name.value());
        }

        let resolver = Arc::clone(&self.strategies.read().table);
        let name = self.escaped(&resolver.resolve_table(entity));
        let name = Arc::clone(self.tables.entry(entity.type_id()).or_insert(name.into()).value());

        self.log.emit(&format!("Resolved table name '{name}' for '{}'", entity.type_name()));
        name
    }

    /// Column name of `property`.
    #[must_use]
    pub fn column(&self, property: &Property) -> Arc<str> {
        if let Some(name) = self.columns.get(property) {
            return Arc::clone(name.value());
        }

        let resolver = Arc::clone(&self.strategies.read().column);
        let name = self.escaped(&resolver.resolve_column(property));
        let name = Arc::clone(self.columns.entry(property.clone()).or_insert(name.into()).value());

        self.log.emit(&format!("Resolved column name '{name}' for '{}'", property.key()));
        name
    }

    /// Column names of `properties`, in order.
    #[must_use]
    pub fn columns(&self, properties: &[Property]) -> Vec<Arc<str>> {
        properties.iter().map(|p| self.column(p)).collect()
    }

    /// Key member of `T` and whether it is an identity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the type has no key or more than one.
    pub fn key_property<T: Entity>(&self) -> Result<KeyProperty> {
        self.key_property_of(T::entity_info())
    }

    /// Key member of the described type and whether it is an identity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the type has no key or more than one.
    pub fn key_property_of(&self, entity: &'static EntityInfo) -> Result<KeyProperty> {
        if let Some(key) = self.keys.get(&entity.type_id()) {
            return Ok(key.value().clone());
        }

        let properties = self.properties_of(entity);
        let resolver = Arc::clone(&self.strategies.read().key);
        let key = resolver.resolve_key(entity, &properties)?;
        let key = self.keys.entry(entity.type_id()).or_insert(key).value().clone();

        self.log.emit(&format!(
            "Resolved property '{}' (Identity: {}) as key property for '{}'",
            key.property.name(),
            key.is_identity,
            entity.type_name()
        ));
        Ok(key)
    }

    /// Mapped members of `T`, in declaration order.
    #[must_use]
    pub fn properties<T: Entity>(&self) -> Arc<[Property]> {
        self.properties_of(T::entity_info())
    }

    /// Mapped members of the described type, in declaration order.
    #[must_use]
    pub fn properties_of(&self, entity: &'static EntityInfo) -> Arc<[Property]> {
        if let Some(properties) = self.properties.get(&entity.type_id()) {
            return Arc::clone(properties.value());
        }

        let resolver = Arc::clone(&self.strategies.read().properties);
        let properties: Arc<[Property]> = resolver.resolve_properties(entity).into();
        let properties =
            Arc::clone(self.properties.entry(entity.type_id()).or_insert(properties).value());

        let names = properties.iter().map(Property::name).collect::<Vec<_>>().join(", ");
        self.log.emit(&format!("Resolved properties '{names}' for '{}'", entity.type_name()));
        properties
    }

    /// Foreign key relating `S` to `I`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignKeyNotFound`] when no relation pattern matches.
    pub fn foreign_key<S: Entity, I: Entity>(&self) -> Result<ForeignKey> {
        self.foreign_key_of(S::entity_info(), I::entity_info())
    }

    /// Foreign key relating `source` to `including`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignKeyNotFound`] when no relation pattern matches.
    pub fn foreign_key_of(
        &self, source: &'static EntityInfo, including: &'static EntityInfo,
    ) -> Result<ForeignKey> {
        let pair = (source.type_id(), including.type_id());
        if let Some(foreign_key) = self.foreign_keys.get(&pair) {
            return Ok(foreign_key.value().clone());
        }

        let resolver = Arc::clone(&self.strategies.read().foreign_key);
        let foreign_key = resolver.resolve_foreign_key(source, including)?;
        let foreign_key = self.foreign_keys.entry(pair).or_insert(foreign_key).value().clone();

        self.log.emit(&format!(
            "Resolved property '{}' ({:?}) as foreign key between '{}' and '{}'",
            foreign_key.property.key(),
            foreign_key.relation,
            source.type_name(),
            including.type_name()
        ));
        Ok(foreign_key)
    }

    /// Staging column descriptor of `property`. Never escaped.
    ///
    /// # Errors
    ///
    /// Returns an error when the member is not primitive-shaped.
    pub fn data_column(&self, property: &Property) -> Result<DataColumn> {
        if let Some(column) = self.data_columns.get(property) {
            return Ok(column.value().clone());
        }

        let resolver = Arc::clone(&self.strategies.read().data_column);
        let column = resolver.resolve_data_column(property)?;
        let column = self.data_columns.entry(property.clone()).or_insert(column).value().clone();

        self.log.emit(&format!(
            "Resolved data column '{}' ({:?}) for '{}'",
            column.name,
            column.kind,
            property.key()
        ));
        Ok(column)
    }

    /// Mapped member for a result column, matched ignoring case on the unescaped column name
    /// or the member name.
    #[must_use]
    pub fn member_for_column(&self, entity: &'static EntityInfo, column: &str) -> Option<Property> {
        let members = self.column_members(entity);
        members.get(&column.to_lowercase()).cloned()
    }

    fn column_members(&self, entity: &'static EntityInfo) -> Arc<HashMap<String, Property>> {
        if let Some(members) = self.column_members.get(&entity.type_id()) {
            return Arc::clone(members.value());
        }

        let resolver = Arc::clone(&self.strategies.read().column);
        let mut members = HashMap::new();
        for property in self.properties_of(entity).iter() {
            members.entry(property.name().to_lowercase()).or_insert_with(|| property.clone());
            members.insert(resolver.resolve_column(property).to_lowercase(), property.clone());
        }
        Arc::clone(
            self.column_members.entry(entity.type_id()).or_insert(Arc::new(members)).value(),
        )
    }

    /// Build a `T` from a result row. Columns without a mapped member are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] when a column value does not fit its member.
    pub fn hydrate<T: Entity + Default>(&self, row: &Row) -> Result<T> {
        let entity = T::entity_info();
        let mut instance = T::default();
        for field in &row.fields {
            let Some(property) = self.member_for_column(entity, &field.name) else {
                continue;
            };
            property.set(&mut instance, field.value.clone()).map_err(|e| Error::Conversion {
                member: property.key().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(instance)
    }

    /// Active escape characters.
    #[must_use]
    pub fn escape(&self) -> Escape {
        *self.escape.read()
    }

    /// Replace the escape characters. Names resolved earlier keep their old form.
    pub fn set_escape(&self, escape: Escape) {
        *self.escape.write() = escape;
    }

    /// Replace the property strategy.
    pub fn set_property_resolver(&self, resolver: impl PropertyResolver + 'static) {
        self.strategies.write().properties = Arc::new(resolver);
    }

    /// Replace the key strategy.
    pub fn set_key_property_resolver(&self, resolver: impl KeyPropertyResolver + 'static) {
        self.strategies.write().key = Arc::new(resolver);
    }

    /// Replace the column name strategy.
    pub fn set_column_name_resolver(&self, resolver: impl ColumnNameResolver + 'static) {
        self.strategies.write().column = Arc::new(resolver);
    }

    /// Replace the table name strategy.
    pub fn set_table_name_resolver(&self, resolver: impl TableNameResolver + 'static) {
        self.strategies.write().table = Arc::new(resolver);
    }

    /// Replace the data column strategy.
    pub fn set_data_column_resolver(&self, resolver: impl DataColumnResolver + 'static) {
        self.strategies.write().data_column = Arc::new(resolver);
    }

    /// Replace the foreign key strategy.
    pub fn set_foreign_key_resolver(&self, resolver: impl ForeignKeyPropertyResolver + 'static) {
        self.strategies.write().foreign_key = Arc::new(resolver);
    }

    /// Diagnostic sink.
    #[must_use]
    pub const fn log(&self) -> &LogSink {
        &self.log
    }

    fn escaped(&self, name: &str) -> String {
        let escape = self.escape();
        if escape.is_set() { escape.wrap(name) } else { name.to_string() }
    }
}

/// Explicit configuration for a [`Catalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    properties: Option<Arc<dyn PropertyResolver>>,
    key: Option<Arc<dyn KeyPropertyResolver>>,
    column: Option<Arc<dyn ColumnNameResolver>>,
    table: Option<Arc<dyn TableNameResolver>>,
    data_column: Option<Arc<dyn DataColumnResolver>>,
    foreign_key: Option<Arc<dyn ForeignKeyPropertyResolver>>,
    mappings: Option<Arc<Mappings>>,
    escape: Escape,
    log: LogSink,
}

impl CatalogBuilder {
    /// Use `resolver` for member sets.
    #[must_use]
    pub fn property_resolver(mut self, resolver: impl PropertyResolver + 'static) -> Self {
        self.properties = Some(Arc::new(resolver));
        self
    }

    /// Use `resolver` for keys.
    #[must_use]
    pub fn key_property_resolver(mut self, resolver: impl KeyPropertyResolver + 'static) -> Self {
        self.key = Some(Arc::new(resolver));
        self
    }

    /// Use `resolver` for column names.
    #[must_use]
    pub fn column_name_resolver(mut self, resolver: impl ColumnNameResolver + 'static) -> Self {
        self.column = Some(Arc::new(resolver));
        self
    }

    /// Use `resolver` for table names.
    #[must_use]
    pub fn table_name_resolver(mut self, resolver: impl TableNameResolver + 'static) -> Self {
        self.table = Some(Arc::new(resolver));
        self
    }

    /// Use `resolver` for staging column descriptors.
    #[must_use]
    pub fn data_column_resolver(mut self, resolver: impl DataColumnResolver + 'static) -> Self {
        self.data_column = Some(Arc::new(resolver));
        self
    }

    /// Use `resolver` for foreign keys.
    #[must_use]
    pub fn foreign_key_resolver(
        mut self, resolver: impl ForeignKeyPropertyResolver + 'static,
    ) -> Self {
        self.foreign_key = Some(Arc::new(resolver));
        self
    }

    /// Consult `mappings` first. Strategies not set explicitly become their mapping-aware
    /// variants.
    #[must_use]
    pub fn mappings(mut self, mappings: impl Into<Arc<Mappings>>) -> Self {
        self.mappings = Some(mappings.into());
        self
    }

    /// Wrap resolved table and column names with `start` and `end`.
    #[must_use]
    pub const fn escape(mut self, start: char, end: char) -> Self {
        self.escape = Escape::new(start, end);
        self
    }

    /// Send diagnostic messages to `callback`.
    #[must_use]
    pub fn log(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = LogSink::new(callback);
        self
    }

    /// Build the catalog.
    #[must_use]
    pub fn build(self) -> Catalog {
        let strategies = match &self.mappings {
            Some(mappings) => Strategies {
                properties: self.properties.unwrap_or_else(|| {
                    Arc::new(MappedPropertyResolver::new(Arc::clone(mappings)))
                }),
                key: self.key.unwrap_or_else(|| {
                    Arc::new(MappedKeyPropertyResolver::new(Arc::clone(mappings)))
                }),
                column: self.column.unwrap_or_else(|| {
                    Arc::new(MappedColumnNameResolver::new(Arc::clone(mappings)))
                }),
                table: self.table.unwrap_or_else(|| {
                    Arc::new(MappedTableNameResolver::new(Arc::clone(mappings)))
                }),
                data_column: self.data_column.unwrap_or_else(|| {
                    Arc::new(MappedDataColumnResolver::new(Arc::clone(mappings)))
                }),
                foreign_key: self
                    .foreign_key
                    .unwrap_or_else(|| Arc::new(DefaultForeignKeyPropertyResolver::default())),
            },
            None => Strategies {
                properties: self
                    .properties
                    .unwrap_or_else(|| Arc::new(DefaultPropertyResolver::default())),
                key: self.key.unwrap_or_else(|| Arc::new(DefaultKeyPropertyResolver)),
                column: self.column.unwrap_or_else(|| Arc::new(DefaultColumnNameResolver)),
                table: self.table.unwrap_or_else(|| Arc::new(DefaultTableNameResolver)),
                data_column: self
                    .data_column
                    .unwrap_or_else(|| Arc::new(DefaultDataColumnResolver)),
                foreign_key: self
                    .foreign_key
                    .unwrap_or_else(|| Arc::new(DefaultForeignKeyPropertyResolver::default())),
            },
        };

        Catalog {
            strategies: RwLock::new(strategies),
            escape: RwLock::new(self.escape),
            log: self.log,
            tables: DashMap::new(),
            columns: DashMap::new(),
            data_columns: DashMap::new(),
            keys: DashMap::new(),
            properties: DashMap::new(),
            foreign_keys: DashMap::new(),
            column_members: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_wraps() {
        assert_eq!(Escape::new('[', ']').wrap("Products"), "[Products]");
        assert_eq!(Escape::default().wrap("Products"), "Products");
        let start_only = Escape {
            start: Some('"'),
            end: None,
        };
        assert!(start_only.is_set());
        assert_eq!(start_only.wrap("Products"), "\"Products");
    }
}
