//! Fluent per-type mapping overrides and the strategies that consult them.
//!
//! ```ignore
//! let mappings = Mappings::new();
//! mappings.add(
//!     EntityMap::new::<Product>()
//!         .to_table_in("tblProduct", "dbo")
//!         .property("name", |p| p.column("ProductName"))
//!         .property("cached_total", PropertyMap::ignore),
//! );
//! let catalog = Catalog::builder().mappings(mappings).build();
//! ```

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;

use crate::entity::{Entity, EntityInfo};
use crate::error::{Error, Result};
use crate::property::Property;
use crate::resolver::{
    ColumnNameResolver, DataColumn, DataColumnResolver, DefaultColumnNameResolver,
    DefaultKeyPropertyResolver, DefaultPropertyResolver, DefaultTableNameResolver, KeyProperty,
    KeyPropertyResolver, PropertyResolver, TableNameResolver, data_column,
};

/// Registry of fluent entity maps, keyed by type.
#[derive(Debug, Default)]
pub struct Mappings {
    maps: DashMap<TypeId, Arc<EntityMap>>,
}

impl Mappings {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `map`, replacing any existing map for the same type.
    pub fn add(&self, map: EntityMap) {
        self.maps.insert(map.type_id, Arc::new(map));
    }

    /// Map for the type, if registered.
    #[must_use]
    pub fn get(&self, type_id: TypeId) -> Option<Arc<EntityMap>> {
        self.maps.get(&type_id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Mapping overrides for one entity type.
#[derive(Debug, Clone)]
pub struct EntityMap {
    type_id: TypeId,
    table: Option<String>,
    properties: Vec<PropertyMap>,
}

impl EntityMap {
    /// Empty map for `E`.
    #[must_use]
    pub fn new<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            table: None,
            properties: Vec::new(),
        }
    }

    /// Map to table `name`.
    #[must_use]
    pub fn to_table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Map to table `name` in `schema`.
    #[must_use]
    pub fn to_table_in(mut self, name: &str, schema: &str) -> Self {
        self.table = Some(format!("{schema}.{name}"));
        self
    }

    /// Configure the member `member`.
    #[must_use]
    pub fn property(
        mut self, member: &str, configure: impl FnOnce(PropertyMap) -> PropertyMap,
    ) -> Self {
        let existing = self.properties.iter().position(|p| p.member == member);
        let map = existing.map_or_else(
            || PropertyMap::new(member),
            |index| self.properties.remove(index),
        );
        self.properties.push(configure(map));
        self
    }

    /// Mapped table name.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Configured members.
    #[must_use]
    pub fn properties(&self) -> &[PropertyMap] {
        &self.properties
    }

    /// Configuration of `member`, if any.
    #[must_use]
    pub fn property_map(&self, member: &str) -> Option<&PropertyMap> {
        self.properties.iter().find(|p| p.member == member)
    }
}

/// Mapping overrides for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMap {
    member: String,
    column: Option<String>,
    ignored: bool,
    key: bool,
    identity: bool,
}

impl PropertyMap {
    fn new(member: &str) -> Self {
        Self {
            member: member.to_string(),
            column: None,
            ignored: false,
            key: false,
            identity: false,
        }
    }

    /// Map to column `name`.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Exclude the member from mapping.
    #[must_use]
    pub const fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Mark as key, with a client-assigned value.
    #[must_use]
    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Mark as key, with a database-generated value.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.key = true;
        self.identity = true;
        self
    }

    /// Member name.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Mapped column name.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Whether the member is excluded.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Whether the member is the key.
    #[must_use]
    pub const fn is_key(&self) -> bool {
        self.key
    }

    /// Whether the key is database generated.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.identity
    }
}

/// [`DefaultPropertyResolver`] that also drops ignored members.
#[derive(Debug, Clone)]
pub struct MappedPropertyResolver {
    mappings: Arc<Mappings>,
    fallback: DefaultPropertyResolver,
}

impl MappedPropertyResolver {
    /// Resolver over `mappings`.
    #[must_use]
    pub fn new(mappings: Arc<Mappings>) -> Self {
        Self {
            mappings,
            fallback: DefaultPropertyResolver::default(),
        }
    }
}

impl PropertyResolver for MappedPropertyResolver {
    fn resolve_properties(&self, entity: &'static EntityInfo) -> Vec<Property> {
        let properties = self.fallback.resolve_properties(entity);
        let Some(map) = self.mappings.get(entity.type_id()) else {
            return properties;
        };
        properties
            .into_iter()
            .filter(|p| !map.property_map(p.name()).is_some_and(PropertyMap::is_ignored))
            .collect()
    }
}

/// Key is the single member mapped as key. Unmapped types, or maps without a key, fall back to
/// [`DefaultKeyPropertyResolver`].
#[derive(Debug, Clone)]
pub struct MappedKeyPropertyResolver {
    mappings: Arc<Mappings>,
}

impl MappedKeyPropertyResolver {
    /// Resolver over `mappings`.
    #[must_use]
    pub const fn new(mappings: Arc<Mappings>) -> Self {
        Self { mappings }
    }
}

impl KeyPropertyResolver for MappedKeyPropertyResolver {
    fn resolve_key(
        &self, entity: &'static EntityInfo, properties: &[Property],
    ) -> Result<KeyProperty> {
        let Some(map) = self.mappings.get(entity.type_id()) else {
            return DefaultKeyPropertyResolver.resolve_key(entity, properties);
        };

        let mut keys = map.properties().iter().filter(|p| p.is_key());
        match (keys.next(), keys.next()) {
            (Some(key), None) => {
                let property = properties
                    .iter()
                    .find(|p| p.name() == key.member())
                    .cloned()
                    .or_else(|| Property::named(entity, key.member()))
                    .ok_or_else(|| Error::UnknownMember {
                        type_name: entity.type_name().to_string(),
                        member: key.member().to_string(),
                    })?;
                Ok(KeyProperty {
                    property,
                    is_identity: key.is_identity(),
                })
            }
            (Some(_), Some(_)) => Err(Error::MappedKeys(entity.type_name().to_string())),
            (None, _) => DefaultKeyPropertyResolver.resolve_key(entity, properties),
        }
    }
}

/// Column is the mapped column name, else [`DefaultColumnNameResolver`].
#[derive(Debug, Clone)]
pub struct MappedColumnNameResolver {
    mappings: Arc<Mappings>,
}

impl MappedColumnNameResolver {
    /// Resolver over `mappings`.
    #[must_use]
    pub const fn new(mappings: Arc<Mappings>) -> Self {
        Self { mappings }
    }

    fn mapped_column(&self, property: &Property) -> Option<String> {
        let map = self.mappings.get(property.owner_id())?;
        map.property_map(property.name())?.column_name().map(ToString::to_string)
    }
}

impl ColumnNameResolver for MappedColumnNameResolver {
    fn resolve_column(&self, property: &Property) -> String {
        self.mapped_column(property)
            .unwrap_or_else(|| DefaultColumnNameResolver.resolve_column(property))
    }
}

/// Table is the mapped table name, else [`DefaultTableNameResolver`].
#[derive(Debug, Clone)]
pub struct MappedTableNameResolver {
    mappings: Arc<Mappings>,
}

impl MappedTableNameResolver {
    /// Resolver over `mappings`.
    #[must_use]
    pub const fn new(mappings: Arc<Mappings>) -> Self {
        Self { mappings }
    }
}

impl TableNameResolver for MappedTableNameResolver {
    fn resolve_table(&self, entity: &'static EntityInfo) -> String {
        self.mappings
            .get(entity.type_id())
            .and_then(|map| map.table().map(ToString::to_string))
            .unwrap_or_else(|| DefaultTableNameResolver.resolve_table(entity))
    }
}

/// Data column named by [`MappedColumnNameResolver`].
#[derive(Debug, Clone)]
pub struct MappedDataColumnResolver {
    columns: MappedColumnNameResolver,
}

impl MappedDataColumnResolver {
    /// Resolver over `mappings`.
    #[must_use]
    pub const fn new(mappings: Arc<Mappings>) -> Self {
        Self {
            columns: MappedColumnNameResolver::new(mappings),
        }
    }
}

impl DataColumnResolver for MappedDataColumnResolver {
    fn resolve_data_column(&self, property: &Property) -> Result<DataColumn> {
        data_column(property, self.columns.resolve_column(property))
    }
}
