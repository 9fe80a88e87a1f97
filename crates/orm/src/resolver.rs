//! Pluggable metadata resolution strategies.
//!
//! Each strategy is a stateless policy object. The [`Catalog`](crate::Catalog) calls them on a
//! cache miss and owns the results; replacing a strategy does not touch what is already cached.

use std::collections::HashSet;
use std::fmt::Debug;

use crate::entity::{EntityInfo, FieldInfo, FieldType, ValueKind};
use crate::error::{Error, Result};
use crate::property::Property;

/// Resolves the ordered set of mapped members of a type.
pub trait PropertyResolver: Debug + Send + Sync {
    /// Members to map, in declaration order.
    fn resolve_properties(&self, entity: &'static EntityInfo) -> Vec<Property>;
}

/// Resolves the key member of a type.
pub trait KeyPropertyResolver: Debug + Send + Sync {
    /// The single key member, chosen among the mapped `properties`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no member or more than one member qualifies.
    fn resolve_key(&self, entity: &'static EntityInfo, properties: &[Property])
    -> Result<KeyProperty>;
}

/// Resolves the column name of a member.
pub trait ColumnNameResolver: Debug + Send + Sync {
    /// Unescaped column name.
    fn resolve_column(&self, property: &Property) -> String;
}

/// Resolves the table name of a type.
pub trait TableNameResolver: Debug + Send + Sync {
    /// Unescaped table name, optionally `schema.table`.
    fn resolve_table(&self, entity: &'static EntityInfo) -> String;
}

/// Resolves the column descriptor used to build staging buffers.
pub trait DataColumnResolver: Debug + Send + Sync {
    /// Column name and value domain.
    ///
    /// # Errors
    ///
    /// Returns an error when the member is not primitive-shaped.
    fn resolve_data_column(&self, property: &Property) -> Result<DataColumn>;
}

/// Resolves the member relating two types.
pub trait ForeignKeyPropertyResolver: Debug + Send + Sync {
    /// Foreign key member relating `source` to `including`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignKeyNotFound`] when no enabled matcher applies.
    fn resolve_foreign_key(
        &self, source: &'static EntityInfo, including: &'static EntityInfo,
    ) -> Result<ForeignKey>;
}

/// Key member of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProperty {
    /// The key member.
    pub property: Property,
    /// Whether the database generates the value on insert.
    pub is_identity: bool,
}

/// Column descriptor for a staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    /// Column name, never escaped.
    pub name: String,
    /// Value domain.
    pub kind: ValueKind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

/// How two types relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// The source holds the foreign key of a single related row.
    OneToOne,
    /// The related type holds the foreign key back to the source.
    OneToMany,
}

/// Foreign key member and relation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Member holding the foreign key. Owned by the source for one-to-one relations and by the
    /// including type for one-to-many relations.
    pub property: Property,
    /// Relation kind.
    pub relation: Relation,
}

/// Maps primitive-shaped members only.
///
/// Scalar values (booleans, numbers, characters and enumerations) are always mapped. Other
/// value kinds are mapped when they are on the allow-list. Navigation members never are.
#[derive(Debug, Clone)]
pub struct DefaultPropertyResolver {
    allowed: HashSet<ValueKind>,
}

impl Default for DefaultPropertyResolver {
    fn default() -> Self {
        let allowed = [
            ValueKind::String,
            ValueKind::Uuid,
            ValueKind::Decimal,
            ValueKind::Double,
            ValueKind::Float,
            ValueKind::Date,
            ValueKind::Time,
            ValueKind::DateTime,
            ValueKind::DateTimeOffset,
            ValueKind::Duration,
            ValueKind::Bytes,
        ];
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl DefaultPropertyResolver {
    /// Add `kind` to the allow-list.
    #[must_use]
    pub fn allow(mut self, kind: ValueKind) -> Self {
        self.allowed.insert(kind);
        self
    }

    /// Remove `kind` from the allow-list. Scalar kinds are always mapped.
    #[must_use]
    pub fn disallow(mut self, kind: ValueKind) -> Self {
        self.allowed.remove(&kind);
        self
    }

    /// Whether members of `field_type` are mapped.
    #[must_use]
    pub fn is_primitive(&self, field_type: FieldType) -> bool {
        field_type.kind().is_some_and(|kind| kind.is_scalar() || self.allowed.contains(&kind))
    }
}

impl PropertyResolver for DefaultPropertyResolver {
    fn resolve_properties(&self, entity: &'static EntityInfo) -> Vec<Property> {
        entity
            .fields()
            .iter()
            .filter(|field| self.is_primitive(field.field_type()))
            .map(|field| Property::new(entity, field))
            .collect()
    }
}

/// Key is the member annotated `#[orm(key)]` or named `id`, and is always an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyPropertyResolver;

impl KeyPropertyResolver for DefaultKeyPropertyResolver {
    fn resolve_key(
        &self, entity: &'static EntityInfo, properties: &[Property],
    ) -> Result<KeyProperty> {
        let mut candidates = properties
            .iter()
            .filter(|p| p.field().is_key() || p.name().eq_ignore_ascii_case("id"));

        match (candidates.next(), candidates.next()) {
            (Some(property), None) => Ok(KeyProperty {
                property: property.clone(),
                is_identity: true,
            }),
            (None, _) => Err(Error::KeyNotFound(entity.type_name().to_string())),
            (Some(_), Some(_)) => Err(Error::MultipleKeys(entity.type_name().to_string())),
        }
    }
}

/// Column is the `#[orm(column = "...")]` annotation, else the member name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultColumnNameResolver;

impl ColumnNameResolver for DefaultColumnNameResolver {
    fn resolve_column(&self, property: &Property) -> String {
        property.field().column_annotation().unwrap_or_else(|| property.name()).to_string()
    }
}

/// Table is the `#[orm(table = "...")]` annotation, else the pluralized type name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTableNameResolver;

impl TableNameResolver for DefaultTableNameResolver {
    fn resolve_table(&self, entity: &'static EntityInfo) -> String {
        if let Some(table) = entity.table_annotation() {
            return match table.schema {
                Some(schema) => format!("{schema}.{}", table.name),
                None => table.name.to_string(),
            };
        }

        let mut name = entity.name();
        if entity.is_interface() {
            name = name.strip_prefix('I').unwrap_or(name);
        }
        pluralize(name)
    }
}

/// Pluralize a type name: `Category` → `Categories`, `Product` → `Products`, `Products` is
/// left as is.
#[must_use]
pub fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix(['y', 'Y']) {
        format!("{stem}ies")
    } else if name.ends_with(['s', 'S']) {
        name.to_string()
    } else {
        format!("{name}s")
    }
}

/// Data column named like [`DefaultColumnNameResolver`], typed by the member's value kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDataColumnResolver;

impl DataColumnResolver for DefaultDataColumnResolver {
    fn resolve_data_column(&self, property: &Property) -> Result<DataColumn> {
        let name = DefaultColumnNameResolver.resolve_column(property);
        data_column(property, name)
    }
}

pub(crate) fn data_column(property: &Property, name: String) -> Result<DataColumn> {
    let field = property.field();
    let kind = field.field_type().kind().ok_or_else(|| Error::UnknownMember {
        type_name: property.owner().type_name().to_string(),
        member: property.name().to_string(),
    })?;
    Ok(DataColumn {
        name,
        kind,
        nullable: field.is_nullable(),
    })
}

/// Two-stage foreign key resolution.
///
/// Stage one looks for a one-to-one relation:
/// - a member `{Including}Id` on the source;
/// - else a navigation member of the including type annotated `#[orm(foreign_key = "...")]`,
///   naming a source member.
///
/// Stage two looks for a one-to-many relation:
/// - a member `{Source}Id` on the including type;
/// - else a `Vec<Including>` navigation member annotated with a foreign key, naming a member of
///   the including type.
///
/// Names match ignoring case and underscores, so `category_id` matches `CategoryId`. Either
/// matcher can be switched off. When nothing matches, resolution fails with
/// [`Error::ForeignKeyNotFound`]; a navigation member is never related by name alone.
#[derive(Debug, Clone, Copy)]
pub struct DefaultForeignKeyPropertyResolver {
    naming: bool,
    annotations: bool,
}

impl Default for DefaultForeignKeyPropertyResolver {
    fn default() -> Self {
        Self {
            naming: true,
            annotations: true,
        }
    }
}

impl DefaultForeignKeyPropertyResolver {
    /// Enable or disable `{Type}Id` naming conventions.
    #[must_use]
    pub const fn naming(mut self, enabled: bool) -> Self {
        self.naming = enabled;
        self
    }

    /// Enable or disable `#[orm(foreign_key)]` annotations on navigation members.
    #[must_use]
    pub const fn annotations(mut self, enabled: bool) -> Self {
        self.annotations = enabled;
        self
    }

    fn by_name(
        &self, owner: &'static EntityInfo, related: &'static EntityInfo,
    ) -> Option<Property> {
        if !self.naming {
            return None;
        }
        let expected = format!("{}id", normalize(related.name()));
        owner
            .fields()
            .iter()
            .find(|field| normalize(field.name()) == expected)
            .map(|field| Property::new(owner, field))
    }

    fn by_annotation(
        &self, source: &'static EntityInfo, including: &'static EntityInfo,
        navigation: fn(&FieldInfo) -> Option<&'static EntityInfo>, target: &'static EntityInfo,
    ) -> Option<Property> {
        if !self.annotations {
            return None;
        }
        source
            .fields()
            .iter()
            .filter(|field| {
                navigation(field).is_some_and(|e| e.type_id() == including.type_id())
            })
            .find_map(|field| field.foreign_key_annotation())
            .and_then(|member| Property::named(target, member))
    }
}

impl ForeignKeyPropertyResolver for DefaultForeignKeyPropertyResolver {
    fn resolve_foreign_key(
        &self, source: &'static EntityInfo, including: &'static EntityInfo,
    ) -> Result<ForeignKey> {
        let one_to_one = self
            .by_name(source, including)
            .or_else(|| self.by_annotation(source, including, single_navigation, source));
        if let Some(property) = one_to_one {
            return Ok(ForeignKey {
                property,
                relation: Relation::OneToOne,
            });
        }

        let one_to_many = self
            .by_name(including, source)
            .or_else(|| self.by_annotation(source, including, collection_navigation, including));
        if let Some(property) = one_to_many {
            return Ok(ForeignKey {
                property,
                relation: Relation::OneToMany,
            });
        }

        Err(Error::ForeignKeyNotFound {
            source_type: source.type_name().to_string(),
            including_type: including.type_name().to_string(),
        })
    }
}

fn single_navigation(field: &FieldInfo) -> Option<&'static EntityInfo> {
    match field.field_type() {
        FieldType::Entity(target) => Some(target.info()),
        FieldType::Value(_) | FieldType::Collection(_) => None,
    }
}

fn collection_navigation(field: &FieldInfo) -> Option<&'static EntityInfo> {
    match field.field_type() {
        FieldType::Collection(target) => Some(target.info()),
        FieldType::Value(_) | FieldType::Entity(_) => None,
    }
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_names() {
        assert_eq!(pluralize("Product"), "Products");
        assert_eq!(pluralize("Products"), "Products");
        assert_eq!(pluralize("PRODUCTS"), "PRODUCTS");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("CATEGORY"), "CATEGORies");
        assert_eq!(pluralize("Foo"), "Foos");
    }

    #[test]
    fn normalized_names() {
        assert_eq!(normalize("category_id"), "categoryid");
        assert_eq!(normalize("CategoryId"), "categoryid");
    }

    #[test]
    fn allow_list() {
        let resolver = DefaultPropertyResolver::default();
        assert!(resolver.is_primitive(FieldType::Value(ValueKind::String)));
        assert!(resolver.is_primitive(FieldType::Value(ValueKind::Enum)));
        assert!(!resolver.is_primitive(FieldType::Value(ValueKind::Json)));

        let resolver = resolver.allow(ValueKind::Json).disallow(ValueKind::String);
        assert!(resolver.is_primitive(FieldType::Value(ValueKind::Json)));
        assert!(!resolver.is_primitive(FieldType::Value(ValueKind::String)));

        // scalars cannot be removed
        let resolver = resolver.disallow(ValueKind::Int);
        assert!(resolver.is_primitive(FieldType::Value(ValueKind::Int)));
    }
}
