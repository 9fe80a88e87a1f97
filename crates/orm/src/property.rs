use std::any::{Any, TypeId};
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use sea_query::Value;

use crate::entity::{EntityInfo, FieldInfo};

/// A member of an entity type, used as the unit of metadata resolution.
///
/// Equality and hashing use only the `"{Type}.{member}"` key, so two descriptors for the same
/// member are equal even when they were built from different metadata instances.
#[derive(Clone)]
pub struct Property {
    owner: &'static EntityInfo,
    field: &'static FieldInfo,
    key: Arc<str>,
}

impl Property {
    /// Descriptor for `field` of `owner`.
    #[must_use]
    pub fn new(owner: &'static EntityInfo, field: &'static FieldInfo) -> Self {
        let key = format!("{}.{}", owner.type_name(), field.name());
        Self {
            owner,
            field,
            key: key.into(),
        }
    }

    /// Descriptor for the member `name` of `owner`, if it exists.
    #[must_use]
    pub fn named(owner: &'static EntityInfo, name: &str) -> Option<Self> {
        owner.field_named(name).map(|field| Self::new(owner, field))
    }

    /// Composite `"{Type}.{member}"` key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Member name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.field.name()
    }

    /// Owning type.
    #[must_use]
    pub const fn owner(&self) -> &'static EntityInfo {
        self.owner
    }

    /// Identity of the owning type.
    #[must_use]
    pub const fn owner_id(&self) -> TypeId {
        self.owner.type_id()
    }

    /// Member metadata.
    #[must_use]
    pub const fn field(&self) -> &'static FieldInfo {
        self.field
    }

    /// Read the member from `entity`.
    #[must_use]
    pub fn get(&self, entity: &dyn Any) -> Option<Value> {
        self.field.get(entity)
    }

    /// Assign `value` to the member of `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error if `entity` is not the owning type or the value does not convert.
    pub fn set(&self, entity: &mut dyn Any, value: Value) -> anyhow::Result<()> {
        self.field.set(entity, value)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.key).finish()
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
