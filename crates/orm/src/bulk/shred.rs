use sea_query::Value;

use crate::bulk::metadata::BulkMetadata;
use crate::connection::DataTable;
use crate::entity::{Entity, Mapped, is_null};
use crate::error::{Error, Result};

/// Which member values a shredded row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Every member.
    Full,
    /// The key only; every other column is NULL.
    KeyOnly,
    /// Every member except a server-generated key.
    WithoutIdentity,
}

/// Shred `entities` into a buffer for `destination`. The correlation column, when present,
/// holds the zero-based input index.
///
/// # Errors
///
/// Returns a conversion error when an input index does not fit the correlation column.
pub fn shred<T: Entity>(
    metadata: &BulkMetadata, entities: &[T], destination: &str, shape: Shape,
) -> Result<DataTable> {
    let skip_identity = shape == Shape::WithoutIdentity && metadata.is_identity();
    let included: Vec<usize> = metadata
        .members()
        .iter()
        .enumerate()
        .filter(|(_, member)| !(skip_identity && member.as_ref() == Some(metadata.key())))
        .map(|(index, _)| index)
        .collect();

    let columns = included.iter().map(|&i| metadata.columns()[i].clone()).collect();
    let mut table = DataTable::new(destination, columns);

    for (seq, entity) in entities.iter().enumerate() {
        let mut row = Vec::with_capacity(included.len());
        for &i in &included {
            let column = &metadata.columns()[i];
            let value = match &metadata.members()[i] {
                None => Value::Int(Some(row_seq(seq)?)),
                Some(member) if shape == Shape::KeyOnly && member != metadata.key() => {
                    column.kind.null()
                }
                Some(member) => member.get(entity).unwrap_or_else(|| column.kind.null()),
            };
            row.push(value);
        }
        table.rows.push(row);
    }

    Ok(table)
}

fn row_seq(seq: usize) -> Result<i32> {
    i32::try_from(seq).map_err(|e| Error::Conversion {
        member: super::metadata::ROW_SEQ.to_string(),
        reason: e.to_string(),
    })
}

/// Instances awaiting a generated identity, addressed by their input index.
///
/// Identities read back from the server arrive in no particular order; each one names the
/// index of the instance it belongs to.
pub struct PendingIdentities<'a, T> {
    pending: Vec<&'a mut T>,
}

impl<'a, T: Entity> PendingIdentities<'a, T> {
    /// Track every instance of `entities`, in input order.
    pub fn new(entities: &'a mut [T]) -> Self {
        Self {
            pending: entities.iter_mut().collect(),
        }
    }

    /// Number of tracked instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Assign `identity` to the key of the instance at input index `seq`. Returns whether an
    /// instance was found.
    ///
    /// Rows deleted by a pruning merge carry no sequence or identity and are skipped.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when `seq` is not an index or `identity` does not fit the
    /// key member.
    pub fn apply(&mut self, metadata: &BulkMetadata, seq: Value, identity: Value) -> Result<bool> {
        if is_null(&seq) || is_null(&identity) {
            return Ok(false);
        }
        let index = i64::from_value(seq).map_err(|e| Error::Conversion {
            member: super::metadata::ROW_SEQ.to_string(),
            reason: e.to_string(),
        })?;
        let Some(entity) = usize::try_from(index).ok().and_then(|i| self.pending.get_mut(i)) else {
            return Ok(false);
        };

        let key = metadata.key();
        key.set(&mut **entity, identity).map_err(|e| Error::Conversion {
            member: key.key().to_string(),
            reason: e.to_string(),
        })?;
        Ok(true)
    }
}
