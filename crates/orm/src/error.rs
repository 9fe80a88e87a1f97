//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while resolving metadata, generating SQL or running statements.
#[derive(Error, Debug)]
pub enum Error {
    // --- Configuration errors ---
    /// No member qualifies as the key of the type.
    #[error("Could not find the key property for type '{0}'.")]
    KeyNotFound(String),

    /// More than one member qualifies as the key of the type.
    #[error("Multiple key properties were found for type '{0}'.")]
    MultipleKeys(String),

    /// The fluent mapping for a type marks more than one member as key.
    #[error("Multiple key properties are mapped for type '{0}'.")]
    MappedKeys(String),

    /// Neither relation pattern matched the pair of types.
    #[error(
        "Could not resolve foreign key property. Source type '{source_type}'; including type: '{including_type}'."
    )]
    ForeignKeyNotFound {
        /// Type holding the relation.
        source_type: String,
        /// Type being included.
        including_type: String,
    },

    /// The dialect needs a key column to build the statement.
    #[error("{dialect} requires a key property to build {operation} statements for '{table}'")]
    KeyRequired {
        /// Dialect that rejected the statement.
        dialect: &'static str,
        /// Statement kind.
        operation: &'static str,
        /// Target table.
        table: String,
    },

    /// A member is not a mapped column.
    #[error("'{member}' is not a mapped column of type '{type_name}'")]
    UnknownMember {
        /// Owning type.
        type_name: String,
        /// Member that was asked for.
        member: String,
    },

    // --- Unsupported operations ---
    /// The dialect does not support the operation.
    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        /// Dialect name.
        dialect: String,
        /// Operation name.
        operation: &'static str,
    },

    // --- Value errors ---
    /// A value could not be converted to or from a member.
    #[error("conversion failed for '{member}': {reason}")]
    Conversion {
        /// Member key (`Type.member`).
        member: String,
        /// What went wrong.
        reason: String,
    },

    // --- Data access ---
    /// An error raised by the data-access collaborator, passed through unchanged.
    #[error(transparent)]
    Data(anyhow::Error),
}

impl Error {
    /// Returns `true` when the error reflects a mismatch between a type and the resolver
    /// policy, rather than a data access failure.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound(_)
                | Self::MultipleKeys(_)
                | Self::MappedKeys(_)
                | Self::ForeignKeyNotFound { .. }
                | Self::KeyRequired { .. }
                | Self::UnknownMember { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        // unwrap domain errors that travelled through an `anyhow` boundary
        match err.downcast::<Self>() {
            Ok(inner) => inner,
            Err(err) => Self::Data(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            Error::KeyNotFound("Foo".into()).to_string(),
            "Could not find the key property for type 'Foo'."
        );
        assert_eq!(
            Error::MultipleKeys("Foo".into()).to_string(),
            "Multiple key properties were found for type 'Foo'."
        );
        let err = Error::ForeignKeyNotFound {
            source_type: "Order".into(),
            including_type: "Customer".into(),
        };
        assert_eq!(
            err.to_string(),
            "Could not resolve foreign key property. Source type 'Order'; including type: 'Customer'."
        );
    }

    #[test]
    fn anyhow_round_trip() {
        let err: Error = anyhow::Error::new(Error::MultipleKeys("Foo".into())).into();
        assert!(matches!(err, Error::MultipleKeys(_)));
        assert!(err.is_configuration());

        let err: Error = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, Error::Data(_)));
        assert_eq!(err.to_string(), "connection reset");
    }
}
