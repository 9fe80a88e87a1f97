use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use crate::catalog::Catalog;
use crate::entity::{EntityInfo, ValueKind};
use crate::error::Result;
use crate::property::Property;
use crate::resolver::DataColumn;

/// Name of the synthetic correlation column.
pub const ROW_SEQ: &str = "__row_seq";

/// Bulk operation metadata for one entity type, with or without the correlation column.
///
/// SQL fragments are computed on first use and reused verbatim afterwards, so the
/// destination schema is assumed not to change for the lifetime of the engine.
#[derive(Debug)]
pub struct BulkMetadata {
    destination: Arc<str>,
    staging: String,
    columns: Vec<DataColumn>,
    members: Vec<Option<Property>>,
    key: Property,
    key_column: DataColumn,
    is_identity: bool,
    correlated: bool,
    create_staging: OnceLock<String>,
    update_merge: OnceLock<String>,
    upsert_merge: OnceLock<String>,
    delete_merge: OnceLock<String>,
}

impl BulkMetadata {
    /// Resolve the bulk metadata of `entity`. With `correlated` the staging table carries
    /// the `__row_seq` column.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key cannot be resolved or a member is not
    /// primitive-shaped.
    pub fn resolve(
        catalog: &Catalog, entity: &'static EntityInfo, correlated: bool,
    ) -> Result<Self> {
        let destination = catalog.table_of(entity);
        let key = catalog.key_property_of(entity)?;

        let mut columns = Vec::new();
        let mut members = Vec::new();
        for property in catalog.properties_of(entity).iter() {
            columns.push(catalog.data_column(property)?);
            members.push(Some(property.clone()));
        }
        if correlated {
            columns.push(DataColumn {
                name: ROW_SEQ.to_string(),
                kind: ValueKind::Int,
                nullable: false,
            });
            members.push(None);
        }

        Ok(Self {
            staging: format!("#{}", staging_name(&destination)),
            destination,
            columns,
            members,
            key_column: catalog.data_column(&key.property)?,
            key: key.property,
            is_identity: key.is_identity,
            correlated,
            create_staging: OnceLock::new(),
            update_merge: OnceLock::new(),
            upsert_merge: OnceLock::new(),
            delete_merge: OnceLock::new(),
        })
    }

    /// Destination table, as resolved by the catalog.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Session temporary table rows are staged into.
    #[must_use]
    pub fn staging(&self) -> &str {
        &self.staging
    }

    /// Temporary table capturing generated identities.
    #[must_use]
    pub fn output(&self) -> String {
        format!("{}_output", self.staging)
    }

    /// Staging columns, in buffer order.
    #[must_use]
    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    /// Member behind each staging column; `None` for the correlation column.
    #[must_use]
    pub fn members(&self) -> &[Option<Property>] {
        &self.members
    }

    /// Key member.
    #[must_use]
    pub const fn key(&self) -> &Property {
        &self.key
    }

    /// Join column.
    #[must_use]
    pub const fn key_column(&self) -> &DataColumn {
        &self.key_column
    }

    /// Whether the key is server-generated.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.is_identity
    }

    /// Whether rows carry the correlation column.
    #[must_use]
    pub const fn is_correlated(&self) -> bool {
        self.correlated
    }

    /// Query returning the `CREATE TABLE` statement of the staging table, built from the
    /// physical column types of the destination.
    #[must_use]
    pub fn discovery_query(&self) -> String {
        let row_seq = if self.correlated { format!(", [{ROW_SEQ}] int") } else { String::new() };
        format!(
            "SELECT N'CREATE TABLE {staging}(' + STUFF((\
             SELECT N', [' + c.name + '] ' + CASE \
             WHEN t.name IN ('varchar', 'nvarchar', 'char', 'nchar', 'binary', 'varbinary') \
             THEN IIF(c.max_length = -1, t.name + '(max)', t.name + '(' + CONVERT(nvarchar(10), \
             IIF(t.name IN ('nvarchar', 'nchar'), c.max_length / 2, c.max_length)) + ')') \
             WHEN t.name IN ('numeric', 'decimal') \
             THEN t.name + '(' + CONVERT(nvarchar(10), c.precision) + ', ' + \
             CONVERT(nvarchar(10), c.scale) + ')' \
             ELSE t.name END \
             FROM sys.columns c INNER JOIN sys.types t ON c.user_type_id = t.user_type_id \
             WHERE c.object_id = OBJECT_ID('{destination}') ORDER BY c.column_id \
             FOR XML PATH(''), TYPE).value('text()[1]', 'nvarchar(max)'), 1, 2, N'') + \
             N'{row_seq});'",
            staging = self.staging,
            destination = self.destination.replace('\'', "''"),
        )
    }

    /// `CREATE TABLE` statement synthesized from the member kinds, used when discovery yields
    /// nothing.
    #[must_use]
    pub fn synthesized_staging(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "NULL" } else { "NOT NULL" };
                format!("[{}] {} {null}", c.name, sql_type(c.kind))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {}({columns});", self.staging)
    }

    /// Memoized staging statement.
    #[must_use]
    pub fn create_staging(&self) -> Option<&str> {
        self.create_staging.get().map(String::as_str)
    }

    /// Memoize `sql` as the staging statement. The first stored statement wins.
    pub fn set_create_staging(&self, sql: String) -> &str {
        self.create_staging.get_or_init(|| sql)
    }

    /// `MERGE` updating matched rows.
    #[must_use]
    pub fn update_merge(&self) -> &str {
        self.update_merge.get_or_init(|| {
            format!(
                "{} WHEN MATCHED THEN {}; DROP TABLE {};",
                self.merge_head(),
                self.update_set(),
                self.staging
            )
        })
    }

    /// `MERGE` updating matched rows and inserting the rest. Callers append the optional
    /// clauses and the terminator.
    #[must_use]
    pub fn upsert_merge(&self) -> &str {
        self.upsert_merge.get_or_init(|| {
            let mut sql = self.merge_head();
            if self.updatable().next().is_some() {
                let _ = write!(sql, " WHEN MATCHED THEN {}", self.update_set());
            }
            let columns: Vec<&str> = self.insertable().collect();
            let _ = write!(
                sql,
                " WHEN NOT MATCHED BY TARGET THEN INSERT ({}) VALUES ({})",
                columns.iter().map(|c| format!("[{c}]")).collect::<Vec<_>>().join(", "),
                columns.iter().map(|c| format!("Source.[{c}]")).collect::<Vec<_>>().join(", ")
            );
            sql
        })
    }

    /// `MERGE` deleting matched rows.
    #[must_use]
    pub fn delete_merge(&self) -> &str {
        self.delete_merge.get_or_init(|| {
            format!("{} WHEN MATCHED THEN DELETE; DROP TABLE {};", self.merge_head(), self.staging)
        })
    }

    /// Whether any column besides the key can be updated.
    #[must_use]
    pub fn has_updatable_columns(&self) -> bool {
        self.updatable().next().is_some()
    }

    fn merge_head(&self) -> String {
        let key = &self.key_column.name;
        format!(
            "MERGE INTO {} WITH (HOLDLOCK) AS Target USING {} AS Source \
             ON Target.[{key}] = Source.[{key}]",
            self.destination, self.staging
        )
    }

    fn update_set(&self) -> String {
        let assignments = self
            .updatable()
            .map(|c| format!("Target.[{c}] = Source.[{c}]"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE SET {assignments}")
    }

    fn updatable(&self) -> impl Iterator<Item = &str> {
        self.data_columns().filter(|c| *c != self.key_column.name)
    }

    fn insertable(&self) -> impl Iterator<Item = &str> {
        self.data_columns().filter(|c| !self.is_identity || *c != self.key_column.name)
    }

    fn data_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str()).filter(|c| *c != ROW_SEQ)
    }
}

/// T-SQL column type for a value kind.
#[must_use]
pub const fn sql_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Bool => "bit",
        ValueKind::TinyInt | ValueKind::TinyUnsigned => "tinyint",
        ValueKind::SmallInt => "smallint",
        ValueKind::Int | ValueKind::SmallUnsigned | ValueKind::Enum => "int",
        ValueKind::BigInt | ValueKind::Unsigned | ValueKind::Duration => "bigint",
        ValueKind::BigUnsigned => "decimal(20, 0)",
        ValueKind::Float => "real",
        ValueKind::Double => "float",
        ValueKind::Char => "nchar(1)",
        ValueKind::Decimal => "decimal(38, 10)",
        ValueKind::String | ValueKind::Json => "nvarchar(max)",
        ValueKind::Uuid => "uniqueidentifier",
        ValueKind::Date => "date",
        ValueKind::Time => "time",
        ValueKind::DateTime => "datetime2",
        ValueKind::DateTimeOffset => "datetimeoffset",
        ValueKind::Bytes => "varbinary(max)",
    }
}

// `[dbo].[Order Items]` stages into `#dbo_OrderItems`
fn staging_name(destination: &str) -> String {
    destination
        .chars()
        .filter_map(|c| match c {
            '.' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_names() {
        assert_eq!(staging_name("Products"), "Products");
        assert_eq!(staging_name("[dbo].[Order Items]"), "dbo_OrderItems");
        assert_eq!(staging_name("\"sales\".\"Orders\""), "sales_Orders");
    }

    #[test]
    fn sql_types() {
        assert_eq!(sql_type(ValueKind::Int), "int");
        assert_eq!(sql_type(ValueKind::String), "nvarchar(max)");
        assert_eq!(sql_type(ValueKind::Duration), "bigint");
        assert_eq!(sql_type(ValueKind::DateTimeOffset), "datetimeoffset");
    }
}
