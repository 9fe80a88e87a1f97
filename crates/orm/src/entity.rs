use std::any::{Any, TypeId, type_name};
use std::fmt::{self, Debug};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_query::Value;
use uuid::Uuid;

/// Trait for types mapped to a database table.
///
/// Typically implemented with `#[derive(Entity)]` rather than manually. The derive builds the
/// [`EntityInfo`] accessor table once, on first use.
pub trait Entity: Send + Sync + 'static {
    /// Structural description of the type.
    fn entity_info() -> &'static EntityInfo;
}

/// Trait for member types that can be mapped to and from column values.
///
/// Implemented for the standard scalar types, `Option<T>`, `Vec<T: Entity>` (navigation
/// collections), and every derived [`Entity`] (navigation members). Enumerations implement it
/// manually, reporting [`ValueKind::Enum`].
pub trait Mapped: Sized + 'static {
    /// Shape of the member.
    fn field_type() -> FieldType;

    /// Whether the member accepts NULL.
    #[must_use]
    fn nullable() -> bool {
        false
    }

    /// Column value for the member, `None` when the member has no column representation.
    fn to_value(&self) -> Option<Value> {
        None
    }

    /// Typed NULL for the member.
    #[must_use]
    fn null_value() -> Option<Value> {
        match Self::field_type() {
            FieldType::Value(kind) => Some(kind.null()),
            FieldType::Entity(_) | FieldType::Collection(_) => None,
        }
    }

    /// Build the member from a column value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to the member type.
    fn from_value(_value: Value) -> Result<Self> {
        bail!("column values cannot be assigned to {}", type_name::<Self>())
    }
}

/// Value domain of a primitive-shaped member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `bool`
    Bool,
    /// `i8`
    TinyInt,
    /// `i16`
    SmallInt,
    /// `i32`
    Int,
    /// `i64`
    BigInt,
    /// `u8`
    TinyUnsigned,
    /// `u16`
    SmallUnsigned,
    /// `u32`
    Unsigned,
    /// `u64`
    BigUnsigned,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `char`
    Char,
    /// `rust_decimal::Decimal`
    Decimal,
    /// `String`
    String,
    /// `uuid::Uuid`
    Uuid,
    /// `chrono::NaiveDate`
    Date,
    /// `chrono::NaiveTime`
    Time,
    /// `chrono::NaiveDateTime` and `DateTime<Utc>`
    DateTime,
    /// `DateTime<FixedOffset>`
    DateTimeOffset,
    /// `std::time::Duration`, stored as whole microseconds
    Duration,
    /// `Vec<u8>`
    Bytes,
    /// `serde_json::Value`
    Json,
    /// User enumerations
    Enum,
}

impl ValueKind {
    /// Scalar value types: booleans, numbers, characters and enumerations.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::TinyInt
                | Self::SmallInt
                | Self::Int
                | Self::BigInt
                | Self::TinyUnsigned
                | Self::SmallUnsigned
                | Self::Unsigned
                | Self::BigUnsigned
                | Self::Float
                | Self::Double
                | Self::Char
                | Self::Enum
        )
    }

    /// Typed NULL for the kind.
    #[must_use]
    pub const fn null(self) -> Value {
        match self {
            Self::Bool => Value::Bool(None),
            Self::TinyInt => Value::TinyInt(None),
            Self::SmallInt => Value::SmallInt(None),
            Self::Int | Self::Enum => Value::Int(None),
            Self::BigInt | Self::Duration => Value::BigInt(None),
            Self::TinyUnsigned => Value::TinyUnsigned(None),
            Self::SmallUnsigned => Value::SmallUnsigned(None),
            Self::Unsigned => Value::Unsigned(None),
            Self::BigUnsigned => Value::BigUnsigned(None),
            Self::Float => Value::Float(None),
            Self::Double => Value::Double(None),
            Self::Char => Value::Char(None),
            Self::Decimal => Value::Decimal(None),
            Self::String => Value::String(None),
            Self::Uuid => Value::Uuid(None),
            Self::Date => Value::ChronoDate(None),
            Self::Time => Value::ChronoTime(None),
            Self::DateTime => Value::ChronoDateTime(None),
            Self::DateTimeOffset => Value::ChronoDateTimeWithTimeZone(None),
            Self::Bytes => Value::Bytes(None),
            Self::Json => Value::Json(None),
        }
    }
}

/// Handle to another entity's metadata, resolved lazily so self-referencing types work.
#[derive(Clone, Copy)]
pub struct EntityRef {
    info: fn() -> &'static EntityInfo,
}

impl EntityRef {
    /// Handle for `E`.
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self { info: E::entity_info }
    }

    /// Metadata of the referenced entity.
    #[must_use]
    pub fn info(&self) -> &'static EntityInfo {
        (self.info)()
    }
}

impl Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.info().name()).finish()
    }
}

/// Shape of a member.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// A column value.
    Value(ValueKind),
    /// A navigation member holding another entity.
    Entity(EntityRef),
    /// A navigation member holding a collection of entities.
    Collection(EntityRef),
}

impl FieldType {
    /// The value kind, if the member is primitive-shaped.
    #[must_use]
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Value(kind) => Some(*kind),
            Self::Entity(_) | Self::Collection(_) => None,
        }
    }

    /// The referenced entity type, if the member is a navigation member.
    #[must_use]
    pub fn entity(&self) -> Option<&'static EntityInfo> {
        match self {
            Self::Value(_) => None,
            Self::Entity(target) | Self::Collection(target) => Some(target.info()),
        }
    }
}

/// `#[orm(table = "...", schema = "...")]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAnnotation {
    /// Table name.
    pub name: &'static str,
    /// Optional schema.
    pub schema: Option<&'static str>,
}

type Getter = Box<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Any, Value) -> Result<()> + Send + Sync>;

/// Structural description of an entity type: its annotations and compiled member accessors.
#[derive(Debug)]
pub struct EntityInfo {
    name: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    table: Option<TableAnnotation>,
    interface: bool,
    fields: Vec<FieldInfo>,
}

impl EntityInfo {
    /// Start describing `E`, named `name`.
    #[must_use]
    pub fn new<E: 'static>(name: &'static str) -> Self {
        Self {
            name,
            type_name: type_name::<E>(),
            type_id: TypeId::of::<E>(),
            table: None,
            interface: false,
            fields: Vec::new(),
        }
    }

    /// Set the table annotation.
    #[must_use]
    pub const fn table(mut self, name: &'static str, schema: Option<&'static str>) -> Self {
        self.table = Some(TableAnnotation { name, schema });
        self
    }

    /// Mark the type as interface-shaped.
    #[must_use]
    pub const fn interface(mut self) -> Self {
        self.interface = true;
        self
    }

    /// Add a member.
    #[must_use]
    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Short type name, as written in source.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Fully qualified type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Stable type identity.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Table annotation, if any.
    #[must_use]
    pub const fn table_annotation(&self) -> Option<TableAnnotation> {
        self.table
    }

    /// Whether the type is interface-shaped.
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.interface
    }

    /// Members in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Member by name.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A member of an entity with its annotations and compiled accessors.
pub struct FieldInfo {
    name: &'static str,
    field_type: FieldType,
    nullable: bool,
    key: bool,
    column: Option<&'static str>,
    foreign_key: Option<&'static str>,
    get: Getter,
    set: Setter,
}

impl FieldInfo {
    /// Describe member `name` of `E`, of type `T`, reached through `get` and `get_mut`.
    #[must_use]
    pub fn new<E: 'static, T: Mapped>(
        name: &'static str, get: fn(&E) -> &T, get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        Self {
            name,
            field_type: T::field_type(),
            nullable: T::nullable(),
            key: false,
            column: None,
            foreign_key: None,
            get: Box::new(move |entity| entity.downcast_ref::<E>().and_then(|e| get(e).to_value())),
            set: Box::new(move |entity, value| {
                let Some(entity) = entity.downcast_mut::<E>() else {
                    bail!("expected an instance of {}", type_name::<E>());
                };
                *get_mut(entity) = T::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// Annotate as key.
    #[must_use]
    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Annotate the column name.
    #[must_use]
    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Annotate the foreign key member this navigation member relates through.
    #[must_use]
    pub const fn foreign_key(mut self, member: &'static str) -> Self {
        self.foreign_key = Some(member);
        self
    }

    /// Member name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Member shape.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the member is an `Option`.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the member carries the key annotation.
    #[must_use]
    pub const fn is_key(&self) -> bool {
        self.key
    }

    /// Column annotation.
    #[must_use]
    pub const fn column_annotation(&self) -> Option<&'static str> {
        self.column
    }

    /// Foreign key annotation.
    #[must_use]
    pub const fn foreign_key_annotation(&self) -> Option<&'static str> {
        self.foreign_key
    }

    /// Read the member from `entity`.
    #[must_use]
    pub fn get(&self, entity: &dyn Any) -> Option<Value> {
        (self.get)(entity)
    }

    /// Assign `value` to the member of `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error if `entity` is not the owning type or the value does not convert.
    pub fn set(&self, entity: &mut dyn Any, value: Value) -> Result<()> {
        (self.set)(entity, value)
    }
}

impl Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("key", &self.key)
            .field("column", &self.column)
            .field("foreign_key", &self.foreign_key)
            .finish_non_exhaustive()
    }
}

/// Whether `value` is a (typed) NULL.
#[must_use]
pub const fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
            | Value::Uuid(None)
            | Value::Decimal(None)
    )
}

macro_rules! mapped {
    ($ty:ty, $kind:ident, $from:ident) => {
        impl Mapped for $ty {
            fn field_type() -> FieldType {
                FieldType::Value(ValueKind::$kind)
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::from(self.clone()))
            }

            fn from_value(value: Value) -> Result<Self> {
                $from(value)
            }
        }
    };
}

macro_rules! mapped_integer {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Mapped for $ty {
                fn field_type() -> FieldType {
                    FieldType::Value(ValueKind::$kind)
                }

                fn to_value(&self) -> Option<Value> {
                    Some(Value::from(*self))
                }

                fn from_value(value: Value) -> Result<Self> {
                    let raw = as_integer(&value)?;
                    <$ty>::try_from(raw)
                        .map_err(|_e| anyhow!("{raw} is out of range for {}", stringify!($ty)))
                }
            }
        )*
    };
}

mapped_integer!(
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => TinyUnsigned,
    u16 => SmallUnsigned,
    u32 => Unsigned,
    u64 => BigUnsigned,
);

mapped!(String, String, as_string);
mapped!(Vec<u8>, Bytes, as_binary);
mapped!(Uuid, Uuid, as_uuid);
mapped!(Decimal, Decimal, as_decimal);
mapped!(NaiveDate, Date, as_date);
mapped!(NaiveTime, Time, as_time);
mapped!(NaiveDateTime, DateTime, as_naive_timestamp);
mapped!(DateTime<Utc>, DateTime, as_timestamp);
mapped!(DateTime<FixedOffset>, DateTimeOffset, as_timestamp_offset);
mapped!(serde_json::Value, Json, as_json);

impl Mapped for bool {
    fn field_type() -> FieldType {
        FieldType::Value(ValueKind::Bool)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Bool(Some(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(Some(v)) => Ok(v),
            other => Ok(as_integer(&other).map_err(|_e| anyhow!("expected boolean value"))? != 0),
        }
    }
}

impl Mapped for char {
    fn field_type() -> FieldType {
        FieldType::Value(ValueKind::Char)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Char(Some(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Char(Some(v)) => Ok(v),
            Value::String(Some(raw)) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(ch),
                    _ => bail!("expected a single character, got '{raw}'"),
                }
            }
            _ => bail!("expected char value"),
        }
    }
}

impl Mapped for f32 {
    fn field_type() -> FieldType {
        FieldType::Value(ValueKind::Float)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Float(Some(*self)))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(Some(v)) => Ok(v),
            other => as_f64(&other).map(|v| v as Self),
        }
    }
}

impl Mapped for f64 {
    fn field_type() -> FieldType {
        FieldType::Value(ValueKind::Double)
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Double(Some(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        as_f64(&value)
    }
}

impl Mapped for Duration {
    fn field_type() -> FieldType {
        FieldType::Value(ValueKind::Duration)
    }

    fn to_value(&self) -> Option<Value> {
        let micros = i64::try_from(self.as_micros()).unwrap_or(i64::MAX);
        Some(Value::BigInt(Some(micros)))
    }

    fn from_value(value: Value) -> Result<Self> {
        let micros = as_integer(&value)?;
        let micros = u64::try_from(micros).map_err(|_e| anyhow!("negative duration: {micros}"))?;
        Ok(Self::from_micros(micros))
    }
}

impl<T: Mapped> Mapped for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }

    fn nullable() -> bool {
        true
    }

    fn to_value(&self) -> Option<Value> {
        match self {
            Some(inner) => inner.to_value(),
            None => T::null_value(),
        }
    }

    fn null_value() -> Option<Value> {
        T::null_value()
    }

    fn from_value(value: Value) -> Result<Self> {
        if is_null(&value) { Ok(None) } else { T::from_value(value).map(Some) }
    }
}

impl<T: Entity> Mapped for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::Collection(EntityRef::of::<T>())
    }
}

// Inbound conversion. Drivers report column values in their own widths, so numeric and
// temporal conversions accept any compatible representation.

fn as_integer(value: &Value) -> Result<i128> {
    let raw = match value {
        Value::Bool(Some(v)) => i128::from(*v),
        Value::TinyInt(Some(v)) => i128::from(*v),
        Value::SmallInt(Some(v)) => i128::from(*v),
        Value::Int(Some(v)) => i128::from(*v),
        Value::BigInt(Some(v)) => i128::from(*v),
        Value::TinyUnsigned(Some(v)) => i128::from(*v),
        Value::SmallUnsigned(Some(v)) => i128::from(*v),
        Value::Unsigned(Some(v)) => i128::from(*v),
        Value::BigUnsigned(Some(v)) => i128::from(*v),
        Value::Decimal(Some(v)) if v.fract().is_zero() => {
            v.to_i128().ok_or_else(|| anyhow!("decimal {v} is not an integer"))?
        }
        Value::String(Some(raw)) => {
            raw.trim().parse().map_err(|_e| anyhow!("expected integer value, got '{raw}'"))?
        }
        _ => bail!("expected integer value"),
    };
    Ok(raw)
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Float(Some(v)) => Ok(f64::from(*v)),
        Value::Double(Some(v)) => Ok(*v),
        Value::Decimal(Some(v)) => {
            v.to_f64().ok_or_else(|| anyhow!("decimal {v} does not fit a double"))
        }
        other => as_integer(other).map(|v| v as f64).map_err(|_e| anyhow!("expected double value")),
    }
}

fn as_string(value: Value) -> Result<String> {
    match value {
        Value::String(Some(raw)) => Ok(*raw),
        Value::Char(Some(ch)) => Ok(ch.to_string()),
        _ => bail!("expected string value"),
    }
}

fn as_binary(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(Some(bytes)) => Ok(*bytes),
        _ => bail!("expected binary value"),
    }
}

fn as_uuid(value: Value) -> Result<Uuid> {
    match value {
        Value::Uuid(Some(id)) => Ok(*id),
        Value::String(Some(raw)) => {
            Uuid::parse_str(&raw).map_err(|_e| anyhow!("unsupported uuid: {raw}"))
        }
        Value::Bytes(Some(bytes)) => {
            Uuid::from_slice(&bytes).map_err(|_e| anyhow!("expected 16 bytes for uuid"))
        }
        _ => bail!("expected uuid value"),
    }
}

fn as_decimal(value: Value) -> Result<Decimal> {
    match value {
        Value::Decimal(Some(v)) => Ok(*v),
        Value::String(Some(raw)) => {
            raw.parse().map_err(|_e| anyhow!("unsupported decimal: {raw}"))
        }
        Value::Float(Some(v)) => {
            Decimal::try_from(v).map_err(|_e| anyhow!("{v} does not fit a decimal"))
        }
        Value::Double(Some(v)) => {
            Decimal::try_from(v).map_err(|_e| anyhow!("{v} does not fit a decimal"))
        }
        other => {
            let raw = as_integer(&other).map_err(|_e| anyhow!("expected decimal value"))?;
            Decimal::try_from_i128_with_scale(raw, 0)
                .map_err(|_e| anyhow!("{raw} does not fit a decimal"))
        }
    }
}

fn as_date(value: Value) -> Result<NaiveDate> {
    match value {
        Value::ChronoDate(Some(date)) => Ok(*date),
        Value::ChronoDateTime(Some(dt)) => Ok(dt.date()),
        Value::String(Some(raw)) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_e| anyhow!("unsupported date: {raw}; expected \"%Y-%m-%d\" format")),
        _ => bail!("expected date value"),
    }
}

fn as_time(value: Value) -> Result<NaiveTime> {
    match value {
        Value::ChronoTime(Some(time)) => Ok(*time),
        Value::String(Some(raw)) => NaiveTime::parse_from_str(&raw, "%H:%M:%S%.f")
            .map_err(|_e| anyhow!("unsupported time: {raw}; expected \"%H:%M:%S%.f\" format")),
        _ => bail!("expected time value"),
    }
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn as_naive_timestamp(value: Value) -> Result<NaiveDateTime> {
    match value {
        Value::ChronoDateTime(Some(dt)) => Ok(*dt),
        Value::ChronoDateTimeUtc(Some(dt)) => Ok(dt.naive_utc()),
        Value::String(Some(raw)) => parse_naive(&raw).ok_or_else(|| {
            anyhow!("unsupported timestamp: {raw}; expected \"%Y-%m-%d %H:%M:%S%.f\" format")
        }),
        _ => bail!("expected timestamp value"),
    }
}

fn as_timestamp(value: Value) -> Result<DateTime<Utc>> {
    match value {
        Value::ChronoDateTimeUtc(Some(dt)) => Ok(*dt),
        Value::ChronoDateTimeWithTimeZone(Some(dt)) => Ok(dt.with_timezone(&Utc)),
        Value::ChronoDateTime(Some(dt)) => Ok(DateTime::from_naive_utc_and_offset(*dt, Utc)),
        Value::String(Some(raw)) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
                return Ok(parsed.with_timezone(&Utc));
            }
            if let Some(parsed) = parse_naive(&raw) {
                return Ok(DateTime::from_naive_utc_and_offset(parsed, Utc));
            }
            bail!(
                "unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format"
            )
        }
        _ => bail!("expected timestamp value"),
    }
}

fn as_timestamp_offset(value: Value) -> Result<DateTime<FixedOffset>> {
    match value {
        Value::ChronoDateTimeWithTimeZone(Some(dt)) => Ok(*dt),
        Value::ChronoDateTimeUtc(Some(dt)) => Ok(dt.fixed_offset()),
        Value::String(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
            .map_err(|_e| anyhow!("unsupported timestamp: {raw}; expected RFC3339 format")),
        _ => bail!("expected timestamp with offset value"),
    }
}

fn as_json(value: Value) -> Result<serde_json::Value> {
    match value {
        Value::Json(Some(json)) => Ok(*json),
        Value::String(Some(raw)) => Ok(serde_json::from_str(&raw)?),
        Value::Bytes(Some(bytes)) => Ok(serde_json::from_slice(&bytes)?),
        _ => bail!("expected json compatible value"),
    }
}
