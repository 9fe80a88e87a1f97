//! Derive macro for `tablemap-orm` entities.

#![forbid(unsafe_code)]

mod entity;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Describes a struct to `tablemap-orm`.
///
/// Implements `Entity`, building the type's metadata and member accessors on first use, and
/// `Mapped`, so the type can appear as a navigation member of other entities.
///
/// # Attributes
///
/// On the struct:
/// - `#[orm(table = "Products")]` maps to an explicit table, optionally with
///   `schema = "dbo"`;
/// - `#[orm(interface)]` marks an interface-shaped type; a leading `I` is dropped from the
///   derived table name.
///
/// On fields:
/// - `#[orm(key)]` marks the key;
/// - `#[orm(column = "ProductName")]` maps to an explicit column;
/// - `#[orm(foreign_key = "category_id")]` names the member a navigation field relates
///   through;
/// - `#[orm(skip)]` leaves the field out of the metadata entirely.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, Default, Entity)]
/// #[orm(table = "tblProduct", schema = "dbo")]
/// pub struct Product {
///     #[orm(key)]
///     pub product_id: i32,
///     #[orm(column = "ProductName")]
///     pub name: String,
///     pub category_id: Option<i32>,
///     #[orm(foreign_key = "category_id")]
///     pub category: Option<Category>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match entity::Entity::try_from(&input) {
        Ok(entity) => entity::expand(&entity).into(),
        Err(e) => e.into_compile_error().into(),
    }
}
