use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Error, Fields, Ident, LitStr, Result, Type};

pub struct Entity {
    pub ident: Ident,
    pub table: Option<LitStr>,
    pub schema: Option<LitStr>,
    pub interface: bool,
    pub fields: Vec<Field>,
}

pub struct Field {
    pub ident: Ident,
    pub ty: Type,
    pub key: bool,
    pub column: Option<LitStr>,
    pub foreign_key: Option<LitStr>,
}

impl TryFrom<&DeriveInput> for Entity {
    type Error = Error;

    fn try_from(input: &DeriveInput) -> Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(Error::new(input.generics.span(), "entities cannot be generic"));
        }
        let Data::Struct(data) = &input.data else {
            return Err(Error::new(input.ident.span(), "`Entity` can only be derived for structs"));
        };
        let Fields::Named(named) = &data.fields else {
            return Err(Error::new(data.fields.span(), "entities need named fields"));
        };

        let mut entity = Self {
            ident: input.ident.clone(),
            table: None,
            schema: None,
            interface: false,
            fields: Vec::new(),
        };

        for attr in input.attrs.iter().filter(|a| a.path().is_ident("orm")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    entity.table = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("schema") {
                    entity.schema = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("interface") {
                    entity.interface = true;
                } else {
                    return Err(meta.error("expected `table`, `schema` or `interface`"));
                }
                Ok(())
            })?;
        }
        if let (None, Some(schema)) = (&entity.table, &entity.schema) {
            return Err(Error::new(schema.span(), "`schema` requires `table`"));
        }

        for field in &named.named {
            let Some(ident) = field.ident.clone() else {
                continue;
            };
            let mut parsed = Field {
                ident,
                ty: field.ty.clone(),
                key: false,
                column: None,
                foreign_key: None,
            };
            let mut skip = false;

            for attr in field.attrs.iter().filter(|a| a.path().is_ident("orm")) {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("key") {
                        parsed.key = true;
                    } else if meta.path.is_ident("column") {
                        parsed.column = Some(meta.value()?.parse()?);
                    } else if meta.path.is_ident("foreign_key") {
                        parsed.foreign_key = Some(meta.value()?.parse()?);
                    } else if meta.path.is_ident("skip") {
                        skip = true;
                    } else {
                        return Err(
                            meta.error("expected `key`, `column`, `foreign_key` or `skip`")
                        );
                    }
                    Ok(())
                })?;
            }

            if !skip {
                entity.fields.push(parsed);
            }
        }

        Ok(entity)
    }
}

pub fn expand(entity: &Entity) -> TokenStream {
    let ident = &entity.ident;
    let name = ident.to_string();

    let table = entity.table.as_ref().map(|table| {
        let schema = entity
            .schema
            .as_ref()
            .map_or_else(|| quote! { ::core::option::Option::None }, |s| quote! { ::core::option::Option::Some(#s) });
        quote! { .table(#table, #schema) }
    });
    let interface = entity.interface.then(|| quote! { .interface() });
    let fields = entity.fields.iter().map(expand_field);

    quote! {
        impl ::tablemap_orm::Entity for #ident {
            fn entity_info() -> &'static ::tablemap_orm::EntityInfo {
                static INFO: ::std::sync::OnceLock<::tablemap_orm::EntityInfo> =
                    ::std::sync::OnceLock::new();
                INFO.get_or_init(|| {
                    ::tablemap_orm::EntityInfo::new::<Self>(#name)
                        #table
                        #interface
                        #(#fields)*
                })
            }
        }

        impl ::tablemap_orm::Mapped for #ident {
            fn field_type() -> ::tablemap_orm::FieldType {
                ::tablemap_orm::FieldType::Entity(::tablemap_orm::EntityRef::of::<Self>())
            }
        }
    }
}

fn expand_field(field: &Field) -> TokenStream {
    let ident = &field.ident;
    let ty = &field.ty;
    let name = ident.to_string();

    let key = field.key.then(|| quote! { .key() });
    let column = field.column.as_ref().map(|column| quote! { .column(#column) });
    let foreign_key = field.foreign_key.as_ref().map(|fk| quote! { .foreign_key(#fk) });

    quote! {
        .field(
            ::tablemap_orm::FieldInfo::new::<Self, #ty>(#name, |e| &e.#ident, |e| &mut e.#ident)
                #key
                #column
                #foreign_key
        )
    }
}
