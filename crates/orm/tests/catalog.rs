//! Metadata resolution through the catalog: default strategies, fluent mappings, escaping,
//! foreign keys and caching.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::thread;

use common::{
    Category, Customer, Document, IAnimal, Messages, Note, Order, Pair, Product, Shipment,
};
use tablemap_orm::{
    Catalog, ColumnNameResolver, DefaultForeignKeyPropertyResolver, Entity, EntityMap, Error,
    Escape, Field, Mappings, Property, PropertyMap, Relation, Row, TableNameResolver, Value,
    ValueKind,
};

#[derive(Debug)]
struct UpperTables;

impl TableNameResolver for UpperTables {
    fn resolve_table(&self, entity: &'static tablemap_orm::EntityInfo) -> String {
        entity.name().to_uppercase()
    }
}

#[derive(Debug)]
struct PrefixedColumns;

impl ColumnNameResolver for PrefixedColumns {
    fn resolve_column(&self, property: &Property) -> String {
        format!("col_{}", property.name())
    }
}

// Table names

#[test]
fn table_names_by_convention() {
    let catalog = Catalog::default();
    assert_eq!(&*catalog.table::<Product>(), "Products");
    assert_eq!(&*catalog.table::<Category>(), "Categories");
    assert_eq!(&*catalog.table::<IAnimal>(), "Animals");
    assert_eq!(&*catalog.table::<Order>(), "dbo.tblOrder");
}

#[test]
fn escaped_names() {
    let catalog = Catalog::builder().escape('[', ']').build();
    assert_eq!(&*catalog.table::<Product>(), "[Products]");

    let name = Property::named(Product::entity_info(), "name").expect("member exists");
    assert_eq!(&*catalog.column(&name), "[name]");

    // staging descriptors are never escaped
    let column = catalog.data_column(&name).expect("primitive member");
    assert_eq!(column.name, "name");
    assert_eq!(column.kind, ValueKind::String);
    assert!(!column.nullable);
}

#[test]
fn column_annotation() {
    let catalog = Catalog::default();
    let category_id = Property::named(Product::entity_info(), "category_id").expect("member");
    assert_eq!(&*catalog.column(&category_id), "CategoryId");

    let column = catalog.data_column(&category_id).expect("primitive member");
    assert_eq!(column.name, "CategoryId");
    assert_eq!(column.kind, ValueKind::Int);
    assert!(column.nullable);
}

// Properties

#[test]
fn properties_exclude_navigation_members() {
    let catalog = Catalog::default();
    let names: Vec<_> = catalog.properties::<Product>().iter().map(Property::name).collect();
    assert_eq!(names, ["id", "name", "price", "category_id"]);

    let names: Vec<_> = catalog.properties::<Category>().iter().map(Property::name).collect();
    assert_eq!(names, ["id", "name"]);
}

#[test]
fn properties_follow_the_allow_list() {
    let catalog = Catalog::default();
    let names: Vec<_> = catalog.properties::<Document>().iter().map(Property::name).collect();
    assert_eq!(names, ["id"]);

    let resolver = tablemap_orm::DefaultPropertyResolver::default().allow(ValueKind::Json);
    let catalog = Catalog::builder().property_resolver(resolver).build();
    let names: Vec<_> = catalog.properties::<Document>().iter().map(Property::name).collect();
    assert_eq!(names, ["id", "body"]);
}

#[test]
fn property_identity() {
    let left = Property::named(Product::entity_info(), "name").expect("member");
    let right = catalog_property::<Product>("name");
    assert_eq!(left, right);
    assert_ne!(left, catalog_property::<Category>("name"));
    assert!(left.key().ends_with("Product.name"));
}

fn catalog_property<T: Entity>(name: &str) -> Property {
    Catalog::default()
        .properties::<T>()
        .iter()
        .find(|p| p.name() == name)
        .cloned()
        .expect("member is mapped")
}

// Keys

#[test]
fn key_by_convention_or_annotation() {
    let catalog = Catalog::default();

    let key = catalog.key_property::<Product>().expect("key");
    assert_eq!(key.property.name(), "id");
    assert!(key.is_identity);

    let key = catalog.key_property::<Order>().expect("key");
    assert_eq!(key.property.name(), "order_number");
}

#[test]
fn key_errors() {
    let catalog = Catalog::default();

    let err = catalog.key_property::<Note>().unwrap_err();
    assert!(matches!(err, Error::KeyNotFound(_)));
    assert!(err.to_string().starts_with("Could not find the key property for type"));

    let err = catalog.key_property::<Pair>().unwrap_err();
    assert!(matches!(err, Error::MultipleKeys(_)));
    assert!(err.is_configuration());
}

// Fluent mappings

#[test]
fn mapped_table_columns_and_keys() {
    let mappings = Mappings::new();
    mappings.add(
        EntityMap::new::<Product>()
            .to_table_in("tblProduct", "dbo")
            .property("name", |p| p.column("ProductName"))
            .property("price", PropertyMap::ignore)
            .property("id", PropertyMap::key),
    );
    let catalog = Catalog::builder().mappings(mappings).build();

    assert_eq!(&*catalog.table::<Product>(), "dbo.tblProduct");

    let names: Vec<_> = catalog.properties::<Product>().iter().map(Property::name).collect();
    assert_eq!(names, ["id", "name", "category_id"]);

    let name = Property::named(Product::entity_info(), "name").expect("member");
    assert_eq!(&*catalog.column(&name), "ProductName");
    assert_eq!(catalog.data_column(&name).expect("column").name, "ProductName");

    // client-assigned key
    let key = catalog.key_property::<Product>().expect("key");
    assert_eq!(key.property.name(), "id");
    assert!(!key.is_identity);

    // unmapped types use the defaults
    assert_eq!(&*catalog.table::<Category>(), "Categories");
    assert!(catalog.key_property::<Category>().expect("key").is_identity);
}

#[test]
fn mapped_identity_implies_key() {
    let mappings = Mappings::new();
    mappings.add(EntityMap::new::<Note>().property("text", PropertyMap::identity));
    let catalog = Catalog::builder().mappings(mappings).build();

    let key = catalog.key_property::<Note>().expect("key");
    assert_eq!(key.property.name(), "text");
    assert!(key.is_identity);
}

#[test]
fn mapped_keys_must_be_unique() {
    let mappings = Mappings::new();
    mappings.add(
        EntityMap::new::<Product>().property("id", PropertyMap::key).property("name", PropertyMap::key),
    );
    let catalog = Catalog::builder().mappings(mappings).build();

    let err = catalog.key_property::<Product>().unwrap_err();
    assert!(matches!(err, Error::MappedKeys(_)));
}

// Foreign keys

#[test]
fn foreign_keys_by_naming() {
    let catalog = Catalog::default();

    let fk = catalog.foreign_key::<Product, Category>().expect("one-to-one");
    assert_eq!(fk.relation, Relation::OneToOne);
    assert_eq!(fk.property.name(), "category_id");

    let fk = catalog.foreign_key::<Category, Product>().expect("one-to-many");
    assert_eq!(fk.relation, Relation::OneToMany);
    assert_eq!(fk.property.name(), "category_id");
    assert_eq!(fk.property.owner().name(), "Product");
}

#[test]
fn foreign_keys_by_annotation() {
    let catalog = Catalog::default();

    let fk = catalog.foreign_key::<Order, Customer>().expect("one-to-one");
    assert_eq!(fk.relation, Relation::OneToOne);
    assert_eq!(fk.property.name(), "buyer");

    let fk = catalog.foreign_key::<Customer, Order>().expect("one-to-many");
    assert_eq!(fk.relation, Relation::OneToMany);
    assert_eq!(fk.property.owner().name(), "Order");
}

#[test]
fn navigation_members_alone_never_relate() {
    let catalog = Catalog::default();

    let err = catalog.foreign_key::<Shipment, Customer>().unwrap_err();
    assert!(matches!(err, Error::ForeignKeyNotFound { .. }));
    assert!(err.to_string().starts_with("Could not resolve foreign key property. Source type"));
}

#[test]
fn foreign_key_matchers_can_be_disabled() {
    let catalog = Catalog::builder()
        .foreign_key_resolver(DefaultForeignKeyPropertyResolver::default().naming(false))
        .build();
    catalog.foreign_key::<Product, Category>().unwrap_err();
    catalog.foreign_key::<Order, Customer>().expect("annotation still applies");

    let catalog = Catalog::builder()
        .foreign_key_resolver(DefaultForeignKeyPropertyResolver::default().annotations(false))
        .build();
    catalog.foreign_key::<Order, Customer>().unwrap_err();
    catalog.foreign_key::<Product, Category>().expect("naming still applies");
}

// Caching and strategies

#[test]
fn replaced_strategies_apply_to_new_lookups_only() {
    let catalog = Catalog::default();
    assert_eq!(&*catalog.table::<Product>(), "Products");

    catalog.set_table_name_resolver(UpperTables);
    catalog.set_column_name_resolver(PrefixedColumns);
    assert_eq!(&*catalog.table::<Product>(), "Products");
    assert_eq!(&*catalog.table::<Category>(), "CATEGORY");

    let name = Property::named(Category::entity_info(), "name").expect("member");
    assert_eq!(&*catalog.column(&name), "col_name");
}

#[test]
fn escape_changes_apply_to_new_lookups_only() {
    let catalog = Catalog::default();
    assert_eq!(&*catalog.table::<Product>(), "Products");

    catalog.set_escape(Escape::new('"', '"'));
    assert_eq!(&*catalog.table::<Product>(), "Products");
    assert_eq!(&*catalog.table::<Category>(), "\"Categories\"");
    assert!(catalog.escape().is_set());
}

#[test]
fn diagnostics_emitted_once_per_resolution() {
    let messages = Messages::default();
    let catalog = Catalog::builder().log(messages.sink()).build();

    for _ in 0..3 {
        let _ = catalog.table::<Product>();
        let _ = catalog.key_property::<Product>();
    }

    assert_eq!(messages.count("Resolved table name 'Products'"), 1);
    assert_eq!(messages.count("as key property for"), 1);
    assert!(messages.all().iter().any(|m| m.starts_with("Resolved properties 'id, name, price, category_id'")));
}

#[test]
fn concurrent_first_use() {
    let catalog = Arc::new(Catalog::default());

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                scope.spawn(move || {
                    let table = catalog.table::<Product>();
                    let key = catalog.key_property::<Product>().expect("key");
                    let properties = catalog.properties::<Product>();
                    (table, key, properties)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread completes")).collect()
    });

    let (table, key, properties) = &results[0];
    for (other_table, other_key, other_properties) in &results[1..] {
        assert_eq!(table, other_table);
        assert_eq!(key, other_key);
        assert_eq!(properties, other_properties);
    }
}

// Hydration

#[test]
fn hydrate_by_column_or_member_name() {
    let catalog = Catalog::default();
    let row = Row {
        fields: vec![
            Field {
                name: "ID".to_string(),
                value: Value::BigInt(Some(7)),
            },
            Field {
                name: "name".to_string(),
                value: Value::from("Widget"),
            },
            Field {
                name: "price".to_string(),
                value: Value::Double(Some(9.5)),
            },
            Field {
                name: "CategoryId".to_string(),
                value: Value::Int(None),
            },
            Field {
                name: "unmapped".to_string(),
                value: Value::from(true),
            },
        ],
    };

    let product: Product = catalog.hydrate(&row).expect("hydrates");
    assert_eq!(product.id, 7);
    assert_eq!(product.name, "Widget");
    assert!((product.price - 9.5).abs() < f64::EPSILON);
    assert_eq!(product.category_id, None);
}

#[test]
fn hydrate_conversion_error() {
    let catalog = Catalog::default();
    let row = Row {
        fields: vec![Field {
            name: "price".to_string(),
            value: Value::from("not a number"),
        }],
    };

    let err = catalog.hydrate::<Product>(&row).unwrap_err();
    assert!(matches!(err, Error::Conversion { .. }));
    assert!(err.to_string().contains("Product.price"));
}
