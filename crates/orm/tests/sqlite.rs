//! CRUD round trips against the default `SQLite` connection.

#![cfg(feature = "sqlite")]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Messages, Product, init_tracing, product};
use tablemap_orm::sqlite::SqliteDb;
use tablemap_orm::{
    BulkEngine, BulkOptions, Catalog, Command, Connection, Error, Executor, Filter, Mapper,
    Upsert, Value, blocking,
};

async fn database() -> SqliteDb {
    init_tracing();
    let db = SqliteDb::in_memory().expect("open database");
    db.execute(Command::new(
        "CREATE TABLE Products (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
         price REAL NOT NULL, CategoryId INTEGER)",
    ))
    .await
    .expect("create table");
    db
}

fn mapper() -> Mapper {
    Mapper::new(Arc::new(Catalog::default()))
}

#[tokio::test]
async fn insert_writes_back_identity() {
    let db = database().await;
    let mapper = mapper();

    let mut widget = product(0, "Widget", 9.5);
    let id = mapper.insert(&db, &mut widget).await.expect("insert");
    assert_eq!(id, Value::BigInt(Some(1)));
    assert_eq!(widget.id, 1);

    let mut gadget = product(0, "Gadget", 25.0);
    mapper.insert(&db, &mut gadget).await.expect("insert");
    assert_eq!(gadget.id, 2);
}

#[tokio::test]
async fn select_update_delete() {
    let db = database().await;
    let mapper = mapper();

    let mut widget = product(0, "Widget", 9.5);
    mapper.insert(&db, &mut widget).await.expect("insert");
    let mut gadget = product(0, "Gadget", 25.0);
    gadget.category_id = Some(3);
    mapper.insert(&db, &mut gadget).await.expect("insert");

    let all: Vec<Product> = mapper.select_all(&db).await.expect("select");
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].category_id, Some(3));
    assert_eq!(all[0].category_id, None);

    let cheap: Vec<Product> = mapper.select_where(&db, Filter::lt("price", 10.0)).await.expect("select");
    assert_eq!(cheap, vec![widget.clone()]);

    widget.price = 12.0;
    assert!(mapper.update(&db, &widget).await.expect("update"));
    let cheap: Vec<Product> = mapper.select_where(&db, Filter::lt("price", 10.0)).await.expect("select");
    assert!(cheap.is_empty());

    assert!(mapper.delete(&db, &widget).await.expect("delete"));
    assert!(!mapper.delete(&db, &widget).await.expect("delete"));
    assert_eq!(mapper.count::<Product>(&db, None).await.expect("count"), 1);
}

#[tokio::test]
async fn update_missing_row() {
    let db = database().await;
    let ghost = product(99, "Ghost", 1.0);
    assert!(!mapper().update(&db, &ghost).await.expect("update"));
}

#[tokio::test]
async fn first_or_default() {
    let db = database().await;
    let mapper = mapper();

    let none: Option<Product> =
        mapper.first_or_default(&db, Filter::eq("name", "Widget")).await.expect("select");
    assert!(none.is_none());

    mapper.insert(&db, &mut product(0, "Widget", 9.5)).await.expect("insert");
    let found: Option<Product> =
        mapper.first_or_default(&db, Filter::eq("name", "Widget")).await.expect("select");
    assert_eq!(found.map(|p| p.id), Some(1));
}

#[tokio::test]
async fn paging_and_counting() {
    let db = database().await;
    let mapper = mapper();

    let products: Vec<_> = (1..=7).map(|i| product(0, &format!("P{i}"), f64::from(i))).collect();
    assert_eq!(mapper.insert_all(&db, &products).await.expect("insert"), 7);

    let page: Vec<Product> = mapper.select_paged(&db, None, 2, 3).await.expect("page");
    let ids: Vec<_> = page.iter().map(|p| p.id).collect();
    assert_eq!(ids, [4, 5, 6]);

    let page: Vec<Product> = mapper.select_paged(&db, None, 0, 3).await.expect("page");
    assert_eq!(page[0].id, 1);

    let page: Vec<Product> =
        mapper.select_paged(&db, Some(Filter::gt("price", 5.0)), 1, 10).await.expect("page");
    assert_eq!(page.len(), 2);

    let filtered = mapper.count::<Product>(&db, Some(Filter::lte("price", 3.0))).await;
    assert_eq!(filtered.expect("count"), 3);

    let deleted = mapper.delete_where::<Product>(&db, Filter::gt("price", 5.0)).await;
    assert_eq!(deleted.expect("delete"), 2);
    assert_eq!(mapper.delete_all::<Product>(&db).await.expect("delete"), 5);
    assert_eq!(mapper.count::<Product>(&db, None).await.expect("count"), 0);
}

#[tokio::test]
async fn data_errors_pass_through() {
    let db = SqliteDb::in_memory().expect("open database");
    let err = mapper().select_all::<Product>(&db).await.unwrap_err();
    assert!(matches!(err, Error::Data(_)));
    assert!(!err.is_configuration());
}

#[tokio::test]
async fn query_log() {
    let db = database().await;
    let messages = Messages::default();
    let mapper = Mapper::new(Arc::new(Catalog::builder().log(messages.sink()).build()));

    mapper.count::<Product>(&db, None).await.expect("count");
    assert_eq!(messages.count("count<Product>: select count(*) from Products"), 1);
}

#[tokio::test]
async fn timeouts_share_caches() {
    let mapper = mapper();
    let bounded = mapper.with_timeout(Duration::from_millis(10));
    assert!(Arc::ptr_eq(mapper.compiler(), bounded.compiler()));

    let db = database().await;
    bounded.insert(&db, &mut product(0, "Widget", 1.0)).await.expect("insert");
    assert_eq!(mapper.count::<Product>(&db, None).await.expect("count"), 1);
}

#[tokio::test]
async fn bulk_insert_copies_into_destination() {
    let db = database().await;
    let messages = Messages::default();
    let catalog = Arc::new(Catalog::builder().log(messages.sink()).build());
    let options = BulkOptions {
        notify_after: 2,
        ..BulkOptions::default()
    };
    let engine = BulkEngine::new(Arc::clone(&catalog)).options(options);

    let products: Vec<_> = (1..=5).map(|i| product(0, &format!("P{i}"), f64::from(i))).collect();
    assert_eq!(engine.bulk_insert(&db, &products, None).await.expect("bulk insert"), 5);
    assert_eq!(engine.bulk_insert(&db, &[] as &[Product], None).await.expect("empty"), 0);

    let mapper = Mapper::new(catalog);
    let stored: Vec<Product> = mapper.select_all(&db).await.expect("select");
    let ids: Vec<_> = stored.iter().map(|p| p.id).collect();
    assert_eq!(ids, [1, 2, 3, 4, 5]);

    assert_eq!(messages.count("Inserted 2 records."), 1);
    assert_eq!(messages.count("Inserted 4 records."), 1);
}

#[tokio::test]
async fn bulk_insert_inside_caller_transaction() {
    let db = database().await;
    let engine = BulkEngine::new(Arc::new(Catalog::default()));

    let tx = db.begin().await.expect("begin");
    let products = vec![product(0, "A", 1.0), product(0, "B", 2.0)];
    engine.bulk_insert(&db, &products, Some(tx)).await.expect("bulk insert");

    assert_eq!(mapper().count::<Product>(&db, None).await.expect("count"), 2);
}

#[tokio::test]
async fn merges_need_sql_server() {
    let db = database().await;
    let engine = BulkEngine::new(Arc::new(Catalog::default()));
    let mut products = vec![product(1, "A", 1.0)];

    let err = engine.bulk_update(&db, &products, None).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    let err = engine.bulk_delete(&db, &products, None).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    let err = engine.bulk_upsert(&db, &mut products, None, Upsert::default()).await.unwrap_err();
    assert!(err.to_string().contains("not supported by the Sqlite dialect"));
}

// Blocking variants run without an async runtime.

#[test]
fn blocking_round_trip() {
    let db = futures::executor::block_on(database());
    let mapper = blocking::Mapper::from(mapper());

    let mut widget = product(0, "Widget", 9.5);
    mapper.insert(&db, &mut widget).expect("insert");
    assert_eq!(widget.id, 1);

    widget.name = "Renamed".to_string();
    assert!(mapper.update(&db, &widget).expect("update"));

    let found: Option<Product> = mapper.first_or_default(&db, Filter::eq("id", 1)).expect("select");
    assert_eq!(found.map(|p| p.name), Some("Renamed".to_string()));

    let engine = blocking::BulkEngine::from(BulkEngine::new(Arc::clone(mapper.inner().catalog())));
    let more = vec![product(0, "A", 1.0), product(0, "B", 2.0)];
    assert_eq!(engine.bulk_insert(&db, &more, None).expect("bulk insert"), 2);
    assert_eq!(mapper.count::<Product>(&db, None).expect("count"), 3);

    assert_eq!(mapper.delete_all::<Product>(&db).expect("delete"), 3);
}
