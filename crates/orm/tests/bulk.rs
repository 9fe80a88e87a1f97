//! Bulk synchronization against a scripted SQL Server connection.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{FakeServer, Messages, Product, assert_sql_contains, init_tracing, product};
use tablemap_orm::{
    BulkEngine, BulkOptions, Catalog, Connection, Dialect, Error, Upsert, ValueKind,
};

fn engine() -> BulkEngine {
    init_tracing();
    BulkEngine::new(Arc::new(Catalog::default()))
}

fn events(server: &FakeServer) -> Vec<String> {
    server.state().events.clone()
}

#[tokio::test]
async fn empty_input_touches_nothing() {
    let server = FakeServer::default();
    let engine = engine();
    let mut none: Vec<Product> = Vec::new();

    assert_eq!(engine.bulk_insert(&server, &none, None).await.expect("insert"), 0);
    assert_eq!(engine.bulk_update(&server, &none, None).await.expect("update"), 0);
    assert_eq!(engine.bulk_delete(&server, &none, None).await.expect("delete"), 0);
    let upserted = engine.bulk_upsert(&server, &mut none, None, Upsert::default()).await;
    assert_eq!(upserted.expect("upsert"), 0);

    assert!(events(&server).is_empty());
    assert!(server.state().statements.is_empty());
}

#[tokio::test]
async fn bulk_insert_leaves_identity_to_the_server() {
    let server = FakeServer::default();
    let products = vec![product(0, "A", 1.0), product(0, "B", 2.0)];

    let copied = engine().bulk_insert(&server, &products, None).await.expect("insert");
    assert_eq!(copied, 2);
    assert_eq!(events(&server), ["open", "begin", "commit", "close"]);

    let state = server.state();
    assert_eq!(state.copies.len(), 1);
    let table = &state.copies[0];
    assert_eq!(table.name, "Products");
    let columns: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, ["name", "price", "CategoryId"]);
    assert_eq!(table.rows.len(), 2);
}

#[tokio::test]
async fn bulk_insert_keeps_identity_on_request() {
    let server = FakeServer::default();
    let options = BulkOptions {
        keep_identity: true,
        ..BulkOptions::default()
    };
    let engine = engine().options(options);

    engine.bulk_insert(&server, &[product(10, "A", 1.0)], None).await.expect("insert");
    let state = server.state();
    assert_eq!(state.copies[0].columns[0].name, "id");
}

#[tokio::test]
async fn bulk_update_stages_and_merges() {
    let server = FakeServer::default();
    server.state().existing.extend([1, 2, 3]);
    let products = vec![product(1, "A", 1.0), product(3, "C", 3.0), product(9, "Z", 9.0)];

    let updated = engine().bulk_update(&server, &products, None).await.expect("update");
    assert_eq!(updated, 2);

    let state = server.state();
    let statements = &state.statements;
    assert!(statements[0].starts_with("SELECT N'CREATE TABLE #Products('"));
    assert_sql_contains(&statements[0], &["OBJECT_ID('Products')", "FOR XML PATH('')"]);
    assert_eq!(
        statements[1],
        "CREATE TABLE #Products([id] int NOT NULL, [name] nvarchar(max) NOT NULL, \
         [price] float NOT NULL, [CategoryId] int NULL);"
    );
    assert_eq!(statements[2], "bulk copy into #Products");
    assert_eq!(
        statements[3],
        "MERGE INTO Products WITH (HOLDLOCK) AS Target USING #Products AS Source \
         ON Target.[id] = Source.[id] WHEN MATCHED THEN UPDATE SET \
         Target.[name] = Source.[name], Target.[price] = Source.[price], \
         Target.[CategoryId] = Source.[CategoryId]; DROP TABLE #Products;"
    );
    assert_eq!(state.events, ["open", "begin", "commit", "close"]);
}

#[tokio::test]
async fn discovered_staging_is_memoized() {
    let server = FakeServer::default();
    server.state().discovered_staging =
        Some("CREATE TABLE #Products([id] int, [name] nvarchar(200), [price] decimal(10, 2), [CategoryId] int);".into());
    let engine = engine();

    engine.bulk_update(&server, &[product(1, "A", 1.0)], None).await.expect("update");
    engine.bulk_update(&server, &[product(2, "B", 2.0)], None).await.expect("update");

    assert_eq!(server.statements_starting("SELECT N'CREATE TABLE").len(), 1);
    let creates = server.statements_starting("CREATE TABLE #Products(");
    assert_eq!(creates.len(), 2);
    assert!(creates.iter().all(|sql| sql.contains("nvarchar(200)")));
}

#[tokio::test]
async fn bulk_delete_stages_keys_only() {
    let server = FakeServer::default();
    server.state().existing.extend([1, 2, 3]);
    let engine = engine();
    let products = vec![product(1, "A", 1.0), product(2, "B", 2.0)];

    assert_eq!(engine.bulk_delete(&server, &products, None).await.expect("delete"), 2);
    assert_eq!(engine.bulk_delete(&server, &products, None).await.expect("delete"), 0);

    let state = server.state();
    let staged = &state.copies[0];
    assert_eq!(staged.rows[0][0], tablemap_orm::Value::Int(Some(1)));
    assert!(staged.rows[0][1..].iter().all(tablemap_orm::is_null));
    assert!(state.statements.iter().any(|sql| sql.contains(
        "ON Target.[id] = Source.[id] WHEN MATCHED THEN DELETE; DROP TABLE #Products;"
    )));
    assert_eq!(state.existing.iter().copied().collect::<Vec<_>>(), [3]);
}

#[tokio::test]
async fn upsert_assigns_identities_by_input_index() {
    let server = FakeServer::default();
    server.state().existing.insert(5);
    // output rows arrive in no particular order
    server.state().identities =
        vec![(Some(2), Some(103)), (Some(0), Some(101)), (Some(1), Some(102))];

    let mut products = vec![
        product(0, "New A", 1.0),
        product(0, "New B", 2.0),
        product(0, "New C", 3.0),
        product(5, "Existing", 5.0),
    ];
    let upsert = Upsert {
        output_identity: true,
        ..Upsert::default()
    };
    let affected = engine().bulk_upsert(&server, &mut products, None, upsert).await.expect("upsert");
    assert_eq!(affected, 4);

    let ids: Vec<_> = products.iter().map(|p| p.id).collect();
    assert_eq!(ids, [101, 102, 103, 5]);

    let state = server.state();
    let staged = &state.copies[0];
    assert_eq!(staged.columns.last().map(|c| c.name.as_str()), Some("__row_seq"));
    assert_eq!(staged.columns.last().map(|c| c.kind), Some(ValueKind::Int));

    let merge = state.statements.iter().find(|sql| sql.contains("MERGE INTO")).expect("merge");
    assert_sql_contains(
        merge,
        &[
            "CREATE TABLE #Products_output([__row_seq] int, [id] int); MERGE INTO Products",
            "WHEN NOT MATCHED BY TARGET THEN INSERT ([name], [price], [CategoryId]) \
             VALUES (Source.[name], Source.[price], Source.[CategoryId])",
            "OUTPUT Source.[__row_seq], INSERTED.[id] INTO #Products_output([__row_seq], [id]); \
             DROP TABLE #Products;",
        ],
    );
    assert!(!merge.contains("NOT MATCHED BY SOURCE"));
    assert!(state.statements.iter().any(|sql| sql == "SELECT [__row_seq], [id] FROM #Products_output;"));
    assert_eq!(state.statements.last().map(String::as_str), Some("DROP TABLE #Products_output;"));
}

#[tokio::test]
async fn pruning_upsert_with_identity_output() {
    let server = FakeServer::default();
    server.state().existing.extend([5, 6, 7]);
    // deleted rows produce output with neither sequence nor identity
    server.state().identities =
        vec![(None, None), (Some(1), Some(102)), (None, None), (Some(0), Some(101))];

    let mut products =
        vec![product(0, "New A", 1.0), product(0, "New B", 2.0), product(5, "Kept", 5.0)];
    let upsert = Upsert {
        prune: true,
        output_identity: true,
    };
    let affected = engine().bulk_upsert(&server, &mut products, None, upsert).await.expect("upsert");
    assert_eq!(affected, 5);

    let ids: Vec<_> = products.iter().map(|p| p.id).collect();
    assert_eq!(ids, [101, 102, 5]);

    let state = server.state();
    assert_eq!(state.events, ["open", "begin", "commit", "close"]);
    assert_eq!(state.existing.iter().copied().collect::<Vec<_>>(), [5]);

    let merge = state.statements.iter().find(|sql| sql.contains("MERGE INTO")).expect("merge");
    assert_sql_contains(
        merge,
        &["WHEN NOT MATCHED BY SOURCE THEN DELETE OUTPUT Source.[__row_seq], INSERTED.[id]"],
    );
    assert_eq!(state.statements.last().map(String::as_str), Some("DROP TABLE #Products_output;"));
}

#[tokio::test]
async fn upsert_without_output_skips_correlation() {
    let server = FakeServer::default();
    let mut products = vec![product(0, "New", 1.0)];
    let upsert = Upsert {
        prune: true,
        ..Upsert::default()
    };

    engine().bulk_upsert(&server, &mut products, None, upsert).await.expect("upsert");
    assert_eq!(products[0].id, 0);

    let state = server.state();
    let columns: Vec<_> = state.copies[0].columns.iter().map(|c| c.name.as_str()).collect();
    assert!(!columns.contains(&"__row_seq"));

    let merge = state.statements.iter().find(|sql| sql.contains("MERGE INTO")).expect("merge");
    assert!(merge.starts_with("MERGE INTO Products"));
    assert!(merge.ends_with("WHEN NOT MATCHED BY SOURCE THEN DELETE; DROP TABLE #Products;"));
    assert!(!merge.contains("OUTPUT"));
    assert!(!state.statements.iter().any(|sql| sql.contains("#Products_output")));
}

#[tokio::test]
async fn failure_rolls_back_and_cleans_up() {
    let server = FakeServer::default();
    server.state().fail_on = Some("MERGE INTO");

    let err = engine().bulk_update(&server, &[product(1, "A", 1.0)], None).await.unwrap_err();
    assert!(matches!(err, Error::Data(_)));
    assert!(err.to_string().contains("simulated failure"));

    let state = server.state();
    assert_eq!(state.events, ["open", "begin", "rollback", "close"]);
    assert_eq!(
        state.statements.last().map(String::as_str),
        Some("IF OBJECT_ID('tempdb..#Products') IS NOT NULL DROP TABLE #Products;")
    );
}

#[tokio::test]
async fn correlated_failure_drops_output_table() {
    let server = FakeServer::default();
    server.state().fail_on = Some("SELECT [__row_seq]");
    let mut products = vec![product(0, "New", 1.0)];
    let upsert = Upsert {
        output_identity: true,
        ..Upsert::default()
    };

    engine().bulk_upsert(&server, &mut products, None, upsert).await.unwrap_err();

    let state = server.state();
    assert!(state.events.contains(&"rollback".to_string()));
    assert!(state.statements.iter().any(|sql| {
        sql == "IF OBJECT_ID('tempdb..#Products_output') IS NOT NULL DROP TABLE #Products_output;"
    }));
}

#[tokio::test]
async fn supplied_transaction_is_used() {
    let server = FakeServer::default();
    let tx = server.begin().await.expect("begin");

    engine().bulk_update(&server, &[product(1, "A", 1.0)], Some(tx)).await.expect("update");
    assert_eq!(events(&server), ["begin", "open", "commit", "close"]);
}

#[tokio::test]
async fn merges_need_sql_server() {
    let server = FakeServer::with_dialect(Dialect::Postgres);
    let err = engine().bulk_delete(&server, &[product(1, "A", 1.0)], None).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    assert!(events(&server).is_empty());

    // plain copies work anywhere
    engine().bulk_insert(&server, &[product(0, "A", 1.0)], None).await.expect("insert");
}

#[tokio::test]
async fn progress_and_merge_are_logged() {
    let server = FakeServer::default();
    let messages = Messages::default();
    let engine = BulkEngine::new(Arc::new(Catalog::builder().log(messages.sink()).build()));

    engine.bulk_update(&server, &[product(1, "A", 1.0)], None).await.expect("update");
    assert_eq!(messages.count("Inserted 1 records."), 1);
    assert_eq!(messages.count("merge<Product>: MERGE INTO Products"), 1);
    assert_eq!(messages.count("Resolved bulk metadata 'Products'"), 1);
}

#[test]
fn metadata_is_cached_per_correlation() {
    let engine = engine();
    let plain = engine.metadata::<Product>(false).expect("metadata");
    let again = engine.metadata::<Product>(false).expect("metadata");
    let correlated = engine.metadata::<Product>(true).expect("metadata");

    assert!(Arc::ptr_eq(&plain, &again));
    assert!(!plain.is_correlated());
    assert!(correlated.is_correlated());
    assert_eq!(plain.columns().len() + 1, correlated.columns().len());
    assert_eq!(plain.staging(), "#Products");
    assert_eq!(plain.output(), "#Products_output");
}

#[test]
fn escaped_destination_stages_under_sanitized_name() {
    let engine = BulkEngine::new(Arc::new(Catalog::builder().escape('[', ']').build()));
    let metadata = engine.metadata::<Product>(false).expect("metadata");

    assert_eq!(metadata.destination(), "[Products]");
    assert_eq!(metadata.staging(), "#Products");
    assert_eq!(metadata.key_column().name, "id");
}
