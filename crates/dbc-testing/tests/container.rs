//! Tests against a PostgreSQL container.
//!
//! These tests start a `postgres` container through testcontainers and are
//! ignored by default.
//!
//! Run with:
//!   cargo test -p dbc-testing --test container -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use dbc::{Config, Database, Error, PoolConfig, SqlValue};
use dbc_testing::{PostgresContainer, TestFixture};
use dbc_testing::container::POSTGRES_PORT;
use testcontainers::runners::AsyncRunner;

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_container_round_trip() {
    let image = PostgresContainer::default();
    let container = image.clone().start().await.unwrap();
    let port = container.get_host_port_ipv4(POSTGRES_PORT).await.unwrap();

    let config = Config::default()
        .connection_string(image.connection_string("127.0.0.1", port))
        .pool(PoolConfig::new().min_connections(1).max_connections(2));
    let db = Database::connect(config).await.unwrap();

    let fixture = TestFixture::unique().with_table("items", "id INT PRIMARY KEY, label TEXT");
    fixture.setup(&db).await.unwrap();

    let items = fixture.qualified("items");
    let inserted = db
        .query(
            &format!("INSERT INTO {items} (id, label) VALUES ($1, $2), ($3, $4)"),
            &[
                SqlValue::from(1),
                SqlValue::from("one"),
                SqlValue::from(2),
                SqlValue::Null,
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted.rows_affected(), 2);

    let rows = db
        .query(&format!("SELECT id, label FROM {items} ORDER BY id"), &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.rows()[0].try_get::<i32>(0).unwrap(), 1);
    assert_eq!(rows.rows()[1].try_get::<Option<String>>(1).unwrap(), None);

    let err = db
        .query(&format!("INSERT INTO {items} (id) VALUES (1)"), &[])
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::Query { .. }));
    assert_eq!(err.code(), Some("23505"));

    fixture.teardown(&db).await.unwrap();
    db.shutdown().await;
}
