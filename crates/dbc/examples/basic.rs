//! Pooled queries example.
//!
//! Shows the explicit database handle, the one-shot query helper, a lease
//! kept across several statements, and the process-wide instance.
//!
//! # Running
//!
//! ```bash
//! export dbc_string="host=localhost user=postgres password=postgres dbname=postgres"
//!
//! cargo run -p dbc --example basic
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use dbc::{ConfigOverrides, Queryable, SqlValue};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== dbc Pooled Query Example ===\n");

    let db = dbc::make_pool(
        ConfigOverrides::new()
            .application_name("dbc-example")
            .max_connections(5),
    )
    .await?;
    print_status("after pre-warm", &db);

    // 1. One-shot query: acquire, run, release
    println!("\n1. One-shot query:");
    let result = db.query("SELECT version()", &[]).await?;
    let version: String = result.scalar()?;
    println!("  Connected to: {}...", &version[..50.min(version.len())]);

    // 2. Positional parameters
    println!("\n2. Positional parameters:");
    let result = db
        .query(
            "SELECT n, n * $2 AS scaled FROM generate_series(1, $1) AS n",
            &[SqlValue::from(3), SqlValue::from(10)],
        )
        .await?;
    for row in &result {
        println!("  {} -> {}", row.try_get::<i32>(0)?, row.try_get::<i32>(1)?);
    }

    // 3. Several statements on one session
    println!("\n3. Explicit lease:");
    {
        let mut lease = db.acquire().await?;
        lease.query("CREATE TEMP TABLE notes (body text)", &[]).await?;
        let inserted = lease
            .query(
                "INSERT INTO notes VALUES ($1), ($2)",
                &[SqlValue::from("first"), SqlValue::from("second")],
            )
            .await?;
        println!("  Inserted {} rows", inserted.rows_affected());
        // Returned to the pool when dropped
    }

    // 4. Concurrent queries share the bounded pool
    println!("\n4. Concurrent queries (10 tasks, 5 connections):");
    let start = Instant::now();
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.query("SELECT pg_sleep(0.1), $1::int4", &[SqlValue::from(i)])
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }
    println!("  Completed in {:?}", start.elapsed());
    print_status("after concurrent queries", &db);

    // 5. Idle connections above the minimum are evicted
    println!("\n5. Idle eviction:");
    tokio::time::sleep(Duration::from_secs(5)).await;
    print_status("after idling", &db);

    // 6. Process-wide instance
    println!("\n6. Process-wide instance:");
    let count = dbc::query("SELECT count(*) FROM pg_stat_activity", &[]).await?;
    println!("  Backends: {}", count.scalar::<i64>()?);
    dbc::shutdown().await;

    db.shutdown().await;
    println!("\n=== Example Complete ===");
    Ok(())
}

fn print_status(label: &str, db: &dbc::Database) {
    let status = db.status();
    println!(
        "  [{label}] total={} idle={} in_use={} max={}",
        status.total, status.available, status.in_use, status.max
    );
}
