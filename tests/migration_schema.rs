//! Schema tests: the cetane migrations must produce the tables, indexes,
//! and constraints the repositories rely on, and re-running them against an
//! already-migrated database must be a no-op.

use rusqlite::Connection;

/// Apply the full registry to a connection, in dependency order.
fn apply_migrations(conn: &Connection) {
    use cetane::backend::Sqlite;

    let registry = pagelift::migrations::registry();
    let backend = Sqlite;

    let ordered = registry
        .resolve_order()
        .expect("failed to resolve migration order");

    for name in ordered {
        let migration = registry.get(name).expect("migration not found");
        for stmt in migration.forward_sql(&backend) {
            if stmt.trim().is_empty() {
                continue;
            }
            conn.execute_batch(&stmt)
                .unwrap_or_else(|e| panic!("migration {} failed: {}", name, e));
        }
    }
}

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

#[test]
fn migrations_create_expected_tables() {
    let conn = Connection::open_in_memory().unwrap();
    apply_migrations(&conn);

    let tables = table_names(&conn);
    for expected in ["pages", "corrections", "reprocess_queue", "cost_ledger"] {
        assert!(
            tables.iter().any(|t| t == expected),
            "missing table {} (have: {:?})",
            expected,
            tables
        );
    }
}

#[test]
fn active_queue_entries_are_unique_per_page() {
    let conn = Connection::open_in_memory().unwrap();
    apply_migrations(&conn);

    conn.execute(
        "INSERT INTO pages (id, image_path, quality_status, rescan_attempts, needs_manual_review, created_at, updated_at)
         VALUES ('p1', 'p1.tif', 'unchecked', 0, 0, '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')",
        [],
    )
    .unwrap();

    let insert = "INSERT INTO reprocess_queue (page_id, reason, priority, status, created_at)
                  VALUES ('p1', 'test', 0, ?1, '2025-01-01T00:00:00+00:00')";

    conn.execute(insert, ["queued"]).unwrap();
    // A second active entry violates the partial unique index.
    assert!(conn.execute(insert, ["queued"]).is_err());
    assert!(conn.execute(insert, ["processing"]).is_err());
    // Settled entries do not count against the invariant.
    conn.execute(insert, ["completed"]).unwrap();
    conn.execute(insert, ["failed"]).unwrap();
}

#[test]
fn page_columns_match_repository_expectations() {
    let conn = Connection::open_in_memory().unwrap();
    apply_migrations(&conn);

    let mut stmt = conn.prepare("PRAGMA table_info(pages)").unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    for expected in [
        "id",
        "image_path",
        "text_path",
        "text_hash",
        "quality_score",
        "quality_status",
        "rescan_attempts",
        "last_attempt_at",
        "needs_manual_review",
        "claimed_at",
        "created_at",
        "updated_at",
    ] {
        assert!(
            columns.iter().any(|c| c == expected),
            "pages missing column {}",
            expected
        );
    }
}

#[tokio::test]
async fn run_migrations_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("schema.db").display().to_string();

    pagelift::repository::run_migrations(&db).await.unwrap();
    // Second run sees everything applied and changes nothing.
    pagelift::repository::run_migrations(&db).await.unwrap();

    let conn = Connection::open(dir.path().join("schema.db")).unwrap();
    let tables = table_names(&conn);
    assert!(tables.iter().any(|t| t == "pages"));
}
