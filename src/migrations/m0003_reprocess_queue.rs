use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0003_reprocess_queue")
        .depends_on(&["0001_pages"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE reprocess_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'queued',
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    FOREIGN KEY (page_id) REFERENCES pages (id) ON DELETE CASCADE
)"#,
        ))
        // One active entry per page; makes enqueue idempotent at the DB level
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE UNIQUE INDEX idx_reprocess_queue_active ON reprocess_queue(page_id) WHERE status IN ('queued', 'processing')",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_reprocess_queue_status ON reprocess_queue(status)",
        ))
}
