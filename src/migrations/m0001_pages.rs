use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_pages")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE pages (
    id TEXT PRIMARY KEY NOT NULL,
    image_path TEXT NOT NULL,
    text_path TEXT,
    text_hash TEXT,
    quality_score INTEGER,
    quality_status TEXT NOT NULL DEFAULT 'unchecked',
    rescan_attempts INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    needs_manual_review INTEGER NOT NULL DEFAULT 0,
    claimed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_pages_quality_status ON pages(quality_status)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_pages_needs_review ON pages(needs_manual_review) WHERE needs_manual_review = 1",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_pages_claimed_at ON pages(claimed_at) WHERE claimed_at IS NOT NULL",
        ))
}
