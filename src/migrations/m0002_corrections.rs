use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_corrections")
        .depends_on(&["0001_pages"])
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE corrections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id TEXT NOT NULL,
    original_text TEXT NOT NULL,
    corrected_text TEXT NOT NULL,
    quality_score INTEGER NOT NULL,
    improvement_level TEXT NOT NULL,
    confidence TEXT NOT NULL,
    needs_review INTEGER NOT NULL DEFAULT 0,
    major_corrections TEXT NOT NULL DEFAULT '[]',
    assessment_json TEXT NOT NULL DEFAULT '{}',
    model TEXT NOT NULL,
    api_cost_usd REAL NOT NULL DEFAULT 0.0,
    processing_time_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (page_id) REFERENCES pages (id) ON DELETE CASCADE
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_corrections_page ON corrections(page_id)",
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_corrections_needs_review ON corrections(needs_review) WHERE needs_review = 1",
        ))
}
