use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0004_cost_ledger")
        .operation(RunSql::portable().for_backend(
            "sqlite",
            r#"CREATE TABLE cost_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model TEXT NOT NULL,
    operation TEXT NOT NULL,
    page_id TEXT,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
)"#,
        ))
        .operation(RunSql::portable().for_backend(
            "sqlite",
            "CREATE INDEX idx_cost_ledger_created_at ON cost_ledger(created_at)",
        ))
}
