//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against SQLite. Each aggregate (pages, corrections, reprocessing queue,
//! cost ledger) gets its own repository; no repository writes another's
//! tables or owned columns.

pub mod correction;
pub mod ledger;
pub mod migrations;
pub mod models;
pub mod page;
pub mod pool;
pub mod queue;
pub mod util;

pub use correction::CorrectionRepository;
pub use ledger::CostLedgerRepository;
pub use migrations::run_migrations;
pub use page::PageRepository;
pub use pool::{AsyncSqlitePool, DieselError};
pub use queue::ReprocessQueueRepository;
pub use util::{parse_datetime, parse_datetime_opt};
