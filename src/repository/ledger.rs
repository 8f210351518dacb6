//! Cost ledger repository.
//!
//! Append-only log of billed API calls. The rolling daily total is always
//! computed by aggregation over the table, never from an in-memory counter,
//! so a restarted or concurrent process sees the true remaining budget.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{LedgerRecord, NewLedgerEntry};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::parse_datetime;
use crate::models::{BilledOperation, LedgerEntry};
use crate::schema::cost_ledger;

#[derive(Clone)]
pub struct CostLedgerRepository {
    pool: AsyncSqlitePool,
}

impl CostLedgerRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Append one billed call. Entries are never updated or deleted.
    pub async fn append(&self, entry: &LedgerEntry) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let created_at = entry.created_at.to_rfc3339();

        diesel::insert_into(cost_ledger::table)
            .values(NewLedgerEntry {
                model: &entry.model,
                operation: entry.operation.as_str(),
                page_id: entry.page_id.as_deref(),
                input_tokens: entry.input_tokens as i32,
                output_tokens: entry.output_tokens as i32,
                cost_usd: entry.cost_usd,
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Total spend since the given instant.
    pub async fn total_since(&self, since: DateTime<Utc>) -> Result<f64, DieselError> {
        use diesel::dsl::sum;

        let mut conn = self.pool.get().await?;
        let cutoff = since.to_rfc3339();

        let total: Option<f64> = cost_ledger::table
            .filter(cost_ledger::created_at.ge(&cutoff))
            .select(sum(cost_ledger::cost_usd))
            .first(&mut conn)
            .await?;

        Ok(total.unwrap_or(0.0))
    }

    /// Rolling 24-hour spend total.
    pub async fn total_last_day(&self) -> Result<f64, DieselError> {
        self.total_since(Utc::now() - Duration::hours(24)).await
    }

    /// Total number of ledger entries.
    pub async fn count(&self) -> Result<u64, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = cost_ledger::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        let records: Vec<LedgerRecord> = cost_ledger::table
            .order(cost_ledger::id.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await?;

        Ok(records
            .into_iter()
            .map(|r| LedgerEntry {
                model: r.model,
                operation: BilledOperation::from_str(&r.operation)
                    .unwrap_or(BilledOperation::Classify),
                page_id: r.page_id,
                input_tokens: r.input_tokens as i64,
                output_tokens: r.output_tokens as i64,
                cost_usd: r.cost_usd,
                created_at: parse_datetime(&r.created_at),
            })
            .collect())
    }
}
