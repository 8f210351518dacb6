//! Reprocessing queue repository.
//!
//! Enqueueing is idempotent per page: a partial unique index on active
//! entries makes a duplicate enqueue a no-op at the database level, so any
//! number of detection passes can flag the same page safely.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewReprocessEntry, ReprocessEntryRecord};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::{parse_datetime, parse_datetime_opt};
use crate::models::{QueueStatus, ReprocessEntry};
use crate::schema::reprocess_queue;

#[derive(Clone)]
pub struct ReprocessQueueRepository {
    pool: AsyncSqlitePool,
}

impl ReprocessQueueRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    fn record_to_entry(record: ReprocessEntryRecord) -> ReprocessEntry {
        ReprocessEntry {
            id: record.id as i64,
            page_id: record.page_id,
            reason: record.reason,
            priority: record.priority,
            status: QueueStatus::from_str(&record.status).unwrap_or(QueueStatus::Queued),
            error_message: record.error_message,
            created_at: parse_datetime(&record.created_at),
            started_at: parse_datetime_opt(record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
        }
    }

    /// Enqueue a page for reprocessing. No-op if an active entry exists.
    ///
    /// Returns true when a new entry was created. Idempotency rests on the
    /// partial unique index over active (`queued`/`processing`) entries;
    /// `insert_or_ignore` turns the conflict into a skipped insert.
    pub async fn enqueue(
        &self,
        page_id: &str,
        reason: &str,
        priority: i32,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = chrono::Utc::now().to_rfc3339();

        let rows = diesel::insert_or_ignore_into(reprocess_queue::table)
            .values(NewReprocessEntry {
                page_id,
                reason,
                priority,
                status: QueueStatus::Queued.as_str(),
                error_message: None,
                created_at: &now,
                started_at: None,
                completed_at: None,
            })
            .execute(&mut conn)
            .await?;

        Ok(rows == 1)
    }

    /// List entries, optionally filtered by status, most urgent first.
    pub async fn list(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<ReprocessEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut query = reprocess_queue::table
            .order((
                reprocess_queue::priority.desc(),
                reprocess_queue::created_at.asc(),
            ))
            .limit(limit as i64)
            .into_boxed();

        if let Some(status) = status {
            query = query.filter(reprocess_queue::status.eq(status.as_str()));
        }

        let records: Vec<ReprocessEntryRecord> = query.load(&mut conn).await?;
        Ok(records.into_iter().map(Self::record_to_entry).collect())
    }

    /// Claim the most urgent queued entry (`queued -> processing`).
    ///
    /// The status filter on the update doubles as a compare-and-set: if
    /// another worker claimed the entry first, zero rows change and the next
    /// candidate is tried.
    pub async fn claim_next(&self) -> Result<Option<ReprocessEntry>, DieselError> {
        let candidates = self.list(Some(QueueStatus::Queued), 10).await?;

        let mut conn = self.pool.get().await?;
        let now = chrono::Utc::now().to_rfc3339();

        for entry in candidates {
            let rows = diesel::update(
                reprocess_queue::table
                    .filter(reprocess_queue::id.eq(entry.id as i32))
                    .filter(reprocess_queue::status.eq(QueueStatus::Queued.as_str())),
            )
            .set((
                reprocess_queue::status.eq(QueueStatus::Processing.as_str()),
                reprocess_queue::started_at.eq(Some(&now)),
            ))
            .execute(&mut conn)
            .await?;

            if rows == 1 {
                return Ok(Some(ReprocessEntry {
                    status: QueueStatus::Processing,
                    started_at: Some(chrono::Utc::now()),
                    ..entry
                }));
            }
        }

        Ok(None)
    }

    /// Mark a processing entry as completed.
    pub async fn complete(&self, id: i64) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = chrono::Utc::now().to_rfc3339();

        diesel::update(
            reprocess_queue::table
                .filter(reprocess_queue::id.eq(id as i32))
                .filter(reprocess_queue::status.eq(QueueStatus::Processing.as_str())),
        )
        .set((
            reprocess_queue::status.eq(QueueStatus::Completed.as_str()),
            reprocess_queue::completed_at.eq(Some(&now)),
        ))
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    /// Mark a processing entry as failed, recording the error.
    pub async fn fail(&self, id: i64, error: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = chrono::Utc::now().to_rfc3339();

        diesel::update(
            reprocess_queue::table
                .filter(reprocess_queue::id.eq(id as i32))
                .filter(reprocess_queue::status.eq(QueueStatus::Processing.as_str())),
        )
        .set((
            reprocess_queue::status.eq(QueueStatus::Failed.as_str()),
            reprocess_queue::error_message.eq(Some(error)),
            reprocess_queue::completed_at.eq(Some(&now)),
        ))
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    /// Manual retry path: `failed -> queued`. Returns true when re-queued.
    pub async fn retry(&self, id: i64) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::update(
            reprocess_queue::table
                .filter(reprocess_queue::id.eq(id as i32))
                .filter(reprocess_queue::status.eq(QueueStatus::Failed.as_str())),
        )
        .set((
            reprocess_queue::status.eq(QueueStatus::Queued.as_str()),
            reprocess_queue::error_message.eq(None::<String>),
            reprocess_queue::started_at.eq(None::<String>),
            reprocess_queue::completed_at.eq(None::<String>),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    /// Count entries with the given status.
    pub async fn count_with_status(&self, status: QueueStatus) -> Result<u64, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = reprocess_queue::table
            .filter(reprocess_queue::status.eq(status.as_str()))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }
}
