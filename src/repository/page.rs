//! Page repository.
//!
//! Owns all reads and writes of the `pages` table. Status transitions are
//! validated against the closed `QualityStatus` state machine, and worker
//! exclusivity is enforced with a compare-and-set claim column so two
//! overlapping pipeline runs never double-process a page.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewPage, PageRecord};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::{parse_datetime, parse_datetime_opt, to_diesel_error};
use crate::models::{Page, QualityStatus};
use crate::schema::{corrections, pages};

/// Per-status page counts for status displays.
#[derive(QueryableByName, Debug)]
struct StatusCount {
    #[diesel(sql_type = diesel::sql_types::Text)]
    quality_status: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

/// Diesel-based page repository with compile-time query checking.
#[derive(Clone)]
pub struct PageRepository {
    pool: AsyncSqlitePool,
}

impl PageRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    fn record_to_page(record: PageRecord) -> Page {
        Page {
            id: record.id,
            image_path: record.image_path,
            text_path: record.text_path,
            text_hash: record.text_hash,
            quality_score: record.quality_score,
            quality_status: QualityStatus::from_str(&record.quality_status)
                .unwrap_or(QualityStatus::Unchecked),
            rescan_attempts: record.rescan_attempts,
            last_attempt_at: parse_datetime_opt(record.last_attempt_at),
            needs_manual_review: record.needs_manual_review != 0,
            claimed_at: parse_datetime_opt(record.claimed_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }

    /// Insert a new page row. Fails if the id already exists.
    pub async fn insert(&self, page: &Page) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        let created_at = page.created_at.to_rfc3339();
        let updated_at = page.updated_at.to_rfc3339();
        let last_attempt_at = page.last_attempt_at.map(|t| t.to_rfc3339());
        let claimed_at = page.claimed_at.map(|t| t.to_rfc3339());

        diesel::insert_into(pages::table)
            .values(NewPage {
                id: &page.id,
                image_path: &page.image_path,
                text_path: page.text_path.as_deref(),
                text_hash: page.text_hash.as_deref(),
                quality_score: page.quality_score,
                quality_status: page.quality_status.as_str(),
                rescan_attempts: page.rescan_attempts,
                last_attempt_at: last_attempt_at.as_deref(),
                needs_manual_review: i32::from(page.needs_manual_review),
                claimed_at: claimed_at.as_deref(),
                created_at: &created_at,
                updated_at: &updated_at,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Insert a page if it does not exist yet; returns true when inserted.
    pub async fn insert_if_missing(&self, page: &Page) -> Result<bool, DieselError> {
        if self.get(&page.id).await?.is_some() {
            return Ok(false);
        }
        self.insert(page).await?;
        Ok(true)
    }

    /// Get a page by id.
    pub async fn get(&self, id: &str) -> Result<Option<Page>, DieselError> {
        let mut conn = self.pool.get().await?;

        let record: Option<PageRecord> = pages::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;

        Ok(record.map(Self::record_to_page))
    }

    /// Find a page by its image path (used by the importer to stay idempotent).
    pub async fn find_by_image_path(&self, image_path: &str) -> Result<Option<Page>, DieselError> {
        let mut conn = self.pool.get().await?;

        let record: Option<PageRecord> = pages::table
            .filter(pages::image_path.eq(image_path))
            .first(&mut conn)
            .await
            .optional()?;

        Ok(record.map(Self::record_to_page))
    }

    /// Count all pages.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = pages::table.select(count_star()).first(&mut conn).await?;
        Ok(count as u64)
    }

    /// Pages that still need assessment or rescanning, oldest first.
    ///
    /// Rows with a fresh claim are excluded so concurrent runs pick
    /// disjoint batches; stale claims (older than `claim_ttl`) are fair game.
    pub async fn get_needing_scan(
        &self,
        limit: usize,
        claim_ttl: Duration,
    ) -> Result<Vec<Page>, DieselError> {
        let mut conn = self.pool.get().await?;
        let cutoff = (Utc::now() - claim_ttl).to_rfc3339();

        let records: Vec<PageRecord> = pages::table
            .filter(
                pages::quality_status
                    .eq(QualityStatus::Unchecked.as_str())
                    .or(pages::quality_status.eq(QualityStatus::NeedsRescan.as_str())),
            )
            .filter(pages::claimed_at.is_null().or(pages::claimed_at.lt(&cutoff)))
            .order(pages::id.asc())
            .limit(limit as i64)
            .load(&mut conn)
            .await?;

        Ok(records.into_iter().map(Self::record_to_page).collect())
    }

    /// Pages eligible for the correction workflow: acceptable pages with no
    /// correction record yet, plus pages a previous run left mid-correction.
    pub async fn get_needing_correction(
        &self,
        limit: usize,
        claim_ttl: Duration,
    ) -> Result<Vec<Page>, DieselError> {
        use diesel::dsl::{exists, not};

        let mut conn = self.pool.get().await?;
        let cutoff = (Utc::now() - claim_ttl).to_rfc3339();

        let records: Vec<PageRecord> = pages::table
            .filter(
                pages::quality_status
                    .eq(QualityStatus::NeedsCorrection.as_str())
                    .or(pages::quality_status
                        .eq(QualityStatus::Acceptable.as_str())
                        .and(not(exists(
                            corrections::table.filter(corrections::page_id.eq(pages::id)),
                        )))),
            )
            .filter(pages::needs_manual_review.eq(0))
            .filter(pages::claimed_at.is_null().or(pages::claimed_at.lt(&cutoff)))
            .order(pages::id.asc())
            .limit(limit as i64)
            .load(&mut conn)
            .await?;

        Ok(records.into_iter().map(Self::record_to_page).collect())
    }

    /// Claim a page for exclusive processing (compare-and-set).
    ///
    /// Succeeds only when the page is unclaimed or its claim is older than
    /// `claim_ttl`, so a crashed worker's claim recovers on its own. Returns
    /// false when another worker holds the page.
    pub async fn claim(&self, id: &str, claim_ttl: Duration) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        let cutoff = (Utc::now() - claim_ttl).to_rfc3339();

        let rows = diesel::update(
            pages::table
                .filter(pages::id.eq(id))
                .filter(pages::claimed_at.is_null().or(pages::claimed_at.lt(&cutoff))),
        )
        .set((pages::claimed_at.eq(&now), pages::updated_at.eq(&now)))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    /// Release a claim after processing.
    pub async fn release(&self, id: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(pages::table.filter(pages::id.eq(id)))
            .set((
                pages::claimed_at.eq(None::<String>),
                pages::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Record an assessment verdict (assessor-owned columns only).
    ///
    /// Rejects transitions the state machine does not allow; re-asserting
    /// the current status is always fine (re-assessment of the same text).
    pub async fn set_quality(
        &self,
        id: &str,
        score: i32,
        status: QualityStatus,
    ) -> Result<(), DieselError> {
        let current = self
            .get(id)
            .await?
            .ok_or(DieselError::NotFound)?
            .quality_status;

        if current != status && !current.can_transition_to(status) {
            return Err(to_diesel_error(format!(
                "illegal status transition for page {}: {} -> {}",
                id,
                current.as_str(),
                status.as_str()
            )));
        }

        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(pages::table.filter(pages::id.eq(id)))
            .set((
                pages::quality_score.eq(Some(score)),
                pages::quality_status.eq(status.as_str()),
                pages::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Record an accepted rescan: new canonical text plus the advanced
    /// attempt counter (rescan-owned columns only).
    pub async fn record_rescan(
        &self,
        id: &str,
        text_path: &str,
        text_hash: &str,
        attempts: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(pages::table.filter(pages::id.eq(id)))
            .set((
                pages::text_path.eq(Some(text_path)),
                pages::text_hash.eq(Some(text_hash)),
                pages::rescan_attempts.eq(attempts),
                pages::last_attempt_at.eq(Some(&now)),
                pages::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Advance the attempt counter without touching the canonical text
    /// (rejected or failed rescan attempt).
    pub async fn record_attempt(&self, id: &str, attempts: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(pages::table.filter(pages::id.eq(id)))
            .set((
                pages::rescan_attempts.eq(attempts),
                pages::last_attempt_at.eq(Some(&now)),
                pages::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Terminal failure: rescan budget exhausted, route to a human.
    ///
    /// Guarded on the current status so a concurrent transition (or a
    /// repeated invocation) cannot fail an already-settled page.
    pub async fn mark_failed(&self, id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(
            pages::table
                .filter(pages::id.eq(id))
                .filter(pages::quality_status.eq(QualityStatus::NeedsRescan.as_str())),
        )
        .set((
            pages::quality_status.eq(QualityStatus::Failed.as_str()),
            pages::needs_manual_review.eq(1),
            pages::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    /// Flag or clear the human-review marker.
    pub async fn set_needs_review(&self, id: &str, needs_review: bool) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(pages::table.filter(pages::id.eq(id)))
            .set((
                pages::needs_manual_review.eq(i32::from(needs_review)),
                pages::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Resolve a human review: clears the marker, leaves everything else.
    pub async fn mark_reviewed(&self, id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(
            pages::table
                .filter(pages::id.eq(id))
                .filter(pages::needs_manual_review.eq(1)),
        )
        .set((
            pages::needs_manual_review.eq(0),
            pages::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    /// Deliberate operator reset: `failed -> unchecked`, counters cleared.
    ///
    /// This is the only path out of the failed state and is intentionally
    /// separate from the automatic transition rules.
    pub async fn reset_for_retry(&self, id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(
            pages::table
                .filter(pages::id.eq(id))
                .filter(pages::quality_status.eq(QualityStatus::Failed.as_str())),
        )
        .set((
            pages::quality_status.eq(QualityStatus::Unchecked.as_str()),
            pages::quality_score.eq(None::<i32>),
            pages::rescan_attempts.eq(0),
            pages::needs_manual_review.eq(0),
            pages::claimed_at.eq(None::<String>),
            pages::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    /// Page counts per quality status.
    pub async fn counts_by_status(&self) -> Result<HashMap<QualityStatus, u64>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<StatusCount> = diesel::sql_query(
            "SELECT quality_status, COUNT(*) as count FROM pages GROUP BY quality_status",
        )
        .load(&mut conn)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            if let Some(status) = QualityStatus::from_str(&row.quality_status) {
                counts.insert(status, row.count as u64);
            }
        }
        Ok(counts)
    }

    /// Number of pages waiting on a human.
    pub async fn count_needing_review(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = pages::table
            .filter(pages::needs_manual_review.eq(1))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }
}
