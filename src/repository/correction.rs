//! Correction repository.
//!
//! Corrections are append-only: rows are inserted once, after both LLM
//! rounds succeed, and never updated. The newest row per page is the one
//! shown to readers.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{CorrectionRow, NewCorrection};
use super::pool::{AsyncSqlitePool, DieselError};
use super::util::parse_datetime;
use crate::models::{Confidence, CorrectionAssessment, CorrectionRecord, ImprovementLevel};
use crate::schema::corrections;

#[derive(Clone)]
pub struct CorrectionRepository {
    pool: AsyncSqlitePool,
}

impl CorrectionRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: CorrectionRow) -> CorrectionRecord {
        CorrectionRecord {
            id: row.id as i64,
            page_id: row.page_id,
            original_text: row.original_text,
            corrected_text: row.corrected_text,
            quality_score: row.quality_score,
            improvement_level: ImprovementLevel::from_str(&row.improvement_level)
                .unwrap_or(ImprovementLevel::Minimal),
            confidence: Confidence::from_str(&row.confidence).unwrap_or(Confidence::Low),
            needs_review: row.needs_review != 0,
            major_corrections: serde_json::from_str(&row.major_corrections).unwrap_or_default(),
            model: row.model,
            api_cost_usd: row.api_cost_usd,
            processing_time_ms: row.processing_time_ms as i64,
            created_at: parse_datetime(&row.created_at),
        }
    }

    /// Store a completed correction (both rounds succeeded).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        page_id: &str,
        original_text: &str,
        corrected_text: &str,
        assessment: &CorrectionAssessment,
        assessment_json: &str,
        model: &str,
        api_cost_usd: f64,
        processing_time_ms: i64,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = chrono::Utc::now().to_rfc3339();
        let major = serde_json::to_string(&assessment.major_corrections)
            .unwrap_or_else(|_| "[]".to_string());

        diesel::insert_into(corrections::table)
            .values(NewCorrection {
                page_id,
                original_text,
                corrected_text,
                quality_score: assessment.quality_score,
                improvement_level: assessment.improvement_level.as_str(),
                confidence: assessment.confidence.as_str(),
                needs_review: i32::from(assessment.needs_review),
                major_corrections: &major,
                assessment_json,
                model,
                api_cost_usd,
                processing_time_ms: processing_time_ms as i32,
                created_at: &now,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Latest correction for a page, if any.
    pub async fn latest_for_page(
        &self,
        page_id: &str,
    ) -> Result<Option<CorrectionRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        let row: Option<CorrectionRow> = corrections::table
            .filter(corrections::page_id.eq(page_id))
            .order(corrections::created_at.desc())
            .then_order_by(corrections::id.desc())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(row.map(Self::row_to_record))
    }

    /// Whether any correction exists for a page.
    pub async fn exists_for_page(&self, page_id: &str) -> Result<bool, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = corrections::table
            .filter(corrections::page_id.eq(page_id))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count > 0)
    }

    /// Count all stored corrections.
    pub async fn count(&self) -> Result<u64, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = corrections::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Count corrections flagged for human review.
    pub async fn count_needing_review(&self) -> Result<u64, DieselError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;
        let count: i64 = corrections::table
            .filter(corrections::needs_review.eq(1))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }
}
