//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! Domain types live in `crate::models`; the structs here mirror rows as
//! stored (timestamps as RFC3339 TEXT, booleans as INTEGER).

use diesel::prelude::*;

use crate::schema;

/// Page record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::pages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PageRecord {
    pub id: String,
    pub image_path: String,
    pub text_path: Option<String>,
    pub text_hash: Option<String>,
    pub quality_score: Option<i32>,
    pub quality_status: String,
    pub rescan_attempts: i32,
    pub last_attempt_at: Option<String>,
    pub needs_manual_review: i32,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New page for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::pages)]
pub struct NewPage<'a> {
    pub id: &'a str,
    pub image_path: &'a str,
    pub text_path: Option<&'a str>,
    pub text_hash: Option<&'a str>,
    pub quality_score: Option<i32>,
    pub quality_status: &'a str,
    pub rescan_attempts: i32,
    pub last_attempt_at: Option<&'a str>,
    pub needs_manual_review: i32,
    pub claimed_at: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Correction record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::corrections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CorrectionRow {
    pub id: i32,
    pub page_id: String,
    pub original_text: String,
    pub corrected_text: String,
    pub quality_score: i32,
    pub improvement_level: String,
    pub confidence: String,
    pub needs_review: i32,
    pub major_corrections: String,
    pub assessment_json: String,
    pub model: String,
    pub api_cost_usd: f64,
    pub processing_time_ms: i32,
    pub created_at: String,
}

/// New correction for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::corrections)]
pub struct NewCorrection<'a> {
    pub page_id: &'a str,
    pub original_text: &'a str,
    pub corrected_text: &'a str,
    pub quality_score: i32,
    pub improvement_level: &'a str,
    pub confidence: &'a str,
    pub needs_review: i32,
    pub major_corrections: &'a str,
    pub assessment_json: &'a str,
    pub model: &'a str,
    pub api_cost_usd: f64,
    pub processing_time_ms: i32,
    pub created_at: &'a str,
}

/// Reprocessing queue record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::reprocess_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReprocessEntryRecord {
    pub id: i32,
    pub page_id: String,
    pub reason: String,
    pub priority: i32,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// New queue entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::reprocess_queue)]
pub struct NewReprocessEntry<'a> {
    pub page_id: &'a str,
    pub reason: &'a str,
    pub priority: i32,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    pub created_at: &'a str,
    pub started_at: Option<&'a str>,
    pub completed_at: Option<&'a str>,
}

/// Cost ledger record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::cost_ledger)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerRecord {
    pub id: i32,
    pub model: String,
    pub operation: String,
    pub page_id: Option<String>,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost_usd: f64,
    pub created_at: String,
}

/// New ledger entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::cost_ledger)]
pub struct NewLedgerEntry<'a> {
    pub model: &'a str,
    pub operation: &'a str,
    pub page_id: Option<&'a str>,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost_usd: f64,
    pub created_at: &'a str,
}
