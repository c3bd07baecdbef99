//! Patient record storage

mod filter;
mod memory;
mod repository;

pub use filter::{AgeBound, KeywordMatch, RecordFilter};
pub use memory::MemoryRecordStore;
pub use repository::{MigrationReport, PgRecordStore};

use clinai_core::{PatientRecord, RecordPatch};
use deadpool_postgres::{Config, Pool, Runtime};
use serde::Deserialize;
use thiserror::Error;
use tokio_postgres::NoTls;

use crate::BoxFuture;

/// Record store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Malformed record {patient_id}: {source}")]
    Decode {
        patient_id: String,
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Direction of a listing ordered by `patient_id`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One page of records ordered by `patient_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub skip: usize,
    pub order: SortOrder,
}

/// Document store of patient records keyed by `patient_id`
pub trait RecordStore
where
    Self: Send + Sync,
{
    fn get<'a>(
        &'a self,
        patient_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PatientRecord>, StoreError>>;

    /// Insert or wholesale replace the record with the same `patient_id`
    fn upsert<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Insert every record whose `patient_id` is not stored yet; stored
    /// records are left as they are. Returns how many were inserted.
    fn insert_many<'a>(
        &'a self,
        records: &'a [PatientRecord],
    ) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Returns `false` when no record has this id
    fn patch<'a>(
        &'a self,
        patient_id: &'a str,
        patch: RecordPatch,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Returns `false` when no record has this id
    fn delete<'a>(&'a self, patient_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// At most `limit` matching records, most recently written first
    fn find<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PatientRecord>, StoreError>>;

    fn list(&self, page: Page) -> BoxFuture<'_, Result<Vec<PatientRecord>, StoreError>>;

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Release held connections. Called once at shutdown.
    fn close(&self) {}
}

/// Create a connection pool from a database URL
pub fn create_pool(database_url: &str) -> Result<Pool, deadpool_postgres::CreatePoolError> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
}
