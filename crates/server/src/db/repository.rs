use clinai_core::{PatientRecord, RecordPatch};
use deadpool_postgres::Pool;
use serde_json::Value as JsonValue;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use super::{Page, RecordFilter, RecordStore, StoreError};
use crate::BoxFuture;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS patient_records (
    patient_id  TEXT PRIMARY KEY,
    data        JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS patient_records_updated_at_idx
    ON patient_records (updated_at DESC);
";

/// Rows still carrying the legacy string encoding of a list field
const LEGACY_ROWS: &str = "SELECT patient_id, data FROM patient_records
   WHERE jsonb_typeof(data->'keywords') = 'string'
      OR jsonb_typeof(data->'timeline') = 'string'
      OR jsonb_typeof(data->'prescriptions') = 'string'";

/// Outcome of [`PgRecordStore::migrate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy rows rewritten into canonical form
    pub normalized: u64,
    /// Legacy rows that could not be decoded
    pub skipped: u64,
}

/// PostgreSQL-backed record store, one JSONB document per patient
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the schema if needed and rewrite legacy rows into canonical form.
    ///
    /// Rows that do not decode are left untouched and counted as skipped. The
    /// rewrites commit together.
    pub async fn migrate(&self) -> Result<MigrationReport, StoreError> {
        let mut client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;

        let tx = client.transaction().await?;
        let rows = tx.query(LEGACY_ROWS, &[]).await?;
        let mut report = MigrationReport::default();
        for row in rows {
            let patient_id: String = row.get(0);
            let record = match decode(&patient_id, row.get(1)) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "Leaving undecodable legacy record as is");
                    report.skipped += 1;
                    continue;
                }
            };
            let data = serde_json::to_value(&record)?;
            // updated_at is left alone so recency order is preserved
            report.normalized += tx
                .execute(
                    "UPDATE patient_records SET data = $2 WHERE patient_id = $1",
                    &[&patient_id, &data],
                )
                .await?;
        }
        tx.commit().await?;

        Ok(report)
    }

    async fn get_record(&self, patient_id: &str) -> Result<Option<PatientRecord>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT data FROM patient_records WHERE patient_id = $1",
                &[&patient_id],
            )
            .await?;

        row.map(|row| decode(patient_id, row.get(0))).transpose()
    }

    async fn upsert_record(&self, record: &PatientRecord) -> Result<(), StoreError> {
        let data = serde_json::to_value(record)?;
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO patient_records (patient_id, data) VALUES ($1, $2)
                 ON CONFLICT (patient_id)
                 DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
                &[&record.patient_id, &data],
            )
            .await?;
        Ok(())
    }

    async fn insert_records(&self, records: &[PatientRecord]) -> Result<u64, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let stmt = tx
            .prepare(
                "INSERT INTO patient_records (patient_id, data) VALUES ($1, $2)
                 ON CONFLICT (patient_id) DO NOTHING",
            )
            .await?;

        let mut inserted = 0;
        for record in records {
            let data = serde_json::to_value(record)?;
            inserted += tx.execute(&stmt, &[&record.patient_id, &data]).await?;
        }
        tx.commit().await?;

        Ok(inserted)
    }

    async fn patch_record(&self, patient_id: &str, patch: RecordPatch) -> Result<bool, StoreError> {
        let field = patch.field().as_str();
        let value = patch.to_json();
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE patient_records
                    SET data = data || jsonb_build_object($2::text, $3::jsonb),
                        updated_at = NOW()
                  WHERE patient_id = $1",
                &[&patient_id, &field, &value],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn delete_record(&self, patient_id: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM patient_records WHERE patient_id = $1",
                &[&patient_id],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn find_records(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<PatientRecord>, StoreError> {
        let (sql, params) = filter.to_sql(limit);
        let params: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &params).await?;
        Ok(decode_rows(rows))
    }

    async fn list_records(&self, page: Page) -> Result<Vec<PatientRecord>, StoreError> {
        let sql = format!(
            "SELECT data FROM patient_records ORDER BY patient_id {} OFFSET $1 LIMIT $2",
            page.order.as_sql()
        );
        let skip = i64::try_from(page.skip).unwrap_or(i64::MAX);
        let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &[&skip, &limit]).await?;
        Ok(decode_rows(rows))
    }

    async fn count_records(&self) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM patient_records", &[])
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn ping_db(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }
}

/// Decode `SELECT data` rows, skipping malformed documents
fn decode_rows(rows: Vec<Row>) -> Vec<PatientRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let data: JsonValue = row.get(0);
        match serde_json::from_value(data) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed patient record"),
        }
    }
    records
}

fn decode(patient_id: &str, data: JsonValue) -> Result<PatientRecord, StoreError> {
    serde_json::from_value(data).map_err(|source| StoreError::Decode {
        patient_id: patient_id.to_string(),
        source,
    })
}

impl RecordStore for PgRecordStore {
    fn get<'a>(
        &'a self,
        patient_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PatientRecord>, StoreError>> {
        Box::pin(self.get_record(patient_id))
    }

    fn upsert<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.upsert_record(record))
    }

    fn insert_many<'a>(
        &'a self,
        records: &'a [PatientRecord],
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(self.insert_records(records))
    }

    fn patch<'a>(
        &'a self,
        patient_id: &'a str,
        patch: RecordPatch,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(self.patch_record(patient_id, patch))
    }

    fn delete<'a>(&'a self, patient_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(self.delete_record(patient_id))
    }

    fn find<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PatientRecord>, StoreError>> {
        Box::pin(self.find_records(filter, limit))
    }

    fn list(&self, page: Page) -> BoxFuture<'_, Result<Vec<PatientRecord>, StoreError>> {
        Box::pin(self.list_records(page))
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(self.count_records())
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.ping_db())
    }

    fn close(&self) {
        self.pool.close();
    }
}
