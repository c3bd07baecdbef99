use std::sync::atomic::{AtomicBool, Ordering};

use clinai_core::{PatientRecord, RecordPatch};
use tokio::sync::RwLock;

use super::{Page, RecordFilter, RecordStore, SortOrder, StoreError};
use crate::BoxFuture;

/// In-process record store, used when no database is configured.
///
/// Records are kept in write order; lookups walk newest first.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<PatientRecord>>,
    closed: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store; later entries count as more recently written.
    pub fn with_records(records: impl IntoIterator<Item = PatientRecord>) -> Self {
        let mut deduped: Vec<PatientRecord> = Vec::new();
        for record in records {
            deduped.retain(|r| r.patient_id != record.patient_id);
            deduped.push(record);
        }
        Self {
            records: RwLock::new(deduped),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn get<'a>(
        &'a self,
        patient_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PatientRecord>, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let records = self.records.read().await;
            Ok(records.iter().find(|r| r.patient_id == patient_id).cloned())
        })
    }

    fn upsert<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let mut records = self.records.write().await;
            records.retain(|r| r.patient_id != record.patient_id);
            records.push(record.clone());
            Ok(())
        })
    }

    fn insert_many<'a>(
        &'a self,
        records: &'a [PatientRecord],
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let mut stored = self.records.write().await;
            let mut inserted = 0;
            for record in records {
                if stored.iter().any(|r| r.patient_id == record.patient_id) {
                    continue;
                }
                stored.push(record.clone());
                inserted += 1;
            }
            Ok(inserted)
        })
    }

    fn patch<'a>(
        &'a self,
        patient_id: &'a str,
        patch: RecordPatch,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let mut records = self.records.write().await;
            let Some(position) = records.iter().position(|r| r.patient_id == patient_id) else {
                return Ok(false);
            };
            let mut record = records.remove(position);
            patch.apply(&mut record);
            records.push(record);
            Ok(true)
        })
    }

    fn delete<'a>(&'a self, patient_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|r| r.patient_id != patient_id);
            Ok(records.len() < before)
        })
    }

    fn find<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PatientRecord>, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let records = self.records.read().await;
            Ok(records
                .iter()
                .rev()
                .filter(|r| filter.matches(r))
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn list(&self, page: Page) -> BoxFuture<'_, Result<Vec<PatientRecord>, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            let records = self.records.read().await;
            let mut sorted: Vec<&PatientRecord> = records.iter().collect();
            sorted.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
            if page.order == SortOrder::Desc {
                sorted.reverse();
            }
            Ok(sorted
                .into_iter()
                .skip(page.skip)
                .take(page.limit)
                .cloned()
                .collect())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(self.records.read().await.len() as u64)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.ensure_open() })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeywordMatch;
    use clinai_core::RecordField;

    fn record(id: &str, keywords: &[&str]) -> PatientRecord {
        let mut record = PatientRecord::new(id, "note", "conversation");
        record.keywords = keywords.iter().map(|k| k.to_string()).collect();
        record
    }

    fn any_of(term: &str) -> RecordFilter {
        RecordFilter {
            keywords: KeywordMatch::AnyOf(vec![term.to_string()]),
            gender: None,
            age: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_moves_to_front() {
        let store = MemoryRecordStore::with_records([
            record("1", &["asthma"]),
            record("2", &["asthma"]),
        ]);
        store.upsert(&record("1", &["asthma", "copd"])).await.unwrap();

        let found = store.find(&any_of("asthma"), 10).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(found[0].keywords, vec!["asthma", "copd"]);
    }

    #[tokio::test]
    async fn find_respects_limit() {
        let store =
            MemoryRecordStore::with_records((0..10).map(|i| record(&i.to_string(), &["flu"])));
        assert_eq!(store.find(&any_of("flu"), 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn patch_and_delete_report_missing_records() {
        let store = MemoryRecordStore::with_records([record("1", &["flu"])]);
        let patch = RecordPatch::Text(RecordField::Summary, "Recovered.".into());

        assert!(store.patch("1", patch.clone()).await.unwrap());
        assert!(!store.patch("9", patch).await.unwrap());
        assert_eq!(store.get("1").await.unwrap().unwrap().summary, "Recovered.");

        assert!(store.delete("1").await.unwrap());
        assert!(!store.delete("1").await.unwrap());
        assert!(store.get("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_many_keeps_stored_records() {
        let store = MemoryRecordStore::with_records([record("1", &["asthma"])]);
        let batch = [
            record("1", &[]),
            record("2", &["flu"]),
            record("2", &["measles"]),
        ];

        assert_eq!(store.insert_many(&batch).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get("1").await.unwrap().unwrap().keywords, vec!["asthma"]);
        assert_eq!(store.get("2").await.unwrap().unwrap().keywords, vec!["flu"]);
    }

    #[tokio::test]
    async fn list_pages_by_patient_id() {
        let store =
            MemoryRecordStore::with_records(["c", "a", "e", "b", "d"].map(|id| record(id, &[])));
        let page = |skip, order| Page {
            limit: 2,
            skip,
            order,
        };
        let ids = |records: Vec<PatientRecord>| {
            records
                .into_iter()
                .map(|r| r.patient_id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(store.list(page(0, SortOrder::Asc)).await.unwrap()), ["a", "b"]);
        assert_eq!(ids(store.list(page(2, SortOrder::Asc)).await.unwrap()), ["c", "d"]);
        assert_eq!(ids(store.list(page(4, SortOrder::Asc)).await.unwrap()), ["e"]);
        assert_eq!(ids(store.list(page(1, SortOrder::Desc)).await.unwrap()), ["d", "c"]);
        assert!(store.list(page(9, SortOrder::Asc)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_is_unavailable() {
        let store = MemoryRecordStore::new();
        store.close();
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.find(&any_of("flu"), 1).await.is_err());
    }
}
