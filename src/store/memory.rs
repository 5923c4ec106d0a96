//! In-process store used when no database is configured, and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    compare_values, Collection, Direction, Document, Filter, Query, RecordStore, StoreError, Write,
};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document exactly as given, bypassing server timestamps.
    /// Used to load fixtures with historical timestamps.
    pub async fn seed(&self, collection: Collection, doc: Document) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(doc.id.clone(), doc);
    }

    /// Strictly increasing clock so documents written back to back still
    /// order deterministically.
    async fn server_now(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock().await;
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

fn sort_key_cmp(a: &Document, b: &Document, order_by: &str) -> Ordering {
    let av = a.field(order_by).cloned().unwrap_or_default();
    let bv = b.field(order_by).cloned().unwrap_or_default();
    compare_values(&av, &bv).then_with(|| a.id.cmp(&b.id))
}

fn matches_all(doc: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(doc))
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, collection: Collection, write: Write) -> Result<String, StoreError> {
        let now = self.server_now().await;
        let id = Uuid::new_v4().to_string();
        let doc = Document {
            id: id.clone(),
            fields: write.resolve(now),
        };

        let mut collections = self.collections.write().await;
        collections.entry(collection).or_default().insert(id.clone(), doc);
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        write: Write,
    ) -> Result<(), StoreError> {
        let now = self.server_now().await;
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        doc.fields.extend(write.resolve(now));
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let position = query
            .start_after
            .as_ref()
            .map(|c| c.position())
            .transpose()?;

        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Document> = docs
            .values()
            .filter(|doc| doc.field(&query.order_by).is_some())
            .filter(|doc| matches_all(doc, &query.filters))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ord = sort_key_cmp(a, b, &query.order_by);
            match query.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });

        if let Some(position) = position {
            rows.retain(|doc| {
                let value = doc.field(&query.order_by).cloned().unwrap_or_default();
                let ord = compare_values(&value, &position.value)
                    .then_with(|| doc.id.as_str().cmp(position.id.as_str()));
                match query.direction {
                    Direction::Asc => ord == Ordering::Greater,
                    Direction::Desc => ord == Ordering::Less,
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.values().filter(|doc| matches_all(doc, filters)).count() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        let _ = self.collections.read().await;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Cursor;
    use serde_json::json;

    async fn store_with(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            store
                .create(
                    Collection::Notices,
                    Write::new()
                        .set("title", format!("notice {}", i))
                        .server_timestamp("createdAt"),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let id = store
            .create(Collection::Resources, Write::new().set("title", "Hometax"))
            .await
            .unwrap();
        let doc = store.get(Collection::Resources, &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["title"], json!("Hometax"));
        assert!(store.get(Collection::Notices, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        let id = store
            .create(
                Collection::Consultations,
                Write::new().set("name", "Kim").set("status", "new"),
            )
            .await
            .unwrap();
        store
            .update(Collection::Consultations, &id, Write::new().set("status", "done"))
            .await
            .unwrap();
        let doc = store.get(Collection::Consultations, &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("Kim"));
        assert_eq!(doc.fields["status"], json!("done"));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(Collection::Notices, "nope", Write::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        let err = store.delete(Collection::Notices, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_continues_strictly_after_cursor() {
        let store = store_with(7).await;
        let query = Query::ordered("createdAt", Direction::Desc).limit(3);
        let first = store.query(Collection::Notices, &query).await.unwrap();
        assert_eq!(first.len(), 3);

        let cursor = Cursor::after(first.last().unwrap(), "createdAt");
        let second = store
            .query(Collection::Notices, &query.clone().start_after(Some(cursor)))
            .await
            .unwrap();
        assert_eq!(second.len(), 3);
        assert!(first.iter().all(|a| second.iter().all(|b| a.id != b.id)));
        assert!(first.last().unwrap().fields["createdAt"].as_str() > second[0].fields["createdAt"].as_str());
    }

    #[tokio::test]
    async fn test_query_skips_documents_without_order_field() {
        let store = store_with(2).await;
        store
            .create(Collection::Notices, Write::new().set("title", "no timestamp"))
            .await
            .unwrap();
        let rows = store
            .query(Collection::Notices, &Query::ordered("createdAt", Direction::Asc))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_count_with_range_filters() {
        let store = MemoryStore::new();
        for (i, ts) in ["2024-01-01", "2024-01-02", "2024-01-03"].iter().enumerate() {
            store
                .seed(
                    Collection::Analytics,
                    Document {
                        id: format!("e{}", i),
                        fields: json!({ "timestamp": ts }).as_object().cloned().unwrap(),
                    },
                )
                .await;
        }
        let n = store
            .count(
                Collection::Analytics,
                &[
                    Filter::gte("timestamp", "2024-01-02"),
                    Filter::lt("timestamp", "2024-01-03"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
}
