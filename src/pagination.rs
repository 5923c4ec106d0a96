//! Cursor pagination over ordered collections, plus the "load more" list
//! that accumulates pages.

use serde::Serialize;

use crate::models::Record;
use crate::store::{Collection, Cursor, Direction, Query, RecordStore, StoreError};

/// Page size of the public notice list
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const MAX_PAGE_SIZE: usize = 100;

pub fn clamp_page_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
    /// True when the page came back full. The final page reports `true`
    /// as well when it happens to be exactly full.
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

/// Which collection a list shows and how it is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrder {
    pub collection: Collection,
    pub order_by: &'static str,
    pub direction: Direction,
}

impl ListOrder {
    pub const fn newest_first(collection: Collection) -> Self {
        Self {
            collection,
            order_by: "createdAt",
            direction: Direction::Desc,
        }
    }
}

/// Fetch up to `page_size` records continuing after `cursor`.
pub async fn load_page<T: Record>(
    store: &dyn RecordStore,
    order: ListOrder,
    page_size: usize,
    cursor: Option<Cursor>,
) -> Result<Page<T>, StoreError> {
    let query = Query::ordered(order.order_by, order.direction)
        .limit(page_size)
        .start_after(cursor);
    let docs = store.query(order.collection, &query).await?;

    let next_cursor = docs.last().map(|doc| Cursor::after(doc, order.order_by));
    let has_more = docs.len() == page_size;
    let items = docs
        .iter()
        .map(|doc| doc.decode::<T>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        next_cursor,
        has_more,
    })
}

/// Every record of a collection in the given order.
pub async fn load_all<T: Record>(
    store: &dyn RecordStore,
    order: ListOrder,
) -> Result<Vec<T>, StoreError> {
    let query = Query::ordered(order.order_by, order.direction);
    store
        .query(order.collection, &query)
        .await?
        .iter()
        .map(|doc| doc.decode::<T>())
        .collect()
}

/// Accumulated "load more" list. `page_size = None` loads the whole
/// collection at once.
#[derive(Debug, Clone)]
pub struct PagedList<T> {
    order: ListOrder,
    page_size: Option<usize>,
    items: Vec<T>,
    cursor: Option<Cursor>,
    has_more: bool,
    loading: bool,
}

impl<T: Record> PagedList<T> {
    pub fn new(order: ListOrder, page_size: Option<usize>) -> Self {
        Self {
            order,
            page_size,
            items: Vec::new(),
            cursor: None,
            has_more: false,
            loading: true,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Still waiting on the first successful load.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Reload from the top, dropping everything accumulated so far. A
    /// failed read leaves the current contents untouched.
    pub async fn load_first(&mut self, store: &dyn RecordStore) -> Result<(), StoreError> {
        let page = self.fetch(store, None).await.map_err(|e| {
            tracing::error!(collection = %self.order.collection, error = %e, "failed to load list");
            e
        })?;
        self.items = page.items;
        self.cursor = page.next_cursor;
        self.has_more = page.has_more;
        self.loading = false;
        Ok(())
    }

    /// Append the next page. Does nothing once the list reports no more
    /// records.
    pub async fn load_more(&mut self, store: &dyn RecordStore) -> Result<(), StoreError> {
        if !self.has_more || self.cursor.is_none() {
            return Ok(());
        }
        let page = self.fetch(store, self.cursor.clone()).await.map_err(|e| {
            tracing::error!(collection = %self.order.collection, error = %e, "failed to load more");
            e
        })?;
        // No de-duplication: a record created between loads can show up twice.
        self.items.extend(page.items);
        if page.next_cursor.is_some() {
            self.cursor = page.next_cursor;
        }
        self.has_more = page.has_more;
        Ok(())
    }

    /// Drop a record locally without asking the store.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    async fn fetch(
        &self,
        store: &dyn RecordStore,
        cursor: Option<Cursor>,
    ) -> Result<Page<T>, StoreError> {
        match self.page_size {
            Some(size) => load_page(store, self.order, size, cursor).await,
            None => Ok(Page {
                items: load_all(store, self.order).await?,
                next_cursor: None,
                has_more: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Notice;
    use crate::store::{MemoryStore, Write};

    const NOTICES: ListOrder = ListOrder::newest_first(Collection::Notices);

    async fn seeded(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            store
                .create(
                    Collection::Notices,
                    Write::new()
                        .set("title", format!("notice {}", i))
                        .set("content", "body")
                        .set("category", "service")
                        .server_timestamp("createdAt")
                        .server_timestamp("updatedAt"),
                )
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_clamp_page_size() {
        assert_eq!(clamp_page_size(None), 5);
        assert_eq!(clamp_page_size(Some(0)), 1);
        assert_eq!(clamp_page_size(Some(1000)), 100);
    }

    #[tokio::test]
    async fn test_descending_order_holds_across_pages() {
        let store = seeded(12).await;
        let mut cursor = None;
        let mut previous_last: Option<Notice> = None;
        let mut seen = 0;

        loop {
            let page: Page<Notice> = load_page(&store, NOTICES, 5, cursor).await.unwrap();
            if let (Some(prev), Some(first)) = (&previous_last, page.items.first()) {
                assert!(first.created_at <= prev.created_at);
            }
            for pair in page.items.windows(2) {
                assert!(pair[1].created_at <= pair[0].created_at);
            }
            seen += page.items.len();
            previous_last = page.items.last().cloned();
            cursor = page.next_cursor;
            if !page.has_more {
                break;
            }
        }
        assert_eq!(seen, 12);
    }

    #[tokio::test]
    async fn test_exactly_full_last_page_still_reports_more() {
        let store = seeded(10).await;
        let first: Page<Notice> = load_page(&store, NOTICES, 5, None).await.unwrap();
        let second: Page<Notice> = load_page(&store, NOTICES, 5, first.next_cursor)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 5);
        assert!(second.has_more);

        let third: Page<Notice> = load_page(&store, NOTICES, 5, second.next_cursor)
            .await
            .unwrap();
        assert!(third.items.is_empty());
        assert!(!third.has_more);
        assert!(third.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_paged_list_accumulates_and_resets() {
        let store = seeded(7).await;
        let mut list = PagedList::<Notice>::new(NOTICES, Some(5));
        assert!(list.is_loading());

        list.load_first(&store).await.unwrap();
        assert!(!list.is_loading());
        assert_eq!(list.items().len(), 5);
        assert!(list.has_more());

        list.load_more(&store).await.unwrap();
        assert_eq!(list.items().len(), 7);
        assert!(!list.has_more());

        // Nothing left to load.
        list.load_more(&store).await.unwrap();
        assert_eq!(list.items().len(), 7);

        list.load_first(&store).await.unwrap();
        assert_eq!(list.items().len(), 5);
    }

    #[tokio::test]
    async fn test_paged_list_remove_is_local() {
        let store = seeded(3).await;
        let mut list = PagedList::<Notice>::new(NOTICES, None);
        list.load_first(&store).await.unwrap();
        let id = list.items()[1].id.clone();

        assert!(list.remove(&id).is_some());
        assert!(list.remove(&id).is_none());
        assert_eq!(list.items().len(), 2);
        assert!(store.get(Collection::Notices, &id).await.unwrap().is_some());
    }
}
