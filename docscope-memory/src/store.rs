//! In-memory storage implementation.
//!
//! Collections are vectors of BSON documents kept in insertion order behind an
//! async-aware read-write lock. Every read scans the whole collection.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::debug;

use docscope_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{get_path, project},
    error::BrowseResult,
    normalize::ID_FIELD,
    query::{Expr, FindSpec, Sort, SortDirection},
};

use crate::evaluator::{DocumentEvaluator, compare};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document store.
///
/// Clones share the same underlying data, so a store can be seeded through one
/// handle and browsed through another.
///
/// # Example
///
/// ```ignore
/// use docscope_memory::MemoryStore;
/// use bson::doc;
///
/// let store = MemoryStore::new();
/// store.insert("users", [doc! { "name": "Alice", "age": 30 }]).await;
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    collections: Arc<RwLock<StoreMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Appends documents to `collection`, creating it if needed.
    ///
    /// Documents without an `_id` get a fresh `ObjectId`. Returns the identifiers
    /// in insertion order.
    pub async fn insert(
        &self,
        collection: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> Vec<Bson> {
        let mut store = self.collections.write().await;
        let rows = store.entry(collection.to_owned()).or_default();

        documents
            .into_iter()
            .map(|mut document| {
                if !document.contains_key(ID_FIELD) {
                    let mut with_id = Document::new();
                    with_id.insert(ID_FIELD, ObjectId::new());
                    with_id.extend(document);
                    document = with_id;
                }
                let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
                rows.push(document);
                id
            })
            .collect()
    }

    /// Removes a collection and its documents. Returns whether it existed.
    pub async fn drop_collection(&self, collection: &str) -> bool {
        self.collections.write().await.remove(collection).is_some()
    }

    fn select(rows: &[Document], spec: &FindSpec) -> BrowseResult<Vec<Document>> {
        let expr = Expr::from_filter(&spec.filter)?;
        let mut matched = DocumentEvaluator::new().filter(&expr, rows)?;

        if !spec.sort.is_empty() {
            matched.sort_by(|a, b| Self::order(a, b, &spec.sort));
        }

        Ok(matched
            .into_iter()
            .skip(spec.skip)
            .take(spec.limit.unwrap_or(usize::MAX))
            .map(|document| match &spec.projection {
                Some(fields) => project(document, fields),
                None => document.clone(),
            })
            .collect())
    }

    fn order(a: &Document, b: &Document, keys: &[Sort]) -> Ordering {
        keys.iter()
            .map(|key| {
                let left = get_path(a, &key.field).unwrap_or(&Bson::Null);
                let right = get_path(b, &key.field).unwrap_or(&Bson::Null);
                match key.direction {
                    SortDirection::Asc => compare(left, right),
                    SortDirection::Desc => compare(right, left),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn count_matching(rows: &[Document], filter: &Document) -> BrowseResult<u64> {
        let expr = Expr::from_filter(filter)?;
        Ok(DocumentEvaluator::new().filter(&expr, rows)?.len() as u64)
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        let store = self.collections.read().await;
        match store.get(collection) {
            Some(rows) => Self::select(rows, &spec),
            None => Ok(Vec::new()),
        }
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        let store = self.collections.read().await;
        match store.get(collection) {
            Some(rows) => Self::count_matching(rows, &filter),
            None => Ok(0),
        }
    }

    /// Runs both halves under one read lock so the page and the total agree.
    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        let store = self.collections.read().await;
        let Some(rows) = store.get(collection) else {
            return Ok((Vec::new(), 0));
        };

        let total = Self::count_matching(rows, &spec.filter)?;
        let page = Self::select(rows, &spec)?;
        debug!(collection, returned = page.len(), total, "memory find with count");
        Ok((page, total))
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        let store = self.collections.read().await;
        Ok(store
            .get(collection)
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        let mut names = self
            .collections
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}

/// Builder for [`MemoryStore`], optionally pre-seeded with collections.
#[derive(Default, Debug)]
pub struct MemoryStoreBuilder {
    seed: StoreMap,
}

impl MemoryStoreBuilder {
    /// Adds documents to a collection of the built store.
    pub fn with_documents(
        mut self,
        collection: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> Self {
        self.seed
            .entry(collection.into())
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MemoryStoreBuilder {
    type Backend = MemoryStore;

    async fn build(self) -> BrowseResult<Self::Backend> {
        let store = MemoryStore::new();
        for (collection, documents) in self.seed {
            store.insert(&collection, documents).await;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    async fn seeded() -> MemoryStore {
        MemoryStore::builder()
            .with_documents(
                "items",
                [
                    doc! { "_id": 1, "v": 10, "tag": "a" },
                    doc! { "_id": 2, "v": 10, "tag": "b" },
                    doc! { "_id": 3, "v": 20, "tag": "a" },
                    doc! { "_id": 4, "tag": "c" },
                ],
            )
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sorts_by_several_keys_with_missing_values_first() {
        let store = seeded().await;
        let spec = FindSpec::builder()
            .sort("v", SortDirection::Desc)
            .sort("_id", SortDirection::Desc)
            .build();

        let ids = store
            .find("items", spec)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get_i32("_id").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, [3, 2, 1, 4]);
    }

    #[tokio::test]
    async fn page_and_total_come_from_the_same_filter() {
        let store = seeded().await;
        let spec = FindSpec::builder()
            .filter(doc! { "tag": "a" })
            .sort("_id", SortDirection::Asc)
            .skip(1)
            .limit(5)
            .projection(vec!["_id".into()])
            .build();

        let (rows, total) = store.find_with_count("items", spec).await.unwrap();
        assert_eq!(rows, vec![doc! { "_id": 3 }]);
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn missing_collections_are_empty() {
        let store = MemoryStore::new();
        assert!(store.find("nope", FindSpec::new()).await.unwrap().is_empty());
        assert_eq!(store.count("nope", Document::new()).await.unwrap(), 0);
        assert!(store.sample("nope", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_assigns_object_ids_first() {
        let store = MemoryStore::new();
        let ids = store.insert("users", [doc! { "name": "Ada" }]).await;
        assert!(matches!(ids[0], Bson::ObjectId(_)));

        let rows = store.find("users", FindSpec::new()).await.unwrap();
        assert_eq!(rows[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(store.list_collections().await.unwrap(), ["users"]);
        assert!(store.drop_collection("users").await);
    }

    #[tokio::test]
    async fn rejected_filters_surface_as_input_errors() {
        let store = seeded().await;
        let err = store
            .count("items", doc! { "v": { "$near": 1 } })
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }
}
