//! Storage backend abstraction for collection browsing.
//!
//! This module defines the minimal read capability the core needs from a document
//! database. Everything the pagination engine and the schema inferencer do is
//! expressed in terms of these calls.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docscope::backend::StoreBackend;
//! use docscope::query::{FindSpec, Filter, SortDirection};
//!
//! let spec = FindSpec::builder()
//!     .filter(Filter::gt("age", 18))
//!     .sort("age", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//!
//! let (rows, total) = backend.find_with_count("users", spec).await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{any::Any, fmt::Debug};

use crate::{error::BrowseResult, query::FindSpec};

/// Read capability of a document store.
///
/// Implementations must be thread-safe: the browser shares one backend across
/// concurrent calls and holds no lock of its own.
///
/// Filters arrive in the MongoDB dialect and have already been normalized and
/// screened for server-side code. A backend that does not run MongoDB natively
/// parses them with [`crate::query::Expr::from_filter`].
///
/// # Errors
///
/// Backends report a rejected filter as [`crate::error::BrowseError::InvalidInput`],
/// an unreachable store as [`crate::error::BrowseError::Unavailable`] and any other
/// failure as [`crate::error::BrowseError::Backend`].
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents of `collection` matching `spec`, sorted, skipped,
    /// limited and projected as requested.
    ///
    /// A collection that does not exist behaves like an empty one.
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>>;

    /// Counts the documents of `collection` matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64>;

    /// Fetches one page and counts all matches for the same filter as a single
    /// logical operation.
    ///
    /// The default implementation dispatches [`StoreBackend::find`] and
    /// [`StoreBackend::count`] concurrently. Backends with a native combined
    /// primitive should override it.
    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        let filter = spec.filter.clone();
        futures::try_join!(self.find(collection, spec), self.count(collection, filter))
    }

    /// Returns up to `limit` documents of `collection`, chosen at the backend's
    /// discretion.
    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>>;

    /// Lists the names of all collections.
    async fn list_collections(&self) -> BrowseResult<Vec<String>>;
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        (*self).find(collection, spec).await
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        (*self).count(collection, filter).await
    }

    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        (*self).find_with_count(collection, spec).await
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        (*self).sample(collection, limit).await
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        (*self).list_collections().await
    }
}

#[async_trait]
impl<B> StoreBackend for &mut B
where
    B: StoreBackend,
{
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        (**self).find(collection, spec).await
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        (**self).count(collection, filter).await
    }

    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        (**self).find_with_count(collection, spec).await
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        (**self).sample(collection, limit).await
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        (**self).list_collections().await
    }
}

/// Object-safe mirror of [`StoreBackend`] for callers that pick a backend at runtime.
///
/// Every `StoreBackend + 'static` implements it. `Box<dyn DynStoreBackend>` in turn
/// implements [`StoreBackend`], so a boxed backend plugs straight into the browser.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>>;
    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64>;
    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)>;
    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>>;
    async fn list_collections(&self) -> BrowseResult<Vec<String>>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        StoreBackend::find(self, collection, spec).await
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        StoreBackend::count(self, collection, filter).await
    }

    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        StoreBackend::find_with_count(self, collection, spec).await
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        StoreBackend::sample(self, collection, limit).await
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        DynStoreBackend::find(self.as_ref(), collection, spec).await
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        DynStoreBackend::count(self.as_ref(), collection, filter).await
    }

    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        DynStoreBackend::find_with_count(self.as_ref(), collection, spec).await
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        DynStoreBackend::sample(self.as_ref(), collection, limit).await
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        DynStoreBackend::list_collections(self.as_ref()).await
    }
}

/// Factory trait for creating backend instances.
///
/// Builders carry connection settings and perform any asynchronous setup (such
/// as connecting to a server) in [`StoreBackendBuilder::build`].
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> BrowseResult<Self::Backend>;
}
