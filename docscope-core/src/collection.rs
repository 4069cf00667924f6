//! Collection handles.
//!
//! A [`Collection`] binds a collection name to a backend and runs every store
//! round trip under a [`CallContext`], so deadlines and cancellation apply
//! uniformly to the pagination engine and the schema inferencer.
//!
//! # Example
//!
//! ```ignore
//! use docscope::{collection::Collection, context::CallContext, query::FindSpec};
//!
//! let users = Collection::new("users", &backend);
//! let rows = users.find(FindSpec::new(), &CallContext::new()).await?;
//! ```

use bson::Document;

use crate::{
    backend::StoreBackend, context::CallContext, error::BrowseResult, query::FindSpec,
};

#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub fn new(name: impl Into<String>, backend: &'a B) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub async fn find(&self, spec: FindSpec, context: &CallContext) -> BrowseResult<Vec<Document>> {
        context.run(self.backend.find(&self.name, spec)).await
    }

    pub async fn count(&self, filter: Document, context: &CallContext) -> BrowseResult<u64> {
        context.run(self.backend.count(&self.name, filter)).await
    }

    /// Fetches a page and the total match count in one logical operation.
    pub async fn find_with_count(
        &self,
        spec: FindSpec,
        context: &CallContext,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        context
            .run(self.backend.find_with_count(&self.name, spec))
            .await
    }

    pub async fn sample(&self, limit: usize, context: &CallContext) -> BrowseResult<Vec<Document>> {
        context.run(self.backend.sample(&self.name, limit)).await
    }
}

impl<B: StoreBackend> Clone for Collection<'_, B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: self.backend,
        }
    }
}
