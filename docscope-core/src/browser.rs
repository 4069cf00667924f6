//! The collection browser: the one entry point an HTTP layer calls.
//!
//! [`CollectionBrowser`] wires a backend to the pagination engine and the
//! schema inferencer, turns raw query strings into filters and picks offset or
//! cursor mode per request.
//!
//! # Example
//!
//! ```ignore
//! use docscope::prelude::*;
//!
//! let browser = CollectionBrowser::new(MemoryStore::new());
//! let page = browser
//!     .list_documents(
//!         "users",
//!         ListRequest {
//!             query: Some(r#"{"age": {"$gt": 18}}"#.into()),
//!             use_cursor: true,
//!             ..Default::default()
//!         },
//!         &CallContext::new(),
//!     )
//!     .await?;
//! ```

use bson::Document;
use serde_json::Value;
use tracing::{Span, debug, instrument, warn};

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::BrowseConfig,
    context::CallContext,
    document::json_object_to_document,
    error::{BrowseError, BrowseResult},
    normalize::IdentifierNormalizer,
    page::{CursorPage, OffsetPage, PageResult},
    pagination::{CursorRequest, OffsetRequest, PaginationEngine},
    query::{Filter, SortDirection, reject_server_side_code, reject_server_side_code_text},
    schema::{InferRequest, SchemaInferencer, SchemaReport, string_fields},
};

/// A listing request as an HTTP layer receives it.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// A JSON filter object, or free text to search for.
    pub query: Option<String>,
    /// Offset mode only.
    pub skip: usize,
    pub limit: Option<usize>,
    pub sort_field: Option<String>,
    pub sort_order: SortDirection,
    /// Cursor mode only.
    pub cursor: Option<String>,
    pub use_cursor: bool,
    /// Fields to return; the identifier is always included.
    pub fields: Option<Vec<String>>,
}

/// Offset-mode parameters for a structured search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub skip: usize,
    pub limit: Option<usize>,
    pub sort_field: Option<String>,
    pub sort_order: SortDirection,
    pub fields: Option<Vec<String>>,
}

/// Generic browsing over the collections of one backend.
///
/// Holds no mutable state; share it behind an `Arc` and call it concurrently.
#[derive(Debug)]
pub struct CollectionBrowser<B: StoreBackend> {
    backend: B,
    config: BrowseConfig,
    normalizer: IdentifierNormalizer,
    engine: PaginationEngine,
    inferencer: SchemaInferencer,
}

impl<B: StoreBackend> CollectionBrowser<B> {
    /// Creates a browser with the default configuration.
    pub fn new(backend: B) -> Self {
        let config = BrowseConfig::default();
        Self {
            backend,
            normalizer: IdentifierNormalizer::default(),
            engine: PaginationEngine::new(config.clone()),
            inferencer: SchemaInferencer::new(&config),
            config,
        }
    }

    /// Creates a browser with a validated configuration.
    pub fn with_config(backend: B, config: BrowseConfig) -> BrowseResult<Self> {
        config.validate()?;

        Ok(Self {
            backend,
            normalizer: IdentifierNormalizer::default(),
            engine: PaginationEngine::new(config.clone()),
            inferencer: SchemaInferencer::new(&config),
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &BrowseConfig {
        &self.config
    }

    pub fn collection(&self, name: &str) -> Collection<'_, B> {
        Collection::new(name, &self.backend)
    }

    /// Lists documents in offset or cursor mode.
    ///
    /// A `query` that parses as a JSON object is a filter; anything else is free
    /// text matched case-insensitively against the collection's searchable fields.
    ///
    /// # Errors
    ///
    /// [`BrowseError::InvalidInput`] when the query mentions a server-side code
    /// operator; store failures, timeouts and cancellation as they occur.
    #[instrument(skip_all, fields(collection = collection, mode = tracing::field::Empty))]
    pub async fn list_documents(
        &self,
        collection: &str,
        request: ListRequest,
        context: &CallContext,
    ) -> BrowseResult<PageResult> {
        let context = self.effective(context);
        let handle = self.collection(collection);
        let filter = self
            .build_filter(&handle, request.query.as_deref(), &context)
            .await?;

        if request.use_cursor {
            Span::current().record("mode", "cursor");
            let page = self
                .engine
                .paginate_cursor(
                    &handle,
                    CursorRequest {
                        filter,
                        sort_field: request.sort_field,
                        direction: request.sort_order,
                        limit: request.limit,
                        cursor: request.cursor,
                        projection: request.fields,
                    },
                    &context,
                )
                .await?;
            Ok(PageResult::Cursor(page))
        } else {
            Span::current().record("mode", "offset");
            let page = self
                .engine
                .paginate_offset(
                    &handle,
                    OffsetRequest {
                        filter,
                        sort_field: request.sort_field,
                        direction: request.sort_order,
                        skip: request.skip,
                        limit: request.limit,
                        projection: request.fields,
                    },
                    &context,
                )
                .await?;
            Ok(PageResult::Offset(page))
        }
    }

    /// Offset-mode search over an already structured filter.
    #[instrument(skip_all, fields(collection = collection))]
    pub async fn search_documents(
        &self,
        collection: &str,
        filter: Document,
        request: SearchRequest,
        context: &CallContext,
    ) -> BrowseResult<OffsetPage> {
        self.screen(&filter)?;

        self.engine
            .paginate_offset(
                &self.collection(collection),
                OffsetRequest {
                    filter,
                    sort_field: request.sort_field,
                    direction: request.sort_order,
                    skip: request.skip,
                    limit: request.limit,
                    projection: request.fields,
                },
                &self.effective(context),
            )
            .await
    }

    #[instrument(skip_all, fields(collection = collection))]
    pub async fn paginate_cursor(
        &self,
        collection: &str,
        request: CursorRequest,
        context: &CallContext,
    ) -> BrowseResult<CursorPage> {
        self.screen(&request.filter)?;

        self.engine
            .paginate_cursor(&self.collection(collection), request, &self.effective(context))
            .await
    }

    #[instrument(skip_all, fields(collection = collection))]
    pub async fn paginate_offset(
        &self,
        collection: &str,
        request: OffsetRequest,
        context: &CallContext,
    ) -> BrowseResult<OffsetPage> {
        self.screen(&request.filter)?;

        self.engine
            .paginate_offset(&self.collection(collection), request, &self.effective(context))
            .await
    }

    /// Infers the collection's field schema from the first available source.
    #[instrument(skip_all, fields(collection = collection))]
    pub async fn infer_schema(
        &self,
        collection: &str,
        request: InferRequest<'_>,
        context: &CallContext,
    ) -> BrowseResult<SchemaReport> {
        self.inferencer
            .infer(&self.collection(collection), request, &self.effective(context))
            .await
    }

    /// Rewrites identifier-candidate strings into native identifiers.
    pub fn normalize_filter(&self, filter: &Document) -> Document {
        self.normalizer.normalize(filter)
    }

    /// String-valued fields of a sample of the collection, capped at
    /// `text_search_max_fields`.
    #[instrument(skip_all, fields(collection = collection))]
    pub async fn searchable_fields(
        &self,
        collection: &str,
        context: &CallContext,
    ) -> BrowseResult<Vec<String>> {
        self.discover_searchable(&self.collection(collection), &self.effective(context))
            .await
    }

    pub async fn list_collections(&self, context: &CallContext) -> BrowseResult<Vec<String>> {
        let mut names = self
            .effective(context)
            .run(self.backend.list_collections())
            .await?;
        names.sort();
        Ok(names)
    }

    async fn build_filter(
        &self,
        collection: &Collection<'_, B>,
        query: Option<&str>,
        context: &CallContext,
    ) -> BrowseResult<Document> {
        let query = match query.map(str::trim) {
            Some(query) if !query.is_empty() => query,
            _ => return Ok(Document::new()),
        };

        if let Err(e) = reject_server_side_code_text(query) {
            warn!(error = %e, "query rejected");
            return Err(e);
        }

        match serde_json::from_str::<Value>(query) {
            Ok(Value::Object(map)) => {
                let filter = json_object_to_document(&map)?;
                self.screen(&filter)?;
                Ok(filter)
            }
            _ => self.text_search(collection, query, context).await,
        }
    }

    async fn text_search(
        &self,
        collection: &Collection<'_, B>,
        text: &str,
        context: &CallContext,
    ) -> BrowseResult<Document> {
        let fields = self.discover_searchable(collection, context).await?;
        if fields.is_empty() {
            debug!("no searchable fields, text search matches everything");
            return Ok(Document::new());
        }

        let pattern = regex::escape(text);
        debug!(fields = ?fields, "text search");
        Ok(Filter::or(
            fields.iter().map(|field| Filter::matches(field, pattern.as_str())),
        ))
    }

    async fn discover_searchable(
        &self,
        collection: &Collection<'_, B>,
        context: &CallContext,
    ) -> BrowseResult<Vec<String>> {
        let sample = collection
            .sample(self.config.clamp_sample_size(self.config.sample_size), context)
            .await?;

        let mut fields = string_fields(&sample);
        fields.truncate(self.config.text_search_max_fields);
        Ok(fields)
    }

    fn screen(&self, filter: &Document) -> BrowseResult<()> {
        reject_server_side_code(filter).inspect_err(|e| warn!(error = %e, "filter rejected"))
    }

    fn effective(&self, context: &CallContext) -> CallContext {
        context.or_timeout(self.config.request_timeout())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bson::doc;

    use super::*;
    use crate::query::FindSpec;

    #[derive(Debug, Default)]
    struct FixedBackend {
        rows: Vec<Document>,
        filters: Mutex<Vec<Document>>,
    }

    #[async_trait]
    impl StoreBackend for FixedBackend {
        async fn find(&self, _collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
            self.filters.lock().unwrap().push(spec.filter);
            Ok(self.rows.clone())
        }

        async fn count(&self, _collection: &str, _filter: Document) -> BrowseResult<u64> {
            Ok(self.rows.len() as u64)
        }

        async fn sample(&self, _collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
            Ok(self.rows.iter().take(limit).cloned().collect())
        }

        async fn list_collections(&self) -> BrowseResult<Vec<String>> {
            Ok(vec!["b".into(), "a".into()])
        }
    }

    fn browser() -> CollectionBrowser<FixedBackend> {
        CollectionBrowser::new(FixedBackend {
            rows: vec![
                doc! { "_id": 1, "name": "Ada", "bio": "math", "age": 36, "joined": "2024-01-01" },
                doc! { "_id": 2, "name": "Alan", "bio": "logic", "age": 41 },
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn json_queries_become_filters() {
        let browser = browser();
        browser
            .list_documents(
                "people",
                ListRequest {
                    query: Some(r#"{"_id": "aaaaaaaaaaaaaaaaaaaaaaaa", "age": {"$gte": 30}}"#.into()),
                    ..Default::default()
                },
                &CallContext::new(),
            )
            .await
            .unwrap();

        let filter = browser.backend().filters.lock().unwrap().last().cloned().unwrap();
        assert!(matches!(filter.get("_id"), Some(bson::Bson::ObjectId(_))));
        assert_eq!(filter.get_document("age").unwrap(), &doc! { "$gte": 30 });
    }

    #[tokio::test]
    async fn free_text_searches_string_fields_with_escaped_pattern() {
        let browser = browser();
        let page = browser
            .list_documents(
                "people",
                ListRequest {
                    query: Some("a.b".into()),
                    use_cursor: true,
                    ..Default::default()
                },
                &CallContext::new(),
            )
            .await
            .unwrap();
        assert!(matches!(page, PageResult::Cursor(_)));

        let filter = browser.backend().filters.lock().unwrap().last().cloned().unwrap();
        assert_eq!(
            filter,
            doc! {
                "$or": [
                    { "name": { "$regex": "a\\.b", "$options": "i" } },
                    { "bio": { "$regex": "a\\.b", "$options": "i" } },
                ],
            }
        );
    }

    #[tokio::test]
    async fn server_side_code_is_rejected_before_the_store() {
        let browser = browser();

        for query in [r#"{"$where": "this.a > 1"}"#, r#"{"$or": [{"$WHERE": "1"}]}"#, "$function"] {
            let err = browser
                .list_documents(
                    "people",
                    ListRequest {
                        query: Some(query.into()),
                        ..Default::default()
                    },
                    &CallContext::new(),
                )
                .await
                .unwrap_err();
            assert!(err.is_input_error(), "{query}");
        }

        let err = browser
            .search_documents(
                "people",
                doc! { "a": { "$in": [ { "$function": {} } ] } },
                SearchRequest::default(),
                &CallContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrowseError::InvalidInput(_)));
        assert!(browser.backend().filters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn searchable_fields_skip_identifiers_numbers_and_dates() {
        let fields = browser()
            .searchable_fields("people", &CallContext::new())
            .await
            .unwrap();
        assert_eq!(fields, ["name", "bio"]);
    }

    #[tokio::test]
    async fn collections_are_listed_sorted() {
        let names = browser().list_collections(&CallContext::new()).await.unwrap();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = BrowseConfig {
            max_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            CollectionBrowser::with_config(FixedBackend::default(), config),
            Err(BrowseError::Config(_))
        ));
    }
}
