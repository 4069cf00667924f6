use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
};
use tracing::{debug, warn};

use docscope_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{BrowseError, BrowseResult},
    query::FindSpec,
};

/// Maps a driver error onto the browse error families.
fn classify(error: MongoError) -> BrowseError {
    match error.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => BrowseError::Unavailable(error.to_string()),
        ErrorKind::Command(_) | ErrorKind::InvalidArgument { .. } => {
            BrowseError::InvalidInput(error.to_string())
        }
        _ => BrowseError::Backend(error.to_string()),
    }
}

/// Builds the single aggregation that returns one page and the total match count.
fn facet_pipeline(spec: &FindSpec) -> Vec<Document> {
    let mut page = Vec::new();
    let sort = spec.sort_document();
    if !sort.is_empty() {
        page.push(doc! { "$sort": sort });
    }
    if spec.skip > 0 {
        page.push(doc! { "$skip": spec.skip as i64 });
    }
    if let Some(limit) = spec.limit {
        page.push(doc! { "$limit": limit as i64 });
    }
    if let Some(projection) = spec.projection_document() {
        page.push(doc! { "$project": projection });
    }

    vec![
        doc! { "$match": spec.filter.clone() },
        doc! { "$facet": { "rows": page, "total": [ { "$count": "n" } ] } },
    ]
}

/// Splits the `$facet` output document into rows and total.
fn unpack_facet(result: Option<Document>) -> BrowseResult<(Vec<Document>, u64)> {
    let Some(result) = result else {
        return Ok((Vec::new(), 0));
    };

    let rows = match result.get("rows") {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(document) => Ok(document.clone()),
                other => Err(BrowseError::Backend(format!(
                    "unexpected row in facet output: {other}"
                ))),
            })
            .collect::<BrowseResult<Vec<_>>>()?,
        _ => Vec::new(),
    };

    let total = result
        .get_array("total")
        .ok()
        .and_then(|counts| counts.first())
        .and_then(Bson::as_document)
        .and_then(|count| match count.get("n") {
            Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
            Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0);

    Ok((rows, total))
}

/// MongoDB-backed store. Queries run natively; filters are passed through as is.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, spec: FindSpec) -> BrowseResult<Vec<Document>> {
        let sort = spec.sort_document();
        let coll = self.get_collection(collection);
        let mut find = coll
            .find(spec.filter.clone())
            .skip(spec.skip as u64);
        if !sort.is_empty() {
            find = find.sort(sort);
        }
        if let Some(limit) = spec.limit {
            find = find.limit(limit as i64);
        }
        if let Some(projection) = spec.projection_document() {
            find = find.projection(projection);
        }

        find.await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(classify)
    }

    async fn count(&self, collection: &str, filter: Document) -> BrowseResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(classify)
    }

    async fn find_with_count(
        &self,
        collection: &str,
        spec: FindSpec,
    ) -> BrowseResult<(Vec<Document>, u64)> {
        let pipeline = facet_pipeline(&spec);
        debug!(collection, stages = pipeline.len(), "running facet aggregation");

        let result = self
            .get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(classify)?
            .try_next()
            .await
            .map_err(classify)?;

        unpack_facet(result)
    }

    async fn sample(&self, collection: &str, limit: usize) -> BrowseResult<Vec<Document>> {
        self.get_collection(collection)
            .aggregate([doc! { "$sample": { "size": limit as i64 } }])
            .await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(classify)
    }

    async fn list_collections(&self) -> BrowseResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(classify)
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    server_selection_timeout: Option<Duration>,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            server_selection_timeout: None,
            app_name: None,
        }
    }

    /// How long the driver waits for a usable server before a call fails as unavailable.
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> BrowseResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn).await.map_err(|e| {
            warn!(error = %e, "invalid MongoDB connection string");
            BrowseError::Config(e.to_string())
        })?;
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        let client = Client::with_options(options).map_err(|e| BrowseError::Config(e.to_string()))?;
        Ok(MongoDbStore::new(client, self.database))
    }
}

#[cfg(test)]
mod tests {
    use docscope_core::query::SortDirection;

    use super::*;

    #[test]
    fn facet_pipeline_matches_once_and_pages_inside_the_facet() {
        let spec = FindSpec::builder()
            .filter(doc! { "status": "open" })
            .sort("created", SortDirection::Desc)
            .sort("_id", SortDirection::Desc)
            .skip(20)
            .limit(10)
            .projection(vec!["_id".into(), "status".into()])
            .build();

        assert_eq!(
            facet_pipeline(&spec),
            vec![
                doc! { "$match": { "status": "open" } },
                doc! {
                    "$facet": {
                        "rows": [
                            { "$sort": { "created": -1, "_id": -1 } },
                            { "$skip": 20_i64 },
                            { "$limit": 10_i64 },
                            { "$project": { "_id": 1, "status": 1 } },
                        ],
                        "total": [ { "$count": "n" } ],
                    }
                },
            ]
        );
    }

    #[test]
    fn facet_pipeline_omits_empty_stages() {
        let pipeline = facet_pipeline(&FindSpec::new());
        assert_eq!(
            pipeline[1],
            doc! { "$facet": { "rows": [], "total": [ { "$count": "n" } ] } }
        );
    }

    #[test]
    fn unpacks_facet_output() {
        let (rows, total) = unpack_facet(Some(doc! {
            "rows": [ { "_id": 1 }, { "_id": 2 } ],
            "total": [ { "n": 7 } ],
        }))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(total, 7);

        let (rows, total) = unpack_facet(Some(doc! { "rows": [], "total": [] })).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);

        assert_eq!(unpack_facet(None).unwrap(), (Vec::new(), 0));
    }

    #[test]
    fn non_document_rows_are_backend_errors() {
        let err = unpack_facet(Some(doc! { "rows": [1], "total": [] })).unwrap_err();
        assert!(err.is_backend_error());
    }
}
