//! Offset and cursor pagination.
//!
//! Cursor mode keeps no server-side state: the token returned with a page holds
//! the last row's `(sort value, identifier)` pair, and the next request turns it
//! into a predicate that selects only rows strictly beyond that pair. Sorting by
//! the sort field and then by the identifier gives a total order, so a traversal
//! over an unchanging collection visits every document exactly once even when
//! many documents share a sort value.
//!
//! Offset mode fetches a page and counts all matches through the backend's
//! combined fetch+count primitive.

use bson::{Bson, Document};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::BrowseConfig,
    context::CallContext,
    cursor::{CursorCodec, CursorPosition},
    document::project,
    error::BrowseResult,
    normalize::{ID_FIELD, IdentifierNormalizer},
    page::{CursorPage, OffsetPage},
    query::{Filter, FindSpec, SortDirection},
};

/// Parameters of one cursor-mode request.
#[derive(Debug, Clone, Default)]
pub struct CursorRequest {
    pub filter: Document,
    /// Defaults to the identifier field.
    pub sort_field: Option<String>,
    pub direction: SortDirection,
    /// Defaults to the configured cursor page size; clamped to the ceiling.
    pub limit: Option<usize>,
    /// Token from the previous page.
    pub cursor: Option<String>,
    /// Fields to return. The identifier is always returned.
    pub projection: Option<Vec<String>>,
}

/// Parameters of one offset-mode request.
#[derive(Debug, Clone, Default)]
pub struct OffsetRequest {
    pub filter: Document,
    /// `None` keeps store order.
    pub sort_field: Option<String>,
    pub direction: SortDirection,
    pub skip: usize,
    /// Defaults to the configured page size; clamped to the ceiling.
    pub limit: Option<usize>,
    /// Fields to return. The identifier is always returned.
    pub projection: Option<Vec<String>>,
}

/// Produces pages in either mode. Stateless; share it freely.
#[derive(Debug, Clone)]
pub struct PaginationEngine {
    normalizer: IdentifierNormalizer,
    codec: CursorCodec,
    config: BrowseConfig,
}

impl Default for PaginationEngine {
    fn default() -> Self {
        Self::new(BrowseConfig::default())
    }
}

impl PaginationEngine {
    pub fn new(config: BrowseConfig) -> Self {
        Self {
            normalizer: IdentifierNormalizer::default(),
            codec: CursorCodec,
            config,
        }
    }

    pub fn with_normalizer(mut self, normalizer: IdentifierNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &BrowseConfig {
        &self.config
    }

    /// Returns one cursor-mode page.
    ///
    /// An undecodable cursor restarts the traversal from the first page.
    pub async fn paginate_cursor<B: StoreBackend>(
        &self,
        collection: &Collection<'_, B>,
        request: CursorRequest,
        context: &CallContext,
    ) -> BrowseResult<CursorPage> {
        let id_field = ID_FIELD;
        let sort_field = request
            .sort_field
            .filter(|field| !field.is_empty())
            .unwrap_or_else(|| id_field.to_owned());
        let limit = self
            .config
            .clamp_limit(request.limit.unwrap_or(self.config.default_cursor_limit));

        let mut filter = self.normalizer.normalize(&request.filter);
        if let Some(token) = request.cursor.as_deref() {
            match self.codec.decode(token, &sort_field) {
                Some(position) => {
                    let predicate = self.tie_break(&sort_field, request.direction, &position);
                    debug!(%predicate, "resuming after cursor");
                    filter = Filter::and([filter, predicate]);
                }
                None => debug!("undecodable cursor, restarting from the first page"),
            }
        }

        let mut builder = FindSpec::builder()
            .filter(filter)
            .sort(sort_field.as_str(), request.direction)
            .limit(limit + 1);
        if sort_field != id_field {
            builder = builder.sort(id_field, request.direction);
        }
        if let Some(fields) = &request.projection {
            builder = builder.projection(self.with_required_fields(fields, &[&sort_field]));
        }

        let mut rows = collection.find(builder.build(), context).await?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = match (has_more, rows.last()) {
            (true, Some(last)) => Some(self.codec.encode(last, &sort_field)),
            _ => None,
        };

        if let Some(fields) = &request.projection {
            let keep = self.with_required_fields(fields, &[]);
            rows = rows.iter().map(|row| project(row, &keep)).collect();
        }

        debug!(
            collection = collection.name(),
            sort_field = sort_field.as_str(),
            limit,
            returned = rows.len(),
            has_more,
            "cursor page fetched"
        );

        Ok(CursorPage::builder(rows)
            .with_next_cursor(next_cursor)
            .with_limit(limit)
            .build())
    }

    /// Returns one offset-mode page together with the total match count.
    pub async fn paginate_offset<B: StoreBackend>(
        &self,
        collection: &Collection<'_, B>,
        request: OffsetRequest,
        context: &CallContext,
    ) -> BrowseResult<OffsetPage> {
        let id_field = ID_FIELD;
        let limit = self
            .config
            .clamp_limit(request.limit.unwrap_or(self.config.default_limit));
        let skip = self.config.clamp_skip(request.skip);

        let mut builder = FindSpec::builder()
            .filter(self.normalizer.normalize(&request.filter))
            .skip(skip)
            .limit(limit);
        if let Some(sort_field) = request.sort_field.filter(|field| !field.is_empty()) {
            builder = builder.sort(sort_field.as_str(), request.direction);
            if sort_field != id_field {
                builder = builder.sort(id_field, request.direction);
            }
        }
        if let Some(fields) = &request.projection {
            builder = builder.projection(self.with_required_fields(fields, &[]));
        }

        let (rows, total) = collection.find_with_count(builder.build(), context).await?;

        debug!(
            collection = collection.name(),
            skip,
            limit,
            returned = rows.len(),
            total,
            "offset page fetched"
        );

        Ok(OffsetPage::builder(rows)
            .with_total(total)
            .with_skip(skip)
            .with_limit(limit)
            .build())
    }

    /// Builds the predicate selecting rows strictly beyond `position`.
    ///
    /// For an identifier sort this is `_id beyond last_id`. Otherwise it is
    /// `sort_field beyond last_value OR (sort_field == last_value AND _id beyond last_id)`,
    /// where "beyond" means `$gt` ascending and `$lt` descending.
    ///
    /// Null and missing values sort first, and range operators never match across
    /// types. Descending traversals therefore also select every null row once past
    /// the non-null values, and a null position is resumed with `$ne: null`
    /// ascending and only the remaining nulls descending.
    pub fn tie_break(
        &self,
        sort_field: &str,
        direction: SortDirection,
        position: &CursorPosition,
    ) -> Document {
        let id_field = ID_FIELD;
        let last_id = position.id.clone();

        match &position.sort_value {
            Some(Bson::Null) if sort_field != id_field => {
                let mut remaining_nulls = Filter::eq(sort_field, Bson::Null);
                remaining_nulls.extend(Filter::beyond(id_field, direction, last_id));

                match direction {
                    SortDirection::Asc => {
                        Filter::or([Filter::ne(sort_field, Bson::Null), remaining_nulls])
                    }
                    SortDirection::Desc => remaining_nulls,
                }
            }
            Some(last_value) if sort_field != id_field => {
                let mut same_value = Filter::eq(sort_field, last_value.clone());
                for (key, value) in Filter::beyond(id_field, direction, last_id) {
                    same_value.insert(key, value);
                }

                let beyond = Filter::beyond(sort_field, direction, last_value.clone());
                match direction {
                    SortDirection::Asc => Filter::or([beyond, same_value]),
                    SortDirection::Desc => {
                        Filter::or([beyond, same_value, Filter::eq(sort_field, Bson::Null)])
                    }
                }
            }
            _ => Filter::beyond(id_field, direction, last_id),
        }
    }

    fn with_required_fields(&self, fields: &[String], extra: &[&str]) -> Vec<String> {
        let mut required = vec![ID_FIELD.to_owned()];
        required.extend(extra.iter().map(|field| (*field).to_owned()));
        required.extend(fields.iter().cloned());

        let mut seen = Vec::with_capacity(required.len());
        for field in required {
            if !seen.contains(&field) {
                seen.push(field);
            }
        }
        seen
    }
}
