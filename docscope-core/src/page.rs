//! Page types returned by the pagination engine.
//!
//! Cursor mode answers with a [`CursorPage`], offset mode with an [`OffsetPage`].
//! [`PageResult`] wraps either one in a uniform envelope tagged with
//! `pagination_type`, which is what the facade hands to its callers.

use bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::document::document_to_display_json;

/// One page of a cursor traversal.
///
/// `rows.len() <= limit` always holds, and `has_more` is true exactly when the
/// engine saw more rows than `limit`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CursorPage {
    pub rows: Vec<Document>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub limit: usize,
}

impl CursorPage {
    pub fn builder(rows: Vec<Document>) -> CursorPageBuilder {
        CursorPageBuilder::new(rows)
    }
}

pub struct CursorPageBuilder {
    rows: Vec<Document>,
    next_cursor: Option<String>,
    has_more: bool,
    limit: usize,
}

impl CursorPageBuilder {
    pub fn new(rows: Vec<Document>) -> Self {
        Self {
            rows,
            next_cursor: None,
            has_more: false,
            limit: 0,
        }
    }

    pub fn with_next_cursor(mut self, next_cursor: Option<String>) -> Self {
        self.has_more = next_cursor.is_some();
        self.next_cursor = next_cursor;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(self) -> CursorPage {
        CursorPage {
            rows: self.rows,
            next_cursor: self.next_cursor,
            has_more: self.has_more,
            limit: self.limit,
        }
    }
}

/// One page of an offset traversal.
///
/// `total` counts every document matching the filter, independent of `skip` and
/// `limit`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OffsetPage {
    pub rows: Vec<Document>,
    pub total: u64,
    pub skip: usize,
    pub limit: usize,
}

impl OffsetPage {
    pub fn builder(rows: Vec<Document>) -> OffsetPageBuilder {
        OffsetPageBuilder::new(rows)
    }

    /// Whether rows exist past this page.
    pub fn has_more(&self) -> bool {
        ((self.skip + self.rows.len()) as u64) < self.total
    }
}

pub struct OffsetPageBuilder {
    rows: Vec<Document>,
    total: u64,
    skip: usize,
    limit: usize,
}

impl OffsetPageBuilder {
    pub fn new(rows: Vec<Document>) -> Self {
        Self {
            rows,
            total: 0,
            skip: 0,
            limit: 0,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(self) -> OffsetPage {
        OffsetPage {
            rows: self.rows,
            total: self.total,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Uniform envelope over both pagination modes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "pagination_type", rename_all = "lowercase")]
pub enum PageResult {
    Cursor(CursorPage),
    Offset(OffsetPage),
}

impl PageResult {
    pub fn rows(&self) -> &[Document] {
        match self {
            PageResult::Cursor(page) => &page.rows,
            PageResult::Offset(page) => &page.rows,
        }
    }

    pub fn into_rows(self) -> Vec<Document> {
        match self {
            PageResult::Cursor(page) => page.rows,
            PageResult::Offset(page) => page.rows,
        }
    }

    pub fn has_more(&self) -> bool {
        match self {
            PageResult::Cursor(page) => page.has_more,
            PageResult::Offset(page) => page.has_more(),
        }
    }

    /// Renders the envelope as display JSON, with rows flattened by
    /// [`document_to_display_json`].
    pub fn to_display_json(&self) -> Value {
        let rows = self
            .rows()
            .iter()
            .map(document_to_display_json)
            .collect::<Vec<_>>();

        match self {
            PageResult::Cursor(page) => json!({
                "pagination_type": "cursor",
                "rows": rows,
                "next_cursor": page.next_cursor,
                "has_more": page.has_more,
                "limit": page.limit,
            }),
            PageResult::Offset(page) => json!({
                "pagination_type": "offset",
                "rows": rows,
                "total": page.total,
                "skip": page.skip,
                "limit": page.limit,
            }),
        }
    }
}

impl From<CursorPage> for PageResult {
    fn from(page: CursorPage) -> Self {
        PageResult::Cursor(page)
    }
}

impl From<OffsetPage> for PageResult {
    fn from(page: OffsetPage) -> Self {
        PageResult::Offset(page)
    }
}
