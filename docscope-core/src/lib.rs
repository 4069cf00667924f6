//! Generic collection browsing over JSON document databases.
//!
//! This crate is the core of the docscope project and provides:
//!
//! - **Store backend abstraction** ([`backend`]) - The narrow query surface a document store implements
//! - **Collection browser** ([`browser`]) - The facade an HTTP layer calls: listing, search, schema
//! - **Pagination** ([`pagination`], [`cursor`], [`page`]) - Offset pages and opaque, stateless cursor tokens
//! - **Filter normalization** ([`normalize`]) - Rewriting identifier-shaped strings into native identifiers
//! - **Schema inference** ([`schema`]) - Field reports from contracts, registries or sampled documents
//! - **Query and filtering API** ([`query`]) - Filter builders, the expression tree and operator screening
//! - **Call context** ([`context`]) - Per-call deadlines and cancellation
//! - **Configuration** ([`config`]) - Page size ceilings, sampling and timeouts, loadable from TOML
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docscope_core::{browser::{CollectionBrowser, ListRequest}, context::CallContext};
//!
//! let browser = CollectionBrowser::new(store);
//! let page = browser
//!     .list_documents("orders", ListRequest { use_cursor: true, ..Default::default() }, &CallContext::new())
//!     .await?;
//! println!("{}", page.to_display_json());
//! ```

#[allow(unused_extern_crates)]
extern crate self as docscope_core;

pub mod backend;
pub mod browser;
pub mod collection;
pub mod config;
pub mod context;
pub mod cursor;
pub mod document;
pub mod error;
pub mod normalize;
pub mod page;
pub mod pagination;
pub mod query;
pub mod schema;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
