//! Generic collection browsing over JSON document databases.
//!
//! This crate is the primary entry point for users of docscope. It re-exports
//! the core types from the sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Offset and cursor pagination** - Stable keyset traversal with opaque, stateless tokens
//! - **Filter normalization** - Identifier-shaped strings become native identifiers
//! - **Schema inference** - From declared contracts, an OpenAPI registry or sampled documents
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docscope::{prelude::*, memory::MemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> BrowseResult<()> {
//!     let store = MemoryStore::new();
//!     store
//!         .insert("orders", [doc! { "total": 10 }, doc! { "total": 20 }])
//!         .await;
//!
//!     let browser = CollectionBrowser::new(store);
//!     let context = CallContext::new();
//!
//!     let mut cursor = None;
//!     loop {
//!         let page = browser
//!             .paginate_cursor(
//!                 "orders",
//!                 CursorRequest {
//!                     sort_field: Some("total".into()),
//!                     limit: Some(1),
//!                     cursor: cursor.take(),
//!                     ..Default::default()
//!                 },
//!                 &context,
//!             )
//!             .await?;
//!
//!         println!("{:?}", page.rows);
//!         match page.next_cursor {
//!             Some(next) => cursor = Some(next),
//!             None => break,
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Schema contracts
//!
//! ```ignore
//! use docscope::prelude::*;
//!
//! #[derive(ContractEnum)]
//! #[contract(rename_all = "lowercase")]
//! enum Status { Open, Closed }
//!
//! #[derive(Contract)]
//! #[contract(name = "orders")]
//! struct Order {
//!     #[contract(min = 0)]
//!     total: f64,
//!     #[contract(enumeration)]
//!     status: Status,
//!     note: Option<String>,
//! }
//!
//! let model = ContractModel::of::<Order>();
//! let report = browser
//!     .infer_schema("orders", InferRequest { contract: Some(&model), ..Default::default() }, &context)
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docscope_core::{
    backend, browser, collection, config, context, cursor, document, error, normalize, page,
    pagination, query, schema,
};
pub use docscope_macros::{Contract, ContractEnum};

#[doc(hidden)]
pub use docscope_core::__private;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docscope_memory::{MemoryStore, MemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docscope_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
