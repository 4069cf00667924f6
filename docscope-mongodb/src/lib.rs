//! MongoDB backend implementation for docscope.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, sorts and projections are handed to the server as is; offset pages
//! and their totals come from a single `$facet` aggregation.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docscope = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Errors
//!
//! Driver failures are classified: server selection, I/O and pool failures become
//! `BrowseError::Unavailable`, command and argument failures (a filter the server
//! refuses) become `BrowseError::InvalidInput`, everything else
//! `BrowseError::Backend`.
//!
//! # Example
//!
//! ```ignore
//! use docscope::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .with_server_selection_timeout(Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docscope_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
