//! In-memory document storage backend for docscope.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It evaluates MongoDB-dialect filters itself and is meant
//! for development, tests and small fixed datasets.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Filter evaluation** - Comparison, membership, regex and logical operators over dotted paths
//! - **Total ordering** - Mixed-type fields sort in a fixed cross-type order
//!
//! # Quick Start
//!
//! ```ignore
//! use docscope::{prelude::*, memory::MemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     store.insert("users", [doc! { "name": "Alice" }]).await;
//!
//!     let browser = CollectionBrowser::new(store);
//!     let page = browser
//!         .list_documents("users", ListRequest::default(), &CallContext::new())
//!         .await?;
//!     assert_eq!(page.rows().len(), 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docscope_memory;

pub mod evaluator;
pub mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};
